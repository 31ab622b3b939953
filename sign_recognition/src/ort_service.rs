use crate::{
    config::ModelConfig,
    model_service::{GestureModel, ModelError, ModelLoader},
};
use ndarray::ArrayView3;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

/// Builds `count` sessions for the same ONNX file.
pub(crate) fn build_sessions(path: &Path, count: usize) -> Result<Vec<Mutex<Session>>, ort::Error> {
    (0..count.max(1))
        .map(|_| {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(path)?;
            Ok(Mutex::new(session))
        })
        .collect()
}

/// Round-robin pool of ONNX sessions. A session is held by exactly one call
/// at a time.
pub(crate) struct SessionPool {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
}

impl SessionPool {
    pub(crate) fn new(sessions: Vec<Mutex<Session>>) -> Self {
        Self {
            sessions,
            counter: AtomicUsize::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn output_names(&self) -> Vec<String> {
        match self.sessions.first().and_then(|s| s.lock().ok()) {
            Some(session) => session.outputs.iter().map(|o| o.name.clone()).collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn with_session<T>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<T, String>,
    ) -> Result<T, String> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| format!("session mutex poisoned: {}", e))?;

        tracing::debug!("Handling request with session {}", index);
        f(&mut session)
    }
}

pub struct OrtGestureModel {
    pool: SessionPool,
    output_name: String,
}

impl OrtGestureModel {
    pub fn new(path: &Path, num_instances: usize) -> Result<Self, ModelError> {
        let sessions =
            build_sessions(path, num_instances).map_err(|e| ModelError::Load(e.to_string()))?;
        let pool = SessionPool::new(sessions);
        let output_name = pool
            .output_names()
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Load("model declares no outputs".into()))?;

        tracing::info!("Created {} classifier ONNX sessions", pool.len());

        Ok(Self { pool, output_name })
    }
}

impl GestureModel for OrtGestureModel {
    fn predict(&self, input: ArrayView3<'_, f32>) -> Result<Vec<f32>, ModelError> {
        let owned_buffer;
        let input_view = if input.is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.to_owned();
            owned_buffer.view()
        };

        self.pool
            .with_session(|session| {
                let tensor_ref = TensorRef::from_array_view(input_view)
                    .map_err(|e| format!("failed to build tensor: {}", e))?;

                let outputs = session
                    .run(ort::inputs![tensor_ref])
                    .map_err(|e| format!("inference failed: {}", e))?;

                let (_shape, data) = outputs[self.output_name.as_str()]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| format!("failed to extract tensor: {}", e))?;

                Ok(data.to_vec())
            })
            .map_err(ModelError::Inference)
    }
}

/// Loads the classifier from the configured ONNX file.
pub struct OrtModelLoader {
    path: PathBuf,
    num_instances: usize,
}

impl OrtModelLoader {
    pub fn new(model_config: &ModelConfig) -> Self {
        Self {
            path: model_config.get_path(),
            num_instances: model_config.num_instances,
        }
    }
}

impl ModelLoader for OrtModelLoader {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Arc<dyn GestureModel>, ModelError> {
        let exists = self.path.exists();
        tracing::info!(path = %self.path.display(), exists, "Locating classifier model");
        if !exists {
            return Err(ModelError::NotFound(self.describe()));
        }

        tracing::info!("Loading classifier model from {}", self.path.display());
        let model = OrtGestureModel::new(&self.path, self.num_instances)?;
        Ok(Arc::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_file_is_reported_with_its_path() {
        let loader = OrtModelLoader::new(&ModelConfig {
            model_dir: PathBuf::from("/nonexistent"),
            model_file: "hand_landmarks.onnx".into(),
            num_instances: 1,
        });

        match loader.load() {
            Err(ModelError::NotFound(path)) => {
                assert_eq!(path, "/nonexistent/hand_landmarks.onnx")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("loading a missing file must fail"),
        }
    }
}
