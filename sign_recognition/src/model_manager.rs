use crate::{
    labels::LabelSet,
    landmarks::{COORDINATES, LANDMARK_COUNT},
    model_service::{GestureModel, ModelError, ModelLoader},
};
use ndarray::Array3;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

enum LoadState {
    Loaded(Arc<dyn GestureModel>),
    Failed(String),
}

/// Owns the gesture classifier for the lifetime of the process.
///
/// The load routine runs at most once: concurrent first callers serialise on
/// `init_lock`, everyone after that reads the settled state without locking.
/// A failed load is recorded, never raised, and never retried.
pub struct ModelManager {
    loader: Box<dyn ModelLoader>,
    labels: LabelSet,
    init_lock: Mutex<()>,
    state: OnceLock<LoadState>,
}

impl ModelManager {
    pub fn new(loader: impl ModelLoader, labels: LabelSet) -> Self {
        Self {
            loader: Box::new(loader),
            labels,
            init_lock: Mutex::new(()),
            state: OnceLock::new(),
        }
    }

    /// Runs the load routine if nobody has yet and reports the outcome.
    pub fn ensure_loaded(&self) -> bool {
        matches!(self.state(), LoadState::Loaded(_))
    }

    pub fn get_model(&self) -> Option<Arc<dyn GestureModel>> {
        match self.state() {
            LoadState::Loaded(model) => Some(model.clone()),
            LoadState::Failed(_) => None,
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        let loaded = self.ensure_loaded();
        tracing::debug!(loaded, "Model load status requested");
        loaded
    }

    pub fn load_error(&self) -> Option<&str> {
        match self.state() {
            LoadState::Loaded(_) => None,
            LoadState::Failed(error) => Some(error.as_str()),
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    fn state(&self) -> &LoadState {
        if let Some(state) = self.state.get() {
            return state;
        }
        let _guard = self.init_lock.lock();
        self.state.get_or_init(|| self.load())
    }

    fn load(&self) -> LoadState {
        match std::env::current_dir() {
            Ok(dir) => tracing::info!("ModelManager: current directory {}", dir.display()),
            Err(e) => tracing::warn!("ModelManager: current directory unavailable: {}", e),
        }
        tracing::info!("ModelManager: model path {}", self.loader.describe());

        match self.load_and_validate() {
            Ok(model) => {
                tracing::info!("ModelManager: model loaded successfully");
                LoadState::Loaded(model)
            }
            Err(e) => {
                tracing::error!("ModelManager: error loading model: {}", e);
                LoadState::Failed(e.to_string())
            }
        }
    }

    fn load_and_validate(&self) -> Result<Arc<dyn GestureModel>, ModelError> {
        let model = self.loader.load()?;

        let dummy_input =
            Array3::from_shape_fn((1, LANDMARK_COUNT, COORDINATES), |_| rand::random::<f32>());
        let scores = model.predict(dummy_input.view())?;
        tracing::info!(
            "ModelManager: validation inference returned {} class scores",
            scores.len()
        );

        if scores.len() != self.labels.len() {
            return Err(ModelError::OutputMismatch {
                expected: self.labels.len(),
                actual: scores.len(),
            });
        }

        Ok(model)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::ArrayView3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores a fixed class and counts its invocations.
    pub(crate) struct FixedModel {
        pub(crate) class_index: usize,
        pub(crate) num_classes: usize,
        pub(crate) calls: AtomicUsize,
    }

    impl FixedModel {
        pub(crate) fn new(class_index: usize, num_classes: usize) -> Self {
            Self {
                class_index,
                num_classes,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl GestureModel for FixedModel {
        fn predict(&self, input: ArrayView3<'_, f32>) -> Result<Vec<f32>, ModelError> {
            assert_eq!(input.shape(), &[1, 21, 3]);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let rest = 0.1 / (self.num_classes.max(2) - 1) as f32;
            Ok((0..self.num_classes)
                .map(|i| if i == self.class_index { 0.9 } else { rest })
                .collect())
        }
    }

    pub(crate) struct MockLoader {
        pub(crate) num_classes: Option<usize>,
        pub(crate) loads: Arc<AtomicUsize>,
    }

    impl MockLoader {
        pub(crate) fn loaded(num_classes: usize) -> Self {
            Self {
                num_classes: Some(num_classes),
                loads: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn missing() -> Self {
            Self {
                num_classes: None,
                loads: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ModelLoader for MockLoader {
        fn describe(&self) -> String {
            "mock://hand_landmarks.onnx".into()
        }

        fn load(&self) -> Result<Arc<dyn GestureModel>, ModelError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            match self.num_classes {
                Some(n) => Ok(Arc::new(FixedModel::new(3, n))),
                None => Err(ModelError::NotFound(self.describe())),
            }
        }
    }

    #[test]
    fn load_runs_once_under_concurrent_first_callers() {
        let loader = MockLoader::loaded(39);
        let loads = loader.loads.clone();
        let manager = Arc::new(ModelManager::new(loader, LabelSet::extended()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.get_model().is_some())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(manager.is_model_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_model_is_recorded_not_raised() {
        let manager = ModelManager::new(MockLoader::missing(), LabelSet::extended());

        assert!(!manager.ensure_loaded());
        assert!(manager.get_model().is_none());
        assert_eq!(
            manager.load_error(),
            Some("Model file not found at mock://hand_landmarks.onnx")
        );
    }

    #[test]
    fn output_size_must_match_label_set() {
        let manager = ModelManager::new(MockLoader::loaded(36), LabelSet::extended());

        assert!(!manager.is_model_loaded());
        let error = manager.load_error().unwrap();
        assert!(error.contains("36 class scores"));
        assert!(error.contains("39 labels"));
    }
}
