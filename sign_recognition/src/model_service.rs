use ndarray::ArrayView3;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ModelError {
    #[error("Model file not found at {0}")]
    NotFound(String),
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Model produced {actual} class scores but the label set has {expected} labels")]
    OutputMismatch { expected: usize, actual: usize },
}

/// A loaded gesture classifier.
///
/// `predict` takes a `(1, 21, 3)` landmark tensor and returns one probability
/// per class, in label-set order.
pub trait GestureModel: Send + Sync + 'static {
    fn predict(&self, input: ArrayView3<'_, f32>) -> Result<Vec<f32>, ModelError>;
}

/// Produces the classifier handle. Called at most once per [`ModelManager`].
///
/// [`ModelManager`]: crate::model_manager::ModelManager
pub trait ModelLoader: Send + Sync + 'static {
    fn describe(&self) -> String;
    fn load(&self) -> Result<Arc<dyn GestureModel>, ModelError>;
}
