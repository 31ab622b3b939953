use crate::landmarks::LandmarkSet;
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("Failed to load hand landmark model: {0}")]
    Load(String),
    #[error("Hand landmark inference failed: {0}")]
    Inference(String),
    #[error("Hand landmark model returned malformed output: {0}")]
    MalformedOutput(String),
}

/// Detects at most one hand in an RGB image.
///
/// Every call is an independent static-image detection: implementations must
/// not carry tracking or timestamp state from one call into the next, and a
/// detector context in use by one call is never handed to another call at
/// the same time.
pub trait LandmarkExtractor: Send + Sync + 'static {
    fn extract(&self, image: &RgbImage) -> Result<Option<LandmarkSet>, ExtractorError>;
}

/// The hand detector the service runs with, or why it could not be built.
#[derive(Clone)]
pub enum ExtractorSlot {
    Ready(Arc<dyn LandmarkExtractor>),
    Unavailable(String),
}
