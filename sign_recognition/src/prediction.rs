use crate::{
    cv_utils::{self, CvUtilsError},
    labels::LabelSet,
    landmark_service::{ExtractorError, ExtractorSlot, LandmarkExtractor},
    landmarks::LandmarkSet,
    model_manager::ModelManager,
    model_service::{GestureModel, ModelError},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("No image data provided")]
    MissingImage,
    #[error("Model not available")]
    ModelUnavailable,
    #[error("Hand landmark model not available")]
    DetectorUnavailable,
    #[error("Error processing image: {0}")]
    Image(#[from] CvUtilsError),
    #[error("Error processing image: {0}")]
    Extraction(#[from] ExtractorError),
    #[error("Error running prediction: {0}")]
    Model(#[from] ModelError),
    #[error("Prediction task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
    pub annotated_image: String,
    pub landmarks: LandmarkSet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutcome {
    Recognized(Prediction),
    NoHand,
}

/// Picks the highest scoring class. Confidence is that score, clamped to `[0, 1]`.
pub fn classify(
    model: &dyn GestureModel,
    labels: &LabelSet,
    landmarks: &LandmarkSet,
) -> Result<(String, f32), ModelError> {
    let scores = model.predict(landmarks.to_tensor().view())?;
    if scores.iter().any(|score| !score.is_finite()) {
        return Err(ModelError::Inference(
            "model returned non-finite class scores".into(),
        ));
    }

    let (class_id, prob) = scores
        .iter()
        .copied()
        .enumerate()
        .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
        .ok_or_else(|| ModelError::Inference("model returned no class scores".into()))?;

    let label = labels.get(class_id).ok_or(ModelError::OutputMismatch {
        expected: labels.len(),
        actual: scores.len(),
    })?;

    Ok((label.to_string(), prob.clamp(0.0, 1.0)))
}

/// Decode, detect, annotate and classify one image.
#[derive(Clone)]
pub struct PredictionService {
    extractor: ExtractorSlot,
    model_manager: Arc<ModelManager>,
}

impl PredictionService {
    pub fn new(extractor: Arc<dyn LandmarkExtractor>, model_manager: Arc<ModelManager>) -> Self {
        Self {
            extractor: ExtractorSlot::Ready(extractor),
            model_manager,
        }
    }

    /// A service whose hand detector failed to load. Every prediction fails
    /// with [`PredictionError::DetectorUnavailable`].
    pub fn without_extractor(reason: impl Into<String>, model_manager: Arc<ModelManager>) -> Self {
        Self {
            extractor: ExtractorSlot::Unavailable(reason.into()),
            model_manager,
        }
    }

    pub fn model_manager(&self) -> &ModelManager {
        &self.model_manager
    }

    pub fn extractor_error(&self) -> Option<&str> {
        match &self.extractor {
            ExtractorSlot::Ready(_) => None,
            ExtractorSlot::Unavailable(reason) => Some(reason.as_str()),
        }
    }

    /// `payload` is a data URL (`<prefix>,<base64>`) or bare base64.
    #[instrument(skip_all)]
    pub fn predict(&self, payload: &str) -> Result<PredictionOutcome, PredictionError> {
        if payload.trim().is_empty() {
            return Err(PredictionError::MissingImage);
        }

        let model = self
            .model_manager
            .get_model()
            .ok_or(PredictionError::ModelUnavailable)?;
        let ExtractorSlot::Ready(extractor) = &self.extractor else {
            return Err(PredictionError::DetectorUnavailable);
        };

        let bytes = cv_utils::decode_base64(payload)?;
        let image = cv_utils::decode_image(&bytes)?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "Decoded request image"
        );

        let Some(landmarks) = extractor.extract(&image)? else {
            tracing::info!("No hand detected in image");
            return Ok(PredictionOutcome::NoHand);
        };

        let annotated = cv_utils::annotate(&image, &landmarks);
        let annotated_image = cv_utils::to_jpeg_data_url(&annotated)?;

        let (label, confidence) =
            classify(model.as_ref(), self.model_manager.labels(), &landmarks)?;
        tracing::info!(prediction = %label, confidence, "Prediction successful");

        Ok(PredictionOutcome::Recognized(Prediction {
            label,
            confidence,
            annotated_image,
            landmarks,
        }))
    }

    /// Runs [`predict`](Self::predict) on the blocking pool.
    pub async fn predict_blocking(
        &self,
        payload: String,
    ) -> Result<PredictionOutcome, PredictionError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.predict(&payload))
            .await
            .map_err(|e| PredictionError::Task(e.to_string()))?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        landmarks::{Landmark, LANDMARK_COUNT},
        model_manager::tests::{FixedModel, MockLoader},
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::{
        io::Cursor,
        sync::atomic::{AtomicUsize, Ordering},
    };

    /// Reports a fixed hand, or no hand, and counts its invocations.
    pub(crate) struct MockExtractor {
        pub(crate) hand: bool,
        pub(crate) calls: AtomicUsize,
    }

    impl MockExtractor {
        pub(crate) fn new(hand: bool) -> Self {
            Self {
                hand,
                calls: AtomicUsize::new(0),
            }
        }
    }

    pub(crate) fn sample_landmarks() -> LandmarkSet {
        let mut points = [Landmark::default(); LANDMARK_COUNT];
        for (i, point) in points.iter_mut().enumerate() {
            *point = Landmark::new(0.3 + 0.02 * i as f32, 0.4 + 0.01 * i as f32, -0.01);
        }
        LandmarkSet::new(points)
    }

    impl LandmarkExtractor for MockExtractor {
        fn extract(&self, _image: &RgbImage) -> Result<Option<LandmarkSet>, ExtractorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hand.then(sample_landmarks))
        }
    }

    pub(crate) fn image_payload() -> String {
        let image = RgbImage::from_pixel(32, 24, Rgb([200, 150, 100]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    fn service(hand: bool, loader: MockLoader) -> (PredictionService, Arc<MockExtractor>) {
        let extractor = Arc::new(MockExtractor::new(hand));
        let manager = Arc::new(ModelManager::new(loader, LabelSet::extended()));
        (PredictionService::new(extractor.clone(), manager), extractor)
    }

    #[test]
    fn classify_takes_the_highest_score() {
        let model = FixedModel::new(12, 39);
        let (label, confidence) =
            classify(&model, &LabelSet::extended(), &sample_landmarks()).unwrap();

        assert_eq!(label, "C");
        assert!((confidence - 0.9).abs() < 1e-6);
    }

    struct NanModel;

    impl GestureModel for NanModel {
        fn predict(&self, _input: ndarray::ArrayView3<'_, f32>) -> Result<Vec<f32>, ModelError> {
            let mut scores = vec![0.01; 39];
            scores[5] = f32::NAN;
            Ok(scores)
        }
    }

    #[test]
    fn classify_rejects_non_finite_scores() {
        let err = classify(&NanModel, &LabelSet::extended(), &sample_landmarks()).unwrap_err();
        assert!(matches!(err, ModelError::Inference(_)));
    }

    #[test]
    fn recognized_hand_returns_label_from_the_set() {
        let (service, _) = service(true, MockLoader::loaded(39));

        let outcome = service.predict(&image_payload()).unwrap();
        let PredictionOutcome::Recognized(prediction) = outcome else {
            panic!("expected a recognized hand");
        };

        assert!(LabelSet::extended().contains(&prediction.label));
        assert!((0.0..=1.0).contains(&prediction.confidence));
        assert!(prediction
            .annotated_image
            .starts_with("data:image/jpeg;base64,"));
        assert_eq!(prediction.landmarks.to_triples().len(), 21);
    }

    #[test]
    fn no_hand_is_a_negative_result() {
        let (service, _) = service(false, MockLoader::loaded(39));

        assert_eq!(
            service.predict(&image_payload()).unwrap(),
            PredictionOutcome::NoHand
        );
    }

    #[test]
    fn missing_model_short_circuits_before_detection() {
        let (service, extractor) = service(true, MockLoader::missing());

        assert!(matches!(
            service.predict(&image_payload()),
            Err(PredictionError::ModelUnavailable)
        ));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_detector_fails_every_prediction() {
        let manager = Arc::new(ModelManager::new(
            MockLoader::loaded(39),
            LabelSet::extended(),
        ));
        let service = PredictionService::without_extractor("model file not found", manager);

        assert_eq!(service.extractor_error(), Some("model file not found"));
        assert!(matches!(
            service.predict(&image_payload()),
            Err(PredictionError::DetectorUnavailable)
        ));
    }

    #[test]
    fn undecodable_payload_is_an_image_error() {
        let (service, _) = service(true, MockLoader::loaded(39));
        let payload = format!("data:image/png;base64,{}", STANDARD.encode(b"not an image"));

        let err = service.predict(&payload).unwrap_err();
        assert!(matches!(err, PredictionError::Image(_)));
        assert!(err.to_string().starts_with("Error processing image"));
    }

    #[test]
    fn repeated_requests_are_deterministic() {
        let (service, _) = service(true, MockLoader::loaded(39));
        let payload = image_payload();

        let first = service.predict(&payload).unwrap();
        let second = service.predict(&payload).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn blocking_prediction_matches_direct_call() {
        let (service, _) = service(true, MockLoader::loaded(39));

        let outcome = service.predict_blocking(image_payload()).await.unwrap();
        assert!(matches!(outcome, PredictionOutcome::Recognized(_)));
    }
}
