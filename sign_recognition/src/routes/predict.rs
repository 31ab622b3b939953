use crate::{
    prediction::{Prediction, PredictionError, PredictionOutcome},
    server::SharedState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::instrument;

#[derive(Deserialize, Debug)]
pub struct PredictRequest {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct PredictResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<[f32; 3]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

impl From<Prediction> for PredictResponse {
    fn from(prediction: Prediction) -> Self {
        Self {
            success: true,
            prediction: Some(prediction.label),
            confidence: Some(prediction.confidence),
            annotated_image: Some(prediction.annotated_image),
            landmarks: Some(prediction.landmarks.to_triples()),
            error: None,
        }
    }
}

impl From<PredictionOutcome> for PredictResponse {
    fn from(outcome: PredictionOutcome) -> Self {
        match outcome {
            PredictionOutcome::Recognized(prediction) => prediction.into(),
            PredictionOutcome::NoHand => Self::failure("No hand detected"),
        }
    }
}

impl PredictionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictionError::MissingImage => StatusCode::BAD_REQUEST,
            PredictionError::ModelUnavailable
            | PredictionError::DetectorUnavailable
            | PredictionError::Image(_)
            | PredictionError::Extraction(_)
            | PredictionError::Model(_)
            | PredictionError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            PredictionError::MissingImage => "bad_request",
            PredictionError::ModelUnavailable => "model_unavailable",
            PredictionError::DetectorUnavailable => "detector_unavailable",
            _ => "error",
        }
    }
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(PredictResponse::failure(self.to_string())),
        )
            .into_response()
    }
}

#[instrument(skip(state, payload))]
pub async fn predict(
    State(state): State<SharedState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, PredictionError> {
    state.metrics.record_request("/predict");

    let image = match payload {
        Ok(Json(PredictRequest { image: Some(image) })) if !image.trim().is_empty() => image,
        Ok(_) => {
            state.metrics.record_prediction("bad_request", 0);
            return Err(PredictionError::MissingImage);
        }
        Err(rejection) => {
            tracing::warn!("Rejected prediction body: {}", rejection);
            state.metrics.record_prediction("bad_request", 0);
            return Err(PredictionError::MissingImage);
        }
    };
    tracing::info!("Received prediction request");

    let started = Instant::now();
    let result = state.prediction_service.predict_blocking(image).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(outcome) => {
            let label = match outcome {
                PredictionOutcome::Recognized(_) => "recognized",
                PredictionOutcome::NoHand => "no_hand",
            };
            state.metrics.record_prediction(label, elapsed_ms);
            Ok(Json(outcome.into()))
        }
        Err(e) => {
            tracing::error!("Error in predict endpoint: {}", e);
            state.metrics.record_prediction(e.outcome(), elapsed_ms);
            Err(e)
        }
    }
}
