use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

const HEALTH_MESSAGE: &str = "Sign recognition server is running";

#[derive(Serialize, Deserialize, Debug)]
pub struct Status {
    pub status: String,
    pub model_loaded: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_error: Option<String>,
    pub landmarker_loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarker_error: Option<String>,
}

/// Always 200 while the process is up. The load flags report the real state
/// of the classifier and of the hand detector.
pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    state.metrics.record_request("/health");
    let manager = state.prediction_service.model_manager();
    let landmarker_error = state.prediction_service.extractor_error();

    Json(Status {
        status: "healthy".into(),
        model_loaded: manager.is_model_loaded(),
        message: HEALTH_MESSAGE.into(),
        model_error: manager.load_error().map(str::to_string),
        landmarker_loaded: landmarker_error.is_none(),
        landmarker_error: landmarker_error.map(str::to_string),
    })
}
