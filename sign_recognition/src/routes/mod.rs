mod health;
mod metrics;
mod predict;

pub use health::Status;
pub use predict::{PredictRequest, PredictResponse};

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/api/health", get(health::healthcheck))
        .route("/predict", post(predict::predict))
        .route("/api/predict", post(predict::predict))
        .route("/metrics", get(metrics::metrics_handler))
}
