use crate::{
    config::Config, prediction::PredictionService, routes::api_routes, telemetry::Metrics,
};
use axum::Router;
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct SharedState {
    pub prediction_service: PredictionService,
    pub metrics: Arc<Metrics>,
}

/// Routes plus the layers every route shares. The frontend runs on another
/// port, so CORS is wide open.
pub fn build_router(state: SharedState) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(metrics_layer)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        prediction_service: PredictionService,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let metrics = Arc::new(Metrics::new()?);
        metrics.record_model_loaded(prediction_service.model_manager().is_model_loaded());

        let app_state = SharedState {
            prediction_service,
            metrics,
        };

        let router = build_router(app_state);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        labels::LabelSet,
        model_manager::{tests::MockLoader, ModelManager},
        prediction::tests::{image_payload, MockExtractor},
        routes::{PredictResponse, Status},
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn router(hand: bool, loader: MockLoader) -> Router {
        let manager = Arc::new(ModelManager::new(loader, LabelSet::extended()));
        manager.ensure_loaded();
        let prediction_service =
            PredictionService::new(Arc::new(MockExtractor::new(hand)), manager);

        build_router(SharedState {
            prediction_service,
            metrics: Arc::new(Metrics::new().unwrap()),
        })
    }

    fn router_without_detector() -> Router {
        let manager = Arc::new(ModelManager::new(MockLoader::loaded(39), LabelSet::extended()));
        manager.ensure_loaded();
        let prediction_service = PredictionService::without_extractor(
            "model file not found at /models/hand_landmarker.onnx",
            manager,
        );

        build_router(SharedState {
            prediction_service,
            metrics: Arc::new(Metrics::new().unwrap()),
        })
    }

    async fn post_json(router: Router, uri: &str, body: String) -> (StatusCode, PredictResponse) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get_health(router: Router, uri: &str) -> (StatusCode, Status) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn image_body() -> String {
        serde_json::json!({ "image": image_payload() }).to_string()
    }

    #[tokio::test]
    async fn test_predict_recognizes_hand() {
        let (status, body) =
            post_json(router(true, MockLoader::loaded(39)), "/predict", image_body()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.success);
        assert!(LabelSet::extended().contains(body.prediction.as_deref().unwrap()));
        let confidence = body.confidence.unwrap();
        assert!((0.0..=1.0).contains(&confidence));
        assert!(body
            .annotated_image
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        assert_eq!(body.landmarks.unwrap().len(), 21);
    }

    #[tokio::test]
    async fn test_predict_without_hand_is_not_an_http_error() {
        let (status, body) =
            post_json(router(false, MockLoader::loaded(39)), "/api/predict", image_body()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, PredictResponse::failure("No hand detected"));
    }

    #[tokio::test]
    async fn test_predict_missing_image_is_bad_request() {
        let (status, body) = post_json(
            router(true, MockLoader::loaded(39)),
            "/predict",
            r#"{"picture": "nope"}"#.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, PredictResponse::failure("No image data provided"));
    }

    #[tokio::test]
    async fn test_predict_malformed_body_is_bad_request() {
        let (status, body) = post_json(
            router(true, MockLoader::loaded(39)),
            "/predict",
            "not json".to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
    }

    #[tokio::test]
    async fn test_predict_without_model_fails_every_time() {
        let router = router(true, MockLoader::missing());

        for body in [image_body(), serde_json::json!({ "image": "data:," }).to_string()] {
            let (status, response) = post_json(router.clone(), "/predict", body).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(response, PredictResponse::failure("Model not available"));
        }
    }

    #[tokio::test]
    async fn test_predict_bad_base64_is_internal_error() {
        let body = serde_json::json!({ "image": "data:image/png;base64,***" }).to_string();
        let (status, response) =
            post_json(router(true, MockLoader::loaded(39)), "/predict", body).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.success);
        assert!(response
            .error
            .unwrap()
            .starts_with("Error processing image"));
    }

    #[tokio::test]
    async fn test_predict_is_idempotent() {
        let router = router(true, MockLoader::loaded(39));

        let (_, first) = post_json(router.clone(), "/predict", image_body()).await;
        let (_, second) = post_json(router, "/predict", image_body()).await;
        assert_eq!(first.prediction, second.prediction);
        assert_eq!(first.confidence, second.confidence);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_exports_prometheus_text() {
        let router = router(true, MockLoader::loaded(39));
        post_json(router.clone(), "/predict", image_body()).await;

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("predictions_total"));
    }

    #[tokio::test]
    async fn test_missing_detector_keeps_server_answering() {
        let router = router_without_detector();

        let (status, health) = get_health(router.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "healthy");
        assert!(health.model_loaded);
        assert!(!health.landmarker_loaded);
        assert!(health
            .landmarker_error
            .unwrap()
            .contains("hand_landmarker.onnx"));

        let (status, response) = post_json(router, "/api/predict", image_body()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response,
            PredictResponse::failure("Hand landmark model not available")
        );
    }

    #[tokio::test]
    async fn test_health_reports_real_model_state() {
        let (status, health) = get_health(router(true, MockLoader::loaded(39)), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "healthy");
        assert!(health.model_loaded);
        assert!(health.model_error.is_none());
        assert!(health.landmarker_loaded);

        let (status, health) = get_health(router(true, MockLoader::missing()), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "healthy");
        assert!(!health.model_loaded);
        assert!(health.model_error.is_some());
    }
}
