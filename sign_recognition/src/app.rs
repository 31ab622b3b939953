use crate::config::Config;
use crate::labels::LabelSet;
use crate::model_manager::ModelManager;
use crate::ort_landmarker::OrtHandLandmarker;
use crate::ort_service::OrtModelLoader;
use crate::prediction::PredictionService;
use crate::server::HttpServer;

use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let labels = match LabelSet::from_config(&config.labels) {
        Ok(labels) => labels,
        Err(e) => {
            tracing::error!("Failed to load label set: {:?}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Using {} gesture labels", labels.len());

    let model_manager = Arc::new(ModelManager::new(
        OrtModelLoader::new(&config.model),
        labels,
    ));

    // A missing classifier leaves the server up in degraded mode.
    let loaded = tokio::task::spawn_blocking({
        let model_manager = model_manager.clone();
        move || model_manager.ensure_loaded()
    })
    .await?;
    if !loaded {
        tracing::warn!(
            "Gesture classifier unavailable, /predict will fail: {}",
            model_manager.load_error().unwrap_or("unknown error")
        );
    }

    // A missing hand detector degrades the same way.
    let prediction_service = match OrtHandLandmarker::new(&config.landmarker) {
        Ok(landmarker) => PredictionService::new(Arc::new(landmarker), model_manager),
        Err(e) => {
            tracing::error!("Failed to initialize hand landmarker: {}", e);
            PredictionService::without_extractor(e.to_string(), model_manager)
        }
    };
    let server = HttpServer::new(prediction_service, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
