use crate::config::LauncherConfig;
use crate::error::LauncherError;
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub model_loaded: bool,
}

#[derive(Error, Debug)]
pub enum HealthError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
}

/// One health check against the backend.
pub trait HealthChecker: Send + Sync {
    fn check(&self) -> impl Future<Output = Result<HealthReport, HealthError>> + Send;
}

#[derive(Deserialize)]
struct HealthBody {
    #[serde(default)]
    model_loaded: bool,
}

pub struct HttpHealthChecker {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthChecker {
    pub fn new(config: &LauncherConfig) -> Result<Self, LauncherError> {
        let client = reqwest::Client::builder()
            .timeout(config.health_check.timeout())
            .build()?;

        Ok(Self {
            client,
            url: config.health_url.clone(),
        })
    }
}

impl HealthChecker for HttpHealthChecker {
    async fn check(&self) -> Result<HealthReport, HealthError> {
        let response = self.client.get(&self.url).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(HealthError::Status(response.status().as_u16()));
        }

        let body: HealthBody = response.json().await?;
        Ok(HealthReport {
            model_loaded: body.model_loaded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_flag_reads_as_not_loaded() {
        let body: HealthBody = serde_json::from_str(r#"{"status": "healthy"}"#).unwrap();
        assert!(!body.model_loaded);

        let body: HealthBody =
            serde_json::from_str(r#"{"status": "healthy", "model_loaded": true}"#).unwrap();
        assert!(body.model_loaded);
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_error() {
        let config = LauncherConfig {
            health_url: "http://127.0.0.1:9/health".into(),
            ..LauncherConfig::default()
        };
        let checker = HttpHealthChecker::new(&config).unwrap();

        assert!(checker.check().await.is_err());
    }
}
