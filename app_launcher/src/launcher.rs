use crate::browser::Browser;
use crate::config::LauncherConfig;
use crate::error::LauncherError;
use crate::health::HealthChecker;
use crate::process::{ProcessRole, ProcessSpawner};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherState {
    Idle,
    BackendStarting,
    BackendReady,
    BackendDegraded,
    FrontendStarting,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendHealth {
    Ready { model_loaded: bool },
    Degraded,
}

pub struct Launcher<P, S, B> {
    config: LauncherConfig,
    checker: P,
    spawner: S,
    browser: B,
    state: LauncherState,
}

impl<P, S, B> Launcher<P, S, B>
where
    P: HealthChecker,
    S: ProcessSpawner,
    B: Browser,
{
    pub fn new(config: LauncherConfig, checker: P, spawner: S, browser: B) -> Self {
        Self {
            config,
            checker,
            spawner,
            browser,
            state: LauncherState::Idle,
        }
    }

    pub fn state(&self) -> LauncherState {
        self.state
    }

    /// Runs until `shutdown` resolves, then stops the tracked children.
    /// Returns an error only if a child could not be started.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), LauncherError> {
        tracing::info!("Starting sign language recognition app");
        tokio::pin!(shutdown);

        let started = tokio::select! {
            result = self.start() => Some(result),
            _ = &mut shutdown => None,
        };

        match started {
            Some(Ok(_)) => {
                tracing::info!(
                    "App is running at {}. Press Ctrl+C to stop.",
                    self.config.frontend_url
                );
                shutdown.await;
                self.stop().await;
                Ok(())
            }
            Some(Err(e)) => {
                tracing::error!("{}", e);
                self.stop().await;
                Err(e)
            }
            None => {
                self.stop().await;
                Ok(())
            }
        }
    }

    pub async fn start(&mut self) -> Result<BackendHealth, LauncherError> {
        self.transition(LauncherState::BackendStarting);
        self.spawner
            .spawn(ProcessRole::Backend, &self.config.backend)?;

        tracing::info!(
            "Waiting {}s for the backend to start",
            self.config.backend_startup_delay_secs
        );
        tokio::time::sleep(self.config.backend_startup_delay()).await;

        let health = self.wait_for_backend().await;
        match health {
            BackendHealth::Ready { model_loaded } => {
                tracing::info!("Backend is ready");
                if !model_loaded {
                    tracing::warn!("Backend is up but the gesture model is not loaded");
                }
                self.transition(LauncherState::BackendReady);
            }
            BackendHealth::Degraded => {
                tracing::warn!("Backend health check failed, but continuing anyway");
                self.transition(LauncherState::BackendDegraded);
            }
        }

        self.transition(LauncherState::FrontendStarting);
        self.spawner
            .spawn(ProcessRole::Frontend, &self.config.frontend)?;

        tracing::info!(
            "Waiting {}s for the frontend to start",
            self.config.frontend_startup_delay_secs
        );
        tokio::time::sleep(self.config.frontend_startup_delay()).await;

        tracing::info!("Opening {}", self.config.frontend_url);
        if let Err(e) = self.browser.open(&self.config.frontend_url) {
            tracing::warn!(
                "Could not open a browser ({}). Visit {} manually.",
                e,
                self.config.frontend_url
            );
        }

        self.transition(LauncherState::Running);
        Ok(health)
    }

    async fn wait_for_backend(&self) -> BackendHealth {
        let attempts = self.config.health_check.attempts;
        for attempt in 1..=attempts {
            match self.checker.check().await {
                Ok(report) => {
                    return BackendHealth::Ready {
                        model_loaded: report.model_loaded,
                    }
                }
                Err(e) => {
                    tracing::info!(attempt, attempts, "Backend not ready yet: {}", e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.health_check.interval()).await;
            }
        }
        BackendHealth::Degraded
    }

    async fn stop(&mut self) {
        self.transition(LauncherState::ShuttingDown);
        self.spawner.terminate_all().await;
        self.transition(LauncherState::Stopped);
        tracing::info!("All processes stopped. Goodbye!");
    }

    fn transition(&mut self, next: LauncherState) {
        tracing::debug!(from = ?self.state, to = ?next, "Launcher state change");
        self.state = next;
    }
}
