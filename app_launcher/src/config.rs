use crate::error::LauncherError;
use crate::process::ProcessRole;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything has a default, so the launcher runs with no configuration file.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LauncherConfig {
    pub backend: CommandConfig,
    pub frontend: CommandConfig,
    pub health_url: String,
    pub frontend_url: String,
    pub backend_startup_delay_secs: u64,
    pub frontend_startup_delay_secs: u64,
    pub shutdown_grace_secs: u64,
    pub health_check: HealthCheckConfig,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            backend: CommandConfig {
                program: "../target/release/sign_recognition".into(),
                args: Vec::new(),
                working_dir: PathBuf::from("sign_recognition"),
            },
            frontend: CommandConfig {
                program: npm_program().into(),
                args: vec!["start".into()],
                working_dir: PathBuf::from("."),
            },
            health_url: "http://localhost:8000/health".into(),
            frontend_url: "http://localhost:8081".into(),
            backend_startup_delay_secs: 5,
            frontend_startup_delay_secs: 5,
            shutdown_grace_secs: 5,
            health_check: HealthCheckConfig::default(),
        }
    }
}

impl LauncherConfig {
    pub fn backend_startup_delay(&self) -> Duration {
        Duration::from_secs(self.backend_startup_delay_secs)
    }

    pub fn frontend_startup_delay(&self) -> Duration {
        Duration::from_secs(self.frontend_startup_delay_secs)
    }

    /// Time children get to exit after SIGTERM before they are killed.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub attempts: u32,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval_secs: 2,
            timeout_secs: 2,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CommandConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl CommandConfig {
    /// Bare names are left for the OS to look up on `PATH`. Anything with a
    /// path separator is resolved against `working_dir` and must exist.
    pub fn resolve_program(&self, role: ProcessRole) -> Result<PathBuf, LauncherError> {
        let program = Path::new(&self.program);
        if program.components().count() <= 1 {
            return Ok(program.to_path_buf());
        }

        let candidate = if program.is_absolute() {
            program.to_path_buf()
        } else {
            self.working_dir.join(program)
        };

        std::fs::canonicalize(&candidate).map_err(|_| LauncherError::ProgramNotFound {
            role,
            path: candidate,
        })
    }
}

fn npm_program() -> &'static str {
    if cfg!(windows) {
        "npm.cmd"
    } else {
        "npm"
    }
}

pub fn get_configuration() -> Result<LauncherConfig, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no working directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let settings = config::Config::builder()
        .add_source(
            config::File::from(configuration_directory.join("launcher.yaml")).required(false),
        )
        .add_source(
            config::Environment::with_prefix("LAUNCHER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("backend.args")
                .with_list_parse_key("frontend.args"),
        )
        .build()?;

    let settings: LauncherConfig = settings.try_deserialize()?;

    if settings.health_check.attempts == 0 {
        return Err(config::ConfigError::Message(
            "health_check.attempts must be at least 1".into(),
        ));
    }

    Ok(settings)
}
