use crate::process::ProcessRole;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("{role} program not found at {}", path.display())]
    ProgramNotFound { role: ProcessRole, path: PathBuf },
    #[error("Failed to start {role} ({program}): {source}")]
    Spawn {
        role: ProcessRole,
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to build health check client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
