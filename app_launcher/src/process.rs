use crate::config::CommandConfig;
use crate::error::LauncherError;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::process::{Child, Command};

#[cfg(unix)]
use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::Pid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    Backend,
    Frontend,
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessRole::Backend => write!(f, "backend"),
            ProcessRole::Frontend => write!(f, "frontend"),
        }
    }
}

/// Starts child processes and remembers them so they, and only they, can be
/// terminated later.
pub trait ProcessSpawner: Send {
    fn spawn(&mut self, role: ProcessRole, command: &CommandConfig) -> Result<(), LauncherError>;

    /// Terminates every tracked child, newest first, and waits for each.
    fn terminate_all(&mut self) -> impl Future<Output = ()> + Send;
}

struct TrackedChild {
    role: ProcessRole,
    pid: Option<u32>,
    child: Child,
}

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Spawns each child as the leader of its own process group, so stopping it
/// also reaches whatever it started (the dev server behind `npm start`).
pub struct TokioSpawner {
    children: Vec<TrackedChild>,
    grace_period: Duration,
}

impl Default for TokioSpawner {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl TokioSpawner {
    /// `grace_period` is how long a group gets after SIGTERM before SIGKILL.
    pub fn new(grace_period: Duration) -> Self {
        Self {
            children: Vec::new(),
            grace_period,
        }
    }
}

impl ProcessSpawner for TokioSpawner {
    fn spawn(&mut self, role: ProcessRole, command: &CommandConfig) -> Result<(), LauncherError> {
        let program = command.resolve_program(role)?;
        tracing::info!(
            "Starting {}: {} {}",
            role,
            program.display(),
            command.args.join(" ")
        );

        let mut cmd = Command::new(&program);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| LauncherError::Spawn {
            role,
            program: program.display().to_string(),
            source,
        })?;

        let pid = child.id();
        tracing::info!(?pid, "{} process started", role);
        self.children.push(TrackedChild { role, pid, child });
        Ok(())
    }

    async fn terminate_all(&mut self) {
        while let Some(TrackedChild {
            role,
            pid,
            mut child,
        }) = self.children.pop()
        {
            // The group is signalled even when the leader is gone, its
            // descendants may still be running.
            tracing::info!(?pid, "Stopping {}", role);
            request_stop(pid, &mut child, role);

            match tokio::time::timeout(self.grace_period, child.wait()).await {
                Ok(Ok(status)) => tracing::info!(?pid, %status, "{} stopped", role),
                Ok(Err(e)) => tracing::warn!(?pid, "Failed to wait for {}: {}", role, e),
                Err(_) => {
                    tracing::warn!(
                        ?pid,
                        "{} did not stop within {:?}, killing it",
                        role,
                        self.grace_period
                    );
                    force_stop(pid, &mut child, role);
                    if let Err(e) = child.wait().await {
                        tracing::warn!(?pid, "Failed to wait for {}: {}", role, e);
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: Signal, role: ProcessRole) -> bool {
    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    match killpg(Pid::from_raw(pid), signal) {
        Ok(()) => true,
        Err(Errno::ESRCH) => true,
        Err(e) => {
            tracing::warn!(pid, "Failed to send {} to {} group: {}", signal.as_str(), role, e);
            false
        }
    }
}

#[cfg(unix)]
fn request_stop(pid: Option<u32>, child: &mut Child, role: ProcessRole) {
    if !signal_group(pid, Signal::SIGTERM, role) {
        force_stop(pid, child, role);
    }
}

#[cfg(not(unix))]
fn request_stop(pid: Option<u32>, child: &mut Child, role: ProcessRole) {
    force_stop(pid, child, role);
}

fn force_stop(pid: Option<u32>, child: &mut Child, role: ProcessRole) {
    #[cfg(unix)]
    signal_group(pid, Signal::SIGKILL, role);

    if let Err(e) = child.start_kill() {
        tracing::debug!(?pid, "Could not kill {}: {}", role, e);
    }
}
