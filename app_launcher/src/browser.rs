use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tokio::task::JoinHandle;

pub trait Browser: Send + Sync {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Hands the URL to the platform's default opener. The opener is reaped in
/// the background; nobody waits on it.
pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        spawn_reaped(opener_command(url)).map(|_| ())
    }
}

/// Spawns `command` and waits for it on a background task.
fn spawn_reaped(mut command: Command) -> io::Result<JoinHandle<io::Result<ExitStatus>>> {
    let handle = tokio::runtime::Handle::try_current()
        .map_err(io::Error::other)?;
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    Ok(handle.spawn(async move {
        let status = child.wait().await;
        match &status {
            Ok(status) if !status.success() => {
                tracing::warn!(%status, "Browser opener exited with an error")
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to wait for browser opener: {}", e),
        }
        status
    }))
}

#[cfg(target_os = "macos")]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("open");
    command.arg(url);
    command
}

#[cfg(windows)]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", "", url]);
    command
}

#[cfg(not(any(target_os = "macos", windows)))]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(url);
    command
}
