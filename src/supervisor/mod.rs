//! Process supervisor — owns server lifecycle decisions.
//!
//! Running/stopped is always a live fact derived from the session listing,
//! never a cached flag; every legality check re-queries before acting.

pub mod error;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{SharedConfig, ServerType};
use crate::session::ScreenSession;
use error::{CommandError, StartError, StopError};

pub const SERVER_JAR: &str = "server.jar";
pub const LOG_FILENAME: &str = "server.log";

/// How long the launch gets to settle before fast-crash detection.
const SETTLE_INTERVAL: Duration = Duration::from_secs(1);
/// Graceful stop polls once per second for this many iterations.
const STOP_POLL_ATTEMPTS: u32 = 30;
const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Lines of log read back when the server dies right after launch.
const CRASH_LOG_TAIL: usize = 10;

/// Snapshot for display and the machine-readable `--status` output.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub running: bool,
    pub installed: bool,
    pub version: Option<String>,
    pub ram_gb: u32,
    pub server_type: ServerType,
    pub server_dir: PathBuf,
}

pub struct Supervisor {
    cfg: SharedConfig,
    session: ScreenSession,
}

impl Supervisor {
    pub fn new(cfg: SharedConfig, session: ScreenSession) -> Self {
        Self { cfg, session }
    }

    pub fn server_dir(&self) -> PathBuf {
        self.cfg.lock().unwrap().server_dir().to_path_buf()
    }

    pub fn log_path(&self) -> PathBuf {
        self.server_dir().join(LOG_FILENAME)
    }

    pub fn command_history(&self) -> Vec<String> {
        self.cfg.lock().unwrap().data.command_history.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.session.exists().await
    }

    /// Pure read; never fails.
    pub async fn status(&self) -> ServerStatus {
        let running = self.session.exists().await;
        let cfg = self.cfg.lock().unwrap();
        ServerStatus {
            running,
            installed: cfg.server_dir().join(SERVER_JAR).exists(),
            version: cfg.data.current_version.clone(),
            ram_gb: cfg.data.ram_gb,
            server_type: cfg.data.server_type,
            server_dir: cfg.server_dir().to_path_buf(),
        }
    }

    /// Start the server in a detached session and confirm it survived the
    /// settle window.
    pub async fn start(&self) -> Result<(), StartError> {
        if self.session.exists().await {
            return Err(StartError::AlreadyRunning);
        }

        let (server_dir, ram_gb) = {
            let cfg = self.cfg.lock().unwrap();
            (cfg.server_dir().to_path_buf(), cfg.data.ram_gb)
        };

        if !server_dir.join(SERVER_JAR).exists() {
            return Err(StartError::NotInstalled);
        }

        let command = launch_command(ram_gb);
        tracing::info!("Launching server in session '{}': {}", self.session.name(), command);
        self.session
            .launch(&server_dir, &command)
            .await
            .map_err(StartError::LaunchFailed)?;

        tokio::time::sleep(SETTLE_INTERVAL).await;

        if self.session.exists().await {
            tracing::info!("Server started");
            return Ok(());
        }

        // Fast crash: the session is already gone. Show the user what the
        // server said on its way out, if anything.
        let tail = read_log_tail(&server_dir.join(LOG_FILENAME), CRASH_LOG_TAIL);
        if tail.is_empty() {
            Err(StartError::ExitedImmediately)
        } else {
            Err(StartError::CrashedOnStart {
                log_tail: tail.join("\n"),
            })
        }
    }

    /// Stop the server. The graceful path asks the server to save and exit
    /// via its own `stop` command, then waits for the session to disappear.
    /// A timeout never escalates to termination; forced stop is a distinct
    /// explicit choice.
    pub async fn stop(&self, graceful: bool, cancel: &CancellationToken) -> Result<(), StopError> {
        if !self.session.exists().await {
            return Err(StopError::NotRunning);
        }

        if !graceful {
            self.session.terminate().await.map_err(StopError::Dispatch)?;
            tracing::info!("Server terminated");
            return Ok(());
        }

        self.session.send_keys("stop").await.map_err(StopError::Dispatch)?;
        for _ in 0..STOP_POLL_ATTEMPTS {
            tokio::select! {
                _ = cancel.cancelled() => return Err(StopError::Cancelled),
                _ = tokio::time::sleep(STOP_POLL_INTERVAL) => {}
            }
            if !self.session.exists().await {
                tracing::info!("Server stopped gracefully");
                return Ok(());
            }
        }
        Err(StopError::StopTimeout)
    }

    /// Inject a console command. History records confirmed sends only.
    pub async fn send_command(&self, command: &str) -> Result<(), CommandError> {
        if !self.session.exists().await {
            return Err(CommandError::NotRunning);
        }

        self.session
            .send_keys(command)
            .await
            .map_err(CommandError::Dispatch)?;

        let mut cfg = self.cfg.lock().unwrap();
        if let Err(e) = cfg.remember_command(command) {
            // The command reached the server; a history write failure is
            // not a dispatch failure.
            tracing::warn!("Failed to persist command history: {}", e);
        }
        Ok(())
    }
}

/// Min and max heap are pinned to the same value so the JVM claims its
/// allocation up front. Combined output is appended to the persistent log
/// the console tails; tee keeps it visible inside the session too.
fn launch_command(ram_gb: u32) -> String {
    format!(
        "java -Xmx{ram}G -Xms{ram}G -jar {jar} nogui 2>&1 | tee -a {log}",
        ram = ram_gb,
        jar = SERVER_JAR,
        log = LOG_FILENAME,
    )
}

fn read_log_tail(path: &std::path::Path, count: usize) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let lines: Vec<&str> = content.lines().collect();
            let start = lines.len().saturating_sub(count);
            lines[start..]
                .iter()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.to_string())
                .collect()
        }
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn launch_command_pins_heap_and_appends_log() {
        let cmd = launch_command(8);
        assert!(cmd.contains("-Xmx8G"));
        assert!(cmd.contains("-Xms8G"));
        assert!(cmd.contains("nogui"));
        assert!(cmd.contains("tee -a server.log"));
    }

    #[test]
    fn log_tail_reads_last_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOG_FILENAME);
        let content: String = (0..25).map(|i| format!("line {}\n", i)).collect();
        std::fs::write(&path, content).unwrap();

        let tail = read_log_tail(&path, 10);
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0], "line 15");
        assert_eq!(tail[9], "line 24");
    }

    #[test]
    fn log_tail_of_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read_log_tail(&dir.path().join("nope.log"), 10).is_empty());
    }

    #[test]
    fn log_tail_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOG_FILENAME);
        std::fs::write(&path, "\n\n   \n").unwrap();
        assert!(read_log_tail(&path, 10).is_empty());
    }
}
