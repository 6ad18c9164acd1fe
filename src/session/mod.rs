//! Thin adapter over the external `screen` binary.
//!
//! The supervised server runs headless inside a named detachable session.
//! At this layer a missing `screen` binary is indistinguishable from "no
//! session running" for queries; mutating calls surface it as a dedicated
//! error so the user gets an actionable message.

use std::io;
use std::path::{Path, PathBuf};

use tokio::process::Command;

pub const DEFAULT_SESSION_NAME: &str = "minecraft";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("screen command not found. Install it with: sudo apt install screen")]
    MultiplexerMissing,

    #[error("screen invocation failed: {stderr}")]
    CommandFailed { stderr: String },

    #[error("screen invocation failed: {0}")]
    Io(#[from] io::Error),
}

/// Client for one named screen session.
#[derive(Debug, Clone)]
pub struct ScreenSession {
    name: String,
    program: PathBuf,
}

impl ScreenSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_program(name, "screen")
    }

    /// Use an alternate multiplexer binary instead of `screen` on PATH.
    /// Lifecycle tests point this at a scripted stand-in.
    pub fn with_program(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the named session is present in `screen -ls` output.
    /// Returns `false` (not an error) when the binary is absent.
    pub async fn exists(&self) -> bool {
        match Command::new(&self.program).args(["-ls", &self.name]).output().await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                stdout.contains(&self.name)
            }
            Err(_) => false,
        }
    }

    /// Start `shell_command` detached inside a new named session rooted at
    /// `working_dir`.
    pub async fn launch(&self, working_dir: &Path, shell_command: &str) -> Result<(), SessionError> {
        let output = Command::new(&self.program)
            .args(["-dmS", &self.name, "bash", "-c", shell_command])
            .current_dir(working_dir)
            .output()
            .await
            .map_err(map_spawn_err)?;

        if !output.status.success() {
            return Err(SessionError::CommandFailed {
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Inject a newline-terminated keystroke sequence into window 0.
    /// The caller must have confirmed the session exists; no retries.
    pub async fn send_keys(&self, text: &str) -> Result<(), SessionError> {
        let payload = stuff_payload(text);
        let output = Command::new(&self.program)
            .args(["-S", &self.name, "-p", "0", "-X", "stuff", &payload])
            .output()
            .await
            .map_err(map_spawn_err)?;

        if !output.status.success() {
            return Err(SessionError::CommandFailed {
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Kill the session outright.
    pub async fn terminate(&self) -> Result<(), SessionError> {
        let output = Command::new(&self.program)
            .args(["-S", &self.name, "-X", "quit"])
            .output()
            .await
            .map_err(map_spawn_err)?;

        if !output.status.success() {
            return Err(SessionError::CommandFailed {
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

fn map_spawn_err(e: io::Error) -> SessionError {
    if e.kind() == io::ErrorKind::NotFound {
        SessionError::MultiplexerMissing
    } else {
        SessionError::Io(e)
    }
}

/// `stuff` sends literal keystrokes; the trailing newline submits the line.
fn stuff_payload(text: &str) -> String {
    format!("{}\n", text)
}
