//! Lifecycle error taxonomy. Every variant carries a short, actionable
//! message via its `Display` impl; nothing here exposes internals.

use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("Server is already running")]
    AlreadyRunning,

    #[error("server.jar not found. Install a server first.")]
    NotInstalled,

    #[error("Failed to launch server: {0}")]
    LaunchFailed(#[source] SessionError),

    #[error("Server exited during startup. Log:\n{log_tail}")]
    CrashedOnStart { log_tail: String },

    #[error("Server started but exited immediately. Check your Java installation.")]
    ExitedImmediately,
}

#[derive(Debug, thiserror::Error)]
pub enum StopError {
    #[error("Server is not running")]
    NotRunning,

    #[error("Server did not stop in time (30s timeout)")]
    StopTimeout,

    #[error("Stop wait aborted. The server may still be shutting down.")]
    Cancelled,

    #[error("Failed to stop server: {0}")]
    Dispatch(#[source] SessionError),
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Server is not running")]
    NotRunning,

    #[error("Failed to send command: {0}")]
    Dispatch(#[source] SessionError),
}
