//! Error types for fleetpush-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while dispatching remote commands
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Remote command ran and exited nonzero
    #[error("remote command exited with code {code}")]
    RemoteExit {
        /// Exit status reported by the remote side
        code: i32,
    },

    /// Failed to reach the remote host
    #[error("connection to {host} failed: {reason}")]
    Connection {
        /// Target host
        host: String,
        /// Transport-level cause
        reason: String,
    },

    /// Authentication was refused
    #[error("authentication to {host} failed: {reason}")]
    Auth {
        /// Target host
        host: String,
        /// What the server objected to
        reason: String,
    },

    /// Connect or command exceeded its deadline
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// SSH key could not be resolved or loaded
    #[error("SSH key error: {0}")]
    Key(String),

    /// Channel-level I/O failure mid-command
    #[error("channel I/O error: {0}")]
    Io(String),
}

impl ExecError {
    /// Whether this is a transport failure rather than a remote nonzero exit
    #[must_use]
    pub fn is_connection(&self) -> bool {
        !matches!(self, ExecError::RemoteExit { .. })
    }
}
