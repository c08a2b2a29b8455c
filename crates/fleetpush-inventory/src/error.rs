//! Error types for fleetpush-inventory

use thiserror::Error;

/// Errors that can occur while talking to a host inventory backend
#[derive(Error, Debug, Clone)]
pub enum InventoryError {
    /// The backend could not be queried for the host list
    #[error("host lookup failed: {0}")]
    LookupFailed(String),

    /// Invalid inventory configuration
    #[error("invalid inventory configuration: {0}")]
    ConfigError(String),
}
