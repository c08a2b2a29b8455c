//! Per-host failure recovery
//!
//! When a host fails and the inventory still expects it alive, the engine
//! asks an injected decider what to do. This is the seam where an
//! interactive prompt or an automated policy plugs in; the engine itself
//! has no notion of terminals.

use async_trait::async_trait;

use crate::error::PushError;

/// What to do about a failed host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDecision {
    /// Re-raise the error and stop the whole push
    Abort,
    /// Skip this host and proceed to the next
    Continue,
    /// Attempt the same host again
    Retry,
}

/// Policy consulted on per-host failures
#[async_trait]
pub trait ErrorDecider: Send + Sync {
    /// Choose what the engine does about `error` on `host`
    async fn decide(&self, host: &str, error: &PushError) -> ErrorDecision;
}

/// The default policy: any failure aborts the push
pub struct AbortDecider;

#[async_trait]
impl ErrorDecider for AbortDecider {
    async fn decide(&self, _host: &str, _error: &PushError) -> ErrorDecision {
        ErrorDecision::Abort
    }
}
