//! Cooperative push control
//!
//! Cancellation and host skipping arrive out-of-band (signal handlers,
//! keypress listeners). Rather than unwinding through the engine, they set
//! flags on a shared handle that the engine checks at its suspension
//! points: the start of each phase and each host iteration, and before any
//! recovery decision is applied.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::PushError;

/// Cloneable handle for steering a running push from the outside
#[derive(Clone, Default)]
pub struct PushControl {
    inner: Arc<ControlInner>,
}

#[derive(Default)]
struct ControlInner {
    cancel_reason: Mutex<Option<String>>,
    skip_one: AtomicBool,
}

impl PushControl {
    /// Create a fresh handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The first reason wins; later calls are ignored.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self.inner.cancel_reason.lock().expect("control lock");
        if slot.is_none() {
            *slot = Some(reason.into());
        }
    }

    /// The pending cancellation reason, if any
    #[must_use]
    pub fn cancelled(&self) -> Option<String> {
        self.inner.cancel_reason.lock().expect("control lock").clone()
    }

    /// Fail with [`PushError::Cancelled`] if cancellation is pending
    ///
    /// # Errors
    /// `PushError::Cancelled` carrying the recorded reason.
    pub fn check(&self) -> Result<(), PushError> {
        match self.cancelled() {
            Some(reason) => Err(PushError::Cancelled { reason }),
            None => Ok(()),
        }
    }

    /// Skip exactly one upcoming host
    pub fn skip_next_host(&self) {
        self.inner.skip_one.store(true, Ordering::SeqCst);
    }

    /// Consume the one-shot skip flag
    pub(crate) fn take_skip(&self) -> bool {
        self.inner.skip_one.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_cancel_reason_wins() {
        let control = PushControl::new();
        control.cancel("received SIGINT");
        control.cancel("\"x\" pressed");
        assert_eq!(control.cancelled().as_deref(), Some("received SIGINT"));
    }

    #[test]
    fn check_surfaces_the_reason() {
        let control = PushControl::new();
        assert!(control.check().is_ok());
        control.cancel("received SIGHUP");
        let err = control.check().unwrap_err();
        assert!(matches!(err, PushError::Cancelled { reason } if reason == "received SIGHUP"));
    }

    #[test]
    fn skip_flag_is_one_shot() {
        let control = PushControl::new();
        control.skip_next_host();
        assert!(control.take_skip());
        assert!(!control.take_skip());
    }
}
