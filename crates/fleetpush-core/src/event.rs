//! Push lifecycle events
//!
//! Every phase fires `began` before executing, `ended` after success, and
//! `aborted` (carrying the causing error) on failure. The registry maps each
//! (phase, stage) pair to its subscribers; firing iterates them in
//! registration order. Listeners are infallible closures: an observer that
//! can fail (chat, syslog) must swallow its own errors, because nothing a
//! listener does may halt the engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::PushError;

/// The phases that emit lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// The push as a whole
    Push,
    /// Syncing build repos on the build host
    Synchronize,
    /// Turning refs into concrete revisions
    ResolveRefs,
    /// Deploying to the build host before the fleet
    DeployToBuildHost,
    /// Building static assets
    BuildStatic,
    /// One per-host iteration (the payload names the host)
    ProcessHost,
}

impl Phase {
    /// Every phase, for blanket subscriptions
    pub const ALL: [Phase; 6] = [
        Phase::Push,
        Phase::Synchronize,
        Phase::ResolveRefs,
        Phase::DeployToBuildHost,
        Phase::BuildStatic,
        Phase::ProcessHost,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Push => "push",
            Phase::Synchronize => "synchronize",
            Phase::ResolveRefs => "resolve_refs",
            Phase::DeployToBuildHost => "deploy_to_build_host",
            Phase::BuildStatic => "build_static",
            Phase::ProcessHost => "process_host",
        };
        f.write_str(name)
    }
}

/// Where in the phase lifecycle an event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Before the phase body runs
    Began,
    /// After the phase body succeeded
    Ended,
    /// The phase body failed; the payload carries the error
    Aborted,
}

impl Stage {
    /// Every stage, for blanket subscriptions
    pub const ALL: [Stage; 3] = [Stage::Began, Stage::Ended, Stage::Aborted];
}

/// What a listener receives
pub struct EventPayload<'a> {
    /// Which phase fired
    pub phase: Phase,
    /// Which lifecycle point
    pub stage: Stage,
    /// The host being processed, for [`Phase::ProcessHost`]
    pub host: Option<&'a str>,
    /// The causing error, for [`Stage::Aborted`]
    pub error: Option<&'a PushError>,
}

/// A subscriber closure
pub type EventListener = Arc<dyn Fn(&EventPayload<'_>) + Send + Sync>;

/// Registry of lifecycle subscribers
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<(Phase, Stage), Vec<EventListener>>,
}

impl EventBus {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one (phase, stage) pair
    pub fn subscribe(
        &mut self,
        phase: Phase,
        stage: Stage,
        listener: impl Fn(&EventPayload<'_>) + Send + Sync + 'static,
    ) {
        self.listeners
            .entry((phase, stage))
            .or_default()
            .push(Arc::new(listener));
    }

    /// Register one listener for every lifecycle event
    pub fn subscribe_all(&mut self, listener: impl Fn(&EventPayload<'_>) + Send + Sync + 'static) {
        let listener: EventListener = Arc::new(listener);
        for phase in Phase::ALL {
            for stage in Stage::ALL {
                self.listeners
                    .entry((phase, stage))
                    .or_default()
                    .push(listener.clone());
            }
        }
    }

    /// Invoke every subscriber of the payload's (phase, stage)
    pub fn fire(&self, payload: &EventPayload<'_>) {
        if let Some(subscribers) = self.listeners.get(&(payload.phase, payload.stage)) {
            for listener in subscribers {
                listener(payload);
            }
        }
    }
}
