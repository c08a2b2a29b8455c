//! Push state machine types

use std::fmt;

/// Where the engine is in the phase sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnginePhase {
    /// Constructed, not yet running
    #[default]
    NotStarted,
    /// Syncing build repos
    Synchronizing,
    /// Resolving refs to concrete revisions
    ResolvingRefs,
    /// Deploying to the build host
    DeployingBuildHost,
    /// Building static assets
    BuildingStatic,
    /// Iterating the host list
    ProcessingHosts,
    /// Finished cleanly
    Completed,
    /// Terminated by error or cancellation
    Aborted,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnginePhase::NotStarted => "not_started",
            EnginePhase::Synchronizing => "synchronizing",
            EnginePhase::ResolvingRefs => "resolving_refs",
            EnginePhase::DeployingBuildHost => "deploying_build_host",
            EnginePhase::BuildingStatic => "building_static",
            EnginePhase::ProcessingHosts => "processing_hosts",
            EnginePhase::Completed => "completed",
            EnginePhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Mutable cursor over the host list
///
/// The markers are consumed once satisfied: `start_at` clears when its host
/// is reached so later occurrences aren't filtered, `stop_before` clears
/// when it halts the loop.
#[derive(Debug, Clone, Default)]
pub struct PushState {
    /// Current phase
    pub phase: EnginePhase,
    /// Index of the host being (or about to be) processed
    pub cursor: usize,
    /// Skip hosts until this one
    pub start_at: Option<String>,
    /// Halt at this host
    pub stop_before: Option<String>,
}
