//! The push state machine
//!
//! Drives the phase sequence (synchronize, resolve refs, deploy to build
//! host, static build) and then the per-host loop, dispatching remote
//! commands through the runner and announcing progress on the event bus.
//! Per-host failures are routed through the liveness check and the decision
//! callback; everything else terminates the run. Teardown of the runner and
//! the inventory source happens exactly once on every exit path.

use tracing::{debug, info, instrument, warn};

use fleetpush_exec::RemoteRunner;
use fleetpush_inventory::HostSource;

use crate::config::{DeployConfig, PushRequest};
use crate::control::PushControl;
use crate::error::PushError;
use crate::event::{EventBus, EventPayload, Phase, Stage};
use crate::plan::HostPlan;
use crate::recover::{AbortDecider, ErrorDecider, ErrorDecision};
use crate::state::{EnginePhase, PushState};

/// The deployment orchestration engine
pub struct PushEngine {
    deploy: DeployConfig,
    request: PushRequest,
    hosts: Vec<String>,
    state: PushState,
    runner: Box<dyn RemoteRunner>,
    source: Box<dyn HostSource>,
    events: EventBus,
    decider: Box<dyn ErrorDecider>,
    control: PushControl,
}

impl PushEngine {
    /// Assemble an engine over an ordered host plan
    #[must_use]
    pub fn new(
        deploy: DeployConfig,
        request: PushRequest,
        plan: HostPlan,
        runner: Box<dyn RemoteRunner>,
        source: Box<dyn HostSource>,
    ) -> Self {
        Self {
            deploy,
            request,
            hosts: plan.hosts,
            state: PushState {
                start_at: plan.start_at,
                stop_before: plan.stop_before,
                ..PushState::default()
            },
            runner,
            source,
            events: EventBus::new(),
            decider: Box::new(AbortDecider),
            control: PushControl::new(),
        }
    }

    /// Replace the default abort-on-error policy
    #[must_use]
    pub fn with_decider(mut self, decider: Box<dyn ErrorDecider>) -> Self {
        self.decider = decider;
        self
    }

    /// Register listeners before running
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Handle for cancelling or skipping from the outside
    #[must_use]
    pub fn control(&self) -> PushControl {
        self.control.clone()
    }

    /// The hosts this push will walk, in order
    #[must_use]
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Run the push to completion.
    ///
    /// Consumes the engine; the runner's session and the inventory source
    /// are shut down exactly once regardless of outcome.
    ///
    /// # Errors
    /// The first error that terminated the run; `PushError::Cancelled` for
    /// an out-of-band abort.
    #[instrument(skip(self), fields(hosts = self.hosts.len()))]
    pub async fn run(mut self) -> Result<(), PushError> {
        let result = self.push().await;
        self.runner.shutdown().await;
        self.source.shut_down().await;
        result
    }

    async fn push(&mut self) -> Result<(), PushError> {
        self.fire(Phase::Push, Stage::Began, None);
        match self.run_phases().await {
            Ok(()) => {
                self.state.phase = EnginePhase::Completed;
                self.fire(Phase::Push, Stage::Ended, None);
                Ok(())
            }
            Err(error) => {
                self.state.phase = EnginePhase::Aborted;
                self.fire_aborted(Phase::Push, None, &error);
                Err(error)
            }
        }
    }

    async fn run_phases(&mut self) -> Result<(), PushError> {
        self.control.check()?;

        if !self.request.fetches.is_empty() {
            self.enter(EnginePhase::Synchronizing)?;
            self.synchronize().await?;
        }

        if !self.request.deploys.is_empty() {
            self.enter(EnginePhase::ResolvingRefs)?;
            self.resolve_refs().await?;

            self.enter(EnginePhase::DeployingBuildHost)?;
            self.deploy_to_build_host().await?;
        }

        if self.request.build_static
            && !self.request.deploys.is_empty()
            && self.static_build_needed().await?
        {
            self.enter(EnginePhase::BuildingStatic)?;
            self.build_static().await?;
            // every host processed from here on also refreshes asset names
            self.request
                .deploy_commands
                .push(vec!["fetch-names".to_string()]);
        }

        self.enter(EnginePhase::ProcessingHosts)?;
        self.process_hosts().await
    }

    /// Transition the state machine, honoring pending cancellation
    fn enter(&mut self, phase: EnginePhase) -> Result<(), PushError> {
        self.control.check()?;
        debug!(from = %self.state.phase, to = %phase, "phase transition");
        self.state.phase = phase;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    async fn synchronize(&mut self) -> Result<(), PushError> {
        self.fire(Phase::Synchronize, Stage::Began, None);
        match self.do_synchronize().await {
            Ok(()) => {
                self.fire(Phase::Synchronize, Stage::Ended, None);
                Ok(())
            }
            Err(error) => {
                self.fire_aborted(Phase::Synchronize, None, &error);
                Err(error)
            }
        }
    }

    async fn do_synchronize(&mut self) -> Result<(), PushError> {
        let repos = self.request.fetches.clone();
        let build_host = self.deploy.build_host.clone();

        for repo in &repos {
            self.run_build_command(vec!["synchronize".to_string(), repo.clone()], false)
                .await?;
        }
        for repo in &repos {
            self.run_deploy_command(&build_host, vec!["fetch".to_string(), repo.clone()], false)
                .await?;
        }
        Ok(())
    }

    async fn resolve_refs(&mut self) -> Result<(), PushError> {
        self.fire(Phase::ResolveRefs, Stage::Began, None);
        match self.do_resolve_refs().await {
            Ok(()) => {
                self.fire(Phase::ResolveRefs, Stage::Ended, None);
                Ok(())
            }
            Err(error) => {
                self.fire_aborted(Phase::ResolveRefs, None, &error);
                Err(error)
            }
        }
    }

    async fn do_resolve_refs(&mut self) -> Result<(), PushError> {
        for repo in self.request.deploys.clone() {
            let requested = self
                .request
                .revisions
                .get(&repo)
                .cloned()
                .unwrap_or_else(|| self.deploy.default_ref.clone());

            let output = self
                .run_build_command(
                    vec!["get-revision".to_string(), repo.clone(), requested.clone()],
                    true,
                )
                .await?;
            let revision = output.trim().to_string();

            info!(repo = %repo, requested = %requested, revision = %revision, "resolved ref");
            self.request.revisions.insert(repo, revision);
        }
        Ok(())
    }

    async fn deploy_to_build_host(&mut self) -> Result<(), PushError> {
        self.fire(Phase::DeployToBuildHost, Stage::Began, None);
        let build_host = self.deploy.build_host.clone();
        match self.deploy_repos_to(&build_host).await {
            Ok(()) => {
                self.fire(Phase::DeployToBuildHost, Stage::Ended, None);
                Ok(())
            }
            Err(error) => {
                self.fire_aborted(Phase::DeployToBuildHost, None, &error);
                Err(error)
            }
        }
    }

    /// Whether any deploy repo wants a static build. The probe is advisory:
    /// a repo whose probe command fails counts as "no".
    async fn static_build_needed(&mut self) -> Result<bool, PushError> {
        for repo in self.request.deploys.clone() {
            if repo == self.deploy.static_repo {
                return Ok(true);
            }
            match self
                .run_build_command(vec!["needs-static-build".to_string(), repo.clone()], true)
                .await
            {
                Ok(_) => return Ok(true),
                Err(PushError::Remote(error)) => {
                    debug!(repo = %repo, error = %error, "static build probe declined");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(false)
    }

    async fn build_static(&mut self) -> Result<(), PushError> {
        self.fire(Phase::BuildStatic, Stage::Began, None);
        match self
            .run_build_command(vec!["build-static".to_string()], false)
            .await
        {
            Ok(_) => {
                self.fire(Phase::BuildStatic, Stage::Ended, None);
                Ok(())
            }
            Err(error) => {
                self.fire_aborted(Phase::BuildStatic, None, &error);
                Err(error)
            }
        }
    }

    // ------------------------------------------------------------------
    // Per-host loop
    // ------------------------------------------------------------------

    async fn process_hosts(&mut self) -> Result<(), PushError> {
        while self.state.cursor < self.hosts.len() {
            self.control.check()?;

            let host = self.hosts[self.state.cursor].clone();

            if self.state.stop_before.as_deref() == Some(host.as_str()) {
                info!(host = %host, "reached stop marker, halting");
                self.state.stop_before = None;
                break;
            }

            if let Some(start) = self.state.start_at.clone() {
                if start == host {
                    self.state.start_at = None;
                } else {
                    self.state.cursor += 1;
                    continue;
                }
            }

            if self.control.take_skip() {
                info!(host = %host, "skipping host");
                self.state.cursor += 1;
                continue;
            }

            match self.process_host(&host).await {
                Ok(()) => self.state.cursor += 1,
                Err(error) => {
                    // cancellation beats any recovery decision
                    self.control.check()?;
                    if matches!(error, PushError::Cancelled { .. }) {
                        return Err(error);
                    }
                    if !matches!(error, PushError::Remote(_)) {
                        return Err(error);
                    }

                    if !self.source.should_host_be_alive(&host).await {
                        warn!(
                            host = %host,
                            error = %error,
                            "host no longer expected alive, continuing"
                        );
                        self.state.cursor += 1;
                        continue;
                    }

                    let decision = self.decider.decide(&host, &error).await;
                    self.control.check()?;
                    match decision {
                        ErrorDecision::Abort => return Err(error),
                        ErrorDecision::Continue => self.state.cursor += 1,
                        ErrorDecision::Retry => {
                            info!(host = %host, "retrying host");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn process_host(&mut self, host: &str) -> Result<(), PushError> {
        self.fire(Phase::ProcessHost, Stage::Began, Some(host));
        match self.do_process_host(host).await {
            Ok(()) => {
                self.fire(Phase::ProcessHost, Stage::Ended, Some(host));
                Ok(())
            }
            Err(error) => {
                self.fire_aborted(Phase::ProcessHost, Some(host), &error);
                Err(error)
            }
        }
    }

    async fn do_process_host(&mut self, host: &str) -> Result<(), PushError> {
        for repo in self.request.fetches.clone() {
            self.run_deploy_command(host, vec!["fetch".to_string(), repo], false)
                .await?;
        }

        self.deploy_repos_to(host).await?;

        for command in self.request.deploy_commands.clone() {
            self.run_deploy_command(host, command, false).await?;
        }

        Ok(())
    }

    async fn deploy_repos_to(&mut self, host: &str) -> Result<(), PushError> {
        for repo in self.request.deploys.clone() {
            let revision = self
                .request
                .revisions
                .get(&repo)
                .cloned()
                .ok_or_else(|| PushError::MissingRevision(repo.clone()))?;
            self.run_deploy_command(host, vec!["deploy".to_string(), repo, revision], false)
                .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    async fn run_build_command(
        &mut self,
        args: Vec<String>,
        quiet: bool,
    ) -> Result<String, PushError> {
        let output = self
            .runner
            .run(
                &self.deploy.build_host,
                &self.deploy.build_binary,
                &args,
                quiet,
            )
            .await?;
        Ok(output)
    }

    async fn run_deploy_command(
        &mut self,
        host: &str,
        args: Vec<String>,
        quiet: bool,
    ) -> Result<String, PushError> {
        let output = self
            .runner
            .run(host, &self.deploy.deploy_binary, &args, quiet)
            .await?;
        Ok(output)
    }

    fn fire(&self, phase: Phase, stage: Stage, host: Option<&str>) {
        self.events.fire(&EventPayload {
            phase,
            stage,
            host,
            error: None,
        });
    }

    fn fire_aborted(&self, phase: Phase, host: Option<&str>, error: &PushError) {
        self.events.fire(&EventPayload {
            phase,
            stage: Stage::Aborted,
            host,
            error: Some(error),
        });
    }
}
