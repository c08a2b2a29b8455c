//! Command dispatch with session reuse

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::ExecError;
use crate::keys::{KeySource, ResolvedKey};
use crate::session::SshSession;

/// Sentinel returned in place of remote output during a dry run
pub const DRY_RUN_OUTPUT: &str = "TESTING";

/// Callback receiving streamed command output chunks as they arrive
pub type OutputMirror = Arc<dyn Fn(&str) + Send + Sync>;

/// Transport settings for remote dispatch
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Login user
    pub user: String,
    /// Where to find the private key
    pub key: KeySource,
    /// SSH port
    pub port: u16,
    /// Deadline for connect + auth
    pub connect_timeout: Duration,
    /// Deadline for a single remote command
    pub command_timeout: Duration,
    /// Prefix commands with /usr/bin/sudo
    pub sudo: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "deploy".to_string(),
            key: KeySource::Discover,
            port: 22,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(600),
            sudo: true,
        }
    }
}

/// The engine's seam to the network: run one command on one host.
///
/// `quiet` suppresses output mirroring for commands whose output is consumed
/// by the caller (ref resolution, probes); the captured text is returned
/// regardless.
#[async_trait]
pub trait RemoteRunner: Send {
    /// Run `binary` with `args` on `host` and return the captured output
    ///
    /// # Errors
    /// `ExecError::RemoteExit` for a nonzero remote exit; connection-class
    /// errors for anything transport-level.
    async fn run(
        &mut self,
        host: &str,
        binary: &str,
        args: &[String],
        quiet: bool,
    ) -> Result<String, ExecError>;

    /// Close any open session. Called exactly once at run end; idempotent.
    async fn shutdown(&mut self);
}

/// Production dispatch over SSH.
///
/// Keeps at most one session open: consecutive commands against the same
/// host reuse it, a different host swaps it out.
pub struct SshRunner {
    config: SshConfig,
    key: ResolvedKey,
    mirror: Option<OutputMirror>,
    session: Option<SshSession>,
}

impl SshRunner {
    /// Create a runner, resolving the key up front so a bad key fails the
    /// push before any host is touched
    ///
    /// # Errors
    /// `ExecError::Key` if key resolution fails.
    pub fn new(config: SshConfig) -> Result<Self, ExecError> {
        let key = config.key.resolve()?;
        Ok(Self {
            config,
            key,
            mirror: None,
            session: None,
        })
    }

    /// Stream command output to `mirror` as it arrives
    #[must_use]
    pub fn with_mirror(mut self, mirror: OutputMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    async fn session_for(&mut self, host: &str) -> Result<&mut SshSession, ExecError> {
        let session = match self.session.take() {
            Some(open) if open.host() == host => open,
            Some(stale) => {
                debug!(from = %stale.host(), to = %host, "switching session");
                stale.close().await;
                SshSession::connect(host, &self.config, &self.key).await?
            }
            None => SshSession::connect(host, &self.config, &self.key).await?,
        };
        Ok(self.session.insert(session))
    }
}

#[async_trait]
impl RemoteRunner for SshRunner {
    async fn run(
        &mut self,
        host: &str,
        binary: &str,
        args: &[String],
        quiet: bool,
    ) -> Result<String, ExecError> {
        let command = compose_command(self.config.sudo, binary, args);
        debug!(host = %host, command = %command, "running remote command");

        let mirror = if quiet { None } else { self.mirror.clone() };
        let deadline = self.config.command_timeout;

        let session = self.session_for(host).await?;
        match timeout(deadline, session.exec(&command, mirror.as_ref())).await {
            Ok(result) => result,
            Err(_) => {
                // the channel is mid-command; the session can't be reused
                if let Some(stale) = self.session.take() {
                    stale.close().await;
                }
                Err(ExecError::Timeout { timeout: deadline })
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

/// Dry-run dispatch: logs what would run and returns a sentinel.
///
/// First-class engine capability used for pipeline rehearsals, not a debug
/// hook; the command stream an operator sees matches a real push.
pub struct DryRunRunner {
    sudo: bool,
    mirror: Option<OutputMirror>,
}

impl DryRunRunner {
    /// Create a dry-run dispatch with the same sudo behavior a real runner
    /// would have
    #[must_use]
    pub fn new(sudo: bool) -> Self {
        Self { sudo, mirror: None }
    }

    /// Mirror would-be command lines to the operator log
    #[must_use]
    pub fn with_mirror(mut self, mirror: OutputMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }
}

#[async_trait]
impl RemoteRunner for DryRunRunner {
    async fn run(
        &mut self,
        host: &str,
        binary: &str,
        args: &[String],
        quiet: bool,
    ) -> Result<String, ExecError> {
        let command = compose_command(self.sudo, binary, args);
        info!(host = %host, command = %command, "dry run");

        if !quiet {
            if let Some(mirror) = &self.mirror {
                mirror(&format!("{host}: {command}\n"));
            }
        }

        Ok(DRY_RUN_OUTPUT.to_string())
    }

    async fn shutdown(&mut self) {}
}

fn compose_command(sudo: bool, binary: &str, args: &[String]) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(args.len() + 2);
    if sudo {
        parts.push("/usr/bin/sudo");
    }
    parts.push(binary);
    parts.extend(args.iter().map(String::as_str));
    parts.join(" ")
}
