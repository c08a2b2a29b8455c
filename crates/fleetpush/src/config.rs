//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use fleetpush_core::{AliasTable, DeployConfig};
use fleetpush_exec::{KeySource, SshConfig};
use fleetpush_inventory::HostSourceConfig;

/// Top-level configuration for fleetpush
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// SSH transport settings
    pub ssh: SshSection,
    /// Deployment topology
    pub deploy: DeployConfig,
    /// Host inventory backend
    pub hosts: HostSourceConfig,
    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsSection,
    /// Defaults the command line can override
    #[serde(default)]
    pub defaults: DefaultsSection,
    /// Notification side channel
    #[serde(default)]
    pub notify: NotifySection,
    /// Alias definitions: name = ["glob", "@other-alias", ...]
    #[serde(default)]
    pub aliases: AliasTable,
}

/// `[ssh]` section
#[derive(Debug, Clone, Deserialize)]
pub struct SshSection {
    /// Login user
    pub user: String,
    /// Private key file; discovered under ~/.ssh when unset
    pub key_file: Option<PathBuf>,
    /// Environment variable holding a base64 key, for CI use
    pub key_env: Option<String>,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect + auth deadline, seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Per-command deadline, seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
    /// Prefix remote commands with /usr/bin/sudo
    #[serde(default = "default_sudo")]
    pub sudo: bool,
}

impl SshSection {
    /// Translate into the exec layer's transport settings
    #[must_use]
    pub fn to_exec_config(&self) -> SshConfig {
        let key = if let Some(path) = &self.key_file {
            KeySource::Path(path.clone())
        } else if let Some(var) = &self.key_env {
            KeySource::Env(var.clone())
        } else {
            KeySource::Discover
        };

        SshConfig {
            user: self.user.clone(),
            key,
            port: self.port,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            command_timeout: Duration::from_secs(self.command_timeout),
            sudo: self.sudo,
        }
    }
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_command_timeout() -> u64 {
    600
}

fn default_sudo() -> bool {
    true
}

/// `[paths]` section
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Where per-push log files land
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
    /// Wordlist for push ids
    #[serde(default = "default_wordlist")]
    pub wordlist: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            log_root: default_log_root(),
            wordlist: default_wordlist(),
        }
    }
}

fn default_log_root() -> PathBuf {
    PathBuf::from("/var/log/fleetpush")
}

fn default_wordlist() -> PathBuf {
    PathBuf::from("/usr/share/dict/words")
}

/// `[defaults]` section
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsSection {
    /// Seconds to sleep between hosts
    #[serde(default = "default_sleeptime")]
    pub sleeptime: u64,
    /// Shuffle unless told otherwise
    #[serde(default)]
    pub shuffle: bool,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            sleeptime: default_sleeptime(),
            shuffle: false,
        }
    }
}

fn default_sleeptime() -> u64 {
    5
}

/// `[notify]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifySection {
    /// Webhook to announce pushes to
    pub webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from a file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("{}: {e}", path.display()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| eyre::eyre!("{}: {e}", path.display()))?;
        Ok(config)
    }

    /// Load from the explicit path or the standard fallback chain
    ///
    /// # Errors
    /// Returns an error if no configuration file exists or parsing fails.
    pub fn load_default(explicit: Option<&Path>) -> eyre::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var("FLEETPUSH_CONFIG") {
            return Self::load(Path::new(&path));
        }

        let candidates = [
            PathBuf::from("fleetpush.toml"),
            PathBuf::from("/etc/fleetpush/fleetpush.toml"),
            dirs::config_dir()
                .map(|p| p.join("fleetpush/fleetpush.toml"))
                .unwrap_or_default(),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        eyre::bail!("no configuration file found (pass --config or create fleetpush.toml)")
    }
}
