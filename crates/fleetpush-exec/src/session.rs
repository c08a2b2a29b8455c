//! SSH session handling using russh

use std::sync::Arc;

use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect, client};
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use crate::error::ExecError;
use crate::keys::ResolvedKey;
use crate::runner::{OutputMirror, SshConfig};

/// SSH client handler for russh
#[derive(Debug)]
struct SessionHandler;

impl client::Handler for SessionHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no); push targets
        // churn too fast for a useful known_hosts file
        Ok(true)
    }
}

/// An open, authenticated channel to exactly one host.
///
/// Owned by [`SshRunner`](crate::runner::SshRunner), which replaces it
/// whenever the target host changes.
pub struct SshSession {
    host: String,
    handle: client::Handle<SessionHandler>,
}

impl SshSession {
    /// Connect and authenticate to `host`
    ///
    /// # Errors
    /// `ExecError::Connection` on transport failure, `ExecError::Auth` if the
    /// server refuses the key, `ExecError::Timeout` past the connect deadline.
    #[instrument(skip(config, key), fields(host = %host))]
    pub async fn connect(
        host: &str,
        config: &SshConfig,
        key: &ResolvedKey,
    ) -> Result<Self, ExecError> {
        debug!(user = %config.user, port = config.port, "connecting");

        let client_config = Arc::new(client::Config::default());

        let connect = client::connect(client_config, (host, config.port), SessionHandler);
        let mut handle = match timeout(config.connect_timeout, connect).await {
            Ok(result) => result.map_err(|e| ExecError::Connection {
                host: host.to_string(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                return Err(ExecError::Timeout {
                    timeout: config.connect_timeout,
                });
            }
        };

        let key_pair = load_secret_key(key.path(), None)
            .map_err(|e| ExecError::Key(format!("{}: {e}", key.path().display())))?;

        let hash_alg = handle.best_supported_rsa_hash().await.ok().flatten().flatten();
        let auth_res = handle
            .authenticate_publickey(
                &config.user,
                PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
            )
            .await
            .map_err(|e| ExecError::Auth {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        if !auth_res.success() {
            return Err(ExecError::Auth {
                host: host.to_string(),
                reason: "public key rejected".to_string(),
            });
        }

        info!(host = %host, "connected and authenticated");

        Ok(Self {
            host: host.to_string(),
            handle,
        })
    }

    /// The host this session is bound to
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Run a command, streaming combined stdout/stderr to `mirror` as it
    /// arrives. The full captured text is returned either way.
    ///
    /// # Errors
    /// `ExecError::RemoteExit` on nonzero exit, `ExecError::Io` on channel
    /// failure.
    pub async fn exec(
        &mut self,
        command: &str,
        mirror: Option<&OutputMirror>,
    ) -> Result<String, ExecError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        let mut code = 0;
        let mut captured = Vec::new();

        loop {
            let Some(msg) = channel.wait().await else {
                break;
            };
            match msg {
                ChannelMsg::Data { data } => {
                    capture_chunk(&mut captured, &data, mirror);
                }
                // stderr is folded into the same stream, in arrival order
                ChannelMsg::ExtendedData { data, ext: 1 } => {
                    capture_chunk(&mut captured, &data, mirror);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    code = exit_status.cast_signed();
                }
                _ => {}
            }
        }

        let output = String::from_utf8_lossy(&captured).to_string();

        if code != 0 {
            debug!(host = %self.host, code, "remote command failed");
            return Err(ExecError::RemoteExit { code });
        }

        Ok(output)
    }

    /// Close the session. Best-effort; a failed disconnect only logs.
    pub async fn close(self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!(host = %self.host, error = %e, "disconnect failed");
        } else {
            debug!(host = %self.host, "disconnected");
        }
    }
}

fn capture_chunk(captured: &mut Vec<u8>, data: &[u8], mirror: Option<&OutputMirror>) {
    captured.extend_from_slice(data);
    if let Some(mirror) = mirror {
        mirror(&String::from_utf8_lossy(data));
    }
}
