//! etcd-registered host source
//!
//! Hosts register themselves under a key prefix; the key disappearing again
//! is the liveness signal that distinguishes autoscale churn from real
//! failures.

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, GetOptions};
use tracing::{debug, instrument, warn};

use crate::error::InventoryError;
use crate::source::HostSource;

/// Inventory backed by host registrations in etcd.
pub struct EtcdHostSource {
    client: Client,
    prefix: String,
}

impl EtcdHostSource {
    /// Connect to etcd and create a source over registrations under `prefix`
    ///
    /// # Errors
    /// Returns `InventoryError::LookupFailed` if the endpoints are
    /// unreachable.
    pub async fn connect(
        endpoints: &[String],
        prefix: impl Into<String>,
        credentials: Option<(String, String)>,
    ) -> Result<Self, InventoryError> {
        let options = credentials.map(|(user, password)| {
            ConnectOptions::new().with_user(user, password)
        });

        let client = Client::connect(endpoints, options)
            .await
            .map_err(|e| InventoryError::LookupFailed(format!("etcd connect failed: {e}")))?;

        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }

        Ok(Self { client, prefix })
    }

    async fn key_exists(&self, key: &str) -> Result<bool, InventoryError> {
        let resp = self
            .client
            .clone()
            .get(key, Some(GetOptions::new().with_count_only()))
            .await
            .map_err(|e| InventoryError::LookupFailed(format!("etcd get failed: {e}")))?;
        Ok(resp.count() > 0)
    }
}

#[async_trait]
impl HostSource for EtcdHostSource {
    #[instrument(skip(self), fields(prefix = %self.prefix))]
    async fn get_all_hosts(&self) -> Result<Vec<String>, InventoryError> {
        let resp = self
            .client
            .clone()
            .get(
                self.prefix.as_str(),
                Some(GetOptions::new().with_prefix().with_keys_only()),
            )
            .await
            .map_err(|e| InventoryError::LookupFailed(format!("etcd enumeration failed: {e}")))?;

        let hosts: Vec<String> = resp
            .kvs()
            .iter()
            .filter_map(|kv| kv.key_str().ok())
            .filter_map(|key| key.strip_prefix(&self.prefix))
            // registrations may nest data below the host key
            .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
            .filter(|host| !host.is_empty())
            .collect();

        debug!(count = hosts.len(), "enumerated registered hosts");

        Ok(hosts)
    }

    async fn should_host_be_alive(&self, host: &str) -> bool {
        let key = format!("{}{}", self.prefix, host);
        match self.key_exists(&key).await {
            Ok(alive) => alive,
            Err(e) => {
                // can't tell; assume alive so the failure surfaces
                warn!(host = %host, error = %e, "liveness check failed");
                true
            }
        }
    }

    async fn shut_down(&mut self) {
        debug!("closing etcd connection");
    }
}
