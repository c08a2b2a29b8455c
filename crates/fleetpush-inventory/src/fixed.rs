//! Static host list, for fixed fleets and tests

use async_trait::async_trait;

use crate::error::InventoryError;
use crate::source::HostSource;

/// Inventory backed by a fixed list of host names from configuration.
///
/// Has no liveness signal; every host is reported alive.
#[derive(Debug, Clone)]
pub struct StaticHostSource {
    hosts: Vec<String>,
}

impl StaticHostSource {
    /// Create a source over the given host names
    #[must_use]
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl HostSource for StaticHostSource {
    async fn get_all_hosts(&self) -> Result<Vec<String>, InventoryError> {
        Ok(self.hosts.clone())
    }
}
