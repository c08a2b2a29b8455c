//! Host inventory capability

use async_trait::async_trait;

use crate::error::InventoryError;

/// A backend that knows the full set of hosts a push may target.
///
/// Implementations are constructed once per run via
/// [`make_host_source`](crate::make_host_source) and shut down exactly once
/// at run end.
#[async_trait]
pub trait HostSource: Send + Sync {
    /// Enumerate every known host name.
    ///
    /// # Errors
    /// Returns `InventoryError::LookupFailed` if the backend cannot be
    /// queried. Output order is unspecified; callers apply
    /// [`sorted_naturally`](crate::sorted_naturally).
    async fn get_all_hosts(&self) -> Result<Vec<String>, InventoryError>;

    /// Whether the host is expected to still be reachable.
    ///
    /// Backends with no liveness signal report `true`. Backends that do have
    /// one also report `true` when the liveness query itself fails, so that
    /// real failures surface to the operator instead of being skipped.
    async fn should_host_be_alive(&self, _host: &str) -> bool {
        true
    }

    /// Release any held connections. Called once at run end.
    async fn shut_down(&mut self) {}
}
