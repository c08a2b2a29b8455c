//! Execution-order policy
//!
//! Applies the optional deterministic shuffle and validates the start/stop
//! markers before anything touches the network. The markers themselves are
//! honored (and consumed) by the engine's per-host loop.

use sha2::{Digest, Sha256};

use crate::error::PushError;

/// Operator directives over the resolved host list
#[derive(Debug, Clone, Default)]
pub struct OrderDirectives {
    /// Reorder deterministically from the seed
    pub shuffle: bool,
    /// Explicit seed word; defaults to the push id
    pub seed: Option<String>,
    /// Skip hosts until this one is reached
    pub start_at: Option<String>,
    /// Halt the push at this host, excluding it
    pub stop_before: Option<String>,
}

/// The final execution order plus the runtime markers
#[derive(Debug, Clone, Default)]
pub struct HostPlan {
    /// Hosts in execution order
    pub hosts: Vec<String>,
    /// Pending start marker
    pub start_at: Option<String>,
    /// Pending stop marker
    pub stop_before: Option<String>,
}

/// Produce the final execution order from the resolved host list.
///
/// The shuffle is a pure function of (seed, host set): same seed and hosts
/// give the identical order on every run, so a prior run's order can be
/// reproduced by reusing its seed. No wall-clock or process randomness is
/// involved.
///
/// # Errors
/// `UnknownHost` if a marker names a host absent from the list;
/// `SeedRequired` if a marker is combined with a shuffle and no explicit
/// seed, since the marker's position in the output order would be
/// unpredictable to the operator.
pub fn order_hosts(
    hosts: Vec<String>,
    directives: OrderDirectives,
    push_id: &str,
) -> Result<HostPlan, PushError> {
    for marker in [&directives.start_at, &directives.stop_before]
        .into_iter()
        .flatten()
    {
        if !hosts.contains(marker) {
            return Err(PushError::UnknownHost(marker.clone()));
        }
    }

    let hosts = if directives.shuffle {
        if directives.seed.is_none() {
            if directives.start_at.is_some() {
                return Err(PushError::SeedRequired("--startat".to_string()));
            }
            if directives.stop_before.is_some() {
                return Err(PushError::SeedRequired("--stopbefore".to_string()));
            }
        }
        let seed = directives.seed.as_deref().unwrap_or(push_id);
        seeded_shuffle(seed, hosts)
    } else {
        hosts
    };

    Ok(HostPlan {
        hosts,
        start_at: directives.start_at,
        stop_before: directives.stop_before,
    })
}

/// Order hosts by the digest of seed word + host name
fn seeded_shuffle(seed: &str, mut hosts: Vec<String>) -> Vec<String> {
    hosts.sort_by_cached_key(|host| {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(host.as_bytes());
        hasher.finalize().to_vec()
    });
    hosts
}
