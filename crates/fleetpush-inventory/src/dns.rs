//! DNS zone-transfer host source
//!
//! Enumerates hosts by transferring the fleet's DNS zone: ask the
//! configured nameserver for the zone's SOA, resolve the primary it names,
//! then AXFR the zone from the primary and collect the A record names.

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use hickory_client::client::{AsyncClient, ClientHandle};
use hickory_client::proto::iocompat::AsyncIoTokioAsStd;
use hickory_client::rr::{DNSClass, Name, RData, RecordType};
use hickory_client::tcp::TcpClientStream;
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::error::InventoryError;
use crate::source::HostSource;

/// Inventory backed by a DNS zone transfer.
///
/// Has no liveness signal; every host is reported alive.
pub struct DnsHostSource {
    domain: String,
    nameserver: String,
}

impl DnsHostSource {
    /// Create a source for the given zone, queried via the given nameserver
    /// (`host:port`; port 53 is assumed when omitted)
    #[must_use]
    pub fn new(domain: impl Into<String>, nameserver: impl Into<String>) -> Self {
        Self {
            domain: normalize_zone(&domain.into()),
            nameserver: nameserver.into(),
        }
    }

    async fn resolve_nameserver(&self) -> Result<SocketAddr, InventoryError> {
        let target = if self.nameserver.contains(':') {
            self.nameserver.clone()
        } else {
            format!("{}:53", self.nameserver)
        };
        tokio::net::lookup_host(&target)
            .await
            .map_err(|e| {
                InventoryError::LookupFailed(format!("nameserver \"{target}\" not resolvable: {e}"))
            })?
            .next()
            .ok_or_else(|| {
                InventoryError::LookupFailed(format!("nameserver \"{target}\" has no address"))
            })
    }

    /// Find the zone primary by following SOA mname, then its A record.
    async fn find_primary(&self, client: &mut AsyncClient) -> Result<SocketAddr, InventoryError> {
        let zone = zone_name(&self.domain)?;

        let soa_answer = client
            .query(zone.clone(), DNSClass::IN, RecordType::SOA)
            .await
            .map_err(|e| InventoryError::LookupFailed(format!("SOA query failed: {e}")))?;
        let primary_name = soa_answer
            .answers()
            .iter()
            .find_map(|record| match record.data() {
                Some(RData::SOA(soa)) => Some(soa.mname().clone()),
                _ => None,
            })
            .ok_or_else(|| {
                InventoryError::LookupFailed(format!("zone {} has no SOA record", self.domain))
            })?;

        let a_answer = client
            .query(primary_name.clone(), DNSClass::IN, RecordType::A)
            .await
            .map_err(|e| InventoryError::LookupFailed(format!("primary A query failed: {e}")))?;
        let primary_addr = a_answer
            .answers()
            .iter()
            .find_map(|record| match record.data() {
                Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
                _ => None,
            })
            .ok_or_else(|| {
                InventoryError::LookupFailed(format!(
                    "zone primary \"{primary_name}\" has no A record"
                ))
            })?;

        Ok(SocketAddr::new(primary_addr, 53))
    }
}

#[async_trait]
impl HostSource for DnsHostSource {
    #[instrument(skip(self), fields(domain = %self.domain))]
    async fn get_all_hosts(&self) -> Result<Vec<String>, InventoryError> {
        let ns_addr = self.resolve_nameserver().await?;
        let mut resolver = connect(ns_addr).await?;
        let primary = self.find_primary(&mut resolver).await?;

        debug!(primary = %primary, "transferring zone");

        let mut client = connect(primary).await?;
        let zone = zone_name(&self.domain)?;
        let transfer = client
            .query(zone, DNSClass::IN, RecordType::AXFR)
            .await
            .map_err(|e| InventoryError::LookupFailed(format!("zone transfer failed: {e}")))?;

        let hosts: Vec<String> = transfer
            .answers()
            .iter()
            .filter(|record| record.record_type() == RecordType::A)
            .filter_map(|record| relative_name(&record.name().to_utf8(), &self.domain))
            .collect();

        debug!(count = hosts.len(), "zone transfer complete");

        Ok(hosts)
    }
}

async fn connect(addr: SocketAddr) -> Result<AsyncClient, InventoryError> {
    let (stream, sender) = TcpClientStream::<AsyncIoTokioAsStd<TcpStream>>::new(addr);
    let (client, background) = AsyncClient::new(stream, sender, None)
        .await
        .map_err(|e| InventoryError::LookupFailed(format!("dns connect to {addr}: {e}")))?;
    tokio::spawn(background);
    Ok(client)
}

fn zone_name(domain: &str) -> Result<Name, InventoryError> {
    Name::from_ascii(domain)
        .map_err(|e| InventoryError::ConfigError(format!("bad zone name \"{domain}\": {e}")))
}

/// Ensure the zone name is fully qualified
fn normalize_zone(domain: &str) -> String {
    let trimmed = domain.trim_end_matches('.');
    format!("{trimmed}.")
}

/// Strip the zone suffix from a record name, yielding the short host name.
/// The zone apex itself yields nothing.
fn relative_name(record_name: &str, zone: &str) -> Option<String> {
    let name = record_name.to_ascii_lowercase();
    let zone = zone.to_ascii_lowercase();

    let stripped = name.strip_suffix(&zone).or_else(|| {
        // some servers hand back names without the trailing dot
        name.strip_suffix(zone.trim_end_matches('.'))
    })?;
    let host = stripped.trim_end_matches('.');

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
