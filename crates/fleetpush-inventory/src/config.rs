//! Inventory configuration and source selection

use serde::Deserialize;

use crate::dns::DnsHostSource;
use crate::error::InventoryError;
use crate::etcd::EtcdHostSource;
use crate::fixed::StaticHostSource;
use crate::source::HostSource;

/// Which inventory backend to use, selected by the `source` key of the
/// `[hosts]` configuration table.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum HostSourceConfig {
    /// Fixed host list from configuration
    Static {
        /// The host names
        hosts: Vec<String>,
    },
    /// DNS zone transfer
    Dns(DnsSourceConfig),
    /// etcd host registrations
    Etcd(EtcdSourceConfig),
}

/// Settings for the DNS zone-transfer backend
#[derive(Debug, Clone, Deserialize)]
pub struct DnsSourceConfig {
    /// Zone holding one A record per host
    pub domain: String,
    /// Nameserver to query for the zone SOA (`host` or `host:port`)
    pub nameserver: String,
}

/// Settings for the etcd backend
#[derive(Debug, Clone, Deserialize)]
pub struct EtcdSourceConfig {
    /// Cluster endpoints, e.g. `http://10.0.0.1:2379`
    pub endpoints: Vec<String>,
    /// Key prefix hosts register under
    pub prefix: String,
    /// Optional auth user
    pub username: Option<String>,
    /// Optional auth password
    pub password: Option<String>,
}

/// Construct the configured host source.
///
/// The variant set is closed; adding a backend means adding an arm here.
///
/// # Errors
/// Returns an error if the backend cannot be constructed (bad settings,
/// unreachable coordinator).
pub async fn make_host_source(
    config: &HostSourceConfig,
) -> Result<Box<dyn HostSource>, InventoryError> {
    match config {
        HostSourceConfig::Static { hosts } => Ok(Box::new(StaticHostSource::new(hosts.clone()))),
        HostSourceConfig::Dns(dns) => Ok(Box::new(DnsHostSource::new(
            dns.domain.clone(),
            dns.nameserver.clone(),
        ))),
        HostSourceConfig::Etcd(etcd) => {
            let credentials = match (&etcd.username, &etcd.password) {
                (Some(user), Some(password)) => Some((user.clone(), password.clone())),
                (None, None) => None,
                _ => {
                    return Err(InventoryError::ConfigError(
                        "etcd username and password must be set together".to_string(),
                    ));
                }
            };
            let source = EtcdHostSource::connect(&etcd.endpoints, &etcd.prefix, credentials).await?;
            Ok(Box::new(source))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_tag_selects_variant() {
        let config: HostSourceConfig = toml::from_str(
            r#"
            source = "static"
            hosts = ["app-01", "app-02"]
            "#,
        )
        .unwrap();
        assert!(matches!(config, HostSourceConfig::Static { ref hosts } if hosts.len() == 2));
    }

    #[test]
    fn dns_variant_parses() {
        let config: HostSourceConfig = toml::from_str(
            r#"
            source = "dns"
            domain = "example.com"
            nameserver = "10.0.0.53"
            "#,
        )
        .unwrap();
        assert!(matches!(config, HostSourceConfig::Dns(_)));
    }

    #[tokio::test]
    async fn static_source_construction() {
        let config = HostSourceConfig::Static {
            hosts: vec!["app-01".to_string()],
        };
        let source = make_host_source(&config).await.unwrap();
        assert_eq!(source.get_all_hosts().await.unwrap(), vec!["app-01"]);
    }
}
