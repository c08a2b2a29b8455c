//! fleetpush-inventory: host inventory sources
//!
//! Answers "what hosts exist" and "should this host still be alive" from a
//! closed set of backends: a static list, a DNS zone transfer, or an etcd
//! registry. Selected by configuration through [`make_host_source`].

pub mod config;
pub mod dns;
pub mod error;
pub mod etcd;
pub mod fixed;
pub mod order;
pub mod source;

pub use config::{DnsSourceConfig, EtcdSourceConfig, HostSourceConfig, make_host_source};
pub use error::InventoryError;
pub use fixed::StaticHostSource;
pub use order::sorted_naturally;
pub use source::HostSource;
