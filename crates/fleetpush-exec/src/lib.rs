//! fleetpush-exec: remote command dispatch
//!
//! One SSH session at a time, reused while the target host is unchanged and
//! replaced when it changes. A dry-run implementation stands in for the
//! network during pipeline rehearsals.

pub mod error;
pub mod keys;
pub mod runner;
pub mod session;

pub use error::ExecError;
pub use keys::{KeySource, ResolvedKey};
pub use runner::{DRY_RUN_OUTPUT, DryRunRunner, OutputMirror, RemoteRunner, SshConfig, SshRunner};
