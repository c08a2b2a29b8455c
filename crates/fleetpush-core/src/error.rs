//! Core error taxonomy
//!
//! Resolution-time errors (hosts, aliases, directives) fail the push before
//! any remote action. Remote errors are intercepted at the per-host loop
//! boundary; everything else terminates the run.

use thiserror::Error;

use fleetpush_exec::ExecError;
use fleetpush_inventory::InventoryError;

/// Errors that can abort a push
#[derive(Error, Debug)]
pub enum PushError {
    /// The inventory backend could not be queried
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// A host reference matched neither a known host nor a defined alias
    #[error("unknown host or alias \"{0}\"")]
    UnknownHostOrAlias(String),

    /// A glob pattern matched no host in the inventory
    #[error("{}unmatched glob \"{pattern}\"", alias_context(.alias))]
    UnmatchedGlob {
        /// Alias being expanded, if the pattern came from one
        alias: Option<String>,
        /// The offending pattern
        pattern: String,
    },

    /// Alias references nested deeper than [`MAX_NESTED_ALIASES`](crate::MAX_NESTED_ALIASES)
    #[error("alias \"{0}\" nests too deeply, circular reference?")]
    AliasRecursionExceeded(String),

    /// An alias referenced an alias that is not defined
    #[error("alias \"{alias}\" references undefined alias \"{referenced}\"")]
    UndefinedAlias {
        /// Alias being expanded
        alias: String,
        /// The missing reference
        referenced: String,
    },

    /// A glob pattern was not parseable
    #[error("bad glob pattern \"{pattern}\": {reason}")]
    BadPattern {
        /// The offending pattern
        pattern: String,
        /// Parser complaint
        reason: String,
    },

    /// A start/stop marker names a host absent from the resolved list
    #[error("host \"{0}\" not in host list")]
    UnknownHost(String),

    /// Positional markers combined with an unseeded shuffle
    #[error("{0} with --shuffle requires an explicit --seed")]
    SeedRequired(String),

    /// A repo reached deployment without a resolved revision
    #[error("no resolved revision for repo \"{0}\"")]
    MissingRevision(String),

    /// A remote command or its transport failed
    #[error(transparent)]
    Remote(#[from] ExecError),

    /// The push was cancelled out-of-band
    #[error("push cancelled: {reason}")]
    Cancelled {
        /// Human-readable cause (signal name, operator keypress)
        reason: String,
    },
}

fn alias_context(alias: &Option<String>) -> String {
    match alias {
        Some(name) => format!("alias \"{name}\": "),
        None => String::new(),
    }
}
