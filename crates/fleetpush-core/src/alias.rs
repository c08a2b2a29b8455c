//! Host reference resolution
//!
//! Expands the operator's host references (literal names, glob patterns,
//! alias names, nested `@alias` references) against the inventory into the
//! concrete target list. Resolution happens before any remote action, so a
//! bad reference can never leave a push half-applied.

use std::collections::{HashMap, VecDeque};

use glob::Pattern;

use crate::error::PushError;

/// Deepest allowed `@alias` nesting; past this a definition is assumed
/// circular
pub const MAX_NESTED_ALIASES: usize = 10;

/// Alias definitions: name to an ordered list of glob patterns and/or
/// `@other-alias` references
pub type AliasTable = HashMap<String, Vec<String>>;

/// Expand `refs` into an ordered host list.
///
/// References are worked breadth-first off a queue. A token containing
/// whitespace is split and re-queued (legacy form where one argument held
/// several names). Duplicates are preserved; globs expand in inventory
/// order, so `all_hosts` should already be in canonical (natural) order.
///
/// # Errors
/// `UnknownHostOrAlias` for an unrecognized literal, `UnmatchedGlob` for a
/// pattern matching nothing, `UndefinedAlias`/`AliasRecursionExceeded` for
/// broken alias definitions.
pub fn resolve(
    refs: &[String],
    all_hosts: &[String],
    aliases: &AliasTable,
) -> Result<Vec<String>, PushError> {
    let mut resolved = Vec::new();
    let mut queue: VecDeque<String> = refs.iter().cloned().collect();

    while let Some(token) = queue.pop_front() {
        if token.contains(char::is_whitespace) {
            queue.extend(token.split_whitespace().map(str::to_string));
            continue;
        }

        if all_hosts.iter().any(|host| *host == token) {
            resolved.push(token);
        } else if let Some(entries) = aliases.get(&token) {
            expand_alias(&token, entries, all_hosts, aliases, 0, &mut resolved)?;
        } else if is_glob(&token) {
            expand_glob(None, &token, all_hosts, &mut resolved)?;
        } else {
            return Err(PushError::UnknownHostOrAlias(token));
        }
    }

    Ok(resolved)
}

fn expand_alias(
    alias: &str,
    entries: &[String],
    all_hosts: &[String],
    aliases: &AliasTable,
    depth: usize,
    out: &mut Vec<String>,
) -> Result<(), PushError> {
    if depth > MAX_NESTED_ALIASES {
        return Err(PushError::AliasRecursionExceeded(alias.to_string()));
    }

    for entry in entries {
        if let Some(referenced) = entry.strip_prefix('@') {
            let sub_entries = aliases.get(referenced).ok_or_else(|| PushError::UndefinedAlias {
                alias: alias.to_string(),
                referenced: referenced.to_string(),
            })?;
            expand_alias(referenced, sub_entries, all_hosts, aliases, depth + 1, out)?;
        } else {
            expand_glob(Some(alias), entry, all_hosts, out)?;
        }
    }

    Ok(())
}

/// Expand one glob against the inventory, in inventory order. Matching
/// nothing is an error: a silently empty expansion would under-deploy.
fn expand_glob(
    alias: Option<&str>,
    pattern: &str,
    all_hosts: &[String],
    out: &mut Vec<String>,
) -> Result<(), PushError> {
    let compiled = Pattern::new(pattern).map_err(|e| PushError::BadPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let before = out.len();
    out.extend(
        all_hosts
            .iter()
            .filter(|host| compiled.matches(host))
            .cloned(),
    );

    if out.len() == before {
        return Err(PushError::UnmatchedGlob {
            alias: alias.map(str::to_string),
            pattern: pattern.to_string(),
        });
    }

    Ok(())
}

fn is_glob(token: &str) -> bool {
    token.contains(['*', '?', '['])
}
