//! Canonical inventory ordering

/// Sort host names the way humans expect: embedded numeric runs compare
/// numerically, so `app2` sorts before `app10`.
///
/// This is the canonical order used wherever "all hosts" is enumerated;
/// glob expansion emits matches in this order.
#[must_use]
pub fn sorted_naturally(mut hosts: Vec<String>) -> Vec<String> {
    hosts.sort_by(|a, b| natord::compare(a, b));
    hosts
}
