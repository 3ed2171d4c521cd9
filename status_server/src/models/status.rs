//! Last-known build statuses and the aggregate pass/fail rule.

use std::collections::BTreeMap;

/// Build name → last recorded status string.
pub type StatusMap = BTreeMap<String, String>;

/// Status spellings that count as passing. `pass` is a legacy value still
/// found in older store files.
pub const PASSING_STATUSES: [&str; 2] = ["SUCCESS", "pass"];

/// Case-sensitive; anything not in [`PASSING_STATUSES`] fails.
pub fn is_passing(status: &str) -> bool {
    PASSING_STATUSES.contains(&status)
}

/// True when every recorded build passes. An empty map passes.
pub fn all_passing(statuses: &StatusMap) -> bool {
    statuses.values().all(|s| is_passing(s))
}
