//! Minimal-diff engine for record submits.
//!
//! Compares a baseline snapshot against the current draft, key by key over
//! the draft's fields, and returns only the fields whose value actually
//! changed. The result is the dirty patch sent upstream on submit: applying
//! it to the baseline field-by-field reproduces the draft.
//!
//! The engine is additive/overwrite-oriented: keys present only in the
//! baseline are never represented, so field removal must travel as an
//! explicit sentinel value rather than omission.

use std::collections::HashSet;

use chrono::DateTime;
use serde_json::{Map, Value};

/// Tuning for [`compute_dirty_with`].
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    instant_keys: HashSet<String>,
}

impl DiffOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a key as instant-typed. Declared keys are always compared by
    /// parsed epoch time, and two unparseable values compare equal -- a junk
    /// timestamp overwritten by other junk is not a change worth submitting.
    pub fn instant_key(mut self, key: impl Into<String>) -> Self {
        self.instant_keys.insert(key.into());
        self
    }
}

/// Computes the minimal set of changed fields between `baseline` and
/// `current`, with default options.
///
/// Pure and total: mismatched shapes degrade to a key-by-key comparison
/// driven by `current`'s keys alone.
pub fn compute_dirty(baseline: &Map<String, Value>, current: &Map<String, Value>) -> Map<String, Value> {
    compute_dirty_with(baseline, current, &DiffOptions::default())
}

/// [`compute_dirty`] with explicit instant-typed keys.
pub fn compute_dirty_with(
    baseline: &Map<String, Value>,
    current: &Map<String, Value>,
    options: &DiffOptions,
) -> Map<String, Value> {
    let mut dirty = Map::new();
    for (key, value) in current {
        let changed = match baseline.get(key) {
            None => true,
            Some(base) => !values_equal(key, base, value, options),
        };
        if changed {
            dirty.insert(key.clone(), value.clone());
        }
    }
    dirty
}

/// Overwrites `base` field-by-field with `patch`. The round-trip
/// counterpart of [`compute_dirty`].
pub fn apply_patch(base: &Map<String, Value>, patch: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

fn values_equal(key: &str, base: &Value, current: &Value, options: &DiffOptions) -> bool {
    // Arrays are whole-replace: order-sensitive, element-wise equality,
    // never an element-level patch.
    if base.is_array() || current.is_array() {
        return base == current;
    }

    if options.instant_keys.contains(key) {
        return match (parse_instant(base), parse_instant(current)) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        };
    }

    let a = parse_instant(base);
    let b = parse_instant(current);
    if a.is_some() || b.is_some() {
        // Instant comparison by epoch time, so equal instants with
        // different offsets or formatting do not count as edits.
        return a == b && a.is_some();
    }

    base == current
}

fn parse_instant(value: &Value) -> Option<i64> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|instant| instant.timestamp_millis())
}
