use std::collections::HashSet;

use serde_json::Value as JsonValue;

use crate::normalize::Row;

/// Per-run identity set that suppresses double-upsert when pages or windows
/// overlap (spec.md §3, "Dedup key set"). Scoped to a single resource run:
/// constructed at its start, dropped at its end.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<Vec<String>>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Builds the identity tuple for a raw record from the descriptor's
    /// conflict-key fields. Missing fields serialize as the literal string
    /// `"null"`, which is fine for identity purposes: a record without a
    /// conflict-key value can never collide with one that has it.
    pub fn identity(record: &JsonValue, conflict_key: &[&str]) -> Vec<String> {
        conflict_key
            .iter()
            .map(|field| {
                record
                    .get(field)
                    .map(json_value_to_identity_part)
                    .unwrap_or_else(|| "null".to_string())
            })
            .collect()
    }

    pub fn identity_from_row(row: &Row, conflict_key: &[&str]) -> Vec<String> {
        conflict_key
            .iter()
            .map(|field| {
                row.get(*field)
                    .map(json_value_to_identity_part)
                    .unwrap_or_else(|| "null".to_string())
            })
            .collect()
    }

    /// Returns `true` if this identity has not been seen before, recording
    /// it as seen either way.
    pub fn insert(&mut self, identity: Vec<String>) -> bool {
        self.seen.insert(identity)
    }

    pub fn contains(&self, identity: &[String]) -> bool {
        self.seen.contains(identity)
    }
}

fn json_value_to_identity_part(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
