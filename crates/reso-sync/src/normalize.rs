use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

/// A single destination row: column name to normalized value, ready to hand
/// to the upserter. Values stay as `serde_json::Value` so the upserter can
/// bind them generically regardless of destination column type.
pub type Row = BTreeMap<String, JsonValue>;

/// Component D: converts a raw upstream payload (a heterogeneous JSON
/// object) into a row with coerced field types. Left as a trait so a
/// resource-specific mapping can be substituted; `RowNormalizer` is the
/// default, generic coercion described in spec.md §9.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, record: &JsonValue) -> anyhow::Result<Row>;
}

/// Generic coercion applied uniformly to every field of a raw record:
/// - `"Y"`/`"N"`/`"true"`/`"false"` strings become booleans
/// - numeric strings are left as strings (the destination driver coerces on
///   bind); bare JSON numbers pass through unchanged
/// - bare scalars where the upstream sometimes sends an array of one are
///   wrapped into a single-element array
/// - everything else passes through as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct RowNormalizer {
    /// Field names known to hold arrays on the destination side, even when
    /// the upstream sends a bare scalar for a single-element case.
    pub array_fields: &'static [&'static str],
}

impl RowNormalizer {
    pub fn new(array_fields: &'static [&'static str]) -> Self {
        Self { array_fields }
    }

    fn coerce_field(&self, name: &str, value: JsonValue) -> JsonValue {
        if self.array_fields.contains(&name) {
            if !value.is_array() && !value.is_null() {
                return JsonValue::Array(vec![value]);
            }
            return value;
        }

        match value {
            JsonValue::String(ref s) => match s.as_str() {
                "Y" | "true" | "True" | "TRUE" => JsonValue::Bool(true),
                "N" | "false" | "False" | "FALSE" => JsonValue::Bool(false),
                _ => value,
            },
            other => other,
        }
    }
}

impl Normalizer for RowNormalizer {
    fn normalize(&self, record: &JsonValue) -> anyhow::Result<Row> {
        let object = record
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("record is not a JSON object"))?;

        let row = object
            .iter()
            .map(|(name, value)| (name.clone(), self.coerce_field(name, value.clone())))
            .collect();

        Ok(row)
    }
}
