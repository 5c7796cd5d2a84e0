//! Allow-list filtering of backend records before they are returned.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Keys removed at every depth, whatever the allow-list says.
pub const SENSITIVE_KEYS: &[&str] = &[
    "raw_data",
    "command_line",
    "cmdline",
    "file_path",
    "filepath",
    "parent_cmdline",
    "_raw",
];

/// How an allow-listed field is copied.
#[derive(Debug, Clone)]
pub enum FieldRule {
    /// Copy the value, scrubbing sensitive keys from any nested structure.
    Keep,
    /// The value is an object or a list of objects; apply this allow-list
    /// to each of them.
    Nested(RecordSanitizer),
}

/// Keeps only allow-listed fields of each record.
#[derive(Debug, Clone, Default)]
pub struct RecordSanitizer {
    allowed: HashMap<String, FieldRule>,
}

impl RecordSanitizer {
    /// Creates a sanitizer that keeps nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sanitizer keeping `fields` as-is.
    pub fn keep(fields: &[&str]) -> Self {
        fields.iter().fold(Self::new(), |s, f| s.field(f))
    }

    /// Allows a field.
    pub fn field(mut self, name: &str) -> Self {
        self.allowed.insert(name.to_string(), FieldRule::Keep);
        self
    }

    /// Allows a structured field filtered by its own allow-list.
    pub fn nested(mut self, name: &str, rules: RecordSanitizer) -> Self {
        self.allowed
            .insert(name.to_string(), FieldRule::Nested(rules));
        self
    }

    /// Returns true if `name` is allow-listed.
    pub fn allows(&self, name: &str) -> bool {
        !is_sensitive(name) && self.allowed.contains_key(name)
    }

    /// Filters a list of records. Entries that are not JSON objects are
    /// dropped.
    pub fn sanitize(&self, records: Vec<Value>) -> Vec<Value> {
        records
            .into_iter()
            .filter_map(|record| match record {
                Value::Object(map) => Some(Value::Object(self.sanitize_record(map))),
                _ => None,
            })
            .collect()
    }

    /// Filters one record.
    pub fn sanitize_record(&self, record: Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in record {
            if is_sensitive(&key) {
                continue;
            }
            match self.allowed.get(&key) {
                Some(FieldRule::Keep) => {
                    out.insert(key, scrub(value));
                }
                Some(FieldRule::Nested(rules)) => {
                    out.insert(key, rules.apply_nested(value));
                }
                None => {}
            }
        }
        out
    }

    fn apply_nested(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.sanitize_record(map)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(map) => Value::Object(self.sanitize_record(map)),
                        other => scrub(other),
                    })
                    .collect(),
            ),
            other => other,
        }
    }
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

/// Removes sensitive keys from every object inside `value`.
pub fn scrub(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !is_sensitive(k))
                .map(|(k, v)| (k, scrub(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(scrub).collect()),
        other => other,
    }
}
