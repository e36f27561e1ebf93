//! Field renaming and schema type coercion.
//!
//! Both run row-by-row after a parser succeeds. Renames apply the inverted
//! normalize map (`source → canonical`); unmapped fields pass through.
//! Coercion failures are warnings; the value stays a string.

use crate::spec::{FieldType, Schema};
use crate::trace::ParseTrace;
use serde_json::Value;
use std::collections::BTreeMap;
use wirlwind_common::Row;

/// Lowercase every key of every row. Parsers emit engine-native casing
/// (TextFSM values are conventionally uppercase); everything downstream
/// assumes lowercase.
pub fn lowercase_keys(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect()
        })
        .collect()
}

/// Rename row fields through the inverted normalize map.
pub fn normalize_rows(
    rows: Vec<Row>,
    remap: &BTreeMap<String, String>,
    trace: &mut ParseTrace,
) -> Vec<Row> {
    if remap.is_empty() || rows.is_empty() {
        return rows;
    }

    let before: Vec<String> = rows[0].keys().cloned().collect();
    let renamed: Vec<Row> = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(k, v)| {
                    let key = remap.get(&k).cloned().unwrap_or(k);
                    (key, v)
                })
                .collect()
        })
        .collect();
    let after: Vec<String> = renamed[0].keys().cloned().collect();
    trace.normalized(before, after);

    renamed
}

/// Coerce string values to the types the schema declares.
///
/// A value that refuses to parse keeps its string form; one bad row never
/// affects the others.
pub fn coerce_rows(rows: Vec<Row>, schema: &Schema, trace: &mut ParseTrace) -> Vec<Row> {
    if schema.fields.is_empty() || rows.is_empty() {
        return rows;
    }

    let mut changes: BTreeMap<String, String> = BTreeMap::new();
    let coerced = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(key, value)| {
                    let Some(spec) = schema.fields.get(&key) else {
                        return (key, value);
                    };
                    match coerce_value(&value, spec.kind) {
                        Some(new_value) => {
                            if new_value != value {
                                changes
                                    .entry(key.clone())
                                    .or_insert_with(|| format!("str→{:?}", spec.kind).to_lowercase());
                            }
                            (key, new_value)
                        }
                        None => {
                            tracing::warn!(
                                field = %key,
                                value = %value,
                                target = ?spec.kind,
                                "Schema coercion failed, keeping string value"
                            );
                            (key, value)
                        }
                    }
                })
                .collect()
        })
        .collect();

    if !changes.is_empty() {
        trace.coerced(changes);
    }
    coerced
}

fn coerce_value(value: &Value, target: FieldType) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match target {
        FieldType::Int => {
            let f = wirlwind_common::num::to_f64(value)?;
            Some(Value::from(f as i64))
        }
        FieldType::Float => {
            let f = wirlwind_common::num::to_f64(value)?;
            serde_json::Number::from_f64(f).map(Value::Number)
        }
        FieldType::Bool => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) => Some(Value::Bool(matches!(
                s.trim().to_lowercase().as_str(),
                "true" | "1" | "yes"
            ))),
            Value::Number(n) => Some(Value::Bool(n.as_f64() != Some(0.0))),
            _ => None,
        },
        FieldType::String => match value {
            Value::String(_) => Some(value.clone()),
            other => Some(Value::String(other.to_string())),
        },
    }
}
