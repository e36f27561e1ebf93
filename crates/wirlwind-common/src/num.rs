//! Lenient numeric coercion for device CLI values.
//!
//! Device output mixes bare numbers, `"1,234"` thousands grouping and
//! `"87%"` suffixes; parser output may already be a JSON number after schema
//! coercion. These helpers accept all of those and give up quietly.

use crate::types::Row;
use serde_json::Value;

/// Coerce a JSON value to f64, tolerating comma grouping and a `%` suffix.
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = s.trim().replace(',', "").replace('%', "");
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse().ok()
        }
        _ => None,
    }
}

/// Coerce a JSON value to i64, truncating fractional input.
pub fn to_i64(value: &Value) -> Option<i64> {
    to_f64(value).map(|f| f as i64)
}

/// First key in `keys` whose value coerces to a number.
pub fn first_numeric(row: &Row, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|k| row.get(*k))
        .find_map(to_f64)
}
