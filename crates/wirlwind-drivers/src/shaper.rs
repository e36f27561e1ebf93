//! Rows → envelope.
//!
//! The uniform transform between the parser chain's row list and the
//! published envelope. Vendor differences do not belong here; drivers
//! adjust fields afterwards in `post_process`.

use serde_json::Value;
use wirlwind_collections::Shape;
use wirlwind_common::{Envelope, Row};

/// Shape a row list into the collection's envelope.
///
/// Empty rows produce `{}` for flat shapes and `{<key>: []}` for list
/// shapes. For `cpu`, the first row hoists to the top level and any
/// remaining rows attach under `processes`. Other flat collections discard
/// rows past the first.
pub fn shape_rows(shape: &Shape, rows: Vec<Row>) -> Envelope {
    match shape {
        Shape::Flat => match rows.into_iter().next() {
            Some(first) => Value::Object(first),
            None => Value::Object(Default::default()),
        },
        Shape::CpuHoist => {
            let mut iter = rows.into_iter();
            let Some(first) = iter.next() else {
                return Value::Object(Default::default());
            };
            let mut envelope = first;
            let rest: Vec<Value> = iter.map(Value::Object).collect();
            if !rest.is_empty() {
                envelope.insert("processes".to_string(), Value::Array(rest));
            }
            Value::Object(envelope)
        }
        Shape::ListUnder(key) => {
            let list: Vec<Value> = rows.into_iter().map(Value::Object).collect();
            let mut envelope = serde_json::Map::new();
            envelope.insert(key.to_string(), Value::Array(list));
            Value::Object(envelope)
        }
    }
}
