//! Inline regex parser.
//!
//! The always-available last resort in a parser chain: a pattern from the
//! collection file, applied with declared flags, one row per match.

use crate::error::Result;
use crate::spec::GroupRef;
use regex::RegexBuilder;
use serde_json::Value;
use std::collections::BTreeMap;
use wirlwind_common::Row;

/// Apply an inline regex spec to sanitized output.
///
/// Row fields come from the `groups` map when present (canonical name →
/// index or named group); otherwise from the pattern's own named groups;
/// otherwise positional `field_1..field_n`. Zero matches yields an empty
/// row list, which the chain treats as a miss.
pub fn parse_regex(
    input: &str,
    pattern: &str,
    flags: &str,
    groups: &BTreeMap<String, GroupRef>,
) -> Result<Vec<Row>> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags
        .split(|c| c == ',' || c == '|' || c == ' ')
        .map(str::trim)
        .filter(|f| !f.is_empty())
    {
        match flag.to_ascii_uppercase().as_str() {
            "MULTILINE" => {
                builder.multi_line(true);
            }
            "DOTALL" => {
                builder.dot_matches_new_line(true);
            }
            "IGNORECASE" => {
                builder.case_insensitive(true);
            }
            other => {
                tracing::debug!(flag = other, "Ignoring unknown regex flag");
            }
        }
    }
    let re = builder.build()?;

    let names: Vec<&str> = re.capture_names().flatten().collect();
    let mut rows = Vec::new();

    for caps in re.captures_iter(input) {
        let mut row = Row::new();
        if !groups.is_empty() {
            for (field, group) in groups {
                let text = match group {
                    GroupRef::Index(i) => caps.get(*i).map(|m| m.as_str()),
                    GroupRef::Name(n) => caps.name(n).map(|m| m.as_str()),
                };
                row.insert(
                    field.clone(),
                    text.map_or(Value::Null, |t| Value::String(t.to_string())),
                );
            }
        } else if !names.is_empty() {
            for name in &names {
                if let Some(m) = caps.name(name) {
                    row.insert(name.to_string(), Value::String(m.as_str().to_string()));
                }
            }
        } else {
            for (i, group) in caps.iter().enumerate().skip(1) {
                if let Some(m) = group {
                    row.insert(format!("field_{i}"), Value::String(m.as_str().to_string()));
                }
            }
        }
        rows.push(row);
    }

    Ok(rows)
}
