//! Declarative parser configuration, as written in collection files.
//!
//! ```yaml
//! parsers:
//!   - type: textfsm
//!     templates:
//!       # Tried in order; local overrides shadow the system copies.
//!       - my_fixed_show_ip_interface_brief.textfsm
//!       - cisco_ios_show_ip_interface_brief.textfsm
//!   - type: regex
//!     pattern: '^(?P<intf>\S+)\s+(?P<ipaddr>\S+)'
//!     flags: MULTILINE
//!     groups:
//!       interface: intf
//!       ip_address: 2
//! normalize:
//!   ip_address: ipaddr
//! ```

use crate::error::{ParseError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

/// One entry in a collection's ordered parser list.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParserSpec {
    Textfsm {
        templates: Vec<String>,
    },
    Ttp {
        templates: Vec<String>,
    },
    Regex {
        pattern: String,
        #[serde(default)]
        flags: String,
        /// Canonical field name → capture group (index or name). Empty means
        /// "use the pattern's named groups".
        #[serde(default)]
        groups: BTreeMap<String, GroupRef>,
    },
}

impl ParserSpec {
    /// The template filenames this spec references, for preflight.
    pub fn template_names(&self) -> &[String] {
        match self {
            ParserSpec::Textfsm { templates } | ParserSpec::Ttp { templates } => templates,
            ParserSpec::Regex { .. } => &[],
        }
    }
}

/// A capture group reference: positional index or named group.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GroupRef {
    Index(usize),
    Name(String),
}

/// On-disk normalize map: canonical field name → parser source field.
///
/// Stored canonical-first for readability ("where does this field come
/// from?"); the runtime direction is the inverse, built once at load.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct NormalizeMap(pub BTreeMap<String, String>);

impl NormalizeMap {
    /// Invert to the runtime `source → canonical` direction.
    ///
    /// Two canonical entries naming the same source field is a config
    /// error: the rename would be ambiguous.
    pub fn invert(&self) -> Result<BTreeMap<String, String>> {
        let mut remap = BTreeMap::new();
        for (canonical, source) in &self.0 {
            if remap
                .insert(source.clone(), canonical.clone())
                .is_some()
            {
                return Err(ParseError::DuplicateNormalizeSource {
                    field: source.clone(),
                });
            }
        }
        Ok(remap)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Field type coercion rules, loaded from a collection's `_schema.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type", default)]
    pub kind: FieldType,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Float,
    Bool,
    #[default]
    #[serde(alias = "str")]
    String,
}
