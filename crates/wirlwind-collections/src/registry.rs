//! Loads the collection tree for one vendor.
//!
//! ```text
//! collections/
//! ├── cpu/
//! │   ├── _schema.yaml
//! │   ├── cisco_ios.yaml
//! │   └── arista_eos.yaml
//! └── interfaces/
//!     └── cisco_ios.yaml
//! ```
//!
//! Lookup tries `<vendor>.yaml` first, then strips one trailing
//! `_segment` and retries once (`cisco_ios_xe` → `cisco_ios`). Collections
//! with no file for the vendor are skipped. Loading happens once at session
//! start; the result is immutable.

use crate::config::{default_interval, CollectionConfig, CollectionFile, DEFAULT_HISTORY_CAPACITY};
use crate::error::{ConfigError, Result};
use crate::shape::Shape;
use std::path::{Path, PathBuf};
use wirlwind_common::vendor::lookup_order;
use wirlwind_parse::Schema;

#[derive(Debug)]
pub struct CollectionRegistry {
    vendor: String,
    collections: Vec<CollectionConfig>,
}

impl CollectionRegistry {
    /// Load every collection defined for `vendor` under `dir`.
    ///
    /// Definition order is sorted directory order; the poll engine fires
    /// collections in this order within a cycle.
    pub fn load(dir: &Path, vendor: &str) -> Result<Self> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| ConfigError::DirUnreadable {
                path: dir.to_path_buf(),
                source: e,
            })?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && !p
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with('_'))
            })
            .collect();
        entries.sort();

        let mut collections = Vec::new();
        for coll_dir in entries {
            let name = coll_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            let Some((file_vendor, path)) = find_vendor_file(&coll_dir, vendor) else {
                tracing::debug!(collection = %name, vendor, "No collection file for vendor");
                continue;
            };

            let config = load_collection(&name, &file_vendor, &path, &coll_dir)?;
            collections.push(config);
        }

        if collections.is_empty() {
            return Err(ConfigError::NoCollections {
                vendor: vendor.to_string(),
                path: dir.to_path_buf(),
            });
        }

        tracing::info!(
            vendor,
            collections = ?collections.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "Collection definitions loaded"
        );

        Ok(Self {
            vendor: vendor.to_string(),
            collections,
        })
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// Collections in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &CollectionConfig> {
        self.collections.iter()
    }

    pub fn get(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.collections.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

/// `<vendor>.yaml`, falling back at most once to the base vendor.
fn find_vendor_file(coll_dir: &Path, vendor: &str) -> Option<(String, PathBuf)> {
    for candidate in lookup_order(vendor) {
        let path = coll_dir.join(format!("{candidate}.yaml"));
        if path.is_file() {
            return Some((candidate.to_string(), path));
        }
    }
    None
}

fn load_collection(
    name: &str,
    vendor: &str,
    path: &Path,
    coll_dir: &Path,
) -> Result<CollectionConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::FileUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file: CollectionFile =
        serde_yaml::from_str(&text).map_err(|e| ConfigError::InvalidYaml {
            path: path.to_path_buf(),
            source: e,
        })?;

    let invalid = |reason: &str| ConfigError::Invalid {
        collection: name.to_string(),
        vendor: vendor.to_string(),
        reason: reason.to_string(),
    };

    if file.command.trim().is_empty() {
        return Err(invalid("command is empty"));
    }
    if file.parsers.is_empty() {
        return Err(invalid("no parsers defined"));
    }

    let remap = file
        .normalize
        .invert()
        .map_err(|e| invalid(&e.to_string()))?;

    let schema = load_schema(coll_dir)?;
    if schema.is_none() {
        tracing::debug!(collection = name, "No _schema.yaml, skipping type coercion");
    }

    Ok(CollectionConfig {
        name: name.to_string(),
        vendor: vendor.to_string(),
        command: file.command,
        interval_seconds: file.interval.unwrap_or_else(|| default_interval(name)),
        parsers: file.parsers,
        remap,
        schema,
        shape: Shape::for_collection(name),
        history_capacity: file
            .history
            .map(|h| h.capacity)
            .unwrap_or(DEFAULT_HISTORY_CAPACITY),
    })
}

fn load_schema(coll_dir: &Path) -> Result<Option<Schema>> {
    let path = coll_dir.join("_schema.yaml");
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileUnreadable {
        path: path.clone(),
        source: e,
    })?;
    let schema: Schema = serde_yaml::from_str(&text).map_err(|e| ConfigError::InvalidYaml {
        path,
        source: e,
    })?;
    Ok(Some(schema))
}
