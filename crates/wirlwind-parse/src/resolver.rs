//! Template filename → filesystem path resolution.
//!
//! Local override directories are searched before the system template
//! directory, so a fixed copy of a broken system template dropped into
//! `templates/textfsm/` shadows it automatically. Resolutions are cached;
//! template changes on disk require a restart.

use crate::error::{ParseError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Which search tier satisfied a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    Local,
    System,
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionTier::Local => write!(f, "local"),
            ResolutionTier::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub path: PathBuf,
    pub tier: ResolutionTier,
}

pub struct TemplateResolver {
    local_dirs: Vec<PathBuf>,
    system_dirs: Vec<PathBuf>,
    cache: Mutex<HashMap<String, Option<ResolvedTemplate>>>,
}

impl TemplateResolver {
    /// Build a resolver. Directories that do not exist are kept out of the
    /// search set but remembered for error messages.
    pub fn new(
        local_dirs: impl IntoIterator<Item = PathBuf>,
        system_dirs: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        let local_dirs: Vec<PathBuf> = local_dirs.into_iter().collect();
        let system_dirs: Vec<PathBuf> = system_dirs.into_iter().collect();
        for dir in local_dirs.iter().chain(&system_dirs) {
            if !dir.is_dir() {
                tracing::debug!(path = %dir.display(), "Template search path not found");
            }
        }
        Self {
            local_dirs,
            system_dirs,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// All configured search paths, priority order.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.local_dirs
            .iter()
            .chain(&self.system_dirs)
            .cloned()
            .collect()
    }

    /// Find a template by filename.
    ///
    /// Local directories are checked with a direct join; the system tier is
    /// also walked recursively because system template packages may nest by
    /// platform.
    pub fn resolve(&self, name: &str) -> Result<ResolvedTemplate> {
        if let Some(cached) = self.cache.lock().expect("resolver cache poisoned").get(name) {
            return cached.clone().ok_or_else(|| self.not_found(name));
        }

        let found = self.resolve_uncached(name);
        self.cache
            .lock()
            .expect("resolver cache poisoned")
            .insert(name.to_string(), found.clone());
        found.ok_or_else(|| self.not_found(name))
    }

    fn resolve_uncached(&self, name: &str) -> Option<ResolvedTemplate> {
        for dir in &self.local_dirs {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(ResolvedTemplate {
                    path: candidate,
                    tier: ResolutionTier::Local,
                });
            }
        }
        for dir in &self.system_dirs {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(ResolvedTemplate {
                    path: candidate,
                    tier: ResolutionTier::System,
                });
            }
            if let Some(path) = find_in_tree(dir, name) {
                return Some(ResolvedTemplate {
                    path,
                    tier: ResolutionTier::System,
                });
            }
        }
        None
    }

    fn not_found(&self, name: &str) -> ParseError {
        ParseError::TemplateNotFound {
            name: name.to_string(),
            searched: self.search_paths(),
        }
    }
}

/// Depth-first search for a filename under `base`.
fn find_in_tree(base: &Path, name: &str) -> Option<PathBuf> {
    let mut stack = vec![base.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.file_name().is_some_and(|f| f == name) {
                return Some(path);
            }
        }
    }
    None
}
