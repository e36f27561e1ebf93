//! Pluggable template engines.
//!
//! The chain only knows this trait; concrete TextFSM/TTP implementations
//! are supplied by the embedding application. Either backend may be absent.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use wirlwind_common::Row;

/// A template-driven parser backend.
///
/// `parse` receives the template source text and the sanitized command
/// output. Returning an empty row list means "the template ran but matched
/// nothing"; the chain treats that as a miss, not an error. Key casing is
/// the engine's business; the chain lowercases afterwards.
pub trait TemplateEngine: Send + Sync {
    fn parse(&self, template_source: &str, input: &str) -> std::result::Result<Vec<Row>, String>;
}

/// The set of engines available to a chain. Cheap to clone.
#[derive(Clone, Default)]
pub struct EngineSet {
    textfsm: Option<Arc<dyn TemplateEngine>>,
    ttp: Option<Arc<dyn TemplateEngine>>,
}

impl EngineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_textfsm(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.textfsm = Some(engine);
        self
    }

    pub fn with_ttp(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.ttp = Some(engine);
        self
    }

    pub fn textfsm(&self) -> Option<&dyn TemplateEngine> {
        self.textfsm.as_deref()
    }

    pub fn ttp(&self) -> Option<&dyn TemplateEngine> {
        self.ttp.as_deref()
    }
}

/// Which parser backends a chain can actually use, plus where it looks for
/// templates. Logged at startup and printed by preflight.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub textfsm: bool,
    pub ttp: bool,
    pub regex: bool,
    pub search_paths: Vec<PathBuf>,
}
