//! Parser-fallback machinery for CLI command output.
//!
//! TextFSM → TTP → regex, tried in the order a collection declares. The
//! first parser that yields rows wins, and every attempt (template
//! resolution, engine invocation, failure reason) is recorded in a
//! structured [`trace::ParseTrace`].
//!
//! The TextFSM and TTP engines themselves are external: they plug in behind
//! the [`engine::TemplateEngine`] trait through an [`engine::EngineSet`].
//! An absent engine degrades gracefully (TTP specs are skipped, TextFSM
//! attempts record the unavailability), the same way the original stack
//! degraded when a parser package was not installed.

pub mod chain;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod regex_parser;
pub mod resolver;
pub mod sanitize;
pub mod spec;
pub mod trace;

pub use chain::{ChainOutcome, FailedAttempt, ParserChain};
pub use engine::{Capabilities, EngineSet, TemplateEngine};
pub use error::{ParseError, Result};
pub use resolver::{ResolutionTier, ResolvedTemplate, TemplateResolver};
pub use sanitize::sanitize_cli_output;
pub use spec::{FieldType, GroupRef, NormalizeMap, ParserSpec, Schema};
pub use trace::{ParseTrace, TraceRecord, TraceStore};
