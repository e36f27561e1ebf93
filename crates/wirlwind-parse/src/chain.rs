//! The ordered parser-fallback chain.
//!
//! Parsers run in the order the collection declares them; within a TextFSM
//! or TTP spec, templates run in declared order. The first attempt to yield
//! at least one row wins. Zero rows is a miss, not an error; an engine
//! exception aborts only that attempt. The chain itself never errors; the
//! worst case is [`ChainOutcome::AllFailed`] with a reason per attempt.

use crate::engine::{Capabilities, EngineSet, TemplateEngine};
use crate::normalize::{coerce_rows, lowercase_keys, normalize_rows};
use crate::resolver::TemplateResolver;
use crate::spec::{ParserSpec, Schema};
use crate::trace::ParseTrace;
use std::collections::BTreeMap;
use wirlwind_common::{ParserKind, Row};

/// One failed parser attempt, with its reason.
#[derive(Debug, Clone)]
pub struct FailedAttempt {
    pub parser: ParserKind,
    pub template: Option<String>,
    pub reason: String,
}

impl std::fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.template {
            Some(t) => write!(f, "{}/{}: {}", self.parser, t, self.reason),
            None => write!(f, "{}: {}", self.parser, self.reason),
        }
    }
}

/// Outcome of running a chain over one command's output.
#[derive(Debug)]
pub enum ChainOutcome {
    Success {
        parsed_by: ParserKind,
        template: Option<String>,
        rows: Vec<Row>,
    },
    AllFailed {
        attempts: Vec<FailedAttempt>,
    },
}

impl ChainOutcome {
    /// Human-readable failure detail, for error envelopes and logs.
    pub fn failure_detail(&self) -> String {
        match self {
            ChainOutcome::Success { .. } => String::new(),
            ChainOutcome::AllFailed { attempts } if attempts.is_empty() => {
                "no parsers defined".to_string()
            }
            ChainOutcome::AllFailed { attempts } => attempts
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

pub struct ParserChain {
    resolver: TemplateResolver,
    engines: EngineSet,
}

impl ParserChain {
    pub fn new(resolver: TemplateResolver, engines: EngineSet) -> Self {
        Self { resolver, engines }
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    /// Which backends this chain can actually use.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            textfsm: self.engines.textfsm().is_some(),
            ttp: self.engines.ttp().is_some(),
            regex: true,
            search_paths: self.resolver.search_paths(),
        }
    }

    /// Run the chain over sanitized output.
    ///
    /// On success the rows come back lowercased, normalized through `remap`
    /// and coerced against `schema`, ready for shaping.
    pub fn parse(
        &self,
        cleaned: &str,
        specs: &[ParserSpec],
        remap: &BTreeMap<String, String>,
        schema: Option<&Schema>,
        trace: &mut ParseTrace,
    ) -> ChainOutcome {
        let mut attempts = Vec::new();

        for spec in specs {
            let won = match spec {
                ParserSpec::Textfsm { templates } => self.try_templates(
                    ParserKind::Textfsm,
                    self.engines.textfsm(),
                    templates,
                    cleaned,
                    trace,
                    &mut attempts,
                ),
                ParserSpec::Ttp { templates } => {
                    if self.engines.ttp().is_none() {
                        // The TTP adapter is optional; absence skips the
                        // spec without an attempt record.
                        tracing::debug!("TTP engine absent, skipping parser spec");
                        continue;
                    }
                    self.try_templates(
                        ParserKind::Ttp,
                        self.engines.ttp(),
                        templates,
                        cleaned,
                        trace,
                        &mut attempts,
                    )
                }
                ParserSpec::Regex {
                    pattern,
                    flags,
                    groups,
                } => self.try_regex(pattern, flags, groups, cleaned, trace, &mut attempts),
            };

            if let Some((parsed_by, template, rows)) = won {
                let rows = normalize_rows(rows, remap, trace);
                let rows = match schema {
                    Some(schema) => coerce_rows(rows, schema, trace),
                    None => rows,
                };
                return ChainOutcome::Success {
                    parsed_by,
                    template,
                    rows,
                };
            }
        }

        ChainOutcome::AllFailed { attempts }
    }

    fn try_templates(
        &self,
        kind: ParserKind,
        engine: Option<&dyn TemplateEngine>,
        templates: &[String],
        cleaned: &str,
        trace: &mut ParseTrace,
        attempts: &mut Vec<FailedAttempt>,
    ) -> Option<(ParserKind, Option<String>, Vec<Row>)> {
        for name in templates {
            let resolved = match self.resolver.resolve(name) {
                Ok(resolved) => {
                    trace.template_resolved(
                        name,
                        Some(&resolved.path),
                        Some(resolved.tier.to_string()),
                    );
                    resolved
                }
                Err(_) => {
                    trace.template_resolved(name, None, None);
                    self.record_failure(
                        kind,
                        name,
                        None,
                        "template not found in search paths",
                        trace,
                        attempts,
                    );
                    continue;
                }
            };

            let Some(engine) = engine else {
                self.record_failure(
                    kind,
                    name,
                    Some(resolved.path.display().to_string()),
                    "engine unavailable",
                    trace,
                    attempts,
                );
                continue;
            };

            let source = match std::fs::read_to_string(&resolved.path) {
                Ok(source) => source,
                Err(e) => {
                    self.record_failure(
                        kind,
                        name,
                        Some(resolved.path.display().to_string()),
                        &format!("template unreadable: {e}"),
                        trace,
                        attempts,
                    );
                    continue;
                }
            };

            match engine.parse(&source, cleaned) {
                Ok(rows) if !rows.is_empty() => {
                    let rows = lowercase_keys(rows);
                    let fields: Vec<String> = rows[0].keys().cloned().collect();
                    trace.parser_tried(
                        kind,
                        name,
                        Some(resolved.path.display().to_string()),
                        true,
                        rows.len(),
                        None,
                        fields,
                    );
                    return Some((kind, Some(name.clone()), rows));
                }
                Ok(_) => {
                    self.record_failure(
                        kind,
                        name,
                        Some(resolved.path.display().to_string()),
                        "0 rows returned",
                        trace,
                        attempts,
                    );
                }
                Err(reason) => {
                    self.record_failure(
                        kind,
                        name,
                        Some(resolved.path.display().to_string()),
                        &reason,
                        trace,
                        attempts,
                    );
                }
            }
        }
        None
    }

    fn try_regex(
        &self,
        pattern: &str,
        flags: &str,
        groups: &BTreeMap<String, crate::spec::GroupRef>,
        cleaned: &str,
        trace: &mut ParseTrace,
        attempts: &mut Vec<FailedAttempt>,
    ) -> Option<(ParserKind, Option<String>, Vec<Row>)> {
        match crate::regex_parser::parse_regex(cleaned, pattern, flags, groups) {
            Ok(rows) if !rows.is_empty() => {
                let rows = lowercase_keys(rows);
                let fields: Vec<String> = rows[0].keys().cloned().collect();
                trace.parser_tried(
                    ParserKind::Regex,
                    "inline",
                    None,
                    true,
                    rows.len(),
                    None,
                    fields,
                );
                Some((ParserKind::Regex, None, rows))
            }
            Ok(_) => {
                self.record_regex_failure("0 matches for pattern", trace, attempts);
                None
            }
            Err(e) => {
                self.record_regex_failure(&e.to_string(), trace, attempts);
                None
            }
        }
    }

    fn record_failure(
        &self,
        kind: ParserKind,
        template: &str,
        resolved_path: Option<String>,
        reason: &str,
        trace: &mut ParseTrace,
        attempts: &mut Vec<FailedAttempt>,
    ) {
        trace.parser_tried(
            kind,
            template,
            resolved_path,
            false,
            0,
            Some(reason.to_string()),
            Vec::new(),
        );
        attempts.push(FailedAttempt {
            parser: kind,
            template: Some(template.to_string()),
            reason: reason.to_string(),
        });
    }

    fn record_regex_failure(
        &self,
        reason: &str,
        trace: &mut ParseTrace,
        attempts: &mut Vec<FailedAttempt>,
    ) {
        trace.parser_tried(
            ParserKind::Regex,
            "inline",
            None,
            false,
            0,
            Some(reason.to_string()),
            Vec::new(),
        );
        attempts.push(FailedAttempt {
            parser: ParserKind::Regex,
            template: None,
            reason: reason.to_string(),
        });
    }
}
