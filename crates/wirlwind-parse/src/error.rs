use std::path::PathBuf;

/// Errors raised by the parsing subsystem.
///
/// Most parse failures never surface as `Err`; a template that matches
/// nothing simply advances the chain. These variants cover the cases that
/// are real faults: unresolvable templates, unreadable files, bad patterns,
/// and invalid normalize maps.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Neither a local override nor the system directory has the template.
    #[error("Parse: template '{name}' not found (searched {searched:?})")]
    TemplateNotFound { name: String, searched: Vec<PathBuf> },

    /// The template file resolved but could not be read.
    #[error("Parse: template '{name}' unreadable: {source}")]
    TemplateRead {
        name: String,
        source: std::io::Error,
    },

    /// The inline regex pattern did not compile.
    #[error("Parse: regex compile error: {0}")]
    RegexCompile(#[from] regex::Error),

    /// A template engine raised while parsing.
    #[error("Parse: {engine} engine failure: {reason}")]
    Engine { engine: &'static str, reason: String },

    /// Two normalize entries claim the same source field.
    #[error("Parse: duplicate source field '{field}' in normalize map")]
    DuplicateNormalizeSource { field: String },
}

/// Convenience `Result` alias for parse operations.
pub type Result<T> = std::result::Result<T, ParseError>;
