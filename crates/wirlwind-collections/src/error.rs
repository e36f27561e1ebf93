use std::path::PathBuf;

/// Errors raised while loading collection definitions. All of these are
/// fatal at startup: a session never begins with a broken config tree.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The collections directory itself is missing or unreadable.
    #[error("Config: collections directory unreadable: {path}: {source}")]
    DirUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A collection file exists but could not be read.
    #[error("Config: {path}: {source}")]
    FileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A collection or schema file is not valid YAML for its model.
    #[error("Config: {path}: {source}")]
    InvalidYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// The file parsed but violates a semantic rule (empty command,
    /// duplicate normalize source, empty parser list).
    #[error("Config: {collection}/{vendor}: {reason}")]
    Invalid {
        collection: String,
        vendor: String,
        reason: String,
    },

    /// No collection file for the vendor, even after fallback.
    #[error("Config: no definitions found for vendor '{vendor}' under {path}")]
    NoCollections { vendor: String, path: PathBuf },
}

/// Convenience `Result` alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
