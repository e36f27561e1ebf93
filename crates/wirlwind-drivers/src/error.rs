/// Errors raised by the driver framework.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Two drivers claimed the same vendor id. Fatal at startup.
    #[error("Driver: vendor id '{0}' registered twice")]
    DuplicateVendor(String),

    /// A post-process transform failed. The engine converts this into an
    /// error envelope for the collection.
    #[error("Driver: post-process failed for '{collection}': {reason}")]
    PostProcess { collection: String, reason: String },
}

impl DriverError {
    pub fn post_process(collection: &str, reason: impl Into<String>) -> Self {
        DriverError::PostProcess {
            collection: collection.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience `Result` alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
