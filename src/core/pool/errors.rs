use thiserror::Error;

/// Fatal construction failures. Selection-time exhaustion is not an error and
/// is reported as `None` by `ProxyPool::random_proxy`.
#[derive(Error, Debug)]
pub enum PoolError {
    /// Unreadable source path, malformed line, unparsable address/CIDR, or a
    /// server/subnet family mismatch.
    #[error("configuration error: {0}")]
    Config(String),

    /// Live egress check failed after exhausting retries.
    #[error("validation error: {0}")]
    Validation(String),

    /// A directory-service collaborator failed to list its addresses.
    #[error("external source {name}: {message}")]
    ExternalSource { name: String, message: String },
}

impl PoolError {
    pub fn config(msg: impl Into<String>) -> Self {
        PoolError::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        PoolError::Validation(msg.into())
    }

    pub fn external(name: impl Into<String>, message: impl Into<String>) -> Self {
        PoolError::ExternalSource {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Error category label for logging.
    pub fn category(&self) -> &'static str {
        match self {
            PoolError::Config(_) => "config",
            PoolError::Validation(_) => "validation",
            PoolError::ExternalSource { .. } => "external-source",
        }
    }
}
