use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed `FieldSpec` or engine configuration. Never recovered locally.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// The embedding provider could not produce a query vector.
    #[error("Embedding failure: {0}")]
    Embedding(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self { Error::InvalidConfig(msg.into()) }

    pub fn index_unavailable<S: Into<String>>(msg: S) -> Self { Error::IndexUnavailable(msg.into()) }

    pub fn embedding<S: Into<String>>(msg: S) -> Self { Error::Embedding(msg.into()) }

    /// Errors a single retrieval channel may fail with without failing the call.
    pub fn is_channel_failure(&self) -> bool {
        matches!(self, Error::IndexUnavailable(_) | Error::Embedding(_) | Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_failures_exclude_config_errors() {
        assert!(Error::index_unavailable("down").is_channel_failure());
        assert!(Error::embedding("no vector").is_channel_failure());
        assert!(Error::Timeout("lexical".into()).is_channel_failure());
        assert!(!Error::invalid_config("final_top_k").is_channel_failure());
        assert!(!Error::Operation("cap".into()).is_channel_failure());
    }
}
