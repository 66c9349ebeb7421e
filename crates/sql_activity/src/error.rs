use thiserror::Error;

pub type Result<T> = std::result::Result<T, SqlActivityError>;

#[derive(Debug, Error)]
pub enum SqlActivityError {
    #[error("invalid report format {format:?}: {reason}")]
    InvalidFormat { format: String, reason: String },
    #[error("unknown query type: {0}")]
    UnknownQueryType(String),
    #[error("unknown persistence framework: {0}")]
    UnknownFramework(String),
    #[error("failed to decode execution on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
