use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZipfluxError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("query execution failed: {0}")]
    QueryExecution(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ZipfluxError>;
