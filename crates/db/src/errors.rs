use rockbound::CodecError;
use thiserror::Error;

/// Simple result type used across the database interface.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// A status-gated update matched zero rows. Callers treat this as a
    /// concurrency loss and re-read.
    #[error("update did not take effect")]
    NoUpdate,

    #[error("tried to insert into {0} out-of-order index {1}")]
    OooInsert(&'static str, u64),

    #[error("unknown application {0}")]
    UnknownApplication(String),

    #[error("db worker dropped the response channel")]
    WorkerFailedStrangely,

    #[error("rocksdb: {0}")]
    Rocksdb(#[from] rockbound::rocksdb::Error),

    #[error("codec: {0}")]
    CodecError(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for DbError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}

impl From<CodecError> for DbError {
    fn from(value: CodecError) -> Self {
        Self::CodecError(value.to_string())
    }
}
