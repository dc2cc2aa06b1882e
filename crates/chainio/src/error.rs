use thiserror::Error;

pub type ChainResult<T> = Result<T, ChainClientError>;

#[derive(Debug, Error)]
pub enum ChainClientError {
    #[error("rpc: {0}")]
    Rpc(String),

    #[error("invalid endpoint url: {0}")]
    Url(String),

    #[error("could not decode log or call return: {0}")]
    Decode(String),

    #[error("block {0} not found")]
    MissingBlock(u64),

    #[error("new-heads subscription could not be established: {0}")]
    Subscribe(String),
}

impl ChainClientError {
    pub(crate) fn rpc(err: impl std::fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }

    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}
