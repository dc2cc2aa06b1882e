use thiserror::Error;

use rollups_chainio::ChainClientError;
use rollups_db::DbError;
use rollups_primitives::Buf20;

#[derive(Debug, Error)]
pub enum EvmReaderError {
    /// The new-heads subscription died; the run loop re-subscribes on this
    /// and only this.
    #[error("subscription error: {0}")]
    Subscription(String),

    #[error(transparent)]
    Chain(#[from] ChainClientError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("consensus addresses do not match, deployed {deployed}, configured {configured}")]
    ConsensusMismatch { deployed: Buf20, configured: Buf20 },
}
