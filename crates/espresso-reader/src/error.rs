use thiserror::Error;

use rollups_db::DbError;
use rollups_evm_reader::EvmReaderError;

use crate::client::EspressoClientError;

#[derive(Debug, Error)]
pub enum EspressoReaderError {
    #[error(transparent)]
    Client(#[from] EspressoClientError),

    #[error(transparent)]
    Evm(#[from] EvmReaderError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl EspressoReaderError {
    /// Database failures are irrecoverable; everything else is retried by
    /// the loop without advancing the cursor.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Db(_) | Self::Evm(EvmReaderError::Db(_))
        )
    }
}
