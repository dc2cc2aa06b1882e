use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use rollups_primitives::{Epoch, Input};

/// One epoch together with the inputs to insert into it, as submitted to
/// [`crate::traits::Repository::store_epoch_and_inputs`].
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct EpochWithInputs {
    pub epoch: Epoch,
    pub inputs: Vec<Input>,
}

impl EpochWithInputs {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            inputs: Vec::new(),
        }
    }
}
