//! Domain entities shared across the node: applications, epochs, inputs and
//! the outputs/reports the machines produce from them.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::buf::{Buf20, Buf32};

/// A registered rollup application. Written once at registration, read-only
/// to the readers except for the `last_processed_block` cursor.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Application {
    pub contract_address: Buf20,
    pub consensus_address: Buf20,
    pub template_hash: Buf32,
    /// Highest L1 block folded into this application's epoch/input state.
    pub last_processed_block: u64,
    pub enabled: bool,
}

#[derive(
    Copy, Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum EpochStatus {
    Open,
    Closed,
    ClaimComputed,
    ClaimSubmitted,
    ClaimAccepted,
}

/// A contiguous window of L1 blocks over which inputs are grouped and a
/// single claim is eventually produced.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Epoch {
    pub index: u64,
    pub first_block: u64,
    pub last_block: u64,
    pub claim_hash: Option<Buf32>,
    pub transaction_hash: Option<Buf32>,
    pub status: EpochStatus,
}

impl Epoch {
    /// A fresh open epoch at `index`. First and last block follow directly
    /// from the index and the consensus epoch length.
    pub fn open_at(index: u64, epoch_length: u64) -> Self {
        Self {
            index,
            first_block: index * epoch_length,
            last_block: index * epoch_length + epoch_length - 1,
            claim_hash: None,
            transaction_hash: None,
            status: EpochStatus::Open,
        }
    }

    pub fn contains_block(&self, block: u64) -> bool {
        self.first_block <= block && block <= self.last_block
    }
}

/// Epoch index a given L1 block belongs to.
pub fn epoch_index(epoch_length: u64, block: u64) -> u64 {
    block / epoch_length
}

#[derive(
    Copy, Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum InputCompletionStatus {
    None,
    Accepted,
    Rejected,
    Exception,
    MachineHalted,
    CycleLimitExceeded,
    TimeLimitExceeded,
    PayloadLengthLimitExceeded,
}

/// A user-submitted payload, from either the L1 input box or the external
/// sequencer. Immutable after insertion except for the completion status the
/// machine writes back.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Input {
    pub index: u64,
    pub block_number: u64,
    /// ABI-encoded `EvmAdvance` blob handed to the machine.
    pub raw_data: Vec<u8>,
    pub status: InputCompletionStatus,
    /// External-sequencer transaction digest, when the input came from there.
    pub transaction_id: Option<Buf32>,
}

#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Output {
    pub index: u64,
    pub input_index: u64,
    pub raw_data: Vec<u8>,
    /// Hash of the L1 transaction that executed this output, once executed.
    pub execution_transaction_hash: Option<Buf32>,
}

#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Report {
    pub index: u64,
    pub input_index: u64,
    pub raw_data: Vec<u8>,
}

/// Which chain head the EVM reader treats as committed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultBlock {
    Latest,
    Safe,
    #[default]
    Finalized,
    Pending,
}
