use rollups_primitives::{Buf20, Buf32};

/// The slice of an L1 block header the node cares about.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainHeader {
    pub number: u64,
    pub timestamp: u64,
    /// The header's mix digest, used as prevRandao in advance payloads.
    pub prev_randao: Buf32,
}

/// A decoded `InputAdded` log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InputAddedEvent {
    pub app: Buf20,
    /// Index the input box assigned on-chain.
    pub index: u64,
    pub payload: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
}

/// A decoded `ClaimAcceptance` log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClaimAcceptanceEvent {
    pub app: Buf20,
    pub last_processed_block: u64,
    pub claim: Buf32,
    pub block_number: u64,
}

/// A decoded `OutputExecuted` log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputExecutedEvent {
    pub app: Buf20,
    pub output_index: u64,
    pub raw_output: Vec<u8>,
    pub transaction_hash: Buf32,
    pub block_number: u64,
}
