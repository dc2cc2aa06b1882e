use async_trait::async_trait;
use tokio::sync::mpsc;

use rollups_primitives::{Buf20, DefaultBlock};

use crate::error::ChainResult;
use crate::types::{ChainHeader, ClaimAcceptanceEvent, InputAddedEvent, OutputExecutedEvent};

/// Capability surface the readers need from the base chain.
///
/// The live implementation speaks JSON-RPC over HTTP and WS; tests inject an
/// in-memory chain. The adapter's only policy is translating a
/// [`DefaultBlock`] tag into a block number at the moment of the query.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Header of the head selected by `tag`, resolved now.
    async fn header_by_tag(&self, tag: DefaultBlock) -> ChainResult<ChainHeader>;

    async fn header_by_number(&self, number: u64) -> ChainResult<ChainHeader>;

    /// Subscribes to new heads. The returned channel closing signals
    /// subscription loss; callers re-subscribe by calling this again.
    async fn subscribe_heads(&self) -> ChainResult<mpsc::Receiver<ChainHeader>>;

    /// `InputAdded` events for `apps` in the inclusive block range, ordered
    /// by (block number, log index).
    async fn input_added_events(
        &self,
        from: u64,
        to: u64,
        apps: &[Buf20],
    ) -> ChainResult<Vec<InputAddedEvent>>;

    /// `ClaimAcceptance` events emitted by `consensus` for `apps`.
    async fn claim_acceptance_events(
        &self,
        from: u64,
        to: u64,
        consensus: Buf20,
        apps: &[Buf20],
    ) -> ChainResult<Vec<ClaimAcceptanceEvent>>;

    /// `OutputExecuted` events emitted by the application contract.
    async fn output_executed_events(
        &self,
        from: u64,
        to: u64,
        app: Buf20,
    ) -> ChainResult<Vec<OutputExecutedEvent>>;

    /// The consensus contract the application points at on-chain.
    async fn consensus_address(&self, app: Buf20) -> ChainResult<Buf20>;

    /// Epoch length configured on the consensus contract.
    async fn epoch_length(&self, consensus: Buf20) -> ChainResult<u64>;
}
