//! Deterministic in-memory chain used by reader tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use rollups_primitives::{Buf20, Buf32, DefaultBlock};

use crate::error::{ChainClientError, ChainResult};
use crate::traits::ChainClient;
use crate::types::{ChainHeader, ClaimAcceptanceEvent, InputAddedEvent, OutputExecutedEvent};

/// Synthesizes a header for `number` with stable timestamp and prevRandao,
/// so tests can assert on the exact values the readers observed.
pub fn test_header(number: u64) -> ChainHeader {
    let mut randao = [0u8; 32];
    randao[24..].copy_from_slice(&number.to_be_bytes());
    ChainHeader {
        number,
        timestamp: 1_700_000_000 + 12 * number,
        prev_randao: Buf32::from(randao),
    }
}

#[derive(Default)]
struct TestChainState {
    headers: BTreeMap<u64, ChainHeader>,
    latest: u64,
    safe: u64,
    finalized: u64,
    inputs: Vec<InputAddedEvent>,
    claims: Vec<ClaimAcceptanceEvent>,
    outputs: Vec<OutputExecutedEvent>,
    consensus: HashMap<Buf20, Buf20>,
    epoch_lengths: HashMap<Buf20, u64>,
}

/// In-memory [`ChainClient`]. Headers not explicitly set are synthesized via
/// [`test_header`]. Announcing a head pushes it to every live subscription;
/// dropping the subscriptions models a websocket failure.
#[derive(Default)]
pub struct TestChainClient {
    state: Mutex<TestChainState>,
    subscribers: Mutex<Vec<mpsc::Sender<ChainHeader>>>,
}

impl TestChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latest(&self, number: u64) {
        self.state.lock().unwrap().latest = number;
    }

    pub fn set_safe(&self, number: u64) {
        self.state.lock().unwrap().safe = number;
    }

    pub fn set_finalized(&self, number: u64) {
        self.state.lock().unwrap().finalized = number;
    }

    pub fn put_header(&self, header: ChainHeader) {
        self.state.lock().unwrap().headers.insert(header.number, header);
    }

    pub fn set_consensus(&self, app: Buf20, consensus: Buf20) {
        self.state.lock().unwrap().consensus.insert(app, consensus);
    }

    pub fn set_epoch_length(&self, consensus: Buf20, length: u64) {
        self.state
            .lock()
            .unwrap()
            .epoch_lengths
            .insert(consensus, length);
    }

    pub fn add_input_event(&self, event: InputAddedEvent) {
        self.state.lock().unwrap().inputs.push(event);
    }

    pub fn add_claim_event(&self, event: ClaimAcceptanceEvent) {
        self.state.lock().unwrap().claims.push(event);
    }

    pub fn add_output_event(&self, event: OutputExecutedEvent) {
        self.state.lock().unwrap().outputs.push(event);
    }

    /// Advances the chain tip and notifies subscribers.
    pub async fn announce_head(&self, number: u64) {
        let header = {
            let mut state = self.state.lock().unwrap();
            state.latest = number;
            state
                .headers
                .get(&number)
                .cloned()
                .unwrap_or_else(|| test_header(number))
        };
        let subscribers = self.subscribers.lock().unwrap().clone();
        for tx in subscribers {
            let _ = tx.send(header.clone()).await;
        }
    }

    /// Closes every open subscription, as a lost websocket would.
    pub fn drop_subscriptions(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    fn header_at(&self, number: u64) -> ChainHeader {
        self.state
            .lock()
            .unwrap()
            .headers
            .get(&number)
            .cloned()
            .unwrap_or_else(|| test_header(number))
    }
}

#[async_trait]
impl ChainClient for TestChainClient {
    async fn header_by_tag(&self, tag: DefaultBlock) -> ChainResult<ChainHeader> {
        let number = {
            let state = self.state.lock().unwrap();
            match tag {
                DefaultBlock::Latest | DefaultBlock::Pending => state.latest,
                DefaultBlock::Safe => state.safe,
                DefaultBlock::Finalized => state.finalized,
            }
        };
        Ok(self.header_at(number))
    }

    async fn header_by_number(&self, number: u64) -> ChainResult<ChainHeader> {
        Ok(self.header_at(number))
    }

    async fn subscribe_heads(&self) -> ChainResult<mpsc::Receiver<ChainHeader>> {
        let (tx, rx) = mpsc::channel(16);
        self.subscribers.lock().unwrap().push(tx);
        Ok(rx)
    }

    async fn input_added_events(
        &self,
        from: u64,
        to: u64,
        apps: &[Buf20],
    ) -> ChainResult<Vec<InputAddedEvent>> {
        let state = self.state.lock().unwrap();
        let mut events: Vec<_> = state
            .inputs
            .iter()
            .filter(|e| e.block_number >= from && e.block_number <= to && apps.contains(&e.app))
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn claim_acceptance_events(
        &self,
        from: u64,
        to: u64,
        consensus: Buf20,
        apps: &[Buf20],
    ) -> ChainResult<Vec<ClaimAcceptanceEvent>> {
        let state = self.state.lock().unwrap();
        let _ = consensus;
        Ok(state
            .claims
            .iter()
            .filter(|e| e.block_number >= from && e.block_number <= to && apps.contains(&e.app))
            .cloned()
            .collect())
    }

    async fn output_executed_events(
        &self,
        from: u64,
        to: u64,
        app: Buf20,
    ) -> ChainResult<Vec<OutputExecutedEvent>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .outputs
            .iter()
            .filter(|e| e.block_number >= from && e.block_number <= to && e.app == app)
            .cloned()
            .collect())
    }

    async fn consensus_address(&self, app: Buf20) -> ChainResult<Buf20> {
        self.state
            .lock()
            .unwrap()
            .consensus
            .get(&app)
            .copied()
            .ok_or_else(|| ChainClientError::Rpc(format!("no consensus configured for {app}")))
    }

    async fn epoch_length(&self, consensus: Buf20) -> ChainResult<u64> {
        self.state
            .lock()
            .unwrap()
            .epoch_lengths
            .get(&consensus)
            .copied()
            .ok_or_else(|| {
                ChainClientError::Rpc(format!("no epoch length configured for {consensus}"))
            })
    }
}
