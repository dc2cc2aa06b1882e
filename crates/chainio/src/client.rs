use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy_rpc_types::{Filter, TransactionInput, TransactionRequest};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::*;

use rollups_primitives::{Buf20, DefaultBlock};

use crate::error::{ChainClientError, ChainResult};
use crate::events::{
    getConsensusCall, getEpochLengthCall, ClaimAcceptance, InputAdded, OutputExecuted,
};
use crate::traits::ChainClient;
use crate::types::{ChainHeader, ClaimAcceptanceEvent, InputAddedEvent, OutputExecutedEvent};

const HEADS_CHANNEL_CAPACITY: usize = 64;

/// Live chain adapter over an HTTP provider (queries) and a WS provider
/// (new-heads subscription).
pub struct EthChainClient {
    http: DynProvider,
    ws: DynProvider,
    input_box: Buf20,
}

impl EthChainClient {
    pub async fn new(http_url: &str, ws_url: &str, input_box: Buf20) -> ChainResult<Self> {
        let http_url = http_url
            .parse()
            .map_err(|e| ChainClientError::Url(format!("{http_url}: {e}")))?;
        let http = ProviderBuilder::new().connect_http(http_url).erased();

        let ws = ProviderBuilder::new()
            .connect_ws(WsConnect::new(ws_url))
            .await
            .map_err(|e| ChainClientError::Url(format!("{ws_url}: {e}")))?
            .erased();

        Ok(Self {
            http,
            ws,
            input_box,
        })
    }

    async fn header(&self, tag: BlockNumberOrTag) -> ChainResult<ChainHeader> {
        let block = self
            .http
            .get_block_by_number(tag)
            .await
            .map_err(ChainClientError::rpc)?
            .ok_or(ChainClientError::MissingBlock(tag.as_number().unwrap_or(0)))?;
        Ok(ChainHeader {
            number: block.header.number,
            timestamp: block.header.timestamp,
            prev_randao: block.header.mix_hash.into(),
        })
    }

    async fn eth_call(&self, to: Buf20, data: Vec<u8>) -> ChainResult<Bytes> {
        let req = TransactionRequest {
            to: Some(TxKind::Call(Address::from(to))),
            input: TransactionInput::new(Bytes::from(data)),
            ..Default::default()
        };
        self.http.call(req).await.map_err(ChainClientError::rpc)
    }

    fn app_topics(apps: &[Buf20]) -> Vec<B256> {
        apps.iter()
            .map(|a| Address::from(*a).into_word())
            .collect()
    }
}

#[async_trait]
impl ChainClient for EthChainClient {
    async fn header_by_tag(&self, tag: DefaultBlock) -> ChainResult<ChainHeader> {
        let tag = match tag {
            DefaultBlock::Latest => BlockNumberOrTag::Latest,
            DefaultBlock::Safe => BlockNumberOrTag::Safe,
            DefaultBlock::Finalized => BlockNumberOrTag::Finalized,
            DefaultBlock::Pending => BlockNumberOrTag::Pending,
        };
        self.header(tag).await
    }

    async fn header_by_number(&self, number: u64) -> ChainResult<ChainHeader> {
        self.header(BlockNumberOrTag::Number(number)).await
    }

    async fn subscribe_heads(&self) -> ChainResult<mpsc::Receiver<ChainHeader>> {
        let sub = self
            .ws
            .subscribe_blocks()
            .await
            .map_err(|e| ChainClientError::Subscribe(e.to_string()))?;

        let (heads_tx, heads_rx) = mpsc::channel(HEADS_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut stream = sub.into_stream();
            while let Some(header) = stream.next().await {
                let head = ChainHeader {
                    number: header.number,
                    timestamp: header.timestamp,
                    prev_randao: header.mix_hash.into(),
                };
                if heads_tx.send(head).await.is_err() {
                    // receiver went away, nothing left to forward to
                    return;
                }
            }
            debug!("ws new-heads stream ended");
        });

        Ok(heads_rx)
    }

    async fn input_added_events(
        &self,
        from: u64,
        to: u64,
        apps: &[Buf20],
    ) -> ChainResult<Vec<InputAddedEvent>> {
        let filter = Filter::new()
            .address(Address::from(self.input_box))
            .event_signature(InputAdded::SIGNATURE_HASH)
            .topic1(Self::app_topics(apps))
            .from_block(from)
            .to_block(to);

        let logs = self
            .http
            .get_logs(&filter)
            .await
            .map_err(ChainClientError::rpc)?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let ev = InputAdded::decode_log_data(log.data()).map_err(ChainClientError::decode)?;
            events.push(InputAddedEvent {
                app: ev.appContract.into(),
                index: u64::try_from(ev.index).map_err(ChainClientError::decode)?,
                payload: ev.input.to_vec(),
                block_number: log.block_number.unwrap_or_default(),
                log_index: log.log_index.unwrap_or_default(),
            });
        }
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
        let filter = Filter::new()
            .address(Address::from(consensus))
            .event_signature(ClaimAcceptance::SIGNATURE_HASH)
            .topic1(Self::app_topics(apps))
            .from_block(from)
            .to_block(to);

        let logs = self
            .http
            .get_logs(&filter)
            .await
            .map_err(ChainClientError::rpc)?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let ev =
                ClaimAcceptance::decode_log_data(log.data()).map_err(ChainClientError::decode)?;
            events.push(ClaimAcceptanceEvent {
                app: ev.appContract.into(),
                last_processed_block: u64::try_from(ev.lastProcessedBlockNumber)
                    .map_err(ChainClientError::decode)?,
                claim: ev.claim.into(),
                block_number: log.block_number.unwrap_or_default(),
            });
        }
        Ok(events)
    }

    async fn output_executed_events(
        &self,
        from: u64,
        to: u64,
        app: Buf20,
    ) -> ChainResult<Vec<OutputExecutedEvent>> {
        let filter = Filter::new()
            .address(Address::from(app))
            .event_signature(OutputExecuted::SIGNATURE_HASH)
            .from_block(from)
            .to_block(to);

        let logs = self
            .http
            .get_logs(&filter)
            .await
            .map_err(ChainClientError::rpc)?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let ev =
                OutputExecuted::decode_log_data(log.data()).map_err(ChainClientError::decode)?;
            events.push(OutputExecutedEvent {
                app,
                output_index: ev.outputIndex,
                raw_output: ev.output.to_vec(),
                transaction_hash: log.transaction_hash.unwrap_or_default().into(),
                block_number: log.block_number.unwrap_or_default(),
            });
        }
        Ok(events)
    }

    async fn consensus_address(&self, app: Buf20) -> ChainResult<Buf20> {
        let ret = self
            .eth_call(app, getConsensusCall {}.abi_encode())
            .await?;
        let consensus =
            getConsensusCall::abi_decode_returns(&ret).map_err(ChainClientError::decode)?;
        Ok(consensus.into())
    }

    async fn epoch_length(&self, consensus: Buf20) -> ChainResult<u64> {
        let ret = self
            .eth_call(consensus, getEpochLengthCall {}.abi_encode())
            .await?;
        let length: U256 =
            getEpochLengthCall::abi_decode_returns(&ret).map_err(ChainClientError::decode)?;
        u64::try_from(length).map_err(ChainClientError::decode)
    }
}
