use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use alloy_sol_types::SolCall;
use tracing::*;

use rollups_chainio::events::EvmAdvanceCall;
use rollups_chainio::ChainClient;
use rollups_db::types::EpochWithInputs;
use rollups_evm_reader::EvmReader;
use rollups_primitives::{epoch_index, Buf32, Epoch, Input, InputCompletionStatus};
use rollups_storage::NodeStorage;
use rollups_tasks::{ReadySignal, ShutdownGuard};

use crate::client::EspressoClient;
use crate::error::EspressoReaderError;
use crate::ns_table::parse_namespace_ids;
use crate::tx::{extract_sig_and_data, ExtractedTransaction};

const POLL_DELAY: Duration = Duration::from_millis(1000);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct EspressoReaderConfig {
    pub namespace: u64,
    /// First sequencer block to scan when no cursor exists yet; 0 means
    /// start from the sequencer's current height.
    pub starting_block: u64,
    pub chain_id: u64,
    pub input_box_deployment_block: u64,
}

/// Follows the external sequencer's block stream, folds the L1 state it
/// references through the EVM reader's library path, and enqueues the
/// namespace's typed transactions as inputs.
pub struct EspressoReader<C, E> {
    client: Arc<E>,
    evm_reader: EvmReader<C>,
    storage: NodeStorage,
    config: EspressoReaderConfig,
    /// Highest L1 block folded into local state.
    l1_watermark: u64,
    l1_timestamp: u64,
}

impl<C: ChainClient, E: EspressoClient> EspressoReader<C, E> {
    pub fn new(
        client: Arc<E>,
        evm_reader: EvmReader<C>,
        storage: NodeStorage,
        config: EspressoReaderConfig,
    ) -> Self {
        let l1_watermark = config.input_box_deployment_block.saturating_sub(1);
        Self {
            client,
            evm_reader,
            storage,
            config,
            l1_watermark,
            l1_timestamp: 0,
        }
    }

    pub async fn run(mut self, shutdown: ShutdownGuard, ready: ReadySignal) -> anyhow::Result<()> {
        let mut current = self.resume_height().await?;
        info!(%current, namespace = self.config.namespace, "espresso reader starting");
        ready.notify();

        self.bootstrap(&shutdown, &mut current).await?;

        let mut backoff = INITIAL_BACKOFF;
        loop {
            if shutdown.should_shutdown() {
                return Ok(());
            }

            let latest = match self.client.latest_block_height().await {
                Ok(height) => {
                    backoff = INITIAL_BACKOFF;
                    height
                }
                Err(err) => {
                    warn!(%err, delay = ?backoff, "failed fetching latest espresso block height");
                    if sleep_or_shutdown(&shutdown, backoff).await {
                        return Ok(());
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };
            trace!(%latest, "espresso height");

            if latest <= current {
                if sleep_or_shutdown(&shutdown, POLL_DELAY).await {
                    return Ok(());
                }
                continue;
            }

            while current < latest {
                if shutdown.should_shutdown() {
                    return Ok(());
                }
                match self.process_block(current).await {
                    Ok(()) => {
                        self.commit_cursor(current).await?;
                        current += 1;
                        backoff = INITIAL_BACKOFF;
                    }
                    Err(err) if err.is_fatal() => return Err(err.into()),
                    Err(err) => {
                        // transient; retry the same height so the cursor
                        // only moves past fully processed blocks
                        warn!(height = current, %err, delay = ?backoff, "failed processing espresso block");
                        if sleep_or_shutdown(&shutdown, backoff).await {
                            return Ok(());
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }
    }

    /// Picks the height to resume from: the smallest non-zero per-app
    /// cursor, then the configured starting block, then the sequencer tip.
    async fn resume_height(&self) -> anyhow::Result<u64> {
        let apps = self.storage.get_all_running_applications().await?;
        let mut cursor: Option<u64> = None;
        for app in &apps {
            let height = self
                .storage
                .get_last_processed_espresso_block(app.contract_address)
                .await?;
            if height > 0 {
                cursor = Some(cursor.map_or(height, |c: u64| c.min(height)));
            }
        }
        if let Some(height) = cursor {
            return Ok(height + 1);
        }
        if self.config.starting_block > 0 {
            return Ok(self.config.starting_block);
        }
        let latest = self.client.latest_block_height().await?;
        info!(%latest, "starting from the sequencer's latest block height");
        Ok(latest)
    }

    /// Catches up over `[current, tip]` using namespace tables, touching
    /// only blocks that actually carry the configured namespace.
    async fn bootstrap(
        &mut self,
        shutdown: &ShutdownGuard,
        current: &mut u64,
    ) -> anyhow::Result<()> {
        let latest = match self.client.latest_block_height().await {
            Ok(height) => height,
            Err(err) => {
                error!(%err, "failed fetching latest espresso block height while bootstrapping");
                return Ok(());
            }
        };
        if latest <= *current {
            return Ok(());
        }
        debug!(from = *current, to = latest, "bootstrapping espresso reader");

        let tables = match self.client.namespace_tables(*current, latest).await {
            Ok(tables) => tables,
            Err(err) => {
                error!(%err, "failed fetching namespace tables while bootstrapping");
                return Ok(());
            }
        };

        for (offset, table) in tables.iter().enumerate() {
            if shutdown.should_shutdown() {
                return Ok(());
            }
            let height = *current + offset as u64;
            let ids = match parse_namespace_ids(table) {
                Ok(ids) => ids,
                Err(err) => {
                    warn!(%height, %err, "skipping block with unparseable namespace table");
                    continue;
                }
            };
            if !ids.contains(&(self.config.namespace as u32)) {
                continue;
            }
            debug!(%height, "bootstrap found namespace in block");
            match self.process_block(height).await {
                Ok(()) => self.commit_cursor(height).await?,
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => warn!(%height, %err, "failed processing block during bootstrap"),
            }
        }
        *current = latest + 1;
        Ok(())
    }

    async fn process_block(&mut self, height: u64) -> Result<(), EspressoReaderError> {
        trace!(%height, "processing espresso block");
        self.read_l1(height).await?;
        self.read_espresso(height).await
    }

    /// Folds the L1 state referenced by the sequencer block's header into
    /// the repository before any of the block's inputs are attached.
    async fn read_l1(&mut self, height: u64) -> Result<(), EspressoReaderError> {
        let header = self.client.header(height).await?;
        let Some(l1) = header.l1_finalized else {
            return Ok(());
        };

        if l1.number > self.l1_watermark {
            debug!(from = self.l1_watermark, to = l1.number, "l1 finalized advanced");
            let apps = self.evm_reader.runnable_apps().await?;
            if !apps.is_empty() {
                self.evm_reader
                    .read_inputs_and_reconcile(self.l1_watermark + 1, l1.number, &apps)
                    .await?;
            }
        }
        self.l1_watermark = l1.number;
        self.l1_timestamp = l1.timestamp;
        Ok(())
    }

    async fn read_espresso(&mut self, height: u64) -> Result<(), EspressoReaderError> {
        let transactions = self
            .client
            .transactions_in_block(height, self.config.namespace)
            .await?;
        debug!(%height, count = transactions.len(), "espresso transactions in block");

        for raw in &transactions {
            if let Err(err) = self.process_transaction(raw).await {
                if err.is_fatal() {
                    return Err(err);
                }
                // malformed or stale transactions are dropped; the cursor
                // still advances so they are not reprocessed
                warn!(%height, %err, "skipping espresso transaction");
            }
        }
        Ok(())
    }

    async fn process_transaction(&mut self, raw: &[u8]) -> Result<(), EspressoReaderError> {
        let tx = match extract_sig_and_data(raw) {
            Ok(tx) => tx,
            Err(err) => {
                error!(%err, "failed to extract espresso transaction");
                return Ok(());
            }
        };
        info!(
            sender = %tx.sender,
            app = %tx.app,
            nonce = tx.nonce,
            tx_id = %tx.sig_hash,
            "espresso input"
        );

        let expected = self.storage.get_espresso_nonce(tx.sender, tx.app).await?;
        if tx.nonce != expected {
            warn!(
                got = tx.nonce,
                expected, "incorrect espresso nonce, possibly a duplicate transaction"
            );
            return Ok(());
        }

        let Some(epoch_length) = self.evm_reader.cached_epoch_length(tx.app) else {
            error!(app = %tx.app, "could not obtain epoch length");
            return Ok(());
        };

        let prev_randao = self
            .evm_reader
            .chain_client()
            .header_by_number(self.l1_watermark)
            .await
            .map_err(rollups_evm_reader::EvmReaderError::from)?
            .prev_randao;

        let index = self.storage.get_input_index(tx.app).await?;
        let raw_data = self.encode_evm_advance(&tx, index, prev_randao);

        // espresso inputs never close epochs; they attach to whatever is
        // open, or synthesize the epoch the watermark falls into
        let epoch = match self.storage.get_epoch(epoch_length, tx.app).await? {
            Some(epoch) => epoch,
            None => Epoch::open_at(epoch_index(epoch_length, self.l1_watermark), epoch_length),
        };

        let input = Input {
            index,
            block_number: self.l1_watermark,
            raw_data,
            status: InputCompletionStatus::None,
            transaction_id: Some(tx.sig_hash),
        };
        let batch = EpochWithInputs {
            epoch,
            inputs: vec![input],
        };
        self.storage
            .store_epoch_and_inputs(tx.app, vec![batch], self.l1_watermark)
            .await?;

        self.storage
            .update_espresso_nonce(tx.sender, tx.app)
            .await?;
        Ok(())
    }

    fn encode_evm_advance(
        &self,
        tx: &ExtractedTransaction,
        index: u64,
        prev_randao: Buf32,
    ) -> Vec<u8> {
        EvmAdvanceCall {
            chainId: U256::from(self.config.chain_id),
            appContract: tx.app.into(),
            msgSender: tx.sender.into(),
            blockNumber: U256::from(self.l1_watermark),
            blockTimestamp: U256::from(self.l1_timestamp),
            prevRandao: U256::from_be_bytes(prev_randao.0),
            index: U256::from(index),
            payload: tx.payload.clone().into(),
        }
        .abi_encode()
    }

    async fn commit_cursor(&self, height: u64) -> Result<(), EspressoReaderError> {
        let apps = self.storage.get_all_running_applications().await?;
        for app in apps {
            self.storage
                .update_last_processed_espresso_block(app.contract_address, height)
                .await?;
        }
        Ok(())
    }
}

/// Returns true when shutdown fired while sleeping.
async fn sleep_or_shutdown(shutdown: &ShutdownGuard, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.wait_for_shutdown() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
