use std::collections::HashMap;
use std::sync::Arc;

use tracing::*;

use rollups_chainio::{ChainClient, ChainHeader};
use rollups_db::DbError;
use rollups_primitives::{Application, Buf20, DefaultBlock};
use rollups_storage::NodeStorage;
use rollups_tasks::{ReadySignal, ShutdownGuard};

use crate::epochs::plan_epochs;
use crate::error::EvmReaderError;

/// An application that passed this tick's on-chain validation, together with
/// its consensus contract and epoch length.
#[derive(Clone, Debug)]
pub struct AppContext {
    pub application: Application,
    pub consensus: Buf20,
    pub epoch_length: u64,
}

/// Reads `InputAdded`, `ClaimAcceptance` and `OutputExecuted` events from
/// the base chain and folds them into the repository.
///
/// Two roles: the subscription-driven loop ([`EvmReader::run`]) follows new
/// heads, and [`EvmReader::read_inputs_and_reconcile`] is the library entry
/// point the espresso reader calls with an explicit window. Instances share
/// nothing but the repository.
pub struct EvmReader<C> {
    client: Arc<C>,
    storage: NodeStorage,
    default_block: DefaultBlock,
    epoch_length_cache: HashMap<Buf20, u64>,
    has_enabled_apps: bool,
}

impl<C: ChainClient> EvmReader<C> {
    pub fn new(client: Arc<C>, storage: NodeStorage, default_block: DefaultBlock) -> Self {
        Self {
            client,
            storage,
            default_block,
            epoch_length_cache: HashMap::new(),
            has_enabled_apps: true,
        }
    }

    pub fn chain_client(&self) -> &Arc<C> {
        &self.client
    }

    /// Epoch length cached during app validation, if this reader has seen
    /// the application this session.
    pub fn cached_epoch_length(&self, app: Buf20) -> Option<u64> {
        self.epoch_length_cache.get(&app).copied()
    }

    /// The subscription-driven loop. Re-subscribes on subscription loss,
    /// returns on shutdown, propagates everything else as fatal.
    pub async fn run(
        mut self,
        shutdown: ShutdownGuard,
        ready: ReadySignal,
    ) -> anyhow::Result<()> {
        let mut ready = Some(ready);
        loop {
            match self.watch_new_heads(&shutdown, &mut ready).await {
                Err(EvmReaderError::Subscription(err)) => {
                    error!(%err, "subscription error");
                    info!("restarting new-heads subscription");
                }
                Err(err) => return Err(err.into()),
                Ok(()) => return Ok(()),
            }
        }
    }

    async fn watch_new_heads(
        &mut self,
        shutdown: &ShutdownGuard,
        ready: &mut Option<ReadySignal>,
    ) -> Result<(), EvmReaderError> {
        let mut heads = self.client.subscribe_heads().await?;
        info!("subscribed to new block events");
        if let Some(ready) = ready.take() {
            ready.notify();
        }

        loop {
            tokio::select! {
                _ = shutdown.wait_for_shutdown() => return Ok(()),
                head = heads.recv() => {
                    let Some(head) = head else {
                        return Err(EvmReaderError::Subscription(
                            "new-heads channel closed".to_string(),
                        ));
                    };
                    if let Err(err) = self.process_head(&head).await {
                        match err {
                            EvmReaderError::Chain(err) => {
                                warn!(%err, "chain query failed, retrying on next head");
                            }
                            err => return Err(err),
                        }
                    }
                }
            }
        }
    }

    async fn process_head(&mut self, head: &ChainHeader) -> Result<(), EvmReaderError> {
        debug!(block_number = head.number, "new block header received");

        let block_number = if self.default_block == DefaultBlock::Latest {
            head.number
        } else {
            let resolved = self.client.header_by_tag(self.default_block).await?;
            debug!(
                resolved = resolved.number,
                delivered = head.number,
                policy = ?self.default_block,
                "using tag-resolved block per commitment policy"
            );
            resolved.number
        };

        let apps = self.runnable_apps().await?;
        if apps.is_empty() {
            return Ok(());
        }

        self.read_inputs_and_reconcile(0, block_number, &apps).await
    }

    /// Enabled applications whose on-chain consensus matches their
    /// configured one. Misconfigured apps are excluded for this tick.
    pub async fn runnable_apps(&mut self) -> Result<Vec<AppContext>, EvmReaderError> {
        let running = self.storage.get_all_running_applications().await?;
        if running.is_empty() {
            if self.has_enabled_apps {
                info!("no registered applications enabled");
            }
            self.has_enabled_apps = false;
            return Ok(Vec::new());
        }
        if !self.has_enabled_apps {
            info!("found enabled applications");
        }
        self.has_enabled_apps = true;

        let mut apps = Vec::new();
        for application in running {
            match self.validate_app(&application).await {
                Ok(ctx) => apps.push(ctx),
                Err(err) => {
                    warn!(
                        app = %application.contract_address,
                        %err,
                        "excluding application for this tick"
                    );
                }
            }
        }
        if apps.is_empty() {
            info!("no correctly configured applications running");
        }
        Ok(apps)
    }

    async fn validate_app(&mut self, app: &Application) -> Result<AppContext, EvmReaderError> {
        let consensus = self.client.consensus_address(app.contract_address).await?;
        if consensus != app.consensus_address {
            return Err(EvmReaderError::ConsensusMismatch {
                deployed: consensus,
                configured: app.consensus_address,
            });
        }

        let epoch_length = match self.epoch_length_cache.get(&app.contract_address) {
            Some(length) => *length,
            None => {
                let length = self.client.epoch_length(consensus).await?;
                self.epoch_length_cache
                    .insert(app.contract_address, length);
                length
            }
        };

        Ok(AppContext {
            application: app.clone(),
            consensus,
            epoch_length,
        })
    }

    /// Scans each application's unprocessed window within `[from, to]` for
    /// inputs, stores them transactionally, then reconciles claim
    /// acceptances and output executions over the same window.
    pub async fn read_inputs_and_reconcile(
        &mut self,
        from: u64,
        to: u64,
        apps: &[AppContext],
    ) -> Result<(), EvmReaderError> {
        for ctx in apps {
            let window_from = from.max(ctx.application.last_processed_block + 1);
            if window_from > to {
                continue;
            }
            self.store_new_inputs(ctx, window_from, to).await?;
            self.reconcile_claims(ctx, window_from, to).await?;
            self.reconcile_outputs(ctx, window_from, to).await?;
        }
        Ok(())
    }

    async fn store_new_inputs(
        &mut self,
        ctx: &AppContext,
        from: u64,
        to: u64,
    ) -> Result<(), EvmReaderError> {
        let app = ctx.application.contract_address;
        let events = self.client.input_added_events(from, to, &[app]).await?;

        let open_epoch = self.storage.get_epoch(ctx.epoch_length, app).await?;
        let next_index = self.storage.get_input_index(app).await?;
        let batches = plan_epochs(ctx.epoch_length, open_epoch, &events, next_index, to);

        if !events.is_empty() {
            info!(%app, count = events.len(), %from, %to, "storing new inputs");
        }
        self.storage.store_epoch_and_inputs(app, batches, to).await?;
        Ok(())
    }

    async fn reconcile_claims(
        &mut self,
        ctx: &AppContext,
        from: u64,
        to: u64,
    ) -> Result<(), EvmReaderError> {
        let app = ctx.application.contract_address;
        let events = self
            .client
            .claim_acceptance_events(from, to, ctx.consensus, &[app])
            .await?;
        if events.is_empty() {
            return Ok(());
        }

        let candidates = self
            .storage
            .get_previous_epochs_with_open_claims(app, to)
            .await?;

        let mut accepted = Vec::new();
        for ev in events {
            let Some(epoch) = candidates
                .iter()
                .find(|e| e.last_block == ev.last_processed_block)
            else {
                warn!(
                    %app,
                    last_block = ev.last_processed_block,
                    "claim acceptance without a matching epoch with an open claim"
                );
                continue;
            };
            if matches!(epoch.claim_hash, Some(stored) if stored != ev.claim) {
                warn!(
                    %app,
                    epoch = epoch.index,
                    onchain = %ev.claim,
                    "accepted claim differs from the locally computed one"
                );
                continue;
            }
            let mut epoch = epoch.clone();
            epoch.claim_hash = Some(ev.claim);
            accepted.push(epoch);
        }

        if accepted.is_empty() {
            return Ok(());
        }
        match self.storage.update_epochs(app, accepted, to).await {
            Err(DbError::NoUpdate) => {
                warn!(%app, "lost a race updating accepted claims, will re-read next tick");
                Ok(())
            }
            other => Ok(other?),
        }
    }

    async fn reconcile_outputs(
        &mut self,
        ctx: &AppContext,
        from: u64,
        to: u64,
    ) -> Result<(), EvmReaderError> {
        let app = ctx.application.contract_address;
        let events = self.client.output_executed_events(from, to, app).await?;
        if events.is_empty() {
            return Ok(());
        }

        let mut executed = Vec::new();
        for ev in events {
            match self.storage.get_output(app, ev.output_index).await? {
                Some(mut output) => {
                    output.execution_transaction_hash = Some(ev.transaction_hash);
                    executed.push(output);
                }
                None => {
                    warn!(%app, index = ev.output_index, "executed output not known yet");
                }
            }
        }

        if executed.is_empty() {
            return Ok(());
        }
        match self.storage.update_output_execution(app, executed, to).await {
            Err(DbError::NoUpdate) => {
                warn!(%app, "lost a race recording output executions");
                Ok(())
            }
            other => Ok(other?),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rollups_primitives::EpochStatus;
    use rollups_chainio::test_utils::TestChainClient;
    use rollups_chainio::{ClaimAcceptanceEvent, InputAddedEvent, OutputExecutedEvent};
    use rollups_db::types::EpochWithInputs;
    use rollups_primitives::{Buf32, Epoch, Output};
    use rollups_rocksdb::{test_utils::get_rocksdb_tmp_instance, NodeDb};

    const EPOCH_LENGTH: u64 = 10;

    fn get_storage() -> NodeStorage {
        let db = get_rocksdb_tmp_instance().unwrap();
        let pool = threadpool::Builder::new().num_threads(2).build();
        NodeStorage::new(pool, Arc::new(NodeDb::new(db)))
    }

    fn app_addr() -> Buf20 {
        Buf20::from([0x11; 20])
    }

    fn consensus_addr() -> Buf20 {
        Buf20::from([0xcc; 20])
    }

    fn test_application(last_processed_block: u64) -> Application {
        Application {
            contract_address: app_addr(),
            consensus_address: consensus_addr(),
            template_hash: Buf32::from([0x77; 32]),
            last_processed_block,
            enabled: true,
        }
    }

    fn input_event(index: u64, block: u64) -> InputAddedEvent {
        InputAddedEvent {
            app: app_addr(),
            index,
            payload: vec![index as u8; 4],
            block_number: block,
            log_index: index,
        }
    }

    async fn setup(cursor: u64) -> (Arc<TestChainClient>, NodeStorage, EvmReader<TestChainClient>)
    {
        let client = Arc::new(TestChainClient::new());
        client.set_consensus(app_addr(), consensus_addr());
        client.set_epoch_length(consensus_addr(), EPOCH_LENGTH);

        let storage = get_storage();
        storage
            .put_application(test_application(cursor))
            .await
            .unwrap();

        let reader = EvmReader::new(client.clone(), storage.clone(), DefaultBlock::Finalized);
        (client, storage, reader)
    }

    #[tokio::test]
    async fn test_two_inputs_land_in_open_epoch() {
        let (client, storage, mut reader) = setup(9).await;
        client.add_input_event(input_event(0, 10));
        client.add_input_event(input_event(1, 11));

        let apps = reader.runnable_apps().await.unwrap();
        reader.read_inputs_and_reconcile(0, 11, &apps).await.unwrap();

        let epoch = storage
            .get_epoch(EPOCH_LENGTH, app_addr())
            .await
            .unwrap()
            .expect("epoch 1 open");
        assert_eq!(epoch.index, 1);
        assert_eq!((epoch.first_block, epoch.last_block), (10, 19));

        let inputs = storage.get_inputs(app_addr()).await.unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].block_number, 10);
        assert_eq!(inputs[1].block_number, 11);

        let app = storage.get_application(app_addr()).await.unwrap().unwrap();
        assert_eq!(app.last_processed_block, 11);
    }

    #[tokio::test]
    async fn test_input_past_boundary_rolls_epoch() {
        let (client, storage, mut reader) = setup(19).await;

        // epoch 1 is open from an earlier window
        storage
            .store_epoch_and_inputs(
                app_addr(),
                vec![EpochWithInputs::new(Epoch::open_at(1, EPOCH_LENGTH))],
                19,
            )
            .await
            .unwrap();

        client.add_input_event(input_event(0, 20));
        let apps = reader.runnable_apps().await.unwrap();
        reader.read_inputs_and_reconcile(0, 20, &apps).await.unwrap();

        let closed = storage.get_epoch_at(app_addr(), 1).await.unwrap().unwrap();
        assert_eq!(closed.status, EpochStatus::Closed);

        let open = storage
            .get_epoch(EPOCH_LENGTH, app_addr())
            .await
            .unwrap()
            .expect("epoch 2 open");
        assert_eq!(open.index, 2);

        let inputs = storage.get_inputs(app_addr()).await.unwrap();
        assert_eq!(inputs.len(), 1);
        assert!(open.contains_block(inputs[0].block_number));
    }

    #[tokio::test]
    async fn test_misconfigured_consensus_excludes_app() {
        let (client, _storage, mut reader) = setup(0).await;
        client.set_consensus(app_addr(), Buf20::from([0xdd; 20]));

        let apps = reader.runnable_apps().await.unwrap();
        assert!(apps.is_empty());
    }

    #[tokio::test]
    async fn test_claim_acceptance_marks_epoch() {
        let (client, storage, mut reader) = setup(19).await;

        let mut closed = Epoch::open_at(1, EPOCH_LENGTH);
        closed.status = EpochStatus::Closed;
        closed.claim_hash = Some(Buf32::from([0xab; 32]));
        storage
            .store_epoch_and_inputs(app_addr(), vec![EpochWithInputs::new(closed)], 19)
            .await
            .unwrap();

        client.add_claim_event(ClaimAcceptanceEvent {
            app: app_addr(),
            last_processed_block: 19,
            claim: Buf32::from([0xab; 32]),
            block_number: 25,
        });

        let apps = reader.runnable_apps().await.unwrap();
        reader.read_inputs_and_reconcile(0, 25, &apps).await.unwrap();

        let epoch = storage.get_epoch_at(app_addr(), 1).await.unwrap().unwrap();
        assert_eq!(epoch.status, EpochStatus::ClaimAccepted);
    }

    #[tokio::test]
    async fn test_output_execution_recorded() {
        let (client, storage, mut reader) = setup(10).await;

        storage
            .db()
            .put_output(
                app_addr(),
                Output {
                    index: 0,
                    input_index: 0,
                    raw_data: vec![0xfe],
                    execution_transaction_hash: None,
                },
            )
            .unwrap();

        client.add_output_event(OutputExecutedEvent {
            app: app_addr(),
            output_index: 0,
            raw_output: vec![0xfe],
            transaction_hash: Buf32::from([0x99; 32]),
            block_number: 12,
        });

        let apps = reader.runnable_apps().await.unwrap();
        reader.read_inputs_and_reconcile(0, 12, &apps).await.unwrap();

        let output = storage.get_output(app_addr(), 0).await.unwrap().unwrap();
        assert_eq!(output.execution_transaction_hash, Some(Buf32::from([0x99; 32])));
    }

    #[tokio::test]
    async fn test_run_restarts_after_subscription_loss() {
        let (client, storage, reader) = setup(9).await;

        let signal = rollups_tasks::ShutdownSignal::new();
        let mut readiness = rollups_tasks::Readiness::new();
        let ready = readiness.register("evm-reader");

        let handle = tokio::spawn(reader.run(signal.guard(), ready));
        readiness.wait_all().await;

        client.add_input_event(input_event(0, 10));
        client.set_finalized(11);
        client.drop_subscriptions();

        // the loop re-subscribes; once a new head arrives through the fresh
        // subscription the pending input gets picked up
        let mut found = false;
        for _ in 0..100 {
            client.announce_head(11).await;
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if !storage.get_inputs(app_addr()).await.unwrap().is_empty() {
                found = true;
                break;
            }
        }
        assert!(found, "input should be ingested after re-subscribe");

        signal.send();
        handle.await.unwrap().unwrap();
    }
}
