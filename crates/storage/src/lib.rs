//! Async face of the repository.
//!
//! Database calls are blocking; async tasks must not run them on the runtime
//! threads. Every operation here is shipped to a worker pool and the result
//! comes back over a oneshot channel.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::warn;

use rollups_db::traits::Repository;
use rollups_db::types::EpochWithInputs;
use rollups_db::{DbError, DbResult};
use rollups_primitives::{Application, Buf20, Epoch, Input, Output, Report};

/// Shared handle to the repository, usable from async tasks. Cheap to clone;
/// all clones share the pool and the underlying database.
#[derive(Clone)]
pub struct NodeStorage {
    pool: threadpool::ThreadPool,
    db: Arc<dyn Repository>,
}

impl NodeStorage {
    pub fn new(pool: threadpool::ThreadPool, db: Arc<dyn Repository>) -> Self {
        Self { pool, db }
    }

    /// Direct access to the underlying repository for blocking contexts.
    pub fn db(&self) -> &Arc<dyn Repository> {
        &self.db
    }

    async fn exec<T, F>(&self, op: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Repository) -> DbResult<T> + Send + 'static,
    {
        let (resp_tx, resp_rx) = oneshot::channel();
        let db = self.db.clone();
        self.pool.execute(move || {
            if resp_tx.send(op(db.as_ref())).is_err() {
                warn!("db worker response dropped by caller");
            }
        });
        match resp_rx.await {
            Ok(res) => res,
            Err(_) => Err(DbError::WorkerFailedStrangely),
        }
    }

    pub async fn put_application(&self, app: Application) -> DbResult<()> {
        self.exec(move |db| db.put_application(app)).await
    }

    pub async fn get_application(&self, app: Buf20) -> DbResult<Option<Application>> {
        self.exec(move |db| db.get_application(app)).await
    }

    pub async fn get_all_running_applications(&self) -> DbResult<Vec<Application>> {
        self.exec(|db| db.get_all_running_applications()).await
    }

    pub async fn store_epoch_and_inputs(
        &self,
        app: Buf20,
        batches: Vec<EpochWithInputs>,
        block_number: u64,
    ) -> DbResult<()> {
        self.exec(move |db| db.store_epoch_and_inputs(app, batches, block_number))
            .await
    }

    pub async fn get_epoch(&self, epoch_length: u64, app: Buf20) -> DbResult<Option<Epoch>> {
        self.exec(move |db| db.get_epoch(epoch_length, app)).await
    }

    pub async fn get_epoch_at(&self, app: Buf20, index: u64) -> DbResult<Option<Epoch>> {
        self.exec(move |db| db.get_epoch_at(app, index)).await
    }

    pub async fn get_previous_epochs_with_open_claims(
        &self,
        app: Buf20,
        up_to_block: u64,
    ) -> DbResult<Vec<Epoch>> {
        self.exec(move |db| db.get_previous_epochs_with_open_claims(app, up_to_block))
            .await
    }

    pub async fn update_epochs(
        &self,
        app: Buf20,
        claims: Vec<Epoch>,
        most_recent_block: u64,
    ) -> DbResult<()> {
        self.exec(move |db| db.update_epochs(app, claims, most_recent_block))
            .await
    }

    pub async fn get_input(&self, app: Buf20, index: u64) -> DbResult<Option<Input>> {
        self.exec(move |db| db.get_input(app, index)).await
    }

    pub async fn get_inputs(&self, app: Buf20) -> DbResult<Vec<Input>> {
        self.exec(move |db| db.get_inputs(app)).await
    }

    pub async fn get_output(&self, app: Buf20, index: u64) -> DbResult<Option<Output>> {
        self.exec(move |db| db.get_output(app, index)).await
    }

    pub async fn update_output_execution(
        &self,
        app: Buf20,
        outputs: Vec<Output>,
        block_number: u64,
    ) -> DbResult<()> {
        self.exec(move |db| db.update_output_execution(app, outputs, block_number))
            .await
    }

    pub async fn get_reports(
        &self,
        app: Buf20,
        input_index: Option<u64>,
    ) -> DbResult<Vec<Report>> {
        self.exec(move |db| db.get_reports(app, input_index)).await
    }

    pub async fn get_espresso_nonce(&self, sender: Buf20, app: Buf20) -> DbResult<u64> {
        self.exec(move |db| db.get_espresso_nonce(sender, app))
            .await
    }

    pub async fn update_espresso_nonce(&self, sender: Buf20, app: Buf20) -> DbResult<u64> {
        self.exec(move |db| db.update_espresso_nonce(sender, app))
            .await
    }

    pub async fn get_input_index(&self, app: Buf20) -> DbResult<u64> {
        self.exec(move |db| db.get_input_index(app)).await
    }

    pub async fn get_last_processed_espresso_block(&self, app: Buf20) -> DbResult<u64> {
        self.exec(move |db| db.get_last_processed_espresso_block(app))
            .await
    }

    pub async fn update_last_processed_espresso_block(
        &self,
        app: Buf20,
        height: u64,
    ) -> DbResult<()> {
        self.exec(move |db| db.update_last_processed_espresso_block(app, height))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollups_primitives::Buf32;
    use rollups_rocksdb::{test_utils::get_rocksdb_tmp_instance, NodeDb};

    fn get_storage() -> NodeStorage {
        let db = get_rocksdb_tmp_instance().unwrap();
        let pool = threadpool::Builder::new().num_threads(2).build();
        NodeStorage::new(pool, Arc::new(NodeDb::new(db)))
    }

    #[tokio::test]
    async fn test_round_trip_through_pool() {
        let storage = get_storage();
        let app = Application {
            contract_address: Buf20::from([1; 20]),
            consensus_address: Buf20::from([2; 20]),
            template_hash: Buf32::from([3; 32]),
            last_processed_block: 0,
            enabled: true,
        };
        storage.put_application(app.clone()).await.unwrap();

        let apps = storage.get_all_running_applications().await.unwrap();
        assert_eq!(apps, vec![app]);

        assert_eq!(
            storage.get_input_index(Buf20::from([1; 20])).await.unwrap(),
            0
        );
    }
}
