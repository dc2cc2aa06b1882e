use std::sync::{Arc, Mutex};

use rockbound::{
    rocksdb::ReadOptions, schema::KeyEncoder, OptimisticTransactionDB, Schema, SchemaBatch,
    SchemaDBOperationsExt,
};

use rollups_db::traits::Repository;
use rollups_db::types::EpochWithInputs;
use rollups_db::{DbError, DbResult};
use rollups_primitives::{Application, Buf20, Epoch, EpochStatus, Input, Output, Report};

use crate::schemas::{
    ApplicationSchema, EpochSchema, EspressoBlockSchema, EspressoNonceSchema, InputIndexSchema,
    InputSchema, LastEpochSchema, OutputSchema, ReportSchema,
};

/// [`Repository`] over a rockbound [`OptimisticTransactionDB`].
///
/// Writes go through [`SchemaBatch`]es so every multi-table update lands
/// atomically. Read-modify-write sequences (batch stores, cursor bumps,
/// status-gated updates) additionally hold `write_lock` so the two reader
/// paths cannot interleave between the read and the write.
pub struct NodeDb {
    db: Arc<OptimisticTransactionDB>,
    write_lock: Mutex<()>,
}

impl NodeDb {
    // NOTE: db is expected to open all the column families in
    // [`crate::STORE_COLUMN_FAMILIES`].
    pub fn new(db: Arc<OptimisticTransactionDB>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    fn lock_writes(&self) -> DbResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| DbError::Other("write lock poisoned".to_string()))
    }

    /// Collects all values of an app-scoped table, in key order.
    fn collect_app_range<S>(&self, app: Buf20) -> DbResult<Vec<S::Value>>
    where
        S: Schema<Key = (Buf20, u64)>,
    {
        let mut options = ReadOptions::default();
        options.set_iterate_lower_bound(
            <(Buf20, u64) as KeyEncoder<S>>::encode_key(&(app, 0))
                .map_err(|err| DbError::CodecError(err.to_string()))?,
        );
        options.set_iterate_upper_bound(
            <(Buf20, u64) as KeyEncoder<S>>::encode_key(&(app, u64::MAX))
                .map_err(|err| DbError::CodecError(err.to_string()))?,
        );

        let res = self
            .db
            .iter_with_opts::<S>(options)?
            .map(|item_result| item_result.map(|item| item.into_tuple().1))
            .collect::<Result<Vec<S::Value>, anyhow::Error>>()?;

        Ok(res)
    }

    fn expect_application(&self, app: Buf20) -> DbResult<Application> {
        self.db
            .get::<ApplicationSchema>(&app)?
            .ok_or_else(|| DbError::UnknownApplication(app.to_string()))
    }

    /// Writes the application row with its cursor advanced, never regressed.
    fn put_cursor(
        &self,
        batch: &mut SchemaBatch,
        mut application: Application,
        block_number: u64,
    ) -> DbResult<()> {
        if block_number > application.last_processed_block {
            application.last_processed_block = block_number;
        }
        batch.put::<ApplicationSchema>(&application.contract_address, &application)?;
        Ok(())
    }
}

impl Repository for NodeDb {
    fn put_application(&self, app: Application) -> DbResult<()> {
        self.db
            .put::<ApplicationSchema>(&app.contract_address, &app)?;
        Ok(())
    }

    fn get_application(&self, app: Buf20) -> DbResult<Option<Application>> {
        Ok(self.db.get::<ApplicationSchema>(&app)?)
    }

    fn get_all_running_applications(&self) -> DbResult<Vec<Application>> {
        let mut apps = self
            .db
            .iter::<ApplicationSchema>()?
            .map(|item_result| item_result.map(|item| item.into_tuple().1))
            .collect::<Result<Vec<Application>, anyhow::Error>>()?;
        apps.retain(|a| a.enabled);
        apps.sort_by_key(|a| a.contract_address);
        Ok(apps)
    }

    fn store_epoch_and_inputs(
        &self,
        app: Buf20,
        batches: Vec<EpochWithInputs>,
        block_number: u64,
    ) -> DbResult<()> {
        let _guard = self.lock_writes()?;

        let application = self.expect_application(app)?;
        let mut next_index = self.db.get::<InputIndexSchema>(&app)?.unwrap_or(0);
        let mut last_epoch = self.db.get::<LastEpochSchema>(&app)?;

        let mut batch = SchemaBatch::new();
        for entry in &batches {
            batch.put::<EpochSchema>(&(app, entry.epoch.index), &entry.epoch)?;
            last_epoch = Some(match last_epoch {
                Some(prev) => prev.max(entry.epoch.index),
                None => entry.epoch.index,
            });

            for input in &entry.inputs {
                if input.index != next_index {
                    return Err(DbError::OooInsert("input", input.index));
                }
                batch.put::<InputSchema>(&(app, input.index), input)?;
                next_index += 1;
            }
        }

        batch.put::<InputIndexSchema>(&app, &next_index)?;
        if let Some(last) = last_epoch {
            batch.put::<LastEpochSchema>(&app, &last)?;
        }
        self.put_cursor(&mut batch, application, block_number)?;

        self.db.write_schemas(batch)?;
        Ok(())
    }

    fn get_epoch(&self, epoch_length: u64, app: Buf20) -> DbResult<Option<Epoch>> {
        let Some(last) = self.db.get::<LastEpochSchema>(&app)? else {
            return Ok(None);
        };
        let Some(epoch) = self.db.get::<EpochSchema>(&(app, last))? else {
            return Ok(None);
        };
        if epoch.first_block != epoch.index * epoch_length {
            return Err(DbError::Other(format!(
                "epoch {} does not match epoch length {epoch_length}",
                epoch.index
            )));
        }
        Ok((epoch.status == EpochStatus::Open).then_some(epoch))
    }

    fn get_epoch_at(&self, app: Buf20, index: u64) -> DbResult<Option<Epoch>> {
        Ok(self.db.get::<EpochSchema>(&(app, index))?)
    }

    fn get_epochs(&self, app: Buf20) -> DbResult<Vec<Epoch>> {
        self.collect_app_range::<EpochSchema>(app)
    }

    fn get_previous_epochs_with_open_claims(
        &self,
        app: Buf20,
        up_to_block: u64,
    ) -> DbResult<Vec<Epoch>> {
        let mut epochs = self.collect_app_range::<EpochSchema>(app)?;
        epochs.retain(|e| {
            e.last_block <= up_to_block
                && matches!(e.status, EpochStatus::Closed | EpochStatus::ClaimComputed)
        });
        Ok(epochs)
    }

    fn update_epochs(
        &self,
        app: Buf20,
        claims: Vec<Epoch>,
        most_recent_block: u64,
    ) -> DbResult<()> {
        let _guard = self.lock_writes()?;

        let application = self.expect_application(app)?;
        let mut batch = SchemaBatch::new();
        for claim in &claims {
            let stored = self
                .db
                .get::<EpochSchema>(&(app, claim.index))?
                .ok_or(DbError::NoUpdate)?;
            if !matches!(
                stored.status,
                EpochStatus::Closed | EpochStatus::ClaimComputed
            ) {
                return Err(DbError::NoUpdate);
            }
            let mut accepted = claim.clone();
            accepted.status = EpochStatus::ClaimAccepted;
            batch.put::<EpochSchema>(&(app, accepted.index), &accepted)?;
        }
        self.put_cursor(&mut batch, application, most_recent_block)?;

        self.db.write_schemas(batch)?;
        Ok(())
    }

    fn get_input(&self, app: Buf20, index: u64) -> DbResult<Option<Input>> {
        Ok(self.db.get::<InputSchema>(&(app, index))?)
    }

    fn get_inputs(&self, app: Buf20) -> DbResult<Vec<Input>> {
        self.collect_app_range::<InputSchema>(app)
    }

    fn put_output(&self, app: Buf20, output: Output) -> DbResult<()> {
        self.db.put::<OutputSchema>(&(app, output.index), &output)?;
        Ok(())
    }

    fn get_output(&self, app: Buf20, index: u64) -> DbResult<Option<Output>> {
        Ok(self.db.get::<OutputSchema>(&(app, index))?)
    }

    fn get_outputs(&self, app: Buf20) -> DbResult<Vec<Output>> {
        self.collect_app_range::<OutputSchema>(app)
    }

    fn update_output_execution(
        &self,
        app: Buf20,
        outputs: Vec<Output>,
        block_number: u64,
    ) -> DbResult<()> {
        let _guard = self.lock_writes()?;

        let application = self.expect_application(app)?;
        let mut batch = SchemaBatch::new();
        for output in &outputs {
            if self.db.get::<OutputSchema>(&(app, output.index))?.is_none() {
                return Err(DbError::NoUpdate);
            }
            batch.put::<OutputSchema>(&(app, output.index), output)?;
        }
        self.put_cursor(&mut batch, application, block_number)?;

        self.db.write_schemas(batch)?;
        Ok(())
    }

    fn put_report(&self, app: Buf20, report: Report) -> DbResult<()> {
        self.db.put::<ReportSchema>(&(app, report.index), &report)?;
        Ok(())
    }

    fn get_report(&self, app: Buf20, index: u64) -> DbResult<Option<Report>> {
        Ok(self.db.get::<ReportSchema>(&(app, index))?)
    }

    fn get_reports(&self, app: Buf20, input_index: Option<u64>) -> DbResult<Vec<Report>> {
        let mut reports = self.collect_app_range::<ReportSchema>(app)?;
        if let Some(wanted) = input_index {
            reports.retain(|r| r.input_index == wanted);
        }
        Ok(reports)
    }

    fn get_espresso_nonce(&self, sender: Buf20, app: Buf20) -> DbResult<u64> {
        Ok(self
            .db
            .get::<EspressoNonceSchema>(&(sender, app))?
            .unwrap_or(0))
    }

    fn update_espresso_nonce(&self, sender: Buf20, app: Buf20) -> DbResult<u64> {
        let _guard = self.lock_writes()?;
        let current = self
            .db
            .get::<EspressoNonceSchema>(&(sender, app))?
            .unwrap_or(0);
        self.db
            .put::<EspressoNonceSchema>(&(sender, app), &(current + 1))?;
        Ok(current)
    }

    fn get_input_index(&self, app: Buf20) -> DbResult<u64> {
        Ok(self.db.get::<InputIndexSchema>(&app)?.unwrap_or(0))
    }

    fn get_last_processed_espresso_block(&self, app: Buf20) -> DbResult<u64> {
        Ok(self.db.get::<EspressoBlockSchema>(&app)?.unwrap_or(0))
    }

    fn update_last_processed_espresso_block(&self, app: Buf20, height: u64) -> DbResult<()> {
        self.db.put::<EspressoBlockSchema>(&app, &height)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::get_rocksdb_tmp_instance;
    use rollups_primitives::{Buf32, InputCompletionStatus};

    fn get_db() -> NodeDb {
        let db = get_rocksdb_tmp_instance().unwrap();
        NodeDb::new(db)
    }

    fn test_app(addr: u8) -> Application {
        Application {
            contract_address: Buf20::from([addr; 20]),
            consensus_address: Buf20::from([0xcc; 20]),
            template_hash: Buf32::from([1; 32]),
            last_processed_block: 0,
            enabled: true,
        }
    }

    fn test_input(index: u64, block: u64) -> Input {
        Input {
            index,
            block_number: block,
            raw_data: vec![index as u8; 4],
            status: InputCompletionStatus::None,
            transaction_id: None,
        }
    }

    #[test]
    fn test_store_epoch_and_inputs() {
        let db = get_db();
        let app = test_app(1);
        let addr = app.contract_address;
        db.put_application(app).unwrap();

        let mut entry = EpochWithInputs::new(Epoch::open_at(1, 10));
        entry.inputs.push(test_input(0, 10));
        entry.inputs.push(test_input(1, 11));
        db.store_epoch_and_inputs(addr, vec![entry], 11).unwrap();

        let epoch = db.get_epoch(10, addr).unwrap().expect("open epoch");
        assert_eq!(epoch.index, 1);
        assert_eq!(epoch.first_block, 10);
        assert_eq!(epoch.last_block, 19);

        let inputs = db.get_inputs(addr).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].index, 0);
        assert_eq!(inputs[1].index, 1);

        assert_eq!(db.get_input_index(addr).unwrap(), 2);
        let stored = db.get_application(addr).unwrap().unwrap();
        assert_eq!(stored.last_processed_block, 11);
    }

    #[test]
    fn test_store_rejects_index_gap() {
        let db = get_db();
        let app = test_app(1);
        let addr = app.contract_address;
        db.put_application(app).unwrap();

        let mut entry = EpochWithInputs::new(Epoch::open_at(0, 10));
        entry.inputs.push(test_input(3, 2));
        let err = db
            .store_epoch_and_inputs(addr, vec![entry], 2)
            .expect_err("gap should be rejected");
        assert!(matches!(err, DbError::OooInsert("input", 3)));

        // nothing from the failed batch may be visible
        assert!(db.get_inputs(addr).unwrap().is_empty());
        assert!(db.get_epoch(10, addr).unwrap().is_none());
        assert_eq!(db.get_input_index(addr).unwrap(), 0);
    }

    #[test]
    fn test_empty_batch_advances_cursor_only() {
        let db = get_db();
        let app = test_app(1);
        let addr = app.contract_address;
        db.put_application(app).unwrap();

        db.store_epoch_and_inputs(addr, vec![], 55).unwrap();
        let stored = db.get_application(addr).unwrap().unwrap();
        assert_eq!(stored.last_processed_block, 55);
        assert!(db.get_inputs(addr).unwrap().is_empty());

        // cursor never regresses
        db.store_epoch_and_inputs(addr, vec![], 40).unwrap();
        let stored = db.get_application(addr).unwrap().unwrap();
        assert_eq!(stored.last_processed_block, 55);
    }

    #[test]
    fn test_get_epoch_only_returns_open() {
        let db = get_db();
        let app = test_app(1);
        let addr = app.contract_address;
        db.put_application(app).unwrap();

        let mut closed = Epoch::open_at(0, 10);
        closed.status = EpochStatus::Closed;
        db.store_epoch_and_inputs(addr, vec![EpochWithInputs::new(closed)], 9)
            .unwrap();
        assert!(db.get_epoch(10, addr).unwrap().is_none());

        db.store_epoch_and_inputs(addr, vec![EpochWithInputs::new(Epoch::open_at(1, 10))], 10)
            .unwrap();
        assert_eq!(db.get_epoch(10, addr).unwrap().unwrap().index, 1);
    }

    #[test]
    fn test_update_epochs_status_gate() {
        let db = get_db();
        let app = test_app(1);
        let addr = app.contract_address;
        db.put_application(app).unwrap();

        let open = Epoch::open_at(0, 10);
        db.store_epoch_and_inputs(addr, vec![EpochWithInputs::new(open.clone())], 5)
            .unwrap();

        // accepting a claim on a still-open epoch is a concurrency loss
        let mut claim = open.clone();
        claim.claim_hash = Some(Buf32::from([9; 32]));
        let err = db.update_epochs(addr, vec![claim.clone()], 20).unwrap_err();
        assert!(matches!(err, DbError::NoUpdate));

        let mut closed = open;
        closed.status = EpochStatus::Closed;
        db.store_epoch_and_inputs(addr, vec![EpochWithInputs::new(closed)], 10)
            .unwrap();
        db.update_epochs(addr, vec![claim], 20).unwrap();

        let stored = db.get_epoch_at(addr, 0).unwrap().unwrap();
        assert_eq!(stored.status, EpochStatus::ClaimAccepted);
        assert_eq!(stored.claim_hash, Some(Buf32::from([9; 32])));
        assert_eq!(
            db.get_application(addr).unwrap().unwrap().last_processed_block,
            20
        );
    }

    #[test]
    fn test_espresso_nonce_post_increment() {
        let db = get_db();
        let sender = Buf20::from([2; 20]);
        let app = Buf20::from([1; 20]);

        assert_eq!(db.get_espresso_nonce(sender, app).unwrap(), 0);
        assert_eq!(db.update_espresso_nonce(sender, app).unwrap(), 0);
        assert_eq!(db.update_espresso_nonce(sender, app).unwrap(), 1);
        assert_eq!(db.get_espresso_nonce(sender, app).unwrap(), 2);

        // independent per (sender, app)
        let other = Buf20::from([3; 20]);
        assert_eq!(db.get_espresso_nonce(other, app).unwrap(), 0);
    }

    #[test]
    fn test_output_execution_update() {
        let db = get_db();
        let app = test_app(1);
        let addr = app.contract_address;
        db.put_application(app).unwrap();

        let missing = Output {
            index: 0,
            input_index: 0,
            raw_data: vec![1],
            execution_transaction_hash: Some(Buf32::from([4; 32])),
        };
        let err = db
            .update_output_execution(addr, vec![missing.clone()], 30)
            .unwrap_err();
        assert!(matches!(err, DbError::NoUpdate));

        db.put_output(
            addr,
            Output {
                index: 0,
                input_index: 0,
                raw_data: vec![1],
                execution_transaction_hash: None,
            },
        )
        .unwrap();
        db.update_output_execution(addr, vec![missing], 30).unwrap();
        let stored = db.get_output(addr, 0).unwrap().unwrap();
        assert_eq!(stored.execution_transaction_hash, Some(Buf32::from([4; 32])));
    }

    #[test]
    fn test_reports_filter_by_input() {
        let db = get_db();
        let addr = Buf20::from([1; 20]);
        for (i, input) in [(0u64, 0u64), (1, 0), (2, 1)] {
            db.put_report(
                addr,
                Report {
                    index: i,
                    input_index: input,
                    raw_data: vec![i as u8],
                },
            )
            .unwrap();
        }

        assert_eq!(db.get_reports(addr, None).unwrap().len(), 3);
        let for_input0 = db.get_reports(addr, Some(0)).unwrap();
        assert_eq!(for_input0.len(), 2);
        assert!(for_input0.iter().all(|r| r.input_index == 0));
    }

    #[test]
    fn test_espresso_block_cursor() {
        let db = get_db();
        let addr = Buf20::from([1; 20]);
        assert_eq!(db.get_last_processed_espresso_block(addr).unwrap(), 0);
        db.update_last_processed_espresso_block(addr, 123).unwrap();
        assert_eq!(db.get_last_processed_espresso_block(addr).unwrap(), 123);
    }

    #[test]
    fn test_running_applications_filters_disabled() {
        let db = get_db();
        let mut a = test_app(1);
        a.enabled = false;
        db.put_application(a).unwrap();
        db.put_application(test_app(2)).unwrap();

        let running = db.get_all_running_applications().unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].contract_address, Buf20::from([2; 20]));
    }
}
