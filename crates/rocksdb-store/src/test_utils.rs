use std::sync::Arc;

use rockbound::OptimisticTransactionDB;
use tempfile::TempDir;

/// Opens a throwaway database instance in a temp dir.
pub fn get_rocksdb_tmp_instance() -> anyhow::Result<Arc<OptimisticTransactionDB>> {
    let mut opts = rockbound::rocksdb::Options::default();
    opts.create_missing_column_families(true);
    opts.create_if_missing(true);

    let temp_dir = TempDir::new().expect("failed to create temp dir");

    let db = OptimisticTransactionDB::open(
        temp_dir.into_path(),
        crate::ROCKSDB_NAME,
        crate::STORE_COLUMN_FAMILIES.iter().map(|s| s.to_string()),
        &opts,
    )?;

    Ok(Arc::new(db))
}
