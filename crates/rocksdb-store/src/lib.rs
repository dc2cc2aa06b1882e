pub mod db;
pub mod macros;
pub mod schemas;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

use std::path::Path;
use std::sync::Arc;

use rockbound::{schema::ColumnFamilyName, OptimisticTransactionDB, Schema};

use crate::schemas::{
    ApplicationSchema, EpochSchema, EspressoBlockSchema, EspressoNonceSchema, InputIndexSchema,
    InputSchema, LastEpochSchema, OutputSchema, ReportSchema,
};

pub use db::NodeDb;

pub const ROCKSDB_NAME: &str = "rollups";

pub const STORE_COLUMN_FAMILIES: &[ColumnFamilyName] = &[
    ApplicationSchema::COLUMN_FAMILY_NAME,
    EpochSchema::COLUMN_FAMILY_NAME,
    LastEpochSchema::COLUMN_FAMILY_NAME,
    InputSchema::COLUMN_FAMILY_NAME,
    OutputSchema::COLUMN_FAMILY_NAME,
    ReportSchema::COLUMN_FAMILY_NAME,
    EspressoNonceSchema::COLUMN_FAMILY_NAME,
    InputIndexSchema::COLUMN_FAMILY_NAME,
    EspressoBlockSchema::COLUMN_FAMILY_NAME,
];

/// Opens (creating if missing) the node database at `path`.
pub fn open_rocksdb_database(path: &Path) -> anyhow::Result<Arc<OptimisticTransactionDB>> {
    let mut opts = rockbound::rocksdb::Options::default();
    opts.create_missing_column_families(true);
    opts.create_if_missing(true);

    let db = OptimisticTransactionDB::open(
        path,
        ROCKSDB_NAME,
        STORE_COLUMN_FAMILIES.iter().map(|s| s.to_string()),
        &opts,
    )?;
    Ok(Arc::new(db))
}
