//! In-memory sequencer used by reader tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{EspressoClient, EspressoClientError, EspressoHeader, EspressoResult};

#[derive(Default)]
struct Inner {
    latest: u64,
    headers: HashMap<u64, EspressoHeader>,
    ns_tables: HashMap<u64, Vec<u8>>,
    transactions: HashMap<(u64, u64), Vec<Vec<u8>>>,
}

/// Deterministic [`EspressoClient`]. Height queries can be made to fail a
/// number of times to exercise the reader's backoff.
#[derive(Default)]
pub struct TestEspressoClient {
    inner: Mutex<Inner>,
    fail_latest: AtomicU32,
}

impl TestEspressoClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latest(&self, height: u64) {
        self.inner.lock().unwrap().latest = height;
    }

    pub fn put_header(&self, height: u64, header: EspressoHeader) {
        self.inner.lock().unwrap().headers.insert(height, header);
    }

    pub fn put_ns_table(&self, height: u64, table: Vec<u8>) {
        self.inner.lock().unwrap().ns_tables.insert(height, table);
    }

    pub fn push_transaction(&self, height: u64, namespace: u64, raw: Vec<u8>) {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .entry((height, namespace))
            .or_default()
            .push(raw);
    }

    /// The next `count` latest-height queries will fail.
    pub fn fail_next_latest(&self, count: u32) {
        self.fail_latest.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl EspressoClient for TestEspressoClient {
    async fn latest_block_height(&self) -> EspressoResult<u64> {
        let remaining = self.fail_latest.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_latest.store(remaining - 1, Ordering::SeqCst);
            return Err(EspressoClientError::Decode(
                "injected latest-height failure".to_string(),
            ));
        }
        Ok(self.inner.lock().unwrap().latest)
    }

    async fn header(&self, height: u64) -> EspressoResult<EspressoHeader> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .headers
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }

    async fn namespace_tables(&self, from: u64, to: u64) -> EspressoResult<Vec<Vec<u8>>> {
        let inner = self.inner.lock().unwrap();
        Ok((from..=to)
            .map(|h| inner.ns_tables.get(&h).cloned().unwrap_or_default())
            .collect())
    }

    async fn transactions_in_block(
        &self,
        height: u64,
        namespace: u64,
    ) -> EspressoResult<Vec<Vec<u8>>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transactions
            .get(&(height, namespace))
            .cloned()
            .unwrap_or_default())
    }
}
