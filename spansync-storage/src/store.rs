//! Record store: durable keyed storage for individual transactions.
//!
//! Records are deduplicated by natural key `(from_card, to_card,
//! added_at)`. The store assigns `id` on first insert and preserves it
//! on later upserts of the same natural key. No business meaning of
//! amount or status is interpreted here.

use std::collections::HashMap;

use async_trait::async_trait;
use spansync_core::{new_transaction_id, CacheResult, NaturalKey, TimeRange, Transaction};

/// Storage trait for transaction records.
///
/// Implementations must be thread-safe; `upsert_all` must be atomic
/// with respect to concurrent readers.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert or replace a record by natural key.
    async fn upsert(&self, tx: Transaction) -> CacheResult<()>;

    /// Apply [`TransactionStore::upsert`] to a batch as one atomic write.
    async fn upsert_all(&self, txs: Vec<Transaction>) -> CacheResult<()>;

    /// Records involving `card` (either side) with `added_at` inside the
    /// closed `range`, ascending by `added_at`.
    async fn query_between(&self, card: &str, range: TimeRange) -> CacheResult<Vec<Transaction>>;

    /// True when at least one record matches `query_between`.
    async fn exists_between(&self, card: &str, range: TimeRange) -> CacheResult<bool>;

    /// Total number of stored records.
    async fn count(&self) -> CacheResult<u64>;

    /// Delete everything.
    async fn clear(&self) -> CacheResult<()>;
}

/// In-memory record store keyed by natural key.
#[derive(Debug, Default)]
pub struct MemoryTransactionStore {
    records: tokio::sync::RwLock<HashMap<NaturalKey, Transaction>>,
}

impl MemoryTransactionStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert_locked(map: &mut HashMap<NaturalKey, Transaction>, mut tx: Transaction) {
        let key = tx.natural_key();
        match map.get(&key) {
            // Replace-by-natural-key keeps the originally assigned id.
            Some(existing) => tx.id = existing.id,
            None => {
                if tx.id.is_none() {
                    tx.id = Some(new_transaction_id());
                }
            }
        }
        map.insert(key, tx);
    }

    /// Snapshot of every stored record, unordered. Test support.
    pub async fn all(&self) -> Vec<Transaction> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn upsert(&self, tx: Transaction) -> CacheResult<()> {
        let mut records = self.records.write().await;
        Self::upsert_locked(&mut records, tx);
        Ok(())
    }

    async fn upsert_all(&self, txs: Vec<Transaction>) -> CacheResult<()> {
        // One write guard for the whole batch keeps readers from
        // observing a half-applied merge.
        let mut records = self.records.write().await;
        for tx in txs {
            Self::upsert_locked(&mut records, tx);
        }
        Ok(())
    }

    async fn query_between(&self, card: &str, range: TimeRange) -> CacheResult<Vec<Transaction>> {
        let records = self.records.read().await;
        let mut hits: Vec<Transaction> = records
            .values()
            .filter(|tx| tx.involves_card(card) && range.contains(tx.added_at))
            .cloned()
            .collect();
        hits.sort_by_key(|tx| tx.added_at);
        Ok(hits)
    }

    async fn exists_between(&self, card: &str, range: TimeRange) -> CacheResult<bool> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .any(|tx| tx.involves_card(card) && range.contains(tx.added_at)))
    }

    async fn count(&self) -> CacheResult<u64> {
        Ok(self.records.read().await.len() as u64)
    }

    async fn clear(&self) -> CacheResult<()> {
        self.records.write().await.clear();
        Ok(())
    }
}
