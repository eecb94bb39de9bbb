//! Range cache: record store + covering-range index behind one
//! coherent operation, serialized per card.
//!
//! [`RangeCache::record`] is the sole mutation entry point and owns the
//! covering-range invariant: a card's range, once set, only ever grows
//! (is replaced by a superset via union) or is deleted wholesale by
//! [`RangeCache::invalidate_all`]. It is never shrunk or split.
//!
//! # Concurrency discipline
//!
//! Callers acquire a [`CardGuard`] for the whole lookup -> fetch ->
//! record sequence of one card. Guards for distinct cards never
//! contend. `invalidate_all` takes the write side of a global barrier
//! and therefore excludes every in-flight card section.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, RwLock};
use tracing::debug;

use spansync_core::{CacheResult, CardNumber, TimeRange, Transaction};

use crate::range_index::RangeIndex;
use crate::store::TransactionStore;

/// Result of a cache lookup for one card and window.
#[derive(Debug, Clone)]
pub struct Lookup {
    /// The card's covering range, if the card is cached at all.
    pub covered: Option<TimeRange>,
    /// Stored records inside the requested window, ascending by time.
    pub hit: Vec<Transaction>,
}

/// Exclusive critical section for a single card.
///
/// Holds a shared read guard on the global invalidation barrier plus
/// the card's own mutex. Dropping the guard ends the section.
pub struct CardGuard {
    _barrier: OwnedRwLockReadGuard<()>,
    _card: OwnedMutexGuard<()>,
}

/// Exclusive critical section for several cards at once.
///
/// Card mutexes are acquired in sorted order so two overlapping batch
/// sections cannot deadlock, and one shared barrier guard covers the
/// whole set.
pub struct CardsGuard {
    _barrier: OwnedRwLockReadGuard<()>,
    _cards: Vec<OwnedMutexGuard<()>>,
}

/// Composition of a [`TransactionStore`] and a [`RangeIndex`].
pub struct RangeCache<S, R>
where
    S: TransactionStore,
    R: RangeIndex,
{
    store: Arc<S>,
    index: Arc<R>,
    /// Write side taken by `invalidate_all`, read side by card guards.
    barrier: Arc<RwLock<()>>,
    /// One mutex per card ever locked, shared across clones so a card's
    /// section stays exclusive workspace-wide. Cards are few (one per
    /// cached card number); entries are only dropped with the whole cache.
    locks: Arc<Mutex<HashMap<CardNumber, Arc<Mutex<()>>>>>,
}

impl<S, R> RangeCache<S, R>
where
    S: TransactionStore,
    R: RangeIndex,
{
    /// Create a new range cache over the given backends.
    pub fn new(store: Arc<S>, index: Arc<R>) -> Self {
        Self {
            store,
            index,
            barrier: Arc::new(RwLock::new(())),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get a reference to the record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a reference to the range index.
    pub fn index(&self) -> &R {
        &self.index
    }

    async fn card_mutex(&self, card: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(card.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Enter the exclusive section for one card.
    pub async fn lock_card(&self, card: &str) -> CardGuard {
        let barrier = self.barrier.clone().read_owned().await;
        let mutex = self.card_mutex(card).await;
        let guard = mutex.lock_owned().await;
        CardGuard {
            _barrier: barrier,
            _card: guard,
        }
    }

    /// Enter the exclusive section for a set of cards.
    pub async fn lock_cards(&self, cards: &[CardNumber]) -> CardsGuard {
        let barrier = self.barrier.clone().read_owned().await;

        let mut sorted: Vec<&CardNumber> = cards.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for card in sorted {
            let mutex = self.card_mutex(card).await;
            guards.push(mutex.lock_owned().await);
        }
        CardsGuard {
            _barrier: barrier,
            _cards: guards,
        }
    }

    /// Read the covering range and the stored records inside `range`.
    pub async fn lookup(&self, card: &str, range: TimeRange) -> CacheResult<Lookup> {
        let covered = self.index.get(card).await?;
        let hit = self.store.query_between(card, range).await?;
        debug!(card, hits = hit.len(), covered = covered.is_some(), "cache lookup");
        Ok(Lookup { covered, hit })
    }

    /// Merge fetched records into the store and grow the covering range.
    ///
    /// The new range is the union of the prior range (if any) and
    /// `window` - the window actually verified against the source, not
    /// necessarily the window the caller originally asked for.
    pub async fn record(
        &self,
        card: &str,
        window: TimeRange,
        txs: Vec<Transaction>,
    ) -> CacheResult<()> {
        debug!(card, records = txs.len(), "recording fetched window");
        self.store.upsert_all(txs).await?;
        let merged = match self.index.get(card).await? {
            Some(prior) => prior.union(&window),
            None => window,
        };
        self.index.set(card, merged).await
    }

    /// True iff no records are stored at all.
    pub async fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.store.count().await? == 0)
    }

    /// Marker presence for a card. This deliberately checks the range
    /// index, not record presence: a verified-but-empty window is
    /// still covered.
    pub async fn is_covered(&self, card: &str) -> CacheResult<bool> {
        Ok(self.index.get(card).await?.is_some())
    }

    /// The covering range for a card, if any.
    pub async fn covered_range(&self, card: &str) -> CacheResult<Option<TimeRange>> {
        self.index.get(card).await
    }

    /// Every card with a covering range.
    pub async fn cards(&self) -> CacheResult<Vec<CardNumber>> {
        self.index.cards().await
    }

    /// Drop every record and covering range.
    ///
    /// Excludes all per-card sections: waits for in-flight guards to be
    /// released and blocks new ones until the clear finishes.
    pub async fn invalidate_all(&self) -> CacheResult<()> {
        let _write = self.barrier.write().await;
        debug!("invalidating whole cache");
        self.store.clear().await?;
        self.index.clear().await
    }
}

impl<S, R> Clone for RangeCache<S, R>
where
    S: TransactionStore,
    R: RangeIndex,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            index: Arc::clone(&self.index),
            barrier: Arc::clone(&self.barrier),
            locks: Arc::clone(&self.locks),
        }
    }
}
