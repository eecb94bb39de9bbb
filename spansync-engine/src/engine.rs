//! The reconciliation engine: interval-gap analysis between a
//! requested window and a card's covering range.
//!
//! Every query runs inside the card's exclusive section
//! ([`RangeCache::lock_card`]) so concurrent queries for the same card
//! cannot interleave a stale covering-range write. Queries for
//! distinct cards proceed in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use spansync_core::{CacheError, CacheResult, CardNumber, TimeRange, Timestamp, Transaction};
use spansync_storage::{Lookup, RangeCache, RangeIndex, TransactionStore};

use crate::router::SourceRouter;

/// Coordinates the range cache and the source router.
pub struct ReconciliationEngine<S, R>
where
    S: TransactionStore,
    R: RangeIndex,
{
    cache: Arc<RangeCache<S, R>>,
    router: Arc<SourceRouter>,
}

impl<S, R> ReconciliationEngine<S, R>
where
    S: TransactionStore,
    R: RangeIndex,
{
    pub fn new(cache: Arc<RangeCache<S, R>>, router: Arc<SourceRouter>) -> Self {
        Self { cache, router }
    }

    /// Get a reference to the underlying cache.
    pub fn cache(&self) -> &RangeCache<S, R> {
        &self.cache
    }

    /// The inbound query operation: all transactions for each card
    /// between `from` and `to`.
    ///
    /// A reversed window is normalized, never rejected. An empty card
    /// list, a malformed card, or an unregistered prefix aborts the
    /// whole batch; an unavailable source only drops its own cards. A
    /// card whose sources had nothing yields no entry at all.
    pub async fn get_by_date_between(
        &self,
        cards: &[CardNumber],
        from: Timestamp,
        to: Timestamp,
    ) -> CacheResult<HashMap<CardNumber, Vec<Transaction>>> {
        if cards.is_empty() {
            return Err(CacheError::invalid("cards must not be empty"));
        }
        if from > to {
            info!("normalizing reversed query window");
        }
        let range = TimeRange::new(from, to);

        // Validate routing up front: NoSourceForPrefix and malformed
        // cards abort before any card is touched.
        for card in cards {
            self.router.route(card)?;
        }

        let mut response = HashMap::new();
        let mut uncovered: Vec<CardNumber> = Vec::new();
        let mut seen = HashSet::new();

        for card in cards {
            // Repeated card numbers are processed once.
            if !seen.insert(card.as_str()) {
                continue;
            }
            if self.cache.is_covered(card).await? {
                match self.query_card_guarded(card, range).await {
                    Ok(txs) => {
                        if !txs.is_empty() {
                            response.insert(card.clone(), txs);
                        }
                    }
                    Err(err) if err.is_recoverable() => {
                        warn!(card = %card, %err, "card dropped from batch");
                    }
                    Err(err) => return Err(err),
                }
            } else {
                uncovered.push(card.clone());
            }
        }

        if !uncovered.is_empty() {
            let batch = self.query_uncovered_batch(&uncovered, range).await?;
            response.extend(batch);
        }

        Ok(response)
    }

    /// Single-card query entry point.
    pub async fn query_card(
        &self,
        card: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> CacheResult<Vec<Transaction>> {
        self.query_card_guarded(card, TimeRange::new(from, to)).await
    }

    async fn query_card_guarded(
        &self,
        card: &str,
        range: TimeRange,
    ) -> CacheResult<Vec<Transaction>> {
        let _section = self.cache.lock_card(card).await;
        self.query_locked(card, range).await
    }

    /// Cards with no covering range: one grouped dispatch for the whole
    /// set, all card sections held for the duration.
    async fn query_uncovered_batch(
        &self,
        cards: &[CardNumber],
        range: TimeRange,
    ) -> CacheResult<HashMap<CardNumber, Vec<Transaction>>> {
        let _sections = self.cache.lock_cards(cards).await;

        // A concurrent query may have covered some of these cards while
        // we waited for their sections; those take the per-card path.
        let mut still_uncovered = Vec::new();
        let mut response = HashMap::new();
        for card in cards {
            if self.cache.is_covered(card).await? {
                match self.query_locked(card, range).await {
                    Ok(txs) => {
                        if !txs.is_empty() {
                            response.insert(card.clone(), txs);
                        }
                    }
                    Err(err) if err.is_recoverable() => {
                        warn!(card = %card, %err, "card dropped from batch");
                    }
                    Err(err) => return Err(err),
                }
            } else {
                still_uncovered.push(card.clone());
            }
        }

        let fetched = self.router.fetch_grouped(&still_uncovered, range).await?;
        let mut recorded = Vec::new();
        for card in still_uncovered {
            // Absent cards belonged to a failed source group: nothing
            // was verified, so neither records nor range are written.
            if let Some(txs) = fetched.get(&card) {
                self.cache.record(&card, range, txs.clone()).await?;
                recorded.push(card);
            }
        }
        // Read back only after every group has landed, so a card sees
        // records it participates in even when another card's source
        // fetched them.
        for card in recorded {
            let txs = self.stored_hit(&card, range).await?;
            if !txs.is_empty() {
                response.insert(card, txs);
            }
        }
        Ok(response)
    }

    /// The gap algorithm for one card. Must run inside the card's
    /// exclusive section.
    async fn query_locked(&self, card: &str, range: TimeRange) -> CacheResult<Vec<Transaction>> {
        let Lookup { covered, hit } = self.cache.lookup(card, range).await?;

        let Some(covered) = covered else {
            // Wholly uncached: fetch the full window. A failure leaves
            // no trace; an empty success still verifies the window.
            let txs = self.router.fetch_one(card, range).await?;
            self.cache.record(card, range, txs).await?;
            return self.stored_hit(card, range).await;
        };

        if hit.is_empty() {
            return self.relocate(card, range, covered).await;
        }
        self.extend(card, range, covered, hit).await
    }

    /// Empty hit with an existing covering range: fetch the requested
    /// window widened to abut the covering range, so the union stays
    /// one contiguous interval and the boundary instant is never
    /// fetched twice.
    async fn relocate(
        &self,
        card: &str,
        range: TimeRange,
        covered: TimeRange,
    ) -> CacheResult<Vec<Transaction>> {
        let from = if covered.to < range.from {
            covered.just_after()
        } else {
            range.from
        };
        let to = if covered.from > range.to {
            covered.just_before()
        } else {
            range.to
        };
        let effective = TimeRange { from, to };
        debug!(card, ?effective, "relocate fetch");

        let txs = self.router.fetch_one(card, effective).await?;
        // Record against the window actually verified, not the request.
        self.cache.record(card, effective, txs).await?;
        self.stored_hit(card, range).await
    }

    /// Non-empty hit: fetch whichever sides of the covering range the
    /// request extends past, merge, and grow the range only along the
    /// sides that were actually obtained.
    async fn extend(
        &self,
        card: &str,
        range: TimeRange,
        covered: TimeRange,
        hit: Vec<Transaction>,
    ) -> CacheResult<Vec<Transaction>> {
        let below = range.from < covered.from;
        let above = range.to > covered.to;

        if !below && !above {
            // Fully inside the covering range: zero fetches.
            return Ok(hit);
        }

        let below_window = TimeRange {
            from: range.from,
            to: covered.just_before(),
        };
        let above_window = TimeRange {
            from: covered.just_after(),
            to: range.to,
        };

        // The two gap fetches are independent; issue them concurrently.
        let (below_result, above_result) = tokio::join!(
            async {
                if below {
                    Some(self.router.fetch_one(card, below_window).await)
                } else {
                    None
                }
            },
            async {
                if above {
                    Some(self.router.fetch_one(card, above_window).await)
                } else {
                    None
                }
            },
        );

        let mut fetched = Vec::new();
        let mut verified = covered;

        match below_result {
            Some(Ok(txs)) => {
                verified.from = range.from;
                fetched.extend(txs);
            }
            Some(Err(err)) => warn!(card, %err, "lower gap fetch skipped"),
            None => {}
        }
        match above_result {
            Some(Ok(txs)) => {
                verified.to = range.to;
                fetched.extend(txs);
            }
            Some(Err(err)) => warn!(card, %err, "upper gap fetch skipped"),
            None => {}
        }

        if verified == covered {
            // Every gap fetch failed: serve the hit, claim nothing new.
            return Ok(hit);
        }
        self.cache.record(card, verified, fetched).await?;
        self.stored_hit(card, range).await
    }

    /// Read the reply back out of the store so it carries the
    /// store-assigned ids and the store's ordering.
    async fn stored_hit(&self, card: &str, range: TimeRange) -> CacheResult<Vec<Transaction>> {
        self.cache.store().query_between(card, range).await
    }

    /// Re-fetch every covered card's full covering window and upsert
    /// the result.
    ///
    /// Repairs records whose amount or status drifted at the source.
    /// Covering ranges are left untouched; a card covered by a
    /// verified-empty window is refreshed like any other, since its
    /// records may exist upstream by now. Skips cards whose source is
    /// unavailable.
    pub async fn refresh_all(&self) -> CacheResult<()> {
        let cards = self.cache.cards().await?;
        if cards.is_empty() {
            debug!("refresh skipped, nothing covered");
            return Ok(());
        }

        for card in cards {
            let _section = self.cache.lock_card(&card).await;
            let Some(covered) = self.cache.covered_range(&card).await? else {
                continue;
            };
            match self.router.fetch_one(&card, covered).await {
                // Union with the identical window leaves the range as-is.
                Ok(txs) => self.cache.record(&card, covered, txs).await?,
                Err(err) if err.is_recoverable() => {
                    warn!(card = %card, %err, "refresh skipped for card");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Drop the whole cache. Thin delegate for the scheduler.
    pub async fn invalidate_all(&self) -> CacheResult<()> {
        self.cache.invalidate_all().await
    }
}
