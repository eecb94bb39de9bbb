//! Covering-range index: card number -> single covering interval.
//!
//! Absence of an entry means the card is wholly uncached. The index
//! itself replaces entries unconditionally; monotonic growth of the
//! covering range is enforced by [`crate::RangeCache`], its only caller.

use std::collections::HashMap;

use async_trait::async_trait;
use spansync_core::{CacheResult, CardNumber, TimeRange};

/// Storage trait for per-card covering ranges.
#[async_trait]
pub trait RangeIndex: Send + Sync {
    /// The covering range for a card, if any.
    async fn get(&self, card: &str) -> CacheResult<Option<TimeRange>>;

    /// Replace the covering range unconditionally.
    async fn set(&self, card: &str, range: TimeRange) -> CacheResult<()>;

    /// Remove a card's covering range.
    async fn delete(&self, card: &str) -> CacheResult<()>;

    /// Every card that currently has a covering range.
    async fn cards(&self) -> CacheResult<Vec<CardNumber>>;

    /// True when no card has a covering range.
    async fn is_empty(&self) -> CacheResult<bool>;

    /// Delete all covering ranges.
    async fn clear(&self) -> CacheResult<()>;
}

/// In-memory covering-range index.
#[derive(Debug, Default)]
pub struct MemoryRangeIndex {
    ranges: tokio::sync::RwLock<HashMap<CardNumber, TimeRange>>,
}

impl MemoryRangeIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RangeIndex for MemoryRangeIndex {
    async fn get(&self, card: &str) -> CacheResult<Option<TimeRange>> {
        Ok(self.ranges.read().await.get(card).copied())
    }

    async fn set(&self, card: &str, range: TimeRange) -> CacheResult<()> {
        self.ranges.write().await.insert(card.to_string(), range);
        Ok(())
    }

    async fn delete(&self, card: &str) -> CacheResult<()> {
        self.ranges.write().await.remove(card);
        Ok(())
    }

    async fn cards(&self) -> CacheResult<Vec<CardNumber>> {
        Ok(self.ranges.read().await.keys().cloned().collect())
    }

    async fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.ranges.read().await.is_empty())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.ranges.write().await.clear();
        Ok(())
    }
}
