//! Upstream source capability, one implementation per card prefix.

use std::collections::HashMap;

use async_trait::async_trait;
use spansync_core::{CacheResult, CardNumber, TimeRange, Transaction};

/// An upstream transaction backend (one per card network).
///
/// The contract is deliberately small: given cards it owns and a time
/// window, return whatever records exist or fail as a whole. A
/// successful return covers *every* requested card for the window -
/// a card absent from the map simply had nothing, which the engine
/// treats as verified coverage. Failures map to
/// [`spansync_core::CacheError::SourceUnavailable`]; retry policy, if
/// any, belongs inside the implementation, never in the engine.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// The card prefix this source owns, e.g. "8600".
    fn prefix(&self) -> &str;

    /// Fetch records for the given cards inside the closed window.
    async fn fetch_between(
        &self,
        cards: &[CardNumber],
        range: TimeRange,
    ) -> CacheResult<HashMap<CardNumber, Vec<Transaction>>>;
}
