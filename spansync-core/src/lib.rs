//! Spansync Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no cache or routing logic.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod range;
pub mod transaction;

pub use config::SyncConfig;
pub use error::{CacheError, CacheResult, StorageError};
pub use range::{epsilon, TimeRange};
pub use transaction::{NaturalKey, Transaction, TransactionStatus};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Transaction identifier using UUIDv7 for timestamp-sortable IDs.
/// Assigned by the record store on first insert, never by callers.
pub type TransactionId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Card number, e.g. "8600123412341234". Opaque to the cache; its
/// leading [`CARD_PREFIX_LEN`] characters route it to an upstream source.
pub type CardNumber = String;

/// Length of the routing prefix at the start of a card number.
pub const CARD_PREFIX_LEN: usize = 4;

/// Generate a new timestamp-sortable TransactionId.
pub fn new_transaction_id() -> TransactionId {
    Uuid::now_v7()
}

/// Extract the routing prefix of a card number.
///
/// Returns `None` when the card is shorter than the prefix length
/// (callers surface this as `InvalidArgument`).
pub fn card_prefix(card: &str) -> Option<&str> {
    card.get(..CARD_PREFIX_LEN)
}
