//! Transaction record type and its natural-key identity.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::{CardNumber, Timestamp, TransactionId};

/// Processing status reported by the upstream card network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Success,
    Pending,
    Failed,
}

/// An immutable transaction fact fetched from an upstream source.
///
/// Identity for deduplication is the natural key
/// `(from_card, to_card, added_at)`, not `id`. The store assigns `id`
/// on first insert and preserves it across upserts of the same natural
/// key, so sources never fabricate identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Store-assigned identifier; `None` until first persisted.
    pub id: Option<TransactionId>,
    pub amount: BigDecimal,
    /// Card the money left.
    pub from_card: CardNumber,
    /// Card the money arrived at.
    pub to_card: CardNumber,
    pub status: TransactionStatus,
    /// When the transaction happened at the source.
    pub added_at: Timestamp,
}

/// Natural key of a transaction: `(from_card, to_card, added_at)`.
pub type NaturalKey = (CardNumber, CardNumber, Timestamp);

impl Transaction {
    /// The deduplication key for this record.
    pub fn natural_key(&self) -> NaturalKey {
        (self.from_card.clone(), self.to_card.clone(), self.added_at)
    }

    /// True when the card participates in this transaction on either side.
    pub fn involves_card(&self, card: &str) -> bool {
        self.from_card == card || self.to_card == card
    }
}
