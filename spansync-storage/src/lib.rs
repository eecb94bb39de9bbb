//! Spansync Storage - Storage Traits and In-Memory Backends
//!
//! Defines the storage abstraction layer for the transaction cache:
//! the record store, the per-card covering-range index, and the
//! [`RangeCache`] that composes them behind one coherent operation.
//! Durable implementations plug in behind the same traits.

pub mod range_cache;
pub mod range_index;
pub mod store;

pub use range_cache::{CardGuard, CardsGuard, Lookup, RangeCache};
pub use range_index::{MemoryRangeIndex, RangeIndex};
pub use store::{MemoryTransactionStore, TransactionStore};
