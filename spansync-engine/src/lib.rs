//! Spansync Engine - Source Routing and Range Reconciliation
//!
//! The engine answers "all transactions for card K between A and B" by
//! consulting the [`spansync_storage::RangeCache`] first and fetching
//! only the uncovered sub-windows from the upstream source that owns
//! the card's prefix. Fetched records are merged back and the card's
//! covering range grows to the verified union.
//!
//! Upstream backends implement [`TransactionSource`]; the
//! [`SourceRouter`] holds an immutable prefix table built once at
//! startup. Periodic invalidation and refresh live in [`jobs`].

pub mod engine;
pub mod jobs;
pub mod router;
pub mod source;

pub use engine::ReconciliationEngine;
pub use jobs::{spawn_invalidator, spawn_refresher};
pub use router::{SourceRouter, SourceRouterBuilder};
pub use source::TransactionSource;
