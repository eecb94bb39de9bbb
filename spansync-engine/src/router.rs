//! Prefix-based source routing.
//!
//! The router maps a card's fixed-length prefix to the registered
//! [`TransactionSource`] that owns it. The table is built once at
//! startup and immutable afterwards; there is exactly one source per
//! distinct prefix.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use spansync_core::{
    card_prefix, CacheError, CacheResult, CardNumber, TimeRange, Transaction, CARD_PREFIX_LEN,
};

use crate::source::TransactionSource;

/// Builder for the immutable routing table.
#[derive(Default)]
pub struct SourceRouterBuilder {
    routes: HashMap<String, Arc<dyn TransactionSource>>,
}

impl SourceRouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its prefix.
    ///
    /// Rejects malformed prefixes and duplicate registrations - the
    /// router requires exactly one source per distinct prefix.
    pub fn register(mut self, source: Arc<dyn TransactionSource>) -> CacheResult<Self> {
        let prefix = source.prefix().to_string();
        if prefix.len() != CARD_PREFIX_LEN {
            return Err(CacheError::invalid(format!(
                "source prefix {prefix:?} must be {CARD_PREFIX_LEN} characters"
            )));
        }
        if self.routes.contains_key(&prefix) {
            return Err(CacheError::invalid(format!(
                "a source for prefix {prefix} is already registered"
            )));
        }
        self.routes.insert(prefix, source);
        Ok(self)
    }

    pub fn build(self) -> SourceRouter {
        SourceRouter {
            routes: self.routes,
        }
    }
}

/// Immutable prefix -> source dispatch table.
pub struct SourceRouter {
    routes: HashMap<String, Arc<dyn TransactionSource>>,
}

impl SourceRouter {
    pub fn builder() -> SourceRouterBuilder {
        SourceRouterBuilder::new()
    }

    /// The source owning a card's prefix.
    ///
    /// `InvalidArgument` for cards shorter than the prefix length,
    /// `NoSourceForPrefix` for an unregistered prefix.
    pub fn route(&self, card: &str) -> CacheResult<&Arc<dyn TransactionSource>> {
        let prefix = card_prefix(card)
            .ok_or_else(|| CacheError::invalid(format!("card number {card:?} is too short")))?;
        self.routes
            .get(prefix)
            .ok_or_else(|| CacheError::NoSourceForPrefix {
                prefix: prefix.to_string(),
            })
    }

    /// Registered prefixes, unordered.
    pub fn prefixes(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    /// Group cards by prefix, validating every card.
    fn group_by_prefix<'a>(
        &self,
        cards: &'a [CardNumber],
    ) -> CacheResult<HashMap<&'a str, Vec<CardNumber>>> {
        let mut groups: HashMap<&str, Vec<CardNumber>> = HashMap::new();
        for card in cards {
            let prefix = card_prefix(card)
                .ok_or_else(|| CacheError::invalid(format!("card number {card:?} is too short")))?;
            groups.entry(prefix).or_default().push(card.clone());
        }
        Ok(groups)
    }

    /// Fetch one card's records; source failures surface to the caller.
    ///
    /// The result is filtered to the window and sorted ascending -
    /// sources are not trusted to do either.
    pub async fn fetch_one(
        &self,
        card: &str,
        range: TimeRange,
    ) -> CacheResult<Vec<Transaction>> {
        let source = self.route(card)?;
        debug!(card, prefix = source.prefix(), "dispatching single-card fetch");
        let mut by_card = source.fetch_between(&[card.to_string()], range).await?;
        let txs = by_card.remove(card).unwrap_or_default();
        Ok(normalize(txs, card, range))
    }

    /// Batched dispatch: one native call per prefix group.
    ///
    /// `InvalidArgument` and `NoSourceForPrefix` abort the whole batch.
    /// A group whose source fails is skipped - its cards are absent
    /// from the result. Cards covered by a successful group but absent
    /// from the source's reply get an explicit empty entry, since their
    /// window was still verified.
    pub async fn fetch_grouped(
        &self,
        cards: &[CardNumber],
        range: TimeRange,
    ) -> CacheResult<HashMap<CardNumber, Vec<Transaction>>> {
        let groups = self.group_by_prefix(cards)?;

        // Resolve every source up front so an unregistered prefix
        // aborts before any network traffic.
        let mut resolved = Vec::with_capacity(groups.len());
        for (prefix, group) in groups {
            let source = self
                .routes
                .get(prefix)
                .ok_or_else(|| CacheError::NoSourceForPrefix {
                    prefix: prefix.to_string(),
                })?;
            resolved.push((source, group));
        }

        let mut response = HashMap::new();
        for (source, group) in resolved {
            debug!(prefix = source.prefix(), cards = group.len(), "dispatching grouped fetch");
            match source.fetch_between(&group, range).await {
                Ok(mut by_card) => {
                    for card in group {
                        let txs = by_card.remove(&card).unwrap_or_default();
                        let txs = normalize(txs, &card, range);
                        response.insert(card, txs);
                    }
                }
                Err(err) if err.is_recoverable() => {
                    warn!(prefix = source.prefix(), %err, "source group skipped");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(response)
    }
}

/// Keep only records for this card inside the window, time-ascending.
fn normalize(mut txs: Vec<Transaction>, card: &str, range: TimeRange) -> Vec<Transaction> {
    txs.retain(|tx| tx.involves_card(card) && range.contains(tx.added_at));
    txs.sort_by_key(|tx| tx.added_at);
    txs
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::{TimeZone, Utc};
    use spansync_core::{Timestamp, TransactionStatus};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn day(d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2023, 3, d, 0, 0, 0).unwrap()
    }

    fn make_tx(from: &str, to: &str, d: u32) -> Transaction {
        Transaction {
            id: None,
            amount: BigDecimal::from(100),
            from_card: from.to_string(),
            to_card: to.to_string(),
            status: TransactionStatus::Success,
            added_at: day(d),
        }
    }

    struct StubSource {
        prefix: &'static str,
        records: Vec<Transaction>,
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl StubSource {
        fn new(prefix: &'static str, records: Vec<Transaction>) -> Self {
            Self {
                prefix,
                records,
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl TransactionSource for StubSource {
        fn prefix(&self) -> &str {
            self.prefix
        }

        async fn fetch_between(
            &self,
            cards: &[CardNumber],
            _range: TimeRange,
        ) -> CacheResult<HashMap<CardNumber, Vec<Transaction>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(CacheError::SourceUnavailable {
                    prefix: self.prefix.to_string(),
                    reason: "stub failure".to_string(),
                });
            }
            let mut out = HashMap::new();
            for card in cards {
                let matching: Vec<Transaction> = self
                    .records
                    .iter()
                    .filter(|tx| tx.involves_card(card))
                    .cloned()
                    .collect();
                if !matching.is_empty() {
                    out.insert(card.clone(), matching);
                }
            }
            Ok(out)
        }
    }

    const UZCARD: &str = "8600111122223333";
    const HUMO: &str = "9860444455556666";

    fn make_router(
        uz: Arc<StubSource>,
        humo: Arc<StubSource>,
    ) -> SourceRouter {
        SourceRouter::builder()
            .register(uz)
            .unwrap()
            .register(humo)
            .unwrap()
            .build()
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let a = Arc::new(StubSource::new("8600", vec![]));
        let b = Arc::new(StubSource::new("8600", vec![]));
        let result = SourceRouter::builder().register(a).unwrap().register(b);
        assert!(matches!(result, Err(CacheError::InvalidArgument { .. })));
    }

    #[test]
    fn test_bad_prefix_length_rejected() {
        let s = Arc::new(StubSource::new("86", vec![]));
        assert!(SourceRouter::builder().register(s).is_err());
    }

    #[test]
    fn test_route_errors() {
        let router = make_router(
            Arc::new(StubSource::new("8600", vec![])),
            Arc::new(StubSource::new("9860", vec![])),
        );
        assert!(router.route(UZCARD).is_ok());
        assert!(matches!(
            router.route("5555000011112222"),
            Err(CacheError::NoSourceForPrefix { .. })
        ));
        assert!(matches!(
            router.route("860"),
            Err(CacheError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_one_filters_and_sorts() {
        let uz = Arc::new(StubSource::new(
            "8600",
            vec![
                make_tx(UZCARD, HUMO, 9),
                make_tx(UZCARD, HUMO, 2),
                make_tx(UZCARD, HUMO, 30),
            ],
        ));
        let router = make_router(uz, Arc::new(StubSource::new("9860", vec![])));

        let txs = router
            .fetch_one(UZCARD, TimeRange::new(day(1), day(10)))
            .await
            .unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].added_at, day(2));
        assert_eq!(txs[1].added_at, day(9));
    }

    #[tokio::test]
    async fn test_fetch_grouped_one_call_per_prefix() {
        let uz = Arc::new(StubSource::new("8600", vec![make_tx(UZCARD, HUMO, 3)]));
        let humo = Arc::new(StubSource::new("9860", vec![]));
        let router = make_router(Arc::clone(&uz), Arc::clone(&humo));

        let other_uz = "8600999988887777".to_string();
        let cards = vec![UZCARD.to_string(), other_uz.clone(), HUMO.to_string()];
        let result = router
            .fetch_grouped(&cards, TimeRange::new(day(1), day(10)))
            .await
            .unwrap();

        assert_eq!(uz.calls.load(Ordering::SeqCst), 1);
        assert_eq!(humo.calls.load(Ordering::SeqCst), 1);
        // Every card of a successful group is present, empty or not.
        assert_eq!(result.len(), 3);
        assert_eq!(result[UZCARD].len(), 1);
        assert!(result[&other_uz].is_empty());
        assert!(result[HUMO].is_empty());
    }

    #[tokio::test]
    async fn test_fetch_grouped_skips_unavailable_group() {
        let uz = Arc::new(StubSource::new("8600", vec![make_tx(UZCARD, HUMO, 3)]));
        let humo = Arc::new(StubSource::new("9860", vec![]));
        humo.fail.store(true, Ordering::SeqCst);
        let router = make_router(uz, humo);

        let cards = vec![UZCARD.to_string(), HUMO.to_string()];
        let result = router
            .fetch_grouped(&cards, TimeRange::new(day(1), day(10)))
            .await
            .unwrap();

        assert!(result.contains_key(UZCARD));
        assert!(!result.contains_key(HUMO));
    }

    #[tokio::test]
    async fn test_fetch_grouped_unregistered_prefix_aborts() {
        let router = make_router(
            Arc::new(StubSource::new("8600", vec![])),
            Arc::new(StubSource::new("9860", vec![])),
        );
        let cards = vec![UZCARD.to_string(), "5555000011112222".to_string()];
        let result = router.fetch_grouped(&cards, TimeRange::new(day(1), day(10))).await;
        assert!(matches!(result, Err(CacheError::NoSourceForPrefix { .. })));
    }
}
