//! Periodic maintenance jobs: full invalidation and drift refresh.
//!
//! Both jobs run on plain tokio intervals spawned at startup. The
//! first tick of a `tokio::time::interval` fires immediately, so each
//! loop ticks once before doing any work to get a true delay.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use spansync_core::SyncConfig;
use spansync_storage::{RangeIndex, TransactionStore};

use crate::engine::ReconciliationEngine;

/// Spawn the periodic full-invalidation job.
///
/// Returns `None` when scheduling is disabled in the config.
pub fn spawn_invalidator<S, R>(
    engine: Arc<ReconciliationEngine<S, R>>,
    config: &SyncConfig,
) -> Option<JoinHandle<()>>
where
    S: TransactionStore + 'static,
    R: RangeIndex + 'static,
{
    if !config.scheduling_enabled {
        info!("scheduling disabled, invalidation job not started");
        return None;
    }
    let every = config.invalidate_every;
    info!(?every, "starting invalidation job");
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            info!("periodic cache invalidation");
            if let Err(err) = engine.invalidate_all().await {
                error!(%err, "cache invalidation failed");
            }
        }
    }))
}

/// Spawn the periodic refresh job that re-fetches every cached window.
///
/// Returns `None` when scheduling is disabled in the config.
pub fn spawn_refresher<S, R>(
    engine: Arc<ReconciliationEngine<S, R>>,
    config: &SyncConfig,
) -> Option<JoinHandle<()>>
where
    S: TransactionStore + 'static,
    R: RangeIndex + 'static,
{
    if !config.scheduling_enabled {
        info!("scheduling disabled, refresh job not started");
        return None;
    }
    let every = config.refresh_every;
    info!(?every, "starting refresh job");
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            info!("periodic cache refresh");
            if let Err(err) = engine.refresh_all().await {
                error!(%err, "cache refresh failed");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::SourceRouter;
    use crate::source::TransactionSource;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::{TimeZone, Utc};
    use spansync_core::{
        CacheResult, CardNumber, TimeRange, Timestamp, Transaction, TransactionStatus,
    };
    use spansync_storage::{MemoryRangeIndex, MemoryTransactionStore, RangeCache};
    use std::collections::HashMap;
    use std::time::Duration;

    const UZCARD: &str = "8600111122223333";
    const HUMO: &str = "9860444455556666";

    fn day(d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2023, 3, d, 0, 0, 0).unwrap()
    }

    struct FixedSource;

    #[async_trait]
    impl TransactionSource for FixedSource {
        fn prefix(&self) -> &str {
            "8600"
        }

        async fn fetch_between(
            &self,
            cards: &[CardNumber],
            _range: TimeRange,
        ) -> CacheResult<HashMap<CardNumber, Vec<Transaction>>> {
            let mut out = HashMap::new();
            for card in cards {
                out.insert(
                    card.clone(),
                    vec![Transaction {
                        id: None,
                        amount: BigDecimal::from(100),
                        from_card: card.clone(),
                        to_card: HUMO.to_string(),
                        status: TransactionStatus::Success,
                        added_at: day(5),
                    }],
                );
            }
            Ok(out)
        }
    }

    fn make_engine() -> Arc<ReconciliationEngine<MemoryTransactionStore, MemoryRangeIndex>> {
        let router = SourceRouter::builder()
            .register(Arc::new(FixedSource))
            .unwrap()
            .build();
        let cache = Arc::new(RangeCache::new(
            Arc::new(MemoryTransactionStore::new()),
            Arc::new(MemoryRangeIndex::new()),
        ));
        Arc::new(ReconciliationEngine::new(cache, Arc::new(router)))
    }

    #[tokio::test]
    async fn test_disabled_scheduling_spawns_nothing() {
        let engine = make_engine();
        let config = SyncConfig::new().with_scheduling(false);
        assert!(spawn_invalidator(Arc::clone(&engine), &config).is_none());
        assert!(spawn_refresher(engine, &config).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidator_clears_cache_on_schedule() {
        let engine = make_engine();
        engine.query_card(UZCARD, day(1), day(10)).await.unwrap();
        assert!(engine.cache().is_covered(UZCARD).await.unwrap());

        let config = SyncConfig::new().with_invalidate_every(Duration::from_secs(60));
        let handle = spawn_invalidator(Arc::clone(&engine), &config).unwrap();

        // Just short of the interval: nothing happened yet.
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(engine.cache().is_covered(UZCARD).await.unwrap());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!engine.cache().is_covered(UZCARD).await.unwrap());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresher_runs_on_schedule() {
        let engine = make_engine();
        engine.query_card(UZCARD, day(1), day(10)).await.unwrap();

        let config = SyncConfig::new().with_refresh_every(Duration::from_secs(30));
        let handle = spawn_refresher(Arc::clone(&engine), &config).unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;
        // Refresh must leave the covering range untouched.
        assert_eq!(
            engine.cache().covered_range(UZCARD).await.unwrap(),
            Some(TimeRange::new(day(1), day(10)))
        );
        handle.abort();
    }
}
