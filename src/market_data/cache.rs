use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Clock, Interval, MarketDataProvider, Period, SystemClock};
use crate::types::PriceHistory;

struct CacheEntry {
    fetched_at: DateTime<Utc>,
    history: PriceHistory,
}

/// Time-bounded cache in front of another provider.
///
/// Only successful, non-empty fetches are cached. Entries older than the TTL
/// are refetched.
pub struct CachedProvider<P, C = SystemClock> {
    inner: P,
    clock: C,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl<P: MarketDataProvider> CachedProvider<P, SystemClock> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self::with_clock(inner, ttl, SystemClock::new())
    }
}

impl<P: MarketDataProvider, C: Clock> CachedProvider<P, C> {
    pub fn with_clock(inner: P, ttl: Duration, clock: C) -> Self {
        Self {
            inner,
            clock,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    fn cache_key(symbol: &str, exchange: &str, period: Period, interval: Interval) -> String {
        format!("{}_{}_{}_{}", symbol, exchange, period, interval)
    }
}

#[async_trait]
impl<P: MarketDataProvider, C: Clock> MarketDataProvider for CachedProvider<P, C> {
    async fn get_history(
        &self,
        symbol: &str,
        exchange: &str,
        period: Period,
        interval: Interval,
    ) -> Result<Option<PriceHistory>> {
        let key = Self::cache_key(symbol, exchange, period, interval);
        let now = self.clock.now();

        if let Some(entry) = self.entries.read().await.get(&key) {
            if now - entry.fetched_at < self.ttl {
                debug!("Using cached data for {}", key);
                return Ok(Some(entry.history.clone()));
            }
        }

        let fetched = self.inner.get_history(symbol, exchange, period, interval).await?;
        if let Some(history) = &fetched {
            if !history.is_empty() {
                self.entries.write().await.insert(
                    key,
                    CacheEntry {
                        fetched_at: now,
                        history: history.clone(),
                    },
                );
            }
        }
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{ManualClock, MockMarketDataProvider};
    use crate::types::test_support::flat_history;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_hit_within_ttl_then_refetch() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_history()
            .times(2)
            .returning(|_, _, _, _| Ok(Some(flat_history(30))));

        let cache = CachedProvider::with_clock(mock, Duration::seconds(300), ManualClock::new(start()));

        let first = cache.get_history("RELIANCE", "NSE", Period::ThreeMonths, Interval::Daily).await.unwrap();
        assert_eq!(first.map(|h| h.len()), Some(30));

        cache.clock.advance(Duration::seconds(299));
        let second = cache.get_history("RELIANCE", "NSE", Period::ThreeMonths, Interval::Daily).await.unwrap();
        assert!(second.is_some());

        cache.clock.advance(Duration::seconds(1));
        cache.get_history("RELIANCE", "NSE", Period::ThreeMonths, Interval::Daily).await.unwrap();
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_key_includes_period_and_interval() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_history()
            .times(2)
            .returning(|_, _, _, _| Ok(Some(flat_history(30))));

        let cache = CachedProvider::with_clock(mock, Duration::seconds(300), ManualClock::new(start()));
        cache.get_history("TCS", "NSE", Period::ThreeMonths, Interval::Daily).await.unwrap();
        cache.get_history("TCS", "NSE", Period::SixMonths, Interval::Daily).await.unwrap();
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_absent_and_failed_fetches_are_not_cached() {
        let mut mock = MockMarketDataProvider::new();
        let mut calls = 0;
        mock.expect_get_history().times(3).returning(move |_, _, _, _| {
            calls += 1;
            if calls == 1 {
                Ok(None)
            } else {
                Err(anyhow::anyhow!("connection reset"))
            }
        });

        let cache = CachedProvider::with_clock(mock, Duration::seconds(300), ManualClock::new(start()));
        assert!(cache.get_history("X", "NSE", Period::OneMonth, Interval::Daily).await.unwrap().is_none());
        assert!(cache.get_history("X", "NSE", Period::OneMonth, Interval::Daily).await.is_err());
        assert!(cache.get_history("X", "NSE", Period::OneMonth, Interval::Daily).await.is_err());
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_clear_forces_refetch() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_history()
            .times(2)
            .returning(|_, _, _, _| Ok(Some(flat_history(30))));

        let cache = CachedProvider::with_clock(mock, Duration::seconds(300), ManualClock::new(start()));
        tokio_test::block_on(async {
            tokio_test::assert_ok!(cache.get_history("INFY", "NSE", Period::OneYear, Interval::Weekly).await);
            cache.clear().await;
            assert!(cache.is_empty().await);
            tokio_test::assert_ok!(cache.get_history("INFY", "NSE", Period::OneYear, Interval::Weekly).await);
            assert_eq!(cache.len().await, 1);
        });
    }
}
