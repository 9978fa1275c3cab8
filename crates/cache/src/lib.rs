//! Read-through asset price cache.
//!
//! Every read first checks staleness. A stale (or never loaded) cache performs
//! exactly one full refresh from its [`AssetSource`], replacing the whole
//! mapping at once. A failed refresh keeps the previous mapping and fails the
//! triggering read.

use coinledger_core::{Asset, AssetSource, SourceError};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_TTL_MINUTES: u64 = 30;
pub const DEFAULT_LIMIT: usize = 150;

/// Errors surfaced by cache reads.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Could not load data")]
    RefreshFailed(#[source] SourceError),
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),
}

/// One complete catalog load, ordered by descending price.
#[derive(Debug)]
struct Snapshot {
    assets: Vec<Asset>,
    /// Asset id -> position in `assets`.
    index: HashMap<String, usize>,
    loaded_at: Instant,
}

impl Snapshot {
    fn build(catalog: Vec<Asset>, limit: usize) -> Self {
        let mut assets: Vec<Asset> = catalog.into_iter().filter(|a| a.is_crypto).collect();
        assets.sort_by(|a, b| b.price.cmp(&a.price));

        // Duplicate ids keep their highest-priced entry.
        let mut index = HashMap::with_capacity(limit.min(assets.len()));
        let mut kept = Vec::with_capacity(limit.min(assets.len()));
        for asset in assets {
            if kept.len() == limit {
                break;
            }
            if index.contains_key(&asset.id) {
                continue;
            }
            index.insert(asset.id.clone(), kept.len());
            kept.push(asset);
        }

        Self {
            assets: kept,
            index,
            loaded_at: Instant::now(),
        }
    }

    fn get(&self, id: &str) -> Option<&Asset> {
        self.index.get(id).map(|&i| &self.assets[i])
    }
}

/// TTL-bounded cache of the top crypto assets by price.
pub struct AssetCache<S> {
    source: S,
    ttl: Duration,
    limit: usize,
    snapshot: Option<Snapshot>,
}

impl<S: AssetSource> AssetCache<S> {
    /// Negative `ttl_minutes` or `limit` fall back to the defaults
    /// (30 minutes, 150 entries).
    pub fn new(source: S, ttl_minutes: i64, limit: i64) -> Self {
        let ttl_minutes = u64::try_from(ttl_minutes).unwrap_or(DEFAULT_TTL_MINUTES);
        let limit = usize::try_from(limit).unwrap_or(DEFAULT_LIMIT);
        Self {
            source,
            ttl: Duration::from_secs(ttl_minutes.saturating_mul(60)),
            limit,
            snapshot: None,
        }
    }

    pub fn ttl_minutes(&self) -> u64 {
        self.ttl.as_secs() / 60
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// When the current mapping was loaded, if ever.
    pub fn last_refresh(&self) -> Option<Instant> {
        self.snapshot.as_ref().map(|s| s.loaded_at)
    }

    /// Look up one asset. Unknown ids are an error.
    pub async fn get_asset(&mut self, id: &str) -> Result<Asset, CacheError> {
        self.fresh()
            .await?
            .get(id)
            .cloned()
            .ok_or_else(|| CacheError::UnknownAsset(id.to_string()))
    }

    /// All cached assets, highest price first.
    pub async fn get_assets(&mut self) -> Result<&[Asset], CacheError> {
        Ok(&self.fresh().await?.assets)
    }

    /// Current price of `id`, or zero when it is not in the catalog.
    pub async fn get_asset_price(&mut self, id: &str) -> Result<Decimal, CacheError> {
        Ok(price_or_zero(self.fresh().await?, id))
    }

    /// Current prices of `ids`. Missing ids map to zero.
    pub async fn get_asset_prices(
        &mut self,
        ids: &[String],
    ) -> Result<HashMap<String, Decimal>, CacheError> {
        let snapshot = self.fresh().await?;
        Ok(ids
            .iter()
            .map(|id| (id.clone(), price_or_zero(snapshot, id)))
            .collect())
    }

    fn is_stale(&self) -> bool {
        match &self.snapshot {
            None => true,
            Some(snapshot) => snapshot.loaded_at.elapsed() >= self.ttl,
        }
    }

    async fn fresh(&mut self) -> Result<&Snapshot, CacheError> {
        if self.is_stale() {
            self.refresh().await?;
        }
        self.snapshot
            .as_ref()
            .ok_or_else(|| CacheError::RefreshFailed(SourceError::NoData))
    }

    async fn refresh(&mut self) -> Result<(), CacheError> {
        debug!(limit = self.limit, "Refreshing asset catalog");
        let catalog = self.source.fetch().await.map_err(|e| {
            warn!(error = %e, "Asset catalog refresh failed");
            CacheError::RefreshFailed(e)
        })?;

        let snapshot = Snapshot::build(catalog, self.limit);
        info!(assets = snapshot.assets.len(), "Asset catalog refreshed");
        self.snapshot = Some(snapshot);
        Ok(())
    }
}

fn price_or_zero(snapshot: &Snapshot, id: &str) -> Decimal {
    snapshot.get(id).map(|a| a.price).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use rust_decimal_macros::dec;

    mock! {
        pub Source {}

        #[async_trait]
        impl AssetSource for Source {
            async fn fetch(&self) -> Result<Vec<Asset>, SourceError>;
        }
    }

    fn catalog() -> Vec<Asset> {
        vec![
            Asset::new("ETH", "Ethereum", true, dec!(1039.37)),
            Asset::new("USD", "US Dollar", false, dec!(1)),
            Asset::new("BTC", "Bitcoin", true, dec!(19424.47)),
            Asset::new("DOGE", "Dogecoin", true, dec!(0.06)),
            Asset::new("XAU", "Gold", false, dec!(1650)),
        ]
    }

    fn source_returning(times: usize) -> MockSource {
        let mut source = MockSource::new();
        source
            .expect_fetch()
            .times(times)
            .returning(|| Ok(catalog()));
        source
    }

    #[tokio::test]
    async fn test_refresh_filters_sorts_and_limits() {
        let mut cache = AssetCache::new(source_returning(1), 30, 2);

        let ids: Vec<&str> = cache
            .get_assets()
            .await
            .unwrap()
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ids, vec!["BTC", "ETH"]);
    }

    #[tokio::test]
    async fn test_reads_within_ttl_refresh_once() {
        let mut cache = AssetCache::new(source_returning(1), 30, 150);

        assert_eq!(cache.get_asset_price("BTC").await.unwrap(), dec!(19424.47));
        assert_eq!(cache.get_asset("ETH").await.unwrap().name, "Ethereum");
        assert_eq!(cache.get_assets().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_ttl_refreshes_every_read() {
        let mut cache = AssetCache::new(source_returning(2), 0, 150);

        cache.get_asset_price("BTC").await.unwrap();
        cache.get_asset_price("BTC").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_ttl_triggers_refresh() {
        let mut cache = AssetCache::new(source_returning(2), 30, 150);

        cache.get_assets().await.unwrap();
        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        cache.get_assets().await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        cache.get_assets().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_price_is_zero() {
        let mut cache = AssetCache::new(source_returning(1), 30, 150);

        assert_eq!(cache.get_asset_price("NOPE").await.unwrap(), Decimal::ZERO);
        // Non-crypto entries are filtered out of the catalog.
        assert_eq!(cache.get_asset_price("USD").await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_prices_for_held_ids() {
        let mut cache = AssetCache::new(source_returning(1), 30, 150);

        let ids = vec!["BTC".to_string(), "GONE".to_string()];
        let prices = cache.get_asset_prices(&ids).await.unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["BTC"], dec!(19424.47));
        assert_eq!(prices["GONE"], Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_asset_lookup_fails() {
        let mut cache = AssetCache::new(source_returning(1), 30, 150);

        let err = cache.get_asset("NOPE").await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown asset: NOPE");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_mapping() {
        let mut source = MockSource::new();
        let mut calls = 0;
        source.expect_fetch().times(3).returning(move || {
            calls += 1;
            match calls {
                2 => Err(SourceError::TooManyRequests),
                _ => Ok(catalog()),
            }
        });
        let mut cache = AssetCache::new(source, 0, 150);

        cache.get_assets().await.unwrap();
        let loaded = cache.last_refresh();

        let err = cache.get_asset_price("BTC").await.unwrap_err();
        assert!(matches!(err, CacheError::RefreshFailed(SourceError::TooManyRequests)));
        assert_eq!(err.to_string(), "Could not load data");
        assert_eq!(cache.last_refresh(), loaded);

        assert_eq!(cache.get_asset_price("BTC").await.unwrap(), dec!(19424.47));
    }

    #[tokio::test]
    async fn test_first_refresh_failure() {
        let mut source = MockSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|| Err(SourceError::Transport("connection refused".into())));
        let mut cache = AssetCache::new(source, 30, 150);

        assert!(cache.get_assets().await.is_err());
        assert!(cache.last_refresh().is_none());
    }

    #[test]
    fn test_negative_settings_clamp_to_defaults() {
        let cache = AssetCache::new(MockSource::new(), -5, -1);
        assert_eq!(cache.ttl_minutes(), DEFAULT_TTL_MINUTES);
        assert_eq!(cache.limit(), DEFAULT_LIMIT);

        let cache = AssetCache::new(MockSource::new(), 0, 10);
        assert_eq!(cache.ttl_minutes(), 0);
        assert_eq!(cache.limit(), 10);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let cache = AssetCache::new(MockSource::new(), i64::MAX, 1);
        assert_eq!(cache.ttl_minutes(), u64::MAX / 60);
        assert_eq!(cache.limit(), 1);
    }
}
