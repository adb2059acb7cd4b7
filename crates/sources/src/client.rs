//! The source-client contract and its shared cached implementation.

use crate::cache::{CacheEntry, CacheStatus, TtlCache};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SourceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tripwatch_location::{resolve_query, Coordinates, LocationQuery, PlaceResolver};

/// The four kinds of live data the monitor tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Weather,
    Traffic,
    Poi,
    Emergency,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::Weather,
        Domain::Traffic,
        Domain::Poi,
        Domain::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Weather => "weather",
            Domain::Traffic => "traffic",
            Domain::Poi => "poi",
            Domain::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache lifetime per domain, in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheStrategy {
    pub weather_minutes: u64,
    pub traffic_minutes: u64,
    pub poi_minutes: u64,
    pub emergency_minutes: u64,
}

impl Default for CacheStrategy {
    fn default() -> Self {
        Self {
            weather_minutes: 30,
            traffic_minutes: 10,
            poi_minutes: 15,
            emergency_minutes: 5,
        }
    }
}

impl CacheStrategy {
    pub fn minutes(&self, domain: Domain) -> u64 {
        match domain {
            Domain::Weather => self.weather_minutes,
            Domain::Traffic => self.traffic_minutes,
            Domain::Poi => self.poi_minutes,
            Domain::Emergency => self.emergency_minutes,
        }
    }

    pub fn ttl(&self, domain: Domain) -> Duration {
        Duration::from_secs(self.minutes(domain).saturating_mul(60))
    }
}

/// A domain query: knows its cache signature and the location it is about.
pub trait SourceQuery: Send + Sync {
    fn cache_key(&self) -> String;
    fn location(&self) -> &LocationQuery;
}

/// Backend that produces fresh records. No caching.
#[async_trait]
pub trait Provider: Send + Sync {
    type Query: SourceQuery;
    type Record: Clone + Send + Sync + Serialize + DeserializeOwned;

    fn domain(&self) -> Domain;

    /// Produce a record for `query` at the already-resolved `at`.
    async fn fetch(
        &self,
        query: &Self::Query,
        at: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<Self::Record>;
}

/// What the aggregator talks to, one per domain.
#[async_trait]
pub trait SourceClient: Send + Sync {
    type Query: Send + Sync;
    type Record: Send;

    fn domain(&self) -> Domain;

    async fn fetch(&self, query: &Self::Query) -> Result<Self::Record>;

    /// Drop one entry, or everything when `key` is `None`.
    fn clear_cache(&self, key: Option<&str>);

    fn cache_status(&self) -> CacheStatus;
}

/// TTL-cached wrapper around a [`Provider`].
pub struct CachedSource<P: Provider> {
    provider: P,
    cache: TtlCache<P::Record>,
    resolver: Arc<dyn PlaceResolver>,
    clock: Arc<dyn Clock>,
}

impl<P: Provider> CachedSource<P> {
    /// Cached source using the provider domain's default TTL.
    pub fn new(provider: P, resolver: Arc<dyn PlaceResolver>) -> Self {
        let ttl = CacheStrategy::default().ttl(provider.domain());
        Self::with_ttl(provider, resolver, ttl)
    }

    pub fn with_ttl(provider: P, resolver: Arc<dyn PlaceResolver>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(520));
        Self {
            provider,
            cache: TtlCache::new(ttl),
            resolver,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Like [`SourceClient::fetch`] but returns the cache entry with its timestamps.
    pub async fn fetch_entry(&self, query: &P::Query) -> Result<CacheEntry<P::Record>> {
        let domain = self.provider.domain();
        let key = query.cache_key();

        if let Some(entry) = self.cache.get(&key, self.clock.now()) {
            tracing::debug!(%domain, key = %key, "cache hit");
            return Ok(entry);
        }
        tracing::debug!(%domain, key = %key, "cache miss");

        let at = resolve_query(self.resolver.as_ref(), query.location())
            .await
            .map_err(|e| SourceError::from_location(domain, e))?;

        let record = self.provider.fetch(query, at, self.clock.now()).await?;
        Ok(self.cache.insert(key, record, self.clock.now()))
    }

    /// Serialize all unexpired entries to JSON.
    pub fn export_cache(&self) -> Result<String> {
        Ok(self.cache.export(self.clock.now())?)
    }

    /// Load entries previously written by [`CachedSource::export_cache`].
    pub fn import_cache(&self, json: &str) -> Result<usize> {
        let kept = self.cache.import(json, self.clock.now())?;
        tracing::debug!(domain = %self.provider.domain(), kept, "cache imported");
        Ok(kept)
    }
}

#[async_trait]
impl<P: Provider> SourceClient for CachedSource<P> {
    type Query = P::Query;
    type Record = P::Record;

    fn domain(&self) -> Domain {
        self.provider.domain()
    }

    async fn fetch(&self, query: &P::Query) -> Result<P::Record> {
        self.fetch_entry(query).await.map(|entry| entry.data)
    }

    fn clear_cache(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.cache.remove(key);
            }
            None => self.cache.clear(),
        }
    }

    fn cache_status(&self) -> CacheStatus {
        self.cache.status(self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        let strategy = CacheStrategy::default();
        assert_eq!(strategy.ttl(Domain::Weather), Duration::from_secs(30 * 60));
        assert_eq!(strategy.ttl(Domain::Traffic), Duration::from_secs(10 * 60));
        assert_eq!(strategy.ttl(Domain::Poi), Duration::from_secs(15 * 60));
        assert_eq!(strategy.ttl(Domain::Emergency), Duration::from_secs(5 * 60));
    }

    #[test]
    fn test_strategy_partial_json_uses_defaults() {
        let strategy: CacheStrategy = serde_json::from_str(r#"{"trafficMinutes": 2}"#).unwrap();
        assert_eq!(strategy.traffic_minutes, 2);
        assert_eq!(strategy.weather_minutes, 30);
    }

    #[test]
    fn test_domain_display() {
        assert_eq!(Domain::Poi.to_string(), "poi");
        assert_eq!(serde_json::to_string(&Domain::Emergency).unwrap(), "\"emergency\"");
    }
}
