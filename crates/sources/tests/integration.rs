//! Integration tests for the cached source layer.
//!
//! Uses a counting provider and a manual clock so cache behaviour is exact.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tripwatch_location::{Coordinates, Gazetteer, LocationQuery, NullLocator, PlaceResolver};
use tripwatch_sources::{
    CachedSource, Domain, ManualClock, Provider, SourceClient, SourceError, SourceQuery,
    SyntheticWeather, WeatherQuery,
};

#[derive(Debug, Clone)]
struct PlaceQuery {
    location: LocationQuery,
    tag: &'static str,
}

impl PlaceQuery {
    fn at(place: &str) -> Self {
        Self {
            location: LocationQuery::place(place),
            tag: "default",
        }
    }
}

impl SourceQuery for PlaceQuery {
    fn cache_key(&self) -> String {
        format!("{}_{}", self.location.signature(), self.tag)
    }

    fn location(&self) -> &LocationQuery {
        &self.location
    }
}

#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl Provider for CountingProvider {
    type Query = PlaceQuery;
    type Record = (u32, f64);

    fn domain(&self) -> Domain {
        Domain::Poi
    }

    async fn fetch(
        &self,
        _query: &PlaceQuery,
        at: Coordinates,
        _now: DateTime<Utc>,
    ) -> tripwatch_sources::Result<(u32, f64)> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        if self.fail {
            return Err(SourceError::fetch_failed(Domain::Poi, "backend down"));
        }
        Ok((n, at.latitude))
    }
}

fn resolver() -> Arc<dyn PlaceResolver> {
    Arc::new(Gazetteer::new())
}

fn counting_source(clock: Arc<ManualClock>) -> CachedSource<CountingProvider> {
    CachedSource::with_ttl(
        CountingProvider::default(),
        resolver(),
        std::time::Duration::from_secs(10 * 60),
    )
    .with_clock(clock)
}

// =============================================================================
// Cache hits and expiry
// =============================================================================

mod caching {
    use super::*;

    #[tokio::test]
    async fn test_hit_within_ttl_does_not_refetch() {
        let clock = Arc::new(ManualClock::default());
        let source = counting_source(clock.clone());

        let first = source.fetch(&PlaceQuery::at("Beijing")).await.unwrap();
        clock.advance(Duration::minutes(9));
        let second = source.fetch(&PlaceQuery::at("Beijing")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.provider().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched_with_new_timestamp() {
        let clock = Arc::new(ManualClock::default());
        let source = counting_source(clock.clone());

        let first = source.fetch_entry(&PlaceQuery::at("Beijing")).await.unwrap();
        clock.advance(Duration::minutes(10));
        let second = source.fetch_entry(&PlaceQuery::at("Beijing")).await.unwrap();

        assert_eq!(source.provider().calls.load(Ordering::SeqCst), 2);
        assert!(second.cached_at > first.cached_at);
        assert_eq!(second.expires_at, second.cached_at + Duration::minutes(10));
        assert_eq!(second.data.0, 2);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let clock = Arc::new(ManualClock::default());
        let source = counting_source(clock);

        source.fetch(&PlaceQuery::at("Beijing")).await.unwrap();
        source.fetch(&PlaceQuery::at("Shanghai")).await.unwrap();
        source.fetch(&PlaceQuery::at("beijing")).await.unwrap();

        assert_eq!(source.provider().calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.cache_status().entries, 2);
    }

    #[tokio::test]
    async fn test_failure_writes_nothing() {
        let clock = Arc::new(ManualClock::default());
        let source = CachedSource::new(
            CountingProvider {
                fail: true,
                ..Default::default()
            },
            resolver(),
        )
        .with_clock(clock);

        let err = source.fetch(&PlaceQuery::at("Beijing")).await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::SourceFetchFailed {
                domain: Domain::Poi,
                ..
            }
        ));
        assert_eq!(source.cache_status().entries, 0);
    }

    #[tokio::test]
    async fn test_default_ttl_comes_from_domain() {
        let source = CachedSource::new(CountingProvider::default(), resolver());
        assert_eq!(source.cache_status().ttl_secs, 15 * 60);
    }
}

// =============================================================================
// Clearing
// =============================================================================

mod clearing {
    use super::*;

    #[tokio::test]
    async fn test_clear_single_key() {
        let clock = Arc::new(ManualClock::default());
        let source = counting_source(clock);
        let beijing = PlaceQuery::at("Beijing");
        let shanghai = PlaceQuery::at("Shanghai");

        source.fetch(&beijing).await.unwrap();
        source.fetch(&shanghai).await.unwrap();
        source.clear_cache(Some(&beijing.cache_key()));

        assert_eq!(source.cache_status().keys, vec![shanghai.cache_key()]);
        source.fetch(&beijing).await.unwrap();
        assert_eq!(source.provider().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let clock = Arc::new(ManualClock::default());
        let source = counting_source(clock);
        source.fetch(&PlaceQuery::at("Beijing")).await.unwrap();
        source.fetch(&PlaceQuery::at("Shanghai")).await.unwrap();

        source.clear_cache(None);
        assert_eq!(source.cache_status().entries, 0);
    }

    #[tokio::test]
    async fn test_clear_unknown_key_is_harmless() {
        let source = counting_source(Arc::new(ManualClock::default()));
        source.clear_cache(Some("nope"));
        assert_eq!(source.cache_status().entries, 0);
    }
}

// =============================================================================
// Location resolution
// =============================================================================

mod resolution {
    use super::*;

    #[tokio::test]
    async fn test_unknown_place_is_location_unresolved() {
        let source = counting_source(Arc::new(ManualClock::default()));
        let err = source.fetch(&PlaceQuery::at("Atlantis")).await.unwrap_err();
        assert_eq!(err, SourceError::LocationUnresolved("Atlantis".to_string()));
        assert_eq!(source.provider().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_coordinates_bypass_resolver() {
        let source = CachedSource::new(CountingProvider::default(), Arc::new(NullLocator));
        let query = PlaceQuery {
            location: Coordinates::new(31.2304, 121.4737).into(),
            tag: "coords",
        };
        let (_, lat) = source.fetch(&query).await.unwrap();
        assert_eq!(lat, 31.2304);
    }
}

// =============================================================================
// Persistence
// =============================================================================

mod persistence {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_export_import_through_disk() {
        let clock = Arc::new(ManualClock::default());
        let source = counting_source(clock.clone());
        let original = source.fetch(&PlaceQuery::at("Beijing")).await.unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("poi-cache.json");
        std::fs::write(&path, source.export_cache().unwrap()).unwrap();

        let restored = counting_source(clock);
        let json = std::fs::read_to_string(&path).unwrap();
        assert_eq!(restored.import_cache(&json).unwrap(), 1);

        let value = restored.fetch(&PlaceQuery::at("Beijing")).await.unwrap();
        assert_eq!(value, original);
        assert_eq!(restored.provider().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_import_drops_expired_entries() {
        let clock = Arc::new(ManualClock::default());
        let source = counting_source(clock.clone());
        source.fetch(&PlaceQuery::at("Beijing")).await.unwrap();
        let json = source.export_cache().unwrap();

        clock.advance(Duration::minutes(11));
        let restored = counting_source(clock);
        assert_eq!(restored.import_cache(&json).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_import_garbage_is_serialization_error() {
        let source = counting_source(Arc::new(ManualClock::default()));
        let err = source.import_cache("{ not json").unwrap_err();
        assert!(matches!(err, SourceError::CacheSerializationFailed(_)));
    }
}

// =============================================================================
// Synthetic backend through the cache
// =============================================================================

mod synthetic {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_weather_cached_by_place() {
        let clock = Arc::new(ManualClock::default());
        let source = CachedSource::new(SyntheticWeather, resolver()).with_clock(clock.clone());
        let query = WeatherQuery::new(LocationQuery::place("北京"));

        let a = source.fetch_entry(&query).await.unwrap();
        clock.advance(Duration::minutes(29));
        let b = source.fetch_entry(&query).await.unwrap();
        assert_eq!(a, b);

        clock.advance(Duration::minutes(1));
        let c = source.fetch_entry(&query).await.unwrap();
        assert!(c.cached_at > a.cached_at);
        assert_eq!(source.cache_status().ttl_secs, 30 * 60);
    }
}
