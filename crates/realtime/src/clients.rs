//! The four source clients the manager aggregates.

use std::sync::Arc;
use tripwatch_location::PlaceResolver;
use tripwatch_sources::{
    CacheStrategy, CachedSource, Clock, Domain, EmergencyClient, PoiClient, SourceClient,
    SyntheticEmergency, SyntheticPoi, SyntheticTraffic, SyntheticWeather, TrafficClient,
    WeatherClient,
};

#[derive(Clone)]
pub struct SourceSet {
    pub weather: WeatherClient,
    pub traffic: TrafficClient,
    pub poi: PoiClient,
    pub emergency: EmergencyClient,
}

impl SourceSet {
    /// Offline sources for every domain, with TTLs from `strategy`.
    pub fn synthetic(
        resolver: Arc<dyn PlaceResolver>,
        strategy: &CacheStrategy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            weather: Arc::new(
                CachedSource::with_ttl(
                    SyntheticWeather,
                    Arc::clone(&resolver),
                    strategy.ttl(Domain::Weather),
                )
                .with_clock(Arc::clone(&clock)),
            ),
            traffic: Arc::new(
                CachedSource::with_ttl(
                    SyntheticTraffic,
                    Arc::clone(&resolver),
                    strategy.ttl(Domain::Traffic),
                )
                .with_clock(Arc::clone(&clock)),
            ),
            poi: Arc::new(
                CachedSource::with_ttl(
                    SyntheticPoi,
                    Arc::clone(&resolver),
                    strategy.ttl(Domain::Poi),
                )
                .with_clock(Arc::clone(&clock)),
            ),
            emergency: Arc::new(
                CachedSource::with_ttl(SyntheticEmergency, resolver, strategy.ttl(Domain::Emergency))
                    .with_clock(clock),
            ),
        }
    }

    pub fn with_weather(mut self, weather: WeatherClient) -> Self {
        self.weather = weather;
        self
    }

    pub fn with_traffic(mut self, traffic: TrafficClient) -> Self {
        self.traffic = traffic;
        self
    }

    pub fn with_poi(mut self, poi: PoiClient) -> Self {
        self.poi = poi;
        self
    }

    pub fn with_emergency(mut self, emergency: EmergencyClient) -> Self {
        self.emergency = emergency;
        self
    }

    pub(crate) fn clear(&self, domain: Domain, key: Option<&str>) {
        match domain {
            Domain::Weather => self.weather.clear_cache(key),
            Domain::Traffic => self.traffic.clear_cache(key),
            Domain::Poi => self.poi.clear_cache(key),
            Domain::Emergency => self.emergency.clear_cache(key),
        }
    }

    pub(crate) fn status(&self, domain: Domain) -> tripwatch_sources::CacheStatus {
        match domain {
            Domain::Weather => self.weather.cache_status(),
            Domain::Traffic => self.traffic.cache_status(),
            Domain::Poi => self.poi.cache_status(),
            Domain::Emergency => self.emergency.cache_status(),
        }
    }
}
