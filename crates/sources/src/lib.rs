//! Per-domain travel data sources.
//!
//! Each domain (weather, traffic, POI, emergency) is served by a
//! [`CachedSource`] wrapping a [`Provider`]. The cache sits in front of the
//! provider with a per-domain TTL; the aggregator only sees the
//! [`SourceClient`] trait.

mod cache;
mod client;
mod clock;
mod error;
mod open_meteo;
mod synthetic;

pub mod emergency;
pub mod poi;
pub mod traffic;
pub mod weather;

pub use cache::{CacheEntry, CacheStatus, TtlCache};
pub use client::{CacheStrategy, CachedSource, Domain, Provider, SourceClient, SourceQuery};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, SourceError};
pub use open_meteo::OpenMeteoWeather;
pub use synthetic::{SyntheticEmergency, SyntheticPoi, SyntheticTraffic, SyntheticWeather};

pub use emergency::{emergency_contacts, EmergencyClient, EmergencyQuery, EmergencyReport};
pub use poi::{PoiClient, PoiQuery, PoiStatus};
pub use traffic::{TrafficClient, TrafficLevel, TrafficQuery, TrafficReport, TravelMode};
pub use weather::{WeatherClient, WeatherQuery, WeatherReport};
