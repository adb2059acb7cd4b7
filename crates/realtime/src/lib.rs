//! Real-time travel information: aggregation, monitoring and fan-out.
//!
//! [`RealTimeInfoManager`] owns a [`CompositeSnapshot`] built from four
//! cached source clients (weather, traffic, points of interest, emergency),
//! keeps it fresh with per-domain timers, and pushes every change to
//! subscribers.

mod alerts;
mod clients;
mod config;
mod error;
mod manager;
mod preferences;
mod scheduler;
mod snapshot;
mod summary;

pub use alerts::{select_new, AlertEvent, AlertRecord};
pub use clients::SourceSet;
pub use config::{
    DefaultLocation, EmergencySettings, PoiSettings, RealtimeConfig, TrafficSettings, MAX_POI_LIMIT,
    MAX_TTL_MINUTES,
};
pub use error::{RealtimeError, Result};
pub use manager::{Lifecycle, ManagerBuilder, PoiSearch, RealTimeInfoManager, RouteOverride};
pub use preferences::{
    AlertSettings, AlertSettingsUpdate, PreferencesUpdate, UpdateFrequency, UserPreferences,
};
pub use scheduler::{monitoring_interval, MonitoringScheduler, RefreshFn};
pub use snapshot::{CompositeSnapshot, DomainSlot};
pub use summary::{compute_summary, OverallStatus, Summary, WeatherSeverity};
