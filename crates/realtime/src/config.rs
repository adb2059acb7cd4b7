//! Aggregator configuration.
//!
//! Every field has a default, so a partial (or missing) JSON file is fine.

use crate::error::{RealtimeError, Result};
use crate::preferences::UserPreferences;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tripwatch_location::{Coordinates, Location, LocationQuery};
use tripwatch_sources::emergency::DEFAULT_EMERGENCY_RADIUS_M;
use tripwatch_sources::poi::{
    PoiCategory, DEFAULT_POI_KEYWORD, DEFAULT_POI_LIMIT, DEFAULT_POI_RADIUS_M,
};
use tripwatch_sources::weather::DEFAULT_FORECAST_DAYS;
use tripwatch_sources::{CacheStrategy, Domain, TravelMode};

/// Largest POI result count a config may ask for.
pub const MAX_POI_LIMIT: usize = 200;
/// Longest cache TTL a config may set: one week.
pub const MAX_TTL_MINUTES: u64 = 7 * 24 * 60;
const MAX_FORECAST_DAYS: u8 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for DefaultLocation {
    fn default() -> Self {
        Self {
            name: "北京".to_string(),
            latitude: 39.9042,
            longitude: 116.4074,
        }
    }
}

impl DefaultLocation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn query(&self) -> LocationQuery {
        LocationQuery::Coordinates(Location::new(self.coordinates(), 0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrafficSettings {
    pub destination: String,
    pub mode: TravelMode,
}

impl Default for TrafficSettings {
    fn default() -> Self {
        Self {
            destination: "北京市中心".to_string(),
            mode: TravelMode::Driving,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoiSettings {
    pub keyword: String,
    pub category: Option<PoiCategory>,
    pub radius_m: f64,
    pub limit: usize,
}

impl Default for PoiSettings {
    fn default() -> Self {
        Self {
            keyword: DEFAULT_POI_KEYWORD.to_string(),
            category: None,
            radius_m: DEFAULT_POI_RADIUS_M,
            limit: DEFAULT_POI_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmergencySettings {
    pub radius_m: f64,
}

impl Default for EmergencySettings {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_EMERGENCY_RADIUS_M,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeConfig {
    pub cache: CacheStrategy,
    pub default_location: DefaultLocation,
    pub traffic: TrafficSettings,
    pub poi: PoiSettings,
    pub emergency: EmergencySettings,
    pub forecast_days: u8,
    pub preferences: UserPreferences,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            cache: CacheStrategy::default(),
            default_location: DefaultLocation::default(),
            traffic: TrafficSettings::default(),
            poi: PoiSettings::default(),
            emergency: EmergencySettings::default(),
            forecast_days: DEFAULT_FORECAST_DAYS,
            preferences: UserPreferences::default(),
        }
    }
}

impl RealtimeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RealtimeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the sources cannot work with.
    pub fn validate(&self) -> Result<()> {
        check_radius("poi.radiusM", self.poi.radius_m)?;
        check_radius("emergency.radiusM", self.emergency.radius_m)?;

        if self.poi.limit > MAX_POI_LIMIT {
            return Err(RealtimeError::Config(format!(
                "poi.limit {} exceeds {MAX_POI_LIMIT}",
                self.poi.limit
            )));
        }
        if !(1..=MAX_FORECAST_DAYS).contains(&self.forecast_days) {
            return Err(RealtimeError::Config(format!(
                "forecastDays must be 1-{MAX_FORECAST_DAYS}, got {}",
                self.forecast_days
            )));
        }
        for domain in Domain::ALL {
            let minutes = self.cache.minutes(domain);
            if minutes > MAX_TTL_MINUTES {
                return Err(RealtimeError::Config(format!(
                    "cache TTL for {domain} is {minutes} minutes, max {MAX_TTL_MINUTES}"
                )));
            }
        }
        if !self.default_location.coordinates().is_valid() {
            return Err(RealtimeError::Config(format!(
                "defaultLocation {} is not a valid coordinate",
                self.default_location.coordinates()
            )));
        }
        Ok(())
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(RealtimeError::Config(format!("{}: {e}", path.display()))),
        }
    }
}

fn check_radius(field: &str, radius_m: f64) -> Result<()> {
    if radius_m.is_finite() && radius_m >= 0.0 {
        Ok(())
    } else {
        Err(RealtimeError::Config(format!(
            "{field} must be a non-negative distance, got {radius_m}"
        )))
    }
}
