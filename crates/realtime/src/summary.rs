//! Derived risk summary.
//!
//! Recomputed from the domain slots, never stored independently. POI data
//! does not contribute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tripwatch_sources::weather::AlertLevel;
use tripwatch_sources::{EmergencyReport, TrafficLevel, TrafficReport, WeatherReport};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    #[default]
    Good,
    Fair,
    Poor,
    Critical,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum WeatherSeverity {
    #[default]
    Clear,
    Mild,
    Moderate,
    Severe,
}

impl From<AlertLevel> for WeatherSeverity {
    fn from(level: AlertLevel) -> Self {
        match level {
            AlertLevel::Extreme => WeatherSeverity::Severe,
            AlertLevel::High => WeatherSeverity::Moderate,
            AlertLevel::Medium => WeatherSeverity::Mild,
            AlertLevel::Low => WeatherSeverity::Clear,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub overall_status: OverallStatus,
    /// Critical, active emergency alerts.
    pub active_alerts: usize,
    pub traffic_level: TrafficLevel,
    pub weather_severity: WeatherSeverity,
    pub last_update: Option<DateTime<Utc>>,
}

/// Deterministic and independent of alert order.
pub fn compute_summary(
    weather: Option<&WeatherReport>,
    traffic: Option<&TrafficReport>,
    emergency: Option<&EmergencyReport>,
    now: DateTime<Utc>,
) -> Summary {
    let weather_severity = weather
        .and_then(|w| w.active_alerts().map(|a| a.severity).max())
        .map(WeatherSeverity::from)
        .unwrap_or_default();

    let traffic_level = traffic.map(|t| t.route.traffic_level).unwrap_or_default();

    let active_alerts = emergency.map_or(0, |e| e.active_critical().count());
    let active_emergencies = emergency.map_or(0, |e| e.active().count());

    let overall_status = if active_alerts > 0
        || weather_severity == WeatherSeverity::Severe
        || traffic_level == TrafficLevel::Severe
    {
        OverallStatus::Critical
    } else if active_emergencies > 2
        || weather_severity == WeatherSeverity::Moderate
        || traffic_level == TrafficLevel::High
    {
        OverallStatus::Poor
    } else if weather_severity == WeatherSeverity::Mild || traffic_level == TrafficLevel::Medium {
        OverallStatus::Fair
    } else {
        OverallStatus::Good
    };

    Summary {
        overall_status,
        active_alerts,
        traffic_level,
        weather_severity,
        last_update: Some(now),
    }
}
