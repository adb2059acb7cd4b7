//! Traffic records and query.

use crate::client::{SourceClient, SourceQuery};
use crate::emergency::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tripwatch_location::LocationQuery;

pub type TrafficClient = Arc<dyn SourceClient<Query = TrafficQuery, Record = TrafficReport>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Transit,
    Cycling,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Transit => "transit",
            TravelMode::Cycling => "cycling",
        }
    }

    /// Free-flow speed used to estimate durations.
    pub fn base_speed_kmh(&self) -> f64 {
        match self {
            TravelMode::Driving => 45.0,
            TravelMode::Walking => 5.0,
            TravelMode::Transit => 30.0,
            TravelMode::Cycling => 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficQuery {
    pub origin: LocationQuery,
    pub destination: String,
    pub mode: TravelMode,
}

impl SourceQuery for TrafficQuery {
    fn cache_key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.origin.signature(),
            self.destination.trim().to_lowercase(),
            self.mode.as_str()
        )
    }

    fn location(&self) -> &LocationQuery {
        &self.origin
    }
}

/// Congestion level, ordered least to most congested.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLevel {
    #[default]
    Low,
    Medium,
    High,
    Severe,
}

impl TrafficLevel {
    pub fn color(&self) -> &'static str {
        match self {
            TrafficLevel::Low => "green",
            TrafficLevel::Medium => "yellow",
            TrafficLevel::High => "orange",
            TrafficLevel::Severe => "red",
        }
    }

    /// Travel-time multiplier over free flow.
    pub fn delay_factor(&self) -> f64 {
        match self {
            TrafficLevel::Low => 1.0,
            TrafficLevel::Medium => 1.3,
            TrafficLevel::High => 1.7,
            TrafficLevel::Severe => 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    pub origin: String,
    pub destination: String,
    pub distance_km: f64,
    pub duration_s: u64,
    pub duration_in_traffic_s: u64,
    pub traffic_level: TrafficLevel,
    pub traffic_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSegment {
    pub name: String,
    pub distance_km: f64,
    pub speed_kmh: f64,
    pub traffic_level: TrafficLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeRoute {
    pub summary: String,
    pub distance_km: f64,
    pub duration_in_traffic_s: u64,
    pub traffic_level: TrafficLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentKind {
    Accident,
    Construction,
    Closure,
    Congestion,
    Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficIncident {
    pub id: String,
    pub kind: IncidentKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub location: String,
    pub affected_roads: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub estimated_end_time: Option<DateTime<Utc>>,
    pub delay_minutes: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Normal,
    Delayed,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitLine {
    pub line: String,
    pub kind: String,
    pub status: ServiceStatus,
    pub delay_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficReport {
    pub route: RouteStatus,
    pub segments: Vec<RouteSegment>,
    pub alternatives: Vec<AlternativeRoute>,
    pub incidents: Vec<TrafficIncident>,
    pub public_transport: Vec<TransitLine>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_shape() {
        let q = TrafficQuery {
            origin: LocationQuery::place("Beijing"),
            destination: " 北京市中心 ".to_string(),
            mode: TravelMode::Driving,
        };
        assert_eq!(q.cache_key(), "beijing_北京市中心_driving");
    }

    #[test]
    fn test_mode_changes_key() {
        let mut q = TrafficQuery {
            origin: LocationQuery::place("Beijing"),
            destination: "airport".to_string(),
            mode: TravelMode::Driving,
        };
        let driving = q.cache_key();
        q.mode = TravelMode::Transit;
        assert_ne!(driving, q.cache_key());
    }

    #[test]
    fn test_level_order_and_colors() {
        assert!(TrafficLevel::Severe > TrafficLevel::High);
        assert_eq!(TrafficLevel::default(), TrafficLevel::Low);
        assert_eq!(TrafficLevel::High.color(), "orange");
    }
}
