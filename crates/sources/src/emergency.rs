//! Emergency alerts, nearby resources, and the hotline directory.

use crate::client::{SourceClient, SourceQuery};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tripwatch_location::{Coordinates, LocationQuery};

pub const DEFAULT_EMERGENCY_RADIUS_M: f64 = 10_000.0;

pub type EmergencyClient =
    Arc<dyn SourceClient<Query = EmergencyQuery, Record = EmergencyReport>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyQuery {
    pub location: LocationQuery,
    pub radius_m: f64,
}

impl EmergencyQuery {
    pub fn new(location: LocationQuery) -> Self {
        Self {
            location,
            radius_m: DEFAULT_EMERGENCY_RADIUS_M,
        }
    }
}

impl SourceQuery for EmergencyQuery {
    fn cache_key(&self) -> String {
        format!("{}_{:.0}", self.location.signature(), self.radius_m)
    }

    fn location(&self) -> &LocationQuery {
        &self.location
    }
}

/// Four-step severity shared by emergency alerts and traffic incidents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// 1..=5 public warning level.
    pub fn level(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 4,
            Severity::Critical => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyKind {
    NaturalDisaster,
    Weather,
    Traffic,
    Security,
    Health,
    Fire,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedArea {
    pub coordinates: Coordinates,
    pub address: String,
    pub affected_radius_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlert {
    pub id: String,
    pub kind: EmergencyKind,
    pub severity: Severity,
    pub level: u8,
    pub title: String,
    pub description: String,
    pub area: AffectedArea,
    pub start_time: DateTime<Utc>,
    pub estimated_end_time: Option<DateTime<Utc>>,
    pub instructions: Vec<String>,
    pub active: bool,
    pub source: String,
    pub verified: bool,
    pub last_updated: DateTime<Utc>,
}

impl EmergencyAlert {
    pub fn is_active_critical(&self) -> bool {
        self.active && self.severity == Severity::Critical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Hospital,
    PoliceStation,
    FireStation,
    Shelter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Available,
    Busy,
    Full,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyResource {
    pub id: String,
    pub name: String,
    pub kind: ResourceKind,
    pub coordinates: Coordinates,
    pub address: String,
    pub status: ResourceStatus,
    pub capacity: Option<u32>,
    pub occupancy: Option<u32>,
    pub phone: String,
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyReport {
    pub alerts: Vec<EmergencyAlert>,
    pub resources: Vec<EmergencyResource>,
}

impl EmergencyReport {
    pub fn active_critical(&self) -> impl Iterator<Item = &EmergencyAlert> {
        self.alerts.iter().filter(|a| a.is_active_critical())
    }

    pub fn active(&self) -> impl Iterator<Item = &EmergencyAlert> {
        self.alerts.iter().filter(|a| a.active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub name: &'static str,
    pub number: &'static str,
    pub kind: &'static str,
}

/// National hotlines (mainland China).
pub fn emergency_contacts() -> Vec<EmergencyContact> {
    vec![
        EmergencyContact {
            name: "报警电话",
            number: "110",
            kind: "police",
        },
        EmergencyContact {
            name: "火警电话",
            number: "119",
            kind: "fire",
        },
        EmergencyContact {
            name: "急救电话",
            number: "120",
            kind: "medical",
        },
        EmergencyContact {
            name: "市民服务热线",
            number: "12345",
            kind: "government",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_includes_radius() {
        let q = EmergencyQuery::new(LocationQuery::place("Beijing"));
        assert_eq!(q.cache_key(), "beijing_10000");
    }

    #[test]
    fn test_contacts_cover_core_services() {
        let numbers: Vec<_> = emergency_contacts().iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec!["110", "119", "120", "12345"]);
    }

    #[test]
    fn test_severity_levels_increase() {
        let levels: Vec<u8> = [
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ]
        .iter()
        .map(Severity::level)
        .collect();
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
    }
}
