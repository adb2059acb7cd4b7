//! Points of interest: live status records, search options and filtering.

use crate::client::{SourceClient, SourceQuery};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tripwatch_location::{Coordinates, LocationQuery};

pub const DEFAULT_POI_KEYWORD: &str = "景点";
pub const DEFAULT_POI_RADIUS_M: f64 = 5_000.0;
pub const DEFAULT_POI_LIMIT: usize = 20;

pub type PoiClient = Arc<dyn SourceClient<Query = PoiQuery, Record = Vec<PoiStatus>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiCategory {
    Attraction,
    Restaurant,
    Hotel,
    Shopping,
    Museum,
    Park,
    Transport,
}

impl PoiCategory {
    pub const ALL: [PoiCategory; 7] = [
        PoiCategory::Attraction,
        PoiCategory::Restaurant,
        PoiCategory::Hotel,
        PoiCategory::Shopping,
        PoiCategory::Museum,
        PoiCategory::Park,
        PoiCategory::Transport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoiCategory::Attraction => "attraction",
            PoiCategory::Restaurant => "restaurant",
            PoiCategory::Hotel => "hotel",
            PoiCategory::Shopping => "shopping",
            PoiCategory::Museum => "museum",
            PoiCategory::Park => "park",
            PoiCategory::Transport => "transport",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoiQuery {
    pub location: LocationQuery,
    pub keyword: String,
    pub category: Option<PoiCategory>,
    pub radius_m: f64,
    pub open_now: bool,
    pub min_rating: Option<f32>,
    pub limit: usize,
}

impl PoiQuery {
    pub fn new(location: LocationQuery) -> Self {
        Self {
            location,
            keyword: DEFAULT_POI_KEYWORD.to_string(),
            category: None,
            radius_m: DEFAULT_POI_RADIUS_M,
            open_now: false,
            min_rating: None,
            limit: DEFAULT_POI_LIMIT,
        }
    }
}

impl SourceQuery for PoiQuery {
    fn cache_key(&self) -> String {
        format!(
            "poi_{}_{}_{}_{:.0}_{}_{}_{}",
            self.location.signature(),
            self.keyword.trim().to_lowercase(),
            self.category.map(|c| c.as_str()).unwrap_or("any"),
            self.radius_m,
            self.open_now,
            self.min_rating
                .map(|r| format!("{r:.1}"))
                .unwrap_or_else(|| "-".to_string()),
            self.limit
        )
    }

    fn location(&self) -> &LocationQuery {
        &self.location
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrowdLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoiAlert {
    pub id: String,
    pub severity: NoticeLevel,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoiStatus {
    pub id: String,
    pub name: String,
    pub coordinates: Coordinates,
    pub category: PoiCategory,
    pub address: String,
    pub rating: Option<f32>,
    pub is_open: bool,
    pub current_hours: String,
    pub crowd_level: CrowdLevel,
    pub queue_minutes: u32,
    pub capacity_pct: u8,
    pub booking_available: bool,
    pub alerts: Vec<PoiAlert>,
    pub updated_at: DateTime<Utc>,
}

/// Apply the query's search options to candidate POIs around `origin`.
///
/// Order is preserved; `limit` is applied last.
pub fn apply_filters(origin: &Coordinates, query: &PoiQuery, pois: Vec<PoiStatus>) -> Vec<PoiStatus> {
    pois.into_iter()
        .filter(|p| query.category.map_or(true, |c| p.category == c))
        .filter(|p| !query.open_now || p.is_open)
        .filter(|p| match query.min_rating {
            Some(min) => p.rating.is_some_and(|r| r >= min),
            None => true,
        })
        .filter(|p| origin.distance_m(&p.coordinates) <= query.radius_m)
        .take(query.limit)
        .collect()
}
