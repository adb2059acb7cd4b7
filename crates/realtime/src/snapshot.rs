//! The composite view handed to subscribers.

use crate::summary::Summary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tripwatch_location::ResolvedLocation;
use tripwatch_sources::{EmergencyReport, PoiStatus, TrafficReport, WeatherReport};

/// One domain's last-known-good data plus its fetch status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSlot<T> {
    pub data: Option<T>,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl<T> Default for DomainSlot<T> {
    fn default() -> Self {
        Self {
            data: None,
            last_updated: None,
            is_loading: false,
            error: None,
        }
    }
}

impl<T> DomainSlot<T> {
    pub(crate) fn begin(&mut self) {
        self.is_loading = true;
    }

    pub(crate) fn succeed(&mut self, data: T, at: DateTime<Utc>) {
        self.data = Some(data);
        self.last_updated = Some(at);
        self.error = None;
        self.is_loading = false;
    }

    /// Previous data is kept.
    pub(crate) fn fail(&mut self, error: String) {
        self.error = Some(error);
        self.is_loading = false;
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeSnapshot {
    pub location: Option<ResolvedLocation>,
    pub weather: DomainSlot<WeatherReport>,
    pub traffic: DomainSlot<TrafficReport>,
    pub poi: DomainSlot<Vec<PoiStatus>>,
    pub emergency: DomainSlot<EmergencyReport>,
    pub summary: Summary,
}

impl CompositeSnapshot {
    pub fn is_loading(&self) -> bool {
        self.weather.is_loading
            || self.traffic.is_loading
            || self.poi.is_loading
            || self.emergency.is_loading
    }
}
