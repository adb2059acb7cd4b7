//! User preferences: polling cadence and which domains raise alerts.

use serde::{Deserialize, Serialize};
use tripwatch_sources::Domain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateFrequency {
    Realtime,
    Frequent,
    #[default]
    Normal,
    Low,
}

impl UpdateFrequency {
    /// Factor applied to each domain's cache TTL to get its polling interval.
    pub fn multiplier(&self) -> f64 {
        match self {
            UpdateFrequency::Realtime => 0.1,
            UpdateFrequency::Frequent => 0.5,
            UpdateFrequency::Normal => 1.0,
            UpdateFrequency::Low => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertSettings {
    pub weather: bool,
    pub traffic: bool,
    pub poi: bool,
    pub emergency: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            weather: true,
            traffic: true,
            poi: false,
            emergency: true,
        }
    }
}

impl AlertSettings {
    pub fn enabled(&self, domain: Domain) -> bool {
        match domain {
            Domain::Weather => self.weather,
            Domain::Traffic => self.traffic,
            Domain::Poi => self.poi,
            Domain::Emergency => self.emergency,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    pub update_frequency: UpdateFrequency,
    pub alert_settings: AlertSettings,
}

/// Partial update; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferencesUpdate {
    pub update_frequency: Option<UpdateFrequency>,
    pub alert_settings: Option<AlertSettingsUpdate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertSettingsUpdate {
    pub weather: Option<bool>,
    pub traffic: Option<bool>,
    pub poi: Option<bool>,
    pub emergency: Option<bool>,
}

impl PreferencesUpdate {
    pub fn frequency(frequency: UpdateFrequency) -> Self {
        Self {
            update_frequency: Some(frequency),
            ..Default::default()
        }
    }

    /// Merge into `prefs`. Returns true when the update frequency changed.
    pub fn apply(&self, prefs: &mut UserPreferences) -> bool {
        let mut frequency_changed = false;
        if let Some(frequency) = self.update_frequency {
            frequency_changed = frequency != prefs.update_frequency;
            prefs.update_frequency = frequency;
        }
        if let Some(alerts) = self.alert_settings {
            let s = &mut prefs.alert_settings;
            s.weather = alerts.weather.unwrap_or(s.weather);
            s.traffic = alerts.traffic.unwrap_or(s.traffic);
            s.poi = alerts.poi.unwrap_or(s.poi);
            s.emergency = alerts.emergency.unwrap_or(s.emergency);
        }
        frequency_changed
    }
}
