//! Weather records, query, and alert derivation.

use crate::client::{SourceClient, SourceQuery};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tripwatch_location::LocationQuery;

pub const DEFAULT_FORECAST_DAYS: u8 = 7;

pub type WeatherClient = Arc<dyn SourceClient<Query = WeatherQuery, Record = WeatherReport>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherQuery {
    pub location: LocationQuery,
    pub forecast_days: u8,
}

impl WeatherQuery {
    pub fn new(location: LocationQuery) -> Self {
        Self {
            location,
            forecast_days: DEFAULT_FORECAST_DAYS,
        }
    }
}

impl SourceQuery for WeatherQuery {
    fn cache_key(&self) -> String {
        format!("{}_{}d", self.location.signature(), self.forecast_days)
    }

    fn location(&self) -> &LocationQuery {
        &self.location
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Thunderstorm,
}

impl WeatherCondition {
    /// Map a WMO weather interpretation code.
    pub fn from_wmo(code: u16) -> Self {
        match code {
            0 => Self::Clear,
            1 | 2 => Self::PartlyCloudy,
            3 => Self::Cloudy,
            45 | 48 => Self::Fog,
            51..=57 => Self::Drizzle,
            61 | 63 | 66 | 80 | 81 => Self::Rain,
            65 | 67 | 82 => Self::HeavyRain,
            71..=77 | 85 | 86 => Self::Snow,
            95..=99 => Self::Thunderstorm,
            _ => Self::Cloudy,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Clear => "晴",
            Self::PartlyCloudy => "多云",
            Self::Cloudy => "阴",
            Self::Fog => "雾",
            Self::Drizzle => "毛毛雨",
            Self::Rain => "雨",
            Self::HeavyRain => "大雨",
            Self::Snow => "雪",
            Self::Thunderstorm => "雷阵雨",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Clear => "01d",
            Self::PartlyCloudy => "02d",
            Self::Cloudy => "04d",
            Self::Fog => "50d",
            Self::Drizzle => "09d",
            Self::Rain | Self::HeavyRain => "10d",
            Self::Snow => "13d",
            Self::Thunderstorm => "11d",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConditions {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    pub visibility_km: f64,
    pub uv_index: f64,
    pub wind_speed_kmh: f64,
    pub wind_direction_deg: f64,
    pub condition: WeatherCondition,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub high_c: f64,
    pub low_c: f64,
    pub condition: WeatherCondition,
    pub description: String,
    pub icon: String,
    pub humidity_pct: f64,
    pub wind_speed_kmh: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherAlertKind {
    Storm,
    Heat,
    Cold,
    Wind,
    Fog,
    Rain,
    Snow,
}

/// Weather alert level, ordered least to most serious.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
    Extreme,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherAlert {
    pub id: String,
    pub kind: WeatherAlertKind,
    pub severity: AlertLevel,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub recommendations: Vec<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    pub location_label: String,
    pub current: CurrentConditions,
    pub forecast: Vec<DailyForecast>,
    pub alerts: Vec<WeatherAlert>,
    pub updated_at: DateTime<Utc>,
}

impl WeatherReport {
    pub fn active_alerts(&self) -> impl Iterator<Item = &WeatherAlert> {
        self.alerts.iter().filter(|a| a.active)
    }
}

/// Derive alerts from observed conditions.
///
/// Shared by every weather backend so the same thresholds apply whether the
/// numbers came from a live API or a generator.
pub fn derive_alerts(
    current: &CurrentConditions,
    location: &str,
    now: DateTime<Utc>,
) -> Vec<WeatherAlert> {
    let mut alerts = Vec::new();
    let mut push = |kind: WeatherAlertKind,
                    severity: AlertLevel,
                    title: &str,
                    description: String,
                    recommendations: &[&str],
                    hours: i64| {
        alerts.push(WeatherAlert {
            // Stable for one kind, place and day so an ongoing condition keeps its id.
            id: format!("wx_{:?}_{}_{}", kind, location, now.format("%Y%m%d")).to_lowercase(),
            kind,
            severity,
            title: title.to_string(),
            description,
            location: location.to_string(),
            start_time: now,
            end_time: Some(now + Duration::hours(hours)),
            recommendations: recommendations.iter().map(|s| s.to_string()).collect(),
            active: true,
        });
    };

    match current.condition {
        WeatherCondition::Thunderstorm => push(
            WeatherAlertKind::Storm,
            AlertLevel::High,
            "雷暴预警",
            format!("{location}出现雷阵雨天气"),
            &["避免户外活动", "远离高大建筑和树木"],
            3,
        ),
        WeatherCondition::HeavyRain => push(
            WeatherAlertKind::Rain,
            AlertLevel::Medium,
            "暴雨预警",
            format!("{location}有强降雨"),
            &["注意道路积水", "携带雨具"],
            6,
        ),
        WeatherCondition::Snow => push(
            WeatherAlertKind::Snow,
            AlertLevel::Medium,
            "降雪提示",
            format!("{location}有降雪"),
            &["注意路面湿滑", "注意保暖"],
            6,
        ),
        WeatherCondition::Fog if current.visibility_km < 1.0 => push(
            WeatherAlertKind::Fog,
            AlertLevel::Medium,
            "大雾预警",
            format!("能见度 {:.1} 公里", current.visibility_km),
            &["减速慢行", "开启雾灯"],
            4,
        ),
        _ => {}
    }

    if current.wind_speed_kmh >= 88.0 {
        push(
            WeatherAlertKind::Wind,
            AlertLevel::Extreme,
            "大风红色预警",
            format!("风速 {:.0} km/h", current.wind_speed_kmh),
            &["留在室内", "远离临时搭建物"],
            6,
        );
    } else if current.wind_speed_kmh >= 62.0 {
        push(
            WeatherAlertKind::Wind,
            AlertLevel::High,
            "大风预警",
            format!("风速 {:.0} km/h", current.wind_speed_kmh),
            &["减少户外活动"],
            6,
        );
    }

    if current.temperature_c >= 40.0 {
        push(
            WeatherAlertKind::Heat,
            AlertLevel::Extreme,
            "高温红色预警",
            format!("气温 {:.0}°C", current.temperature_c),
            &["避免正午外出", "及时补充水分"],
            8,
        );
    } else if current.temperature_c >= 35.0 {
        push(
            WeatherAlertKind::Heat,
            AlertLevel::Medium,
            "高温预警",
            format!("气温 {:.0}°C", current.temperature_c),
            &["及时补充水分"],
            8,
        );
    } else if current.temperature_c <= -15.0 {
        push(
            WeatherAlertKind::Cold,
            AlertLevel::High,
            "寒潮预警",
            format!("气温 {:.0}°C", current.temperature_c),
            &["注意保暖", "减少户外停留"],
            12,
        );
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn conditions(condition: WeatherCondition) -> CurrentConditions {
        CurrentConditions {
            temperature_c: 22.0,
            humidity_pct: 50.0,
            pressure_hpa: 1013.0,
            visibility_km: 10.0,
            uv_index: 3.0,
            wind_speed_kmh: 10.0,
            wind_direction_deg: 180.0,
            condition,
            description: condition.label().to_string(),
            icon: condition.icon().to_string(),
        }
    }

    #[test]
    fn test_wmo_mapping() {
        assert_eq!(WeatherCondition::from_wmo(0), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_wmo(65), WeatherCondition::HeavyRain);
        assert_eq!(WeatherCondition::from_wmo(96), WeatherCondition::Thunderstorm);
        assert_eq!(WeatherCondition::from_wmo(73), WeatherCondition::Snow);
    }

    #[test]
    fn test_alert_id_survives_refetch_same_day() {
        let mut hot = conditions(WeatherCondition::Thunderstorm);
        hot.temperature_c = 41.0;
        let morning = Utc.with_ymd_and_hms(2024, 7, 1, 2, 0, 0).unwrap();
        let first = derive_alerts(&hot, "北京", morning);
        let later = derive_alerts(&hot, "北京", morning + Duration::minutes(45));
        let next_day = derive_alerts(&hot, "北京", morning + Duration::days(1));

        let ids = |alerts: &[WeatherAlert]| alerts.iter().map(|a| a.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&later));
        assert_ne!(ids(&first), ids(&next_day));
        assert_ne!(
            ids(&first),
            ids(&derive_alerts(&hot, "上海", morning))
        );
    }

    #[test]
    fn test_mild_weather_has_no_alerts() {
        let alerts = derive_alerts(&conditions(WeatherCondition::Clear), "北京", Utc::now());
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_storm_and_wind_alerts() {
        let mut c = conditions(WeatherCondition::Thunderstorm);
        c.wind_speed_kmh = 95.0;
        let now = Utc::now();
        let alerts = derive_alerts(&c, "北京", now);
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.active && a.start_time == now));
        assert_eq!(
            alerts.iter().map(|a| a.severity).max(),
            Some(AlertLevel::Extreme)
        );
        assert_ne!(alerts[0].id, alerts[1].id);
    }

    #[test]
    fn test_heat_thresholds() {
        let mut c = conditions(WeatherCondition::Clear);
        c.temperature_c = 36.0;
        assert_eq!(
            derive_alerts(&c, "x", Utc::now())[0].severity,
            AlertLevel::Medium
        );
        c.temperature_c = 41.0;
        assert_eq!(
            derive_alerts(&c, "x", Utc::now())[0].severity,
            AlertLevel::Extreme
        );
    }

    #[test]
    fn test_alert_level_ordering() {
        assert!(AlertLevel::Extreme > AlertLevel::High);
        assert!(AlertLevel::Medium > AlertLevel::Low);
    }

    #[test]
    fn test_cache_key_includes_days() {
        let mut q = WeatherQuery::new(LocationQuery::place("Beijing"));
        let a = q.cache_key();
        q.forecast_days = 3;
        assert_ne!(a, q.cache_key());
    }
}
