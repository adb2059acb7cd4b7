//! Live weather from the Open-Meteo forecast API (no key required).

use crate::client::{Domain, Provider};
use crate::error::{Result, SourceError};
use crate::weather::{
    derive_alerts, CurrentConditions, DailyForecast, WeatherCondition, WeatherQuery,
    WeatherReport,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tripwatch_location::Coordinates;

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,surface_pressure,\
visibility,uv_index,wind_speed_10m,wind_direction_10m,weather_code";
const DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,\
relative_humidity_2m_mean,wind_speed_10m_max";

#[derive(Debug, serde::Deserialize)]
struct ForecastResponse {
    current: CurrentBlock,
    #[serde(default)]
    daily: Option<DailyBlock>,
}

#[derive(Debug, serde::Deserialize)]
struct CurrentBlock {
    temperature_2m: f64,
    #[serde(default)]
    relative_humidity_2m: Option<f64>,
    #[serde(default)]
    surface_pressure: Option<f64>,
    /// Metres.
    #[serde(default)]
    visibility: Option<f64>,
    #[serde(default)]
    uv_index: Option<f64>,
    #[serde(default)]
    wind_speed_10m: Option<f64>,
    #[serde(default)]
    wind_direction_10m: Option<f64>,
    weather_code: u16,
}

#[derive(Debug, Default, serde::Deserialize)]
struct DailyBlock {
    #[serde(default)]
    time: Vec<NaiveDate>,
    #[serde(default)]
    weather_code: Vec<Option<u16>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m_mean: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m_max: Vec<Option<f64>>,
}

pub struct OpenMeteoWeather {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoWeather {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get(&self, at: Coordinates, days: u8) -> Result<ForecastResponse> {
        let failed = |e: String| SourceError::fetch_failed(Domain::Weather, e);
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", at.latitude.to_string()),
                ("longitude", at.longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
                ("daily", DAILY_FIELDS.to_string()),
                ("wind_speed_unit", "kmh".to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", days.clamp(1, 16).to_string()),
            ])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(failed(resp.status().to_string()));
        }

        resp.json::<ForecastResponse>()
            .await
            .map_err(|e| failed(e.to_string()))
    }
}

#[async_trait]
impl Provider for OpenMeteoWeather {
    type Query = WeatherQuery;
    type Record = WeatherReport;

    fn domain(&self) -> Domain {
        Domain::Weather
    }

    async fn fetch(
        &self,
        query: &WeatherQuery,
        at: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<WeatherReport> {
        let resp = self.get(at, query.forecast_days).await?;
        let report = normalize(resp, &query.location.label(), now);
        tracing::debug!(
            location = %report.location_label,
            condition = ?report.current.condition,
            alerts = report.alerts.len(),
            "open-meteo weather fetched"
        );
        Ok(report)
    }
}

fn normalize(resp: ForecastResponse, label: &str, now: DateTime<Utc>) -> WeatherReport {
    let c = resp.current;
    let condition = WeatherCondition::from_wmo(c.weather_code);
    let current = CurrentConditions {
        temperature_c: c.temperature_2m,
        humidity_pct: c.relative_humidity_2m.unwrap_or_default(),
        pressure_hpa: c.surface_pressure.unwrap_or(1013.0),
        visibility_km: c.visibility.map(|m| m / 1000.0).unwrap_or(10.0),
        uv_index: c.uv_index.unwrap_or_default(),
        wind_speed_kmh: c.wind_speed_10m.unwrap_or_default(),
        wind_direction_deg: c.wind_direction_10m.unwrap_or_default(),
        condition,
        description: condition.label().to_string(),
        icon: condition.icon().to_string(),
    };

    let daily = resp.daily.unwrap_or_default();
    let at = |v: &[Option<f64>], i: usize| v.get(i).copied().flatten();
    let forecast = daily
        .time
        .iter()
        .enumerate()
        .filter_map(|(i, date)| {
            let condition =
                WeatherCondition::from_wmo(daily.weather_code.get(i).copied().flatten()?);
            Some(DailyForecast {
                date: *date,
                high_c: at(&daily.temperature_2m_max, i)?,
                low_c: at(&daily.temperature_2m_min, i)?,
                condition,
                description: condition.label().to_string(),
                icon: condition.icon().to_string(),
                humidity_pct: at(&daily.relative_humidity_2m_mean, i).unwrap_or_default(),
                wind_speed_kmh: at(&daily.wind_speed_10m_max, i).unwrap_or_default(),
            })
        })
        .collect();

    let alerts = derive_alerts(&current, label, now);

    WeatherReport {
        location_label: label.to_string(),
        current,
        forecast,
        alerts,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "latitude": 39.9, "longitude": 116.4,
        "current": {
            "time": "2024-07-01T14:00", "interval": 900,
            "temperature_2m": 36.4, "relative_humidity_2m": 40,
            "surface_pressure": 1002.1, "visibility": 24140.0, "uv_index": 8.1,
            "wind_speed_10m": 12.5, "wind_direction_10m": 190, "weather_code": 95
        },
        "daily": {
            "time": ["2024-07-01", "2024-07-02"],
            "weather_code": [95, null],
            "temperature_2m_max": [37.0, 33.0],
            "temperature_2m_min": [26.0, 24.0],
            "relative_humidity_2m_mean": [45, 50],
            "wind_speed_10m_max": [20.0, 15.0]
        }
    }"#;

    #[test]
    fn test_normalize_sample() {
        let resp: ForecastResponse = serde_json::from_str(SAMPLE).unwrap();
        let report = normalize(resp, "北京", Utc::now());

        assert_eq!(report.current.condition, WeatherCondition::Thunderstorm);
        assert!((report.current.visibility_km - 24.14).abs() < 1e-9);
        // Second day has no weather code and is skipped.
        assert_eq!(report.forecast.len(), 1);
        assert_eq!(report.forecast[0].high_c, 37.0);
        // Thunderstorm plus heat.
        assert_eq!(report.alerts.len(), 2);
        assert_eq!(report.location_label, "北京");
    }

    #[test]
    fn test_missing_daily_block() {
        let json = r#"{"current": {"temperature_2m": 20.0, "weather_code": 0}}"#;
        let resp: ForecastResponse = serde_json::from_str(json).unwrap();
        let report = normalize(resp, "x", Utc::now());
        assert!(report.forecast.is_empty());
        assert!(report.alerts.is_empty());
        assert_eq!(report.current.pressure_hpa, 1013.0);
    }
}
