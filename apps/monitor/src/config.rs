//! Monitor configuration: the aggregator settings plus backend selection.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tripwatch_realtime::RealtimeConfig;

pub const CONFIG_ENV: &str = "TRIPWATCH_CONFIG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeatherBackend {
    #[default]
    Synthetic,
    OpenMeteo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeocodingBackend {
    #[default]
    Gazetteer,
    Nominatim,
}

/// Where "current position" comes from when no location is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeviceBackend {
    #[default]
    None,
    Ip,
    Fixed { latitude: f64, longitude: f64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Backends {
    pub weather: WeatherBackend,
    pub geocoding: GeocodingBackend,
    pub device: DeviceBackend,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    #[serde(flatten)]
    pub realtime: RealtimeConfig,
    pub backends: Backends,
    /// Place name to monitor; device location or the default otherwise.
    pub location: Option<String>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl MonitorConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(json) => {
                let config: Self = serde_json::from_str(&json)
                    .with_context(|| format!("parsing {}", path.display()))?;
                config
                    .realtime
                    .validate()
                    .with_context(|| format!("validating {}", path.display()))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

/// `--config <path>` (or `--config=<path>`), then `env`, then the user
/// config directory.
pub fn config_path<I>(args: I, env: Option<String>) -> PathBuf
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = env.filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripwatch")
        .join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripwatch_realtime::UpdateFrequency;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flag_wins_over_env() {
        let path = config_path(args(&["--config", "/tmp/a.json"]), Some("/tmp/b.json".into()));
        assert_eq!(path, PathBuf::from("/tmp/a.json"));

        let path = config_path(args(&["--config=/tmp/c.json"]), None);
        assert_eq!(path, PathBuf::from("/tmp/c.json"));
    }

    #[test]
    fn test_env_then_default_dir() {
        assert_eq!(
            config_path(args(&[]), Some("/tmp/b.json".into())),
            PathBuf::from("/tmp/b.json")
        );
        let fallback = config_path(args(&[]), None);
        assert!(fallback.ends_with("tripwatch/config.json"));
    }

    #[test]
    fn test_flattened_realtime_fields() {
        let config: MonitorConfig = serde_json::from_str(
            r#"{
                "forecastDays": 3,
                "preferences": {"updateFrequency": "realtime"},
                "backends": {"weather": "open-meteo", "device": {"kind": "fixed", "latitude": 31.23, "longitude": 121.47}},
                "location": "上海"
            }"#,
        )
        .unwrap();

        assert_eq!(config.realtime.forecast_days, 3);
        assert_eq!(
            config.realtime.preferences.update_frequency,
            UpdateFrequency::Realtime
        );
        assert_eq!(config.backends.weather, WeatherBackend::OpenMeteo);
        assert_eq!(config.backends.geocoding, GeocodingBackend::Gazetteer);
        assert_eq!(
            config.backends.device,
            DeviceBackend::Fixed {
                latitude: 31.23,
                longitude: 121.47
            }
        );
        assert_eq!(config.location.as_deref(), Some("上海"));
    }

    #[test]
    fn test_load_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let missing = MonitorConfig::load(&dir.path().join("none.json")).unwrap();
        assert_eq!(missing, MonitorConfig::default());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ nope").unwrap();
        let err = MonitorConfig::load(&bad).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_load_rejects_negative_poi_radius() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("radius.json");
        std::fs::write(&path, r#"{"poi": {"radiusM": -100.0}, "location": "上海"}"#).unwrap();

        let err = MonitorConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("validating"));
        assert!(format!("{err:#}").contains("poi.radiusM"));
    }
}
