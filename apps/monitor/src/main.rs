mod config;

use anyhow::Context;
use config::{DeviceBackend, GeocodingBackend, MonitorConfig, WeatherBackend, CONFIG_ENV};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tripwatch_location::{
    Coordinates, DeviceLocator, FixedLocator, Gazetteer, IpApiLocator, LocationQuery,
    NominatimClient, NullLocator, PlaceResolver, ReverseGeocoder,
};
use tripwatch_realtime::{CompositeSnapshot, RealTimeInfoManager, SourceSet};
use tripwatch_sources::{CachedSource, Clock, Domain, OpenMeteoWeather, SystemClock};

const DEFAULT_LOG_FILTER: &str = "info,tripwatch=debug";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config::config_path(std::env::args().skip(1), std::env::var(CONFIG_ENV).ok());
    let config = MonitorConfig::load(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(config.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER))
        }))
        .init();

    info!(config = %path.display(), "Starting tripwatch monitor");

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("building HTTP client")?;
    let manager = build_manager(&config, http);

    let _updates = manager.subscribe_to_updates(log_snapshot);
    let _alerts = manager.subscribe_to_alerts(|event| {
        warn!(
            domain = %event.domain,
            severity = %event.severity,
            location = %event.location,
            "{}",
            event.title
        );
    });

    manager
        .initialize(config.location.as_deref().map(LocationQuery::place))
        .await
        .context("initializing monitor")?;
    manager.start_monitoring();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutting down");
    manager.dispose();
    Ok(())
}

fn build_manager(config: &MonitorConfig, http: reqwest::Client) -> RealTimeInfoManager {
    let (resolver, geocoder): (Arc<dyn PlaceResolver>, Arc<dyn ReverseGeocoder>) =
        match config.backends.geocoding {
            GeocodingBackend::Gazetteer => {
                let gazetteer = Arc::new(Gazetteer::new());
                (
                    gazetteer.clone() as Arc<dyn PlaceResolver>,
                    gazetteer as Arc<dyn ReverseGeocoder>,
                )
            }
            GeocodingBackend::Nominatim => {
                let nominatim = Arc::new(NominatimClient::new(http.clone()));
                (
                    nominatim.clone() as Arc<dyn PlaceResolver>,
                    nominatim as Arc<dyn ReverseGeocoder>,
                )
            }
        };

    let locator: Arc<dyn DeviceLocator> = match config.backends.device {
        DeviceBackend::None => Arc::new(NullLocator),
        DeviceBackend::Ip => Arc::new(IpApiLocator::new(http.clone())),
        DeviceBackend::Fixed {
            latitude,
            longitude,
        } => Arc::new(FixedLocator::new(Coordinates::new(latitude, longitude))),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let strategy = &config.realtime.cache;
    let mut sources = SourceSet::synthetic(Arc::clone(&resolver), strategy, Arc::clone(&clock));

    if config.backends.weather == WeatherBackend::OpenMeteo {
        let weather = CachedSource::with_ttl(
            OpenMeteoWeather::new(http),
            Arc::clone(&resolver),
            strategy.ttl(Domain::Weather),
        )
        .with_clock(Arc::clone(&clock));
        sources = sources.with_weather(Arc::new(weather));
    }

    info!(
        weather = ?config.backends.weather,
        geocoding = ?config.backends.geocoding,
        device = ?config.backends.device,
        "Backends selected"
    );

    RealTimeInfoManager::builder(sources)
        .config(config.realtime.clone())
        .place_resolver(resolver)
        .reverse_geocoder(geocoder)
        .device_locator(locator)
        .clock(clock)
        .build()
}

fn log_snapshot(snapshot: &CompositeSnapshot) {
    if snapshot.is_loading() || snapshot.summary.last_update.is_none() {
        return;
    }
    let summary = &snapshot.summary;
    info!(
        location = snapshot.location.as_ref().map_or("-", |l| l.address.as_str()),
        status = ?summary.overall_status,
        weather = ?summary.weather_severity,
        traffic = ?summary.traffic_level,
        alerts = summary.active_alerts,
        "Conditions"
    );
}
