//! The aggregator: owns the composite snapshot, drives the four source
//! clients, and fans updates out to subscribers.

use crate::alerts::{select_new, AlertEvent, AlertRecord};
use crate::clients::SourceSet;
use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, Result};
use crate::preferences::{PreferencesUpdate, UserPreferences};
use crate::scheduler::{monitoring_interval, panic_message, MonitoringScheduler, RefreshFn};
use crate::snapshot::{CompositeSnapshot, DomainSlot};
use crate::summary::compute_summary;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, error, info, warn};
use tripwatch_bus::{Subscription, SubscriptionBus};
use tripwatch_location::{
    resolve_query, Coordinates, DeviceLocator, Gazetteer, LocationQuery, NullLocator,
    PlaceResolver, ResolvedLocation, ReverseGeocoder,
};
use tripwatch_sources::poi::PoiCategory;
use tripwatch_sources::{
    CacheStatus, Clock, Domain, EmergencyQuery, PoiQuery, SourceClient, SourceError,
    SystemClock, TrafficQuery, TravelMode, WeatherQuery,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

#[derive(Default)]
struct ManagerState {
    lifecycle: Lifecycle,
    location: Option<LocationQuery>,
    preferences: UserPreferences,
}

struct Inner {
    sources: SourceSet,
    config: RealtimeConfig,
    resolver: Arc<dyn PlaceResolver>,
    geocoder: Arc<dyn ReverseGeocoder>,
    locator: Arc<dyn DeviceLocator>,
    clock: Arc<dyn Clock>,

    /// Serializes `initialize` per instance.
    init_lock: tokio::sync::Mutex<()>,
    state: Mutex<ManagerState>,
    snapshot: Mutex<CompositeSnapshot>,
    /// Held while a snapshot is cloned and delivered, so deliveries are ordered.
    publish_lock: Mutex<()>,
    /// Alert ids already seen per domain.
    delivered: Mutex<HashMap<Domain, HashSet<String>>>,

    updates: SubscriptionBus<CompositeSnapshot>,
    alerts: SubscriptionBus<AlertEvent>,
    scheduler: MonitoringScheduler,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn no_location() -> SourceError {
    SourceError::LocationUnresolved("no location set".to_string())
}

type SlotFn<R> = fn(&mut CompositeSnapshot) -> &mut DomainSlot<R>;

/// Await a client call; a panic inside it becomes a fetch failure.
async fn guarded<R, F>(domain: Domain, fetch: F) -> std::result::Result<R, SourceError>
where
    F: Future<Output = std::result::Result<R, SourceError>>,
{
    match AssertUnwindSafe(fetch).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref()).to_string();
            error!(%domain, panic = %message, "source client panicked");
            Err(SourceError::fetch_failed(
                domain,
                format!("source client panicked: {message}"),
            ))
        }
    }
}

/// One-off route for a traffic refresh. Unset fields fall back to the
/// stored location and the configured destination and mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteOverride {
    pub origin: Option<LocationQuery>,
    pub destination: Option<String>,
    pub mode: Option<TravelMode>,
}

/// One-off POI search terms; unset fields come from the config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoiSearch {
    pub keyword: Option<String>,
    pub category: Option<PoiCategory>,
}

impl Inner {
    fn lifecycle(&self) -> Lifecycle {
        lock(&self.state).lifecycle
    }

    fn set_lifecycle(&self, lifecycle: Lifecycle) {
        lock(&self.state).lifecycle = lifecycle;
    }

    fn location(&self) -> Option<LocationQuery> {
        lock(&self.state).location.clone()
    }

    fn preferences(&self) -> UserPreferences {
        lock(&self.state).preferences.clone()
    }

    fn store_location(&self, query: LocationQuery, resolved: ResolvedLocation) {
        lock(&self.state).location = Some(query);
        lock(&self.snapshot).location = Some(resolved);
    }

    /// Address for display; falls back to `fallback` or the coordinates.
    async fn describe(&self, coordinates: Coordinates, fallback: Option<String>) -> String {
        match self.geocoder.address_for(coordinates).await {
            Ok(address) => address.display_name,
            Err(e) => {
                debug!(error = %e, %coordinates, "reverse geocoding failed");
                fallback.unwrap_or_else(|| coordinates.to_string())
            }
        }
    }

    fn publish(&self) {
        let _order = lock(&self.publish_lock);
        let snapshot = lock(&self.snapshot).clone();
        self.updates.publish(&snapshot);
    }

    fn recompute(&self, snapshot: &mut CompositeSnapshot, now: DateTime<Utc>) {
        snapshot.summary = compute_summary(
            snapshot.weather.data.as_ref(),
            snapshot.traffic.data.as_ref(),
            snapshot.emergency.data.as_ref(),
            now,
        );
    }

    fn begin<R>(&self, slot: SlotFn<R>) {
        slot(&mut lock(&self.snapshot)).begin();
        self.publish();
    }

    fn finish<R: AlertRecord>(
        &self,
        domain: Domain,
        slot: SlotFn<R>,
        result: std::result::Result<R, SourceError>,
        recompute: bool,
    ) {
        let now = self.clock.now();
        let events = {
            let mut snapshot = lock(&self.snapshot);
            let events = match result {
                Ok(data) => {
                    let events = data.alert_events();
                    slot(&mut snapshot).succeed(data, now);
                    debug!(%domain, "refresh succeeded");
                    Some(events)
                }
                Err(e) => {
                    warn!(%domain, error = %e, "refresh failed");
                    slot(&mut snapshot).fail(e.to_string());
                    None
                }
            };
            if recompute {
                self.recompute(&mut snapshot, now);
            }
            events
        };
        self.publish();

        if let Some(events) = events {
            self.emit_alerts(domain, events, now);
        }
    }

    fn emit_alerts(&self, domain: Domain, events: Vec<AlertEvent>, now: DateTime<Utc>) {
        let prefs = self.preferences();
        let window = monitoring_interval(&self.config.cache, domain, prefs.update_frequency);
        let since = now - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());

        let fresh = select_new(
            events,
            since,
            lock(&self.delivered).entry(domain).or_default(),
        );
        if !prefs.alert_settings.enabled(domain) {
            return;
        }
        for event in &fresh {
            info!(%domain, id = %event.id, severity = %event.severity, title = %event.title, "new alert");
            self.alerts.publish(event);
        }
    }

    /// Resolve `query` and look up its display address.
    async fn locate(&self, query: &LocationQuery) -> Result<ResolvedLocation> {
        let coordinates = resolve_query(self.resolver.as_ref(), query)
            .await
            .map_err(|e| {
                warn!(location = %query.label(), error = %e, "location could not be resolved");
                RealtimeError::LocationUnresolved(e.to_string())
            })?;

        let (fallback, timestamp) = match query {
            LocationQuery::Place(name) => (Some(name.trim().to_string()), self.clock.now()),
            LocationQuery::Coordinates(fix) => (None, fix.timestamp),
        };
        let address = self.describe(coordinates, fallback).await;
        Ok(ResolvedLocation {
            coordinates,
            address,
            timestamp,
        })
    }

    async fn refresh_weather(&self, recompute: bool) {
        self.begin(|s| &mut s.weather);
        let query = self.location().map(|location| WeatherQuery {
            location,
            forecast_days: self.config.forecast_days,
        });
        let result = match &query {
            Some(q) => guarded(Domain::Weather, self.sources.weather.fetch(q)).await,
            None => Err(no_location()),
        };
        self.finish(Domain::Weather, |s| &mut s.weather, result, recompute);
    }

    async fn refresh_traffic(&self, route: &RouteOverride, recompute: bool) {
        self.begin(|s| &mut s.traffic);
        let settings = &self.config.traffic;
        let query = route
            .origin
            .clone()
            .or_else(|| self.location())
            .map(|origin| TrafficQuery {
                origin,
                destination: route
                    .destination
                    .clone()
                    .unwrap_or_else(|| settings.destination.clone()),
                mode: route.mode.unwrap_or(settings.mode),
            });
        let result = match &query {
            Some(q) => guarded(Domain::Traffic, self.sources.traffic.fetch(q)).await,
            None => Err(no_location()),
        };
        self.finish(Domain::Traffic, |s| &mut s.traffic, result, recompute);
    }

    async fn refresh_poi(&self, search: &PoiSearch, recompute: bool) {
        self.begin(|s| &mut s.poi);
        let query = self.location().map(|location| {
            let settings = &self.config.poi;
            PoiQuery {
                keyword: search
                    .keyword
                    .clone()
                    .unwrap_or_else(|| settings.keyword.clone()),
                category: search.category.or(settings.category),
                radius_m: settings.radius_m,
                limit: settings.limit,
                ..PoiQuery::new(location)
            }
        });
        let result = match &query {
            Some(q) => guarded(Domain::Poi, self.sources.poi.fetch(q)).await,
            None => Err(no_location()),
        };
        self.finish(Domain::Poi, |s| &mut s.poi, result, recompute);
    }

    async fn refresh_emergency(&self, recompute: bool) {
        self.begin(|s| &mut s.emergency);
        let query = self.location().map(|location| EmergencyQuery {
            location,
            radius_m: self.config.emergency.radius_m,
        });
        let result = match &query {
            Some(q) => guarded(Domain::Emergency, self.sources.emergency.fetch(q)).await,
            None => Err(no_location()),
        };
        self.finish(Domain::Emergency, |s| &mut s.emergency, result, recompute);
    }

    async fn refresh_domain(&self, domain: Domain, recompute: bool) {
        match domain {
            Domain::Weather => self.refresh_weather(recompute).await,
            Domain::Traffic => {
                self.refresh_traffic(&RouteOverride::default(), recompute)
                    .await
            }
            Domain::Poi => self.refresh_poi(&PoiSearch::default(), recompute).await,
            Domain::Emergency => self.refresh_emergency(recompute).await,
        }
    }

    async fn refresh_all(&self) {
        let (route, search) = (RouteOverride::default(), PoiSearch::default());
        futures::join!(
            self.refresh_weather(false),
            self.refresh_traffic(&route, false),
            self.refresh_poi(&search, false),
            self.refresh_emergency(false),
        );

        let now = self.clock.now();
        let summary = {
            let mut snapshot = lock(&self.snapshot);
            self.recompute(&mut snapshot, now);
            snapshot.summary.clone()
        };
        self.publish();
        info!(
            status = ?summary.overall_status,
            traffic = ?summary.traffic_level,
            weather = ?summary.weather_severity,
            active_alerts = summary.active_alerts,
            "all domains refreshed"
        );
    }
}

/// Builder for [`RealTimeInfoManager`].
pub struct ManagerBuilder {
    sources: SourceSet,
    config: RealtimeConfig,
    resolver: Arc<dyn PlaceResolver>,
    geocoder: Arc<dyn ReverseGeocoder>,
    locator: Arc<dyn DeviceLocator>,
    clock: Arc<dyn Clock>,
}

impl ManagerBuilder {
    pub fn new(sources: SourceSet) -> Self {
        let gazetteer = Arc::new(Gazetteer::new());
        Self {
            sources,
            config: RealtimeConfig::default(),
            resolver: gazetteer.clone(),
            geocoder: gazetteer,
            locator: Arc::new(NullLocator),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: RealtimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn place_resolver(mut self, resolver: Arc<dyn PlaceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn reverse_geocoder(mut self, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        self.geocoder = geocoder;
        self
    }

    pub fn device_locator(mut self, locator: Arc<dyn DeviceLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> RealTimeInfoManager {
        let preferences = self.config.preferences.clone();
        RealTimeInfoManager {
            inner: Arc::new(Inner {
                sources: self.sources,
                config: self.config,
                resolver: self.resolver,
                geocoder: self.geocoder,
                locator: self.locator,
                clock: self.clock,
                init_lock: tokio::sync::Mutex::new(()),
                state: Mutex::new(ManagerState {
                    preferences,
                    ..Default::default()
                }),
                snapshot: Mutex::new(CompositeSnapshot::default()),
                publish_lock: Mutex::new(()),
                delivered: Mutex::new(HashMap::new()),
                updates: SubscriptionBus::new(),
                alerts: SubscriptionBus::new(),
                scheduler: MonitoringScheduler::new(),
            }),
        }
    }
}

/// Real-time information manager.
///
/// Cheap to clone; clones share state. Call [`RealTimeInfoManager::dispose`]
/// to stop timers and drop subscribers.
#[derive(Clone)]
pub struct RealTimeInfoManager {
    inner: Arc<Inner>,
}

impl RealTimeInfoManager {
    pub fn builder(sources: SourceSet) -> ManagerBuilder {
        ManagerBuilder::new(sources)
    }

    /// Resolve a location and run the first full refresh.
    ///
    /// With no explicit location the device locator is asked, then the
    /// configured default is used. Calling again while ready without a
    /// location does nothing.
    pub async fn initialize(&self, location: Option<LocationQuery>) -> Result<()> {
        let inner = &self.inner;
        let _init = inner.init_lock.lock().await;

        let previous = inner.lifecycle();
        if previous == Lifecycle::Ready && location.is_none() {
            debug!("already initialized");
            return Ok(());
        }
        inner.set_lifecycle(Lifecycle::Initializing);

        let query = match location {
            Some(query) => query,
            None => match inner.locator.current_position().await {
                Ok(fix) => LocationQuery::Coordinates(fix),
                Err(e) => {
                    debug!(error = %e, "device location unavailable, using default");
                    inner.config.default_location.query()
                }
            },
        };

        let resolved = match inner.locate(&query).await {
            Ok(resolved) => resolved,
            Err(e) => {
                inner.set_lifecycle(previous);
                return Err(e);
            }
        };
        info!(address = %resolved.address, coordinates = %resolved.coordinates, "location set");
        inner.store_location(query, resolved);

        inner.refresh_all().await;
        inner.set_lifecycle(Lifecycle::Ready);
        info!("real-time info manager ready");
        Ok(())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle()
    }

    pub fn get_current_data(&self) -> CompositeSnapshot {
        lock(&self.inner.snapshot).clone()
    }

    /// Register for snapshot updates. The callback runs once immediately with
    /// the current snapshot.
    ///
    /// Deliveries are serialized; a callback must not subscribe re-entrantly.
    pub fn subscribe_to_updates<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CompositeSnapshot) + Send + Sync + 'static,
    {
        let _order = lock(&self.inner.publish_lock);
        let current = lock(&self.inner.snapshot).clone();
        self.inner.updates.subscribe_with_current(callback, &current)
    }

    /// Register for new alerts across enabled domains.
    pub fn subscribe_to_alerts<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AlertEvent) + Send + Sync + 'static,
    {
        self.inner.alerts.subscribe(callback)
    }

    pub async fn refresh_all_data(&self) {
        self.inner.refresh_all().await;
    }

    pub async fn refresh_weather_data(&self) {
        self.inner.refresh_weather(true).await;
    }

    pub async fn refresh_traffic_data(&self) {
        self.inner
            .refresh_traffic(&RouteOverride::default(), true)
            .await;
    }

    /// Refresh traffic for a different route without touching the config.
    pub async fn refresh_traffic_route(&self, route: RouteOverride) {
        self.inner.refresh_traffic(&route, true).await;
    }

    pub async fn refresh_poi_data(&self) {
        self.inner.refresh_poi(&PoiSearch::default(), true).await;
    }

    /// Refresh points of interest with different search terms.
    pub async fn refresh_poi_search(&self, search: PoiSearch) {
        self.inner.refresh_poi(&search, true).await;
    }

    pub async fn refresh_emergency_data(&self) {
        self.inner.refresh_emergency(true).await;
    }

    /// Replace the user's location with coordinates or a place name.
    ///
    /// Publishes the new location but does not refresh any domain.
    pub async fn set_user_location(&self, location: impl Into<LocationQuery>) -> Result<()> {
        let query = location.into();
        let resolved = self.inner.locate(&query).await?;
        info!(address = %resolved.address, coordinates = %resolved.coordinates, "user location changed");
        self.inner.store_location(query, resolved);
        self.inner.publish();
        Ok(())
    }

    fn refresh_fn(&self) -> RefreshFn {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Arc::new(move |domain| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh_domain(domain, true).await;
                }
            }
            .boxed()
        })
    }

    /// Arm one timer per domain. Returns false if already running or if
    /// called outside a tokio runtime.
    pub fn start_monitoring(&self) -> bool {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("start_monitoring called outside a tokio runtime");
            return false;
        }
        let frequency = self.inner.preferences().update_frequency;
        let intervals: Vec<_> = Domain::ALL
            .iter()
            .map(|&domain| {
                (
                    domain,
                    monitoring_interval(&self.inner.config.cache, domain, frequency),
                )
            })
            .collect();
        self.inner.scheduler.start(&intervals, self.refresh_fn())
    }

    pub fn stop_monitoring(&self) -> bool {
        self.inner.scheduler.stop()
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    pub fn active_timers(&self) -> usize {
        self.inner.scheduler.active_timers()
    }

    /// `(domain, period)` of each armed timer; empty when not monitoring.
    pub fn monitoring_intervals(&self) -> Vec<(Domain, std::time::Duration)> {
        self.inner.scheduler.intervals()
    }

    /// Clear one domain's cache, or all of them.
    pub fn clear_cache(&self, domain: Option<Domain>) {
        let domains: &[Domain] = match &domain {
            Some(d) => std::slice::from_ref(d),
            None => &Domain::ALL,
        };
        for &d in domains {
            self.inner.sources.clear(d, None);
        }
        debug!(?domain, "cache cleared");
    }

    pub fn get_cache_status(&self) -> BTreeMap<Domain, CacheStatus> {
        Domain::ALL
            .iter()
            .map(|&d| (d, self.inner.sources.status(d)))
            .collect()
    }

    pub fn get_user_preferences(&self) -> UserPreferences {
        self.inner.preferences()
    }

    /// Merge `update` into the preferences. A frequency change re-arms
    /// running timers with the new intervals.
    pub fn update_user_preferences(&self, update: PreferencesUpdate) -> UserPreferences {
        let (changed, prefs) = {
            let mut state = lock(&self.inner.state);
            let changed = update.apply(&mut state.preferences);
            (changed, state.preferences.clone())
        };

        if changed && self.is_monitoring() {
            info!(frequency = ?prefs.update_frequency, "update frequency changed, re-arming timers");
            self.stop_monitoring();
            self.start_monitoring();
        }
        prefs
    }

    /// Stop monitoring and drop every subscriber.
    pub fn dispose(&self) {
        self.stop_monitoring();
        self.inner.updates.clear();
        self.inner.alerts.clear();
        info!("real-time info manager disposed");
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }
}
