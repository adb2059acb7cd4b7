//! Deterministic offline providers for all four domains.
//!
//! Output depends only on (domain, cache key, clock minute), so repeated
//! fetches at the same virtual time produce identical records.

use crate::client::{Domain, Provider, SourceQuery};
use crate::emergency::{
    AffectedArea, EmergencyAlert, EmergencyKind, EmergencyQuery, EmergencyReport,
    EmergencyResource, ResourceKind, ResourceStatus, Severity,
};
use crate::error::Result;
use crate::poi::{
    apply_filters, CrowdLevel, NoticeLevel, PoiAlert, PoiCategory, PoiQuery, PoiStatus,
};
use crate::traffic::{
    AlternativeRoute, IncidentKind, RouteSegment, RouteStatus, ServiceStatus, TrafficIncident,
    TrafficLevel, TrafficQuery, TrafficReport, TransitLine,
};
use crate::weather::{
    derive_alerts, CurrentConditions, DailyForecast, WeatherCondition, WeatherQuery,
    WeatherReport,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tripwatch_location::Coordinates;

/// Seeded RNG for one fetch.
fn rng_for(domain: Domain, key: &str, now: DateTime<Utc>) -> StdRng {
    // FNV-1a: stable across processes and toolchains.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let minute = now.timestamp().div_euclid(60);
    for byte in domain
        .as_str()
        .bytes()
        .chain(key.bytes())
        .chain(minute.to_le_bytes())
    {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    StdRng::seed_from_u64(hash)
}

/// Upper bound on generated POI candidates per fetch.
const MAX_POI_CANDIDATES: usize = 400;

/// Degrees of latitude/longitude to scatter POIs over; zero for unusable radii.
fn jitter_spread(radius_m: f64) -> f64 {
    if radius_m.is_finite() && radius_m > 0.0 {
        (radius_m * 1.5 / 111_000.0).min(90.0)
    } else {
        0.0
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticWeather;

#[async_trait]
impl Provider for SyntheticWeather {
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
        let mut rng = rng_for(Domain::Weather, &query.cache_key(), now);
        let label = query.location.label();

        // Cooler towards the poles.
        let base_temp = 28.0 - at.latitude.abs() * 0.4;
        let conditions = [
            WeatherCondition::Clear,
            WeatherCondition::PartlyCloudy,
            WeatherCondition::Cloudy,
            WeatherCondition::Rain,
            WeatherCondition::Thunderstorm,
        ];
        let weights = [35, 30, 20, 10, 5];
        let pick = |rng: &mut StdRng| {
            let mut roll = rng.gen_range(0..100);
            for (c, w) in conditions.iter().zip(weights) {
                if roll < w {
                    return *c;
                }
                roll -= w;
            }
            WeatherCondition::Clear
        };

        let condition = pick(&mut rng);
        let current = CurrentConditions {
            temperature_c: round1(base_temp + rng.gen_range(-6.0..6.0)),
            humidity_pct: rng.gen_range(30.0..90.0_f64).round(),
            pressure_hpa: rng.gen_range(1000.0..1025.0_f64).round(),
            visibility_km: round1(rng.gen_range(2.0..20.0)),
            uv_index: rng.gen_range(0.0..10.0_f64).round(),
            wind_speed_kmh: round1(rng.gen_range(0.0..40.0)),
            wind_direction_deg: rng.gen_range(0.0..360.0_f64).round(),
            condition,
            description: condition.label().to_string(),
            icon: condition.icon().to_string(),
        };

        let today = now.date_naive();
        let forecast = (0..query.forecast_days)
            .map(|day| {
                let condition = pick(&mut rng);
                let high = round1(base_temp + rng.gen_range(-4.0..8.0));
                DailyForecast {
                    date: today + Duration::days(i64::from(day)),
                    high_c: high,
                    low_c: round1(high - rng.gen_range(5.0..12.0)),
                    condition,
                    description: condition.label().to_string(),
                    icon: condition.icon().to_string(),
                    humidity_pct: rng.gen_range(30.0..90.0_f64).round(),
                    wind_speed_kmh: round1(rng.gen_range(0.0..30.0)),
                }
            })
            .collect();

        let alerts = derive_alerts(&current, &label, now);

        Ok(WeatherReport {
            location_label: label,
            current,
            forecast,
            alerts,
            updated_at: now,
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticTraffic;

fn is_rush_hour(now: DateTime<Utc>) -> bool {
    // UTC+8 local time.
    let hour = (now.hour() + 8) % 24;
    (7..=9).contains(&hour) || (17..=19).contains(&hour)
}

fn random_level(rng: &mut StdRng, rush: bool) -> TrafficLevel {
    let roll = rng.gen_range(0..100) + if rush { 30 } else { 0 };
    match roll {
        0..=49 => TrafficLevel::Low,
        50..=79 => TrafficLevel::Medium,
        80..=109 => TrafficLevel::High,
        _ => TrafficLevel::Severe,
    }
}

#[async_trait]
impl Provider for SyntheticTraffic {
    type Query = TrafficQuery;
    type Record = TrafficReport;

    fn domain(&self) -> Domain {
        Domain::Traffic
    }

    async fn fetch(
        &self,
        query: &TrafficQuery,
        _at: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<TrafficReport> {
        let mut rng = rng_for(Domain::Traffic, &query.cache_key(), now);
        let rush = is_rush_hour(now);
        let level = random_level(&mut rng, rush);

        let distance_km = round1(rng.gen_range(3.0..40.0));
        let duration_s = (distance_km / query.mode.base_speed_kmh() * 3600.0) as u64;
        let duration_in_traffic_s = (duration_s as f64 * level.delay_factor()) as u64;

        let segment_count = rng.gen_range(2..5);
        let segments = (0..segment_count)
            .map(|i| {
                let seg_level = random_level(&mut rng, rush);
                RouteSegment {
                    name: format!("路段 {}", i + 1),
                    distance_km: round1(distance_km / segment_count as f64),
                    speed_kmh: round1(query.mode.base_speed_kmh() / seg_level.delay_factor()),
                    traffic_level: seg_level,
                }
            })
            .collect();

        let alternatives = (0..rng.gen_range(0..3))
            .map(|i| {
                let alt_level = random_level(&mut rng, rush);
                let alt_distance = round1(distance_km * rng.gen_range(1.0..1.4));
                AlternativeRoute {
                    summary: format!("备选路线 {}", i + 1),
                    distance_km: alt_distance,
                    duration_in_traffic_s: (alt_distance / query.mode.base_speed_kmh()
                        * 3600.0
                        * alt_level.delay_factor()) as u64,
                    traffic_level: alt_level,
                }
            })
            .collect();

        let mut incidents = Vec::new();
        if level >= TrafficLevel::High && rng.gen_bool(0.6) {
            let kind = *[IncidentKind::Accident, IncidentKind::Construction, IncidentKind::Congestion]
                .choose(&mut rng)
                .unwrap_or(&IncidentKind::Congestion);
            let severity = if level == TrafficLevel::Severe {
                Severity::High
            } else {
                Severity::Medium
            };
            incidents.push(TrafficIncident {
                id: format!("tr_{}_{}", now.timestamp(), rng.gen_range(1000..10000)),
                kind,
                severity,
                title: match kind {
                    IncidentKind::Accident => "交通事故",
                    IncidentKind::Construction => "道路施工",
                    _ => "道路拥堵",
                }
                .to_string(),
                description: format!("前往{}方向通行缓慢", query.destination),
                location: query.origin.label(),
                affected_roads: vec!["主干道".to_string()],
                start_time: now - Duration::minutes(rng.gen_range(0..30)),
                estimated_end_time: Some(now + Duration::minutes(rng.gen_range(15..90))),
                delay_minutes: rng.gen_range(5..40),
                active: true,
            });
        }

        let public_transport = ["地铁1号线", "地铁2号线", "公交52路"]
            .iter()
            .map(|line| {
                let delayed = rng.gen_bool(if rush { 0.3 } else { 0.1 });
                TransitLine {
                    line: line.to_string(),
                    kind: if line.starts_with("地铁") { "subway" } else { "bus" }.to_string(),
                    status: if delayed {
                        ServiceStatus::Delayed
                    } else {
                        ServiceStatus::Normal
                    },
                    delay_minutes: if delayed { rng.gen_range(3..15) } else { 0 },
                }
            })
            .collect();

        Ok(TrafficReport {
            route: RouteStatus {
                origin: query.origin.label(),
                destination: query.destination.clone(),
                distance_km,
                duration_s,
                duration_in_traffic_s,
                traffic_level: level,
                traffic_color: level.color().to_string(),
            },
            segments,
            alternatives,
            incidents,
            public_transport,
            updated_at: now,
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticPoi;

fn poi_names(category: PoiCategory) -> &'static [&'static str] {
    match category {
        PoiCategory::Attraction => &["古城墙", "钟楼", "观景台", "老街"],
        PoiCategory::Restaurant => &["老字号饭庄", "小吃街", "江边餐厅"],
        PoiCategory::Hotel => &["中心酒店", "青年旅舍"],
        PoiCategory::Shopping => &["步行街", "购物中心"],
        PoiCategory::Museum => &["城市博物馆", "美术馆"],
        PoiCategory::Park => &["人民公园", "植物园"],
        PoiCategory::Transport => &["火车站", "机场快线站"],
    }
}

#[async_trait]
impl Provider for SyntheticPoi {
    type Query = PoiQuery;
    type Record = Vec<PoiStatus>;

    fn domain(&self) -> Domain {
        Domain::Poi
    }

    async fn fetch(
        &self,
        query: &PoiQuery,
        at: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<Vec<PoiStatus>> {
        let mut rng = rng_for(Domain::Poi, &query.cache_key(), now);
        let local_hour = (now.hour() + 8) % 24;

        // Generate more candidates than asked for so filters have work to do.
        let candidates = (0..query.limit.clamp(1, MAX_POI_CANDIDATES / 2) * 2)
            .map(|i| {
                let category = query
                    .category
                    .unwrap_or_else(|| *PoiCategory::ALL.choose(&mut rng).unwrap_or(&PoiCategory::Attraction));
                let names = poi_names(category);
                let name = names[i % names.len()];
                // Up to ~1.5x the search radius so some fall outside it.
                let spread = jitter_spread(query.radius_m);
                let coordinates = if spread > 0.0 {
                    at.offset(
                        rng.gen_range(-spread..=spread),
                        rng.gen_range(-spread..=spread),
                    )
                } else {
                    at
                };
                let is_open = (9..21).contains(&local_hour) && rng.gen_bool(0.9);
                let capacity_pct: u8 = if is_open { rng.gen_range(5..=100) } else { 0 };
                let crowd_level = match capacity_pct {
                    0..=30 => CrowdLevel::Low,
                    31..=60 => CrowdLevel::Moderate,
                    61..=85 => CrowdLevel::High,
                    _ => CrowdLevel::VeryHigh,
                };
                let mut alerts = Vec::new();
                if crowd_level == CrowdLevel::VeryHigh {
                    alerts.push(PoiAlert {
                        id: format!("poi_{}_crowd", i),
                        severity: NoticeLevel::Warning,
                        title: "客流量大".to_string(),
                        message: format!("{name}当前人流密集，建议错峰前往"),
                        timestamp: now,
                    });
                }
                PoiStatus {
                    id: format!("poi_{}_{}", category.as_str(), i),
                    name: format!("{name}{}", i / names.len() + 1),
                    coordinates,
                    category,
                    address: format!("{} 附近", query.location.label()),
                    rating: rng.gen_bool(0.85).then(|| round1(rng.gen_range(3.0..5.0)) as f32),
                    is_open,
                    current_hours: "09:00-21:00".to_string(),
                    crowd_level,
                    queue_minutes: match crowd_level {
                        CrowdLevel::Low => 0,
                        CrowdLevel::Moderate => rng.gen_range(0..10),
                        CrowdLevel::High => rng.gen_range(10..30),
                        CrowdLevel::VeryHigh => rng.gen_range(30..90),
                    },
                    capacity_pct,
                    booking_available: rng.gen_bool(0.5),
                    alerts,
                    updated_at: now,
                }
            })
            .collect();

        Ok(apply_filters(&at, query, candidates))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticEmergency;

#[async_trait]
impl Provider for SyntheticEmergency {
    type Query = EmergencyQuery;
    type Record = EmergencyReport;

    fn domain(&self) -> Domain {
        Domain::Emergency
    }

    async fn fetch(
        &self,
        query: &EmergencyQuery,
        at: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<EmergencyReport> {
        let mut rng = rng_for(Domain::Emergency, &query.cache_key(), now);
        let label = query.location.label();

        let mut alerts = Vec::new();
        // Most of the time there is nothing going on.
        if rng.gen_bool(0.15) {
            let severity = *[Severity::Low, Severity::Medium, Severity::High, Severity::Critical]
                .choose(&mut rng)
                .unwrap_or(&Severity::Low);
            let kind = *[
                EmergencyKind::Weather,
                EmergencyKind::Traffic,
                EmergencyKind::Security,
                EmergencyKind::Health,
                EmergencyKind::Fire,
            ]
            .choose(&mut rng)
            .unwrap_or(&EmergencyKind::Security);
            let start_time = now - Duration::minutes(rng.gen_range(0..20));
            alerts.push(EmergencyAlert {
                id: format!("em_{}_{}", now.timestamp(), rng.gen_range(1000..10000)),
                kind,
                severity,
                level: severity.level(),
                title: match kind {
                    EmergencyKind::Weather => "气象灾害预警",
                    EmergencyKind::Traffic => "重大交通管制",
                    EmergencyKind::Security => "公共安全提示",
                    EmergencyKind::Health => "公共卫生提示",
                    EmergencyKind::Fire => "火情通报",
                    EmergencyKind::NaturalDisaster => "自然灾害预警",
                }
                .to_string(),
                description: format!("{label}周边发布{}级预警", severity.level()),
                area: AffectedArea {
                    coordinates: at.offset(rng.gen_range(-0.02..0.02), rng.gen_range(-0.02..0.02)),
                    address: label.clone(),
                    affected_radius_m: rng.gen_range(500.0..query.radius_m.max(501.0)),
                },
                start_time,
                estimated_end_time: Some(start_time + Duration::hours(rng.gen_range(1..6))),
                instructions: vec!["关注官方通报".to_string(), "听从现场指挥".to_string()],
                active: true,
                source: "应急管理部门".to_string(),
                verified: true,
                last_updated: now,
            });
        }

        let resources = [
            (ResourceKind::Hospital, "市人民医院", "120", vec!["急诊", "住院"]),
            (ResourceKind::PoliceStation, "城区派出所", "110", vec!["报警", "求助"]),
            (ResourceKind::FireStation, "消防救援站", "119", vec!["灭火", "救援"]),
            (ResourceKind::Shelter, "应急避难场所", "12345", vec!["临时安置"]),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (kind, name, phone, services))| {
            let capacity = matches!(kind, ResourceKind::Hospital | ResourceKind::Shelter)
                .then(|| rng.gen_range(100..1000));
            let occupancy = capacity.map(|c| rng.gen_range(0..=c));
            let status = match (capacity, occupancy) {
                (Some(c), Some(o)) if o >= c => ResourceStatus::Full,
                (Some(c), Some(o)) if o * 10 >= c * 8 => ResourceStatus::Busy,
                _ => ResourceStatus::Available,
            };
            EmergencyResource {
                id: format!("res_{i}"),
                name: name.to_string(),
                kind,
                coordinates: at.offset(rng.gen_range(-0.03..0.03), rng.gen_range(-0.03..0.03)),
                address: format!("{label} 附近"),
                status,
                capacity,
                occupancy,
                phone: phone.to_string(),
                services: services.into_iter().map(str::to_string).collect(),
            }
        })
        .collect();

        Ok(EmergencyReport { alerts, resources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripwatch_location::LocationQuery;

    fn beijing() -> Coordinates {
        Coordinates::new(39.9042, 116.4074)
    }

    #[tokio::test]
    async fn test_weather_is_deterministic_for_same_minute() {
        let q = WeatherQuery::new(LocationQuery::place("Beijing"));
        let now = Utc::now();
        let a = SyntheticWeather.fetch(&q, beijing(), now).await.unwrap();
        let b = SyntheticWeather.fetch(&q, beijing(), now).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.forecast.len(), 7);
        assert_eq!(a.location_label, "Beijing");
    }

    #[tokio::test]
    async fn test_traffic_report_is_consistent() {
        let q = TrafficQuery {
            origin: LocationQuery::place("Beijing"),
            destination: "北京市中心".to_string(),
            mode: Default::default(),
        };
        let report = SyntheticTraffic.fetch(&q, beijing(), Utc::now()).await.unwrap();
        assert_eq!(report.route.traffic_color, report.route.traffic_level.color());
        assert!(report.route.duration_in_traffic_s >= report.route.duration_s);
        assert_eq!(report.public_transport.len(), 3);
    }

    #[tokio::test]
    async fn test_poi_respects_radius_and_limit() {
        let mut q = PoiQuery::new(LocationQuery::place("Beijing"));
        q.limit = 5;
        let pois = SyntheticPoi.fetch(&q, beijing(), Utc::now()).await.unwrap();
        assert!(pois.len() <= 5);
        assert!(pois
            .iter()
            .all(|p| beijing().distance_m(&p.coordinates) <= q.radius_m));
    }

    #[tokio::test]
    async fn test_poi_unusable_radius_does_not_panic() {
        for radius in [-100.0, f64::NAN, f64::INFINITY, 0.0] {
            let mut q = PoiQuery::new(LocationQuery::place("Beijing"));
            q.radius_m = radius;
            q.limit = usize::MAX;
            let pois = SyntheticPoi.fetch(&q, beijing(), Utc::now()).await.unwrap();
            assert!(pois.len() <= MAX_POI_CANDIDATES);
        }
    }

    #[test]
    fn test_jitter_spread_bounds() {
        assert_eq!(jitter_spread(-1.0), 0.0);
        assert_eq!(jitter_spread(f64::NAN), 0.0);
        assert_eq!(jitter_spread(f64::MAX), 90.0);
        assert!((jitter_spread(111_000.0) - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_emergency_resources_always_listed() {
        let q = EmergencyQuery::new(LocationQuery::place("Beijing"));
        let report = SyntheticEmergency.fetch(&q, beijing(), Utc::now()).await.unwrap();
        assert_eq!(report.resources.len(), 4);
        assert!(report.alerts.iter().all(|a| a.level == a.severity.level()));
    }

    #[test]
    fn test_seed_changes_with_minute() {
        let now = Utc::now();
        let a: u64 = rng_for(Domain::Poi, "k", now).gen();
        let b: u64 = rng_for(Domain::Poi, "k", now + Duration::minutes(1)).gen();
        let c: u64 = rng_for(Domain::Poi, "k", now).gen();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }
}
