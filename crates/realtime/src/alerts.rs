//! Alert channel: flattening domain alerts into events and picking new ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tripwatch_sources::{Domain, EmergencyReport, PoiStatus, TrafficReport, WeatherReport};

/// One alert pushed to alert subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub domain: Domain,
    pub id: String,
    /// Domain-specific severity label (`extreme`, `critical`, `warning`, ...).
    pub severity: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub active: bool,
}

/// A domain record that carries alerts.
pub trait AlertRecord {
    fn alert_events(&self) -> Vec<AlertEvent>;
}

fn label<S: Serialize>(severity: &S) -> String {
    serde_json::to_value(severity)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

impl AlertRecord for WeatherReport {
    fn alert_events(&self) -> Vec<AlertEvent> {
        self.alerts
            .iter()
            .map(|a| AlertEvent {
                domain: Domain::Weather,
                id: a.id.clone(),
                severity: label(&a.severity),
                title: a.title.clone(),
                description: a.description.clone(),
                location: a.location.clone(),
                start_time: a.start_time,
                end_time: a.end_time,
                active: a.active,
            })
            .collect()
    }
}

impl AlertRecord for TrafficReport {
    fn alert_events(&self) -> Vec<AlertEvent> {
        self.incidents
            .iter()
            .map(|i| AlertEvent {
                domain: Domain::Traffic,
                id: i.id.clone(),
                severity: label(&i.severity),
                title: i.title.clone(),
                description: i.description.clone(),
                location: i.location.clone(),
                start_time: i.start_time,
                end_time: i.estimated_end_time,
                active: i.active,
            })
            .collect()
    }
}

impl AlertRecord for Vec<PoiStatus> {
    fn alert_events(&self) -> Vec<AlertEvent> {
        self.iter()
            .flat_map(|poi| {
                poi.alerts.iter().map(move |a| AlertEvent {
                    domain: Domain::Poi,
                    id: format!("{}:{}", poi.id, a.id),
                    severity: label(&a.severity),
                    title: a.title.clone(),
                    description: a.message.clone(),
                    location: poi.name.clone(),
                    start_time: a.timestamp,
                    end_time: None,
                    active: true,
                })
            })
            .collect()
    }
}

impl AlertRecord for EmergencyReport {
    fn alert_events(&self) -> Vec<AlertEvent> {
        self.alerts
            .iter()
            .map(|a| AlertEvent {
                domain: Domain::Emergency,
                id: a.id.clone(),
                severity: label(&a.severity),
                title: a.title.clone(),
                description: a.description.clone(),
                location: a.area.address.clone(),
                start_time: a.start_time,
                end_time: a.estimated_end_time,
                active: a.active,
            })
            .collect()
    }
}

/// Active alerts that started after `since` and were not delivered before.
///
/// `delivered` is replaced by the ids present in `events`, so it never grows
/// beyond the current record.
pub fn select_new(
    events: Vec<AlertEvent>,
    since: DateTime<Utc>,
    delivered: &mut HashSet<String>,
) -> Vec<AlertEvent> {
    let current: HashSet<String> = events.iter().map(|e| e.id.clone()).collect();
    let fresh = events
        .into_iter()
        .filter(|e| e.active && e.start_time > since && !delivered.contains(&e.id))
        .collect();
    *delivered = current;
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(id: &str, start: DateTime<Utc>, active: bool) -> AlertEvent {
        AlertEvent {
            domain: Domain::Weather,
            id: id.to_string(),
            severity: "high".to_string(),
            title: String::new(),
            description: String::new(),
            location: String::new(),
            start_time: start,
            end_time: None,
            active,
        }
    }

    #[test]
    fn test_window_and_activity() {
        let now = Utc::now();
        let since = now - Duration::minutes(30);
        let mut delivered = HashSet::new();
        let fresh = select_new(
            vec![
                event("new", now - Duration::minutes(5), true),
                event("old", now - Duration::minutes(45), true),
                event("inactive", now - Duration::minutes(5), false),
            ],
            since,
            &mut delivered,
        );
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, "new");
        assert_eq!(delivered.len(), 3);
    }

    #[test]
    fn test_not_delivered_twice() {
        let now = Utc::now();
        let since = now - Duration::minutes(30);
        let mut delivered = HashSet::new();
        let events = vec![event("a", now, true)];
        assert_eq!(select_new(events.clone(), since, &mut delivered).len(), 1);
        assert!(select_new(events, since, &mut delivered).is_empty());
    }

    #[test]
    fn test_severity_label_is_wire_name() {
        use tripwatch_sources::emergency::Severity;
        assert_eq!(label(&Severity::Critical), "critical");
    }
}
