//! Location value types.
//!
//! Pure data, no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and inside the latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_m(&self, other: &Coordinates) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let d_phi = (other.latitude - self.latitude).to_radians();
        let d_lambda = (other.longitude - self.longitude).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    /// Shift by a delta in degrees, clamped to valid ranges.
    pub fn offset(&self, d_lat: f64, d_lng: f64) -> Self {
        Self {
            latitude: (self.latitude + d_lat).clamp(-90.0, 90.0),
            longitude: (self.longitude + d_lng).clamp(-180.0, 180.0),
        }
    }

    /// Stable text form used in cache keys (4 decimals, ~11 m).
    pub fn signature(&self) -> String {
        format!("{:.4},{:.4}", self.latitude, self.longitude)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// A captured position fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub coordinates: Coordinates,
    /// Horizontal accuracy in metres.
    pub accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
}

impl Location {
    pub fn new(coordinates: Coordinates, accuracy_m: f64) -> Self {
        Self::at(coordinates, accuracy_m, Utc::now())
    }

    pub fn at(coordinates: Coordinates, accuracy_m: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinates,
            accuracy_m,
            timestamp,
        }
    }
}

/// What a caller hands in as "the location": a fix or a place name to resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum LocationQuery {
    Coordinates(Location),
    Place(String),
}

impl LocationQuery {
    pub fn place(name: impl Into<String>) -> Self {
        LocationQuery::Place(name.into())
    }

    /// Deterministic cache signature. Place names are case and whitespace insensitive.
    pub fn signature(&self) -> String {
        match self {
            LocationQuery::Coordinates(location) => location.coordinates.signature(),
            LocationQuery::Place(name) => name.trim().to_lowercase(),
        }
    }

    /// Short label for display and synthetic records.
    pub fn label(&self) -> String {
        match self {
            LocationQuery::Coordinates(location) => location.coordinates.to_string(),
            LocationQuery::Place(name) => name.trim().to_string(),
        }
    }
}

impl From<Location> for LocationQuery {
    fn from(location: Location) -> Self {
        LocationQuery::Coordinates(location)
    }
}

impl From<Coordinates> for LocationQuery {
    fn from(coordinates: Coordinates) -> Self {
        LocationQuery::Coordinates(Location::new(coordinates, 0.0))
    }
}

impl From<&str> for LocationQuery {
    fn from(name: &str) -> Self {
        LocationQuery::Place(name.to_string())
    }
}

/// A location after resolution, with the address shown to users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub coordinates: Coordinates,
    pub address: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_beijing_shanghai() {
        let beijing = Coordinates::new(39.9042, 116.4074);
        let shanghai = Coordinates::new(31.2304, 121.4737);
        let km = beijing.distance_m(&shanghai) / 1000.0;
        assert!((1050.0..1090.0).contains(&km), "got {km} km");
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = Coordinates::new(48.8566, 2.3522);
        assert!(p.distance_m(&p) < 1e-6);
    }

    #[test]
    fn test_validity() {
        assert!(Coordinates::new(0.0, 0.0).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, -181.0).is_valid());
        assert!(!Coordinates::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_place_signature_normalizes() {
        let a = LocationQuery::place("  Beijing ");
        let b = LocationQuery::place("beijing");
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_coordinate_signature_rounds() {
        let q: LocationQuery = Coordinates::new(39.904_21, 116.407_44).into();
        assert_eq!(q.signature(), "39.9042,116.4074");
    }

    #[test]
    fn test_query_serde_shape() {
        let q = LocationQuery::place("Paris");
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["kind"], "place");
        assert_eq!(json["value"], "Paris");
    }
}
