//! Offline place resolver.
//!
//! Resolves `"lat,lng"` literals and names from a small built-in table of
//! cities; reverse lookups answer with the nearest known place.

use crate::error::{LocationError, Result};
use crate::model::Coordinates;
use crate::provider::{Address, PlaceResolver, ReverseGeocoder};
use async_trait::async_trait;

/// Places further than this from every table entry get no city name.
const NEAREST_PLACE_MAX_M: f64 = 50_000.0;

#[derive(Debug, Clone)]
struct Place {
    names: Vec<String>,
    region: String,
    country: String,
    coordinates: Coordinates,
}

const BUILTIN: &[(&[&str], &str, &str, f64, f64)] = &[
    (&["北京", "北京市", "北京市中心", "beijing"], "北京市", "中国", 39.9042, 116.4074),
    (&["上海", "上海市", "shanghai"], "上海市", "中国", 31.2304, 121.4737),
    (&["广州", "广州市", "guangzhou"], "广东省", "中国", 23.1291, 113.2644),
    (&["深圳", "深圳市", "shenzhen"], "广东省", "中国", 22.5431, 114.0579),
    (&["杭州", "杭州市", "hangzhou"], "浙江省", "中国", 30.2741, 120.1551),
    (&["成都", "成都市", "chengdu"], "四川省", "中国", 30.5728, 104.0668),
    (&["西安", "西安市", "xi'an", "xian"], "陕西省", "中国", 34.3416, 108.9398),
    (&["香港", "hong kong"], "香港", "中国", 22.3193, 114.1694),
    (&["东京", "tokyo"], "東京都", "日本", 35.6762, 139.6503),
    (&["paris"], "Île-de-France", "France", 48.8566, 2.3522),
    (&["london"], "England", "United Kingdom", 51.5074, -0.1278),
    (&["new york", "nyc"], "New York", "United States", 40.7128, -74.0060),
    (&["barcelona"], "Catalonia", "Spain", 41.3874, 2.1686),
];

/// Built-in place table with literal coordinate parsing.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    places: Vec<Place>,
}

impl Default for Gazetteer {
    fn default() -> Self {
        let places = BUILTIN
            .iter()
            .map(|(names, region, country, lat, lng)| Place {
                names: names.iter().map(|n| n.to_string()).collect(),
                region: region.to_string(),
                country: country.to_string(),
                coordinates: Coordinates::new(*lat, *lng),
            })
            .collect();
        Self { places }
    }
}

impl Gazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gazetteer with no built-in entries.
    pub fn empty() -> Self {
        Self { places: Vec::new() }
    }

    /// Add (or shadow) a place.
    pub fn with_place(mut self, name: &str, coordinates: Coordinates) -> Self {
        self.places.insert(
            0,
            Place {
                names: vec![name.to_string()],
                region: String::new(),
                country: String::new(),
                coordinates,
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn lookup(&self, name: &str) -> Option<Coordinates> {
        if let Some(coords) = parse_literal(name) {
            return Some(coords);
        }
        let needle = name.trim().to_lowercase();
        self.places
            .iter()
            .find(|p| p.names.iter().any(|n| n.to_lowercase() == needle))
            .map(|p| p.coordinates)
    }

    fn nearest(&self, coordinates: &Coordinates) -> Option<(&Place, f64)> {
        self.places
            .iter()
            .map(|p| (p, p.coordinates.distance_m(coordinates)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Parse `"lat,lng"` (whitespace tolerant). Out-of-range pairs are rejected.
fn parse_literal(text: &str) -> Option<Coordinates> {
    let (lat, lng) = text.split_once(',')?;
    let coords = Coordinates::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?);
    coords.is_valid().then_some(coords)
}

#[async_trait]
impl PlaceResolver for Gazetteer {
    async fn resolve_place(&self, name: &str) -> Result<Coordinates> {
        self.lookup(name)
            .ok_or_else(|| LocationError::Unresolved(name.to_string()))
    }
}

#[async_trait]
impl ReverseGeocoder for Gazetteer {
    async fn address_for(&self, coordinates: Coordinates) -> Result<Address> {
        match self.nearest(&coordinates) {
            Some((place, distance)) if distance <= NEAREST_PLACE_MAX_M => {
                let city = place.names.first().cloned();
                let display_name = [
                    city.clone().unwrap_or_default(),
                    place.region.clone(),
                    place.country.clone(),
                ]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
                Ok(Address {
                    city,
                    region: Some(place.region.clone()).filter(|s| !s.is_empty()),
                    country: Some(place.country.clone()).filter(|s| !s.is_empty()),
                    display_name,
                })
            }
            _ => Err(LocationError::Unresolved(format!(
                "no known place near {coordinates}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_builtin_names_case_insensitively() {
        let g = Gazetteer::new();
        let coords = g.resolve_place("Beijing").await.unwrap();
        assert_eq!(coords, Coordinates::new(39.9042, 116.4074));
        assert_eq!(g.resolve_place("北京市中心").await.unwrap(), coords);
    }

    #[tokio::test]
    async fn test_resolves_literal_pair() {
        let g = Gazetteer::empty();
        let coords = g.resolve_place(" 41.38 , 2.17 ").await.unwrap();
        assert_eq!(coords, Coordinates::new(41.38, 2.17));
    }

    #[tokio::test]
    async fn test_unknown_place_is_unresolved() {
        let err = Gazetteer::new().resolve_place("Atlantis").await.unwrap_err();
        assert_eq!(err, LocationError::Unresolved("Atlantis".to_string()));
    }

    #[tokio::test]
    async fn test_out_of_range_literal_is_not_a_place() {
        assert!(Gazetteer::empty().resolve_place("95,10").await.is_err());
    }

    #[tokio::test]
    async fn test_custom_place_shadows_builtin() {
        let g = Gazetteer::new().with_place("paris", Coordinates::new(33.66, -95.55));
        assert_eq!(
            g.resolve_place("Paris").await.unwrap(),
            Coordinates::new(33.66, -95.55)
        );
    }

    #[tokio::test]
    async fn test_reverse_lookup_nearest() {
        let g = Gazetteer::new();
        let address = g
            .address_for(Coordinates::new(39.91, 116.40))
            .await
            .unwrap();
        assert_eq!(address.city.as_deref(), Some("北京"));
        assert!(address.display_name.contains("中国"));
    }

    #[tokio::test]
    async fn test_reverse_lookup_far_from_everything() {
        let g = Gazetteer::new();
        assert!(g.address_for(Coordinates::new(-60.0, -140.0)).await.is_err());
    }
}
