//! OpenStreetMap Nominatim geocoding.

use crate::error::{LocationError, Result};
use crate::model::Coordinates;
use crate::provider::{Address, PlaceResolver, ReverseGeocoder};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Mutex;

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

const USER_AGENT: &str = "tripwatch/0.1 (travel monitor)";

#[derive(Debug, serde::Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

#[derive(Debug, serde::Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    address: Option<ReverseAddress>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ReverseAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

/// Forward and reverse geocoding against a Nominatim instance.
///
/// Reverse results are memoized per coordinate signature for the lifetime of
/// the client; Nominatim's usage policy asks for at most one request a second.
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
    language: String,
    addresses: Mutex<HashMap<String, Address>>,
}

impl NominatimClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            language: "zh-CN".to_string(),
            addresses: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn cached(&self, key: &str) -> Option<Address> {
        self.addresses
            .lock()
            .ok()
            .and_then(|cache| cache.get(key).cloned())
    }

    fn remember(&self, key: String, address: Address) {
        if let Ok(mut cache) = self.addresses.lock() {
            cache.insert(key, address);
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .get(url)
            .query(params)
            .header("User-Agent", USER_AGENT)
            .header("Accept-Language", &self.language)
            .send()
            .await
            .map_err(|e| LocationError::Request(e.to_string()))?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(LocationError::Unavailable("rate limited".to_string()));
        }
        if !resp.status().is_success() {
            return Err(LocationError::Request(resp.status().to_string()));
        }

        resp.json::<T>()
            .await
            .map_err(|e| LocationError::Request(e.to_string()))
    }
}

#[async_trait]
impl PlaceResolver for NominatimClient {
    async fn resolve_place(&self, name: &str) -> Result<Coordinates> {
        let hits: Vec<SearchHit> = self
            .get_json(
                "search",
                &[
                    ("q", name.to_string()),
                    ("format", "json".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        let hit = hits
            .into_iter()
            .next()
            .ok_or_else(|| LocationError::Unresolved(name.to_string()))?;

        let coordinates = parse_hit(&hit)
            .ok_or_else(|| LocationError::Request(format!("bad coordinates for {name}")))?;
        tracing::debug!(name, %coordinates, "nominatim resolved place");
        Ok(coordinates)
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn address_for(&self, coordinates: Coordinates) -> Result<Address> {
        let key = coordinates.signature();
        if let Some(address) = self.cached(&key) {
            return Ok(address);
        }

        let resp: ReverseResponse = self
            .get_json(
                "reverse",
                &[
                    ("lat", coordinates.latitude.to_string()),
                    ("lon", coordinates.longitude.to_string()),
                    ("format", "json".to_string()),
                ],
            )
            .await?;

        if resp.display_name.is_empty() {
            return Err(LocationError::Unresolved(format!(
                "no address for {coordinates}"
            )));
        }

        let address = to_address(resp);
        self.remember(key, address.clone());
        Ok(address)
    }
}

fn parse_hit(hit: &SearchHit) -> Option<Coordinates> {
    let coords = Coordinates::new(hit.lat.parse().ok()?, hit.lon.parse().ok()?);
    coords.is_valid().then_some(coords)
}

fn to_address(resp: ReverseResponse) -> Address {
    let parts = resp.address.unwrap_or_default();
    Address {
        city: parts.city.or(parts.town).or(parts.village),
        region: parts.state,
        country: parts.country,
        display_name: resp.display_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hit() {
        let hit = SearchHit {
            lat: "39.9057".to_string(),
            lon: "116.3913".to_string(),
        };
        assert_eq!(parse_hit(&hit), Some(Coordinates::new(39.9057, 116.3913)));

        let bad = SearchHit {
            lat: "north".to_string(),
            lon: "0".to_string(),
        };
        assert_eq!(parse_hit(&bad), None);
    }

    #[test]
    fn test_reverse_response_prefers_city_then_town() {
        let json = r#"{
            "display_name": "Sitges, Garraf, Barcelona, Catalonia, Spain",
            "address": { "town": "Sitges", "state": "Catalonia", "country": "Spain" }
        }"#;
        let resp: ReverseResponse = serde_json::from_str(json).unwrap();
        let address = to_address(resp);
        assert_eq!(address.city.as_deref(), Some("Sitges"));
        assert_eq!(address.region.as_deref(), Some("Catalonia"));
        assert_eq!(address.country.as_deref(), Some("Spain"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = NominatimClient::new(reqwest::Client::new())
            .with_base_url("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_address_memo() {
        let client = NominatimClient::new(reqwest::Client::new());
        assert!(client.cached("1.0000,2.0000").is_none());
        client.remember(
            "1.0000,2.0000".to_string(),
            Address {
                display_name: "Somewhere".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(
            client.cached("1.0000,2.0000").map(|a| a.display_name),
            Some("Somewhere".to_string())
        );
    }
}
