//! Coarse device location from ip-api.com.

use crate::error::{LocationError, Result};
use crate::model::{Coordinates, Location};
use crate::provider::DeviceLocator;
use async_trait::async_trait;

pub const DEFAULT_ENDPOINT: &str = "http://ip-api.com/json";

/// City-level IP geolocation is rarely better than this.
const IP_ACCURACY_M: f64 = 5_000.0;

#[derive(Debug, serde::Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

pub struct IpApiLocator {
    client: reqwest::Client,
    endpoint: String,
}

impl IpApiLocator {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl DeviceLocator for IpApiLocator {
    async fn current_position(&self) -> Result<Location> {
        let resp = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LocationError::Unavailable(resp.status().to_string()));
        }

        let body = resp
            .json::<IpApiResponse>()
            .await
            .map_err(|e| LocationError::Request(e.to_string()))?;

        let location = to_location(body)?;
        tracing::debug!(coordinates = %location.coordinates, "ip geolocation fix");
        Ok(location)
    }
}

fn to_location(body: IpApiResponse) -> Result<Location> {
    if body.status != "success" {
        return Err(LocationError::Unavailable(
            body.message.unwrap_or_else(|| body.status.clone()),
        ));
    }
    match (body.lat, body.lon) {
        (Some(lat), Some(lon)) => {
            let coordinates = Coordinates::new(lat, lon);
            if !coordinates.is_valid() {
                return Err(LocationError::Request(format!(
                    "invalid coordinates {coordinates}"
                )));
            }
            Ok(Location::new(coordinates, IP_ACCURACY_M))
        }
        _ => Err(LocationError::Request("missing lat/lon".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_body() {
        let body: IpApiResponse =
            serde_json::from_str(r#"{"status":"success","lat":41.39,"lon":2.16}"#).unwrap();
        let location = to_location(body).unwrap();
        assert_eq!(location.coordinates, Coordinates::new(41.39, 2.16));
        assert_eq!(location.accuracy_m, IP_ACCURACY_M);
    }

    #[test]
    fn test_fail_body_carries_message() {
        let body: IpApiResponse =
            serde_json::from_str(r#"{"status":"fail","message":"private range"}"#).unwrap();
        assert_eq!(
            to_location(body).unwrap_err(),
            LocationError::Unavailable("private range".to_string())
        );
    }

    #[test]
    fn test_missing_coordinates() {
        let body: IpApiResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(matches!(
            to_location(body),
            Err(LocationError::Request(_))
        ));
    }
}
