//! Location collaborator traits.
//!
//! The monitor consumes these as black boxes; concrete backends live in the
//! sibling modules, tests use `FixedLocator` / `NullLocator`.

use crate::error::{LocationError, Result};
use crate::model::{Coordinates, Location, LocationQuery};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structured address returned by reverse geocoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub display_name: String,
}

/// Turns a place name into coordinates.
#[async_trait]
pub trait PlaceResolver: Send + Sync {
    async fn resolve_place(&self, name: &str) -> Result<Coordinates>;
}

/// Turns coordinates into a human-readable address.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn address_for(&self, coordinates: Coordinates) -> Result<Address>;
}

/// Reports where the device currently is.
#[async_trait]
pub trait DeviceLocator: Send + Sync {
    async fn current_position(&self) -> Result<Location>;
}

/// Resolve a query to coordinates, validating literal fixes.
pub async fn resolve_query(
    resolver: &dyn PlaceResolver,
    query: &LocationQuery,
) -> Result<Coordinates> {
    match query {
        LocationQuery::Coordinates(location) => {
            if location.coordinates.is_valid() {
                Ok(location.coordinates)
            } else {
                Err(LocationError::Unresolved(format!(
                    "invalid coordinates {}",
                    location.coordinates
                )))
            }
        }
        LocationQuery::Place(name) => {
            if name.trim().is_empty() {
                return Err(LocationError::Unresolved("empty place name".to_string()));
            }
            resolver.resolve_place(name.trim()).await
        }
    }
}

/// Provider that never knows anything. Useful for tests and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLocator;

#[async_trait]
impl PlaceResolver for NullLocator {
    async fn resolve_place(&self, name: &str) -> Result<Coordinates> {
        Err(LocationError::Unresolved(name.to_string()))
    }
}

#[async_trait]
impl ReverseGeocoder for NullLocator {
    async fn address_for(&self, _coordinates: Coordinates) -> Result<Address> {
        Err(LocationError::Unavailable("no reverse geocoder".to_string()))
    }
}

#[async_trait]
impl DeviceLocator for NullLocator {
    async fn current_position(&self) -> Result<Location> {
        Err(LocationError::Unavailable("no device locator".to_string()))
    }
}

/// Device locator pinned to one position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocator {
    coordinates: Coordinates,
    accuracy_m: f64,
}

impl FixedLocator {
    pub fn new(coordinates: Coordinates) -> Self {
        Self {
            coordinates,
            accuracy_m: 10.0,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = accuracy_m;
        self
    }
}

#[async_trait]
impl DeviceLocator for FixedLocator {
    async fn current_position(&self) -> Result<Location> {
        Ok(Location::new(self.coordinates, self.accuracy_m))
    }
}
