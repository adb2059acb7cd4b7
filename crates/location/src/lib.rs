//! Location model and the geocoding collaborators the monitor depends on.
//!
//! Everything that turns "where is the traveller" into coordinates or a
//! human-readable address lives here:
//! - `model.rs`     - coordinates, captured locations, location queries (pure)
//! - `provider.rs`  - traits for place resolution, reverse geocoding, device location
//! - `gazetteer.rs` - offline resolver backed by a built-in place table
//! - `nominatim.rs` - OpenStreetMap Nominatim forward/reverse geocoding
//! - `ip_api.rs`    - coarse device location from IP geolocation

mod error;
mod gazetteer;
mod ip_api;
mod model;
mod nominatim;
mod provider;

pub use error::{LocationError, Result};
pub use gazetteer::Gazetteer;
pub use ip_api::IpApiLocator;
pub use model::{Coordinates, Location, LocationQuery, ResolvedLocation};
pub use nominatim::NominatimClient;
pub use provider::{
    resolve_query, Address, DeviceLocator, FixedLocator, NullLocator, PlaceResolver,
    ReverseGeocoder,
};
