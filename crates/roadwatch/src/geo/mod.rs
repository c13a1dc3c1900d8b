//! Route geometry.
//!
//! Decodes encoded polylines into coordinates and answers the distance
//! questions the session engine asks about a route: how long it is, where a
//! driver is after travelling some distance, and how much is left.

mod path;
mod polyline;

use serde::{Deserialize, Serialize};

pub use path::{
    EARTH_RADIUS_METERS, RouteError, RoutePath, cumulative_distances, distance, remaining_distance,
};
pub use polyline::{DecodeError, decode, encode};

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}
