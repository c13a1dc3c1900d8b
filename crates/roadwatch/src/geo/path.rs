//! Distance arithmetic over decoded routes.

use thiserror::Error;

use super::Coordinate;
use super::polyline::{self, DecodeError};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Errors building a [`RoutePath`].
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route needs at least two points, found {found}")]
    TooFewPoints { found: usize },

    #[error("invalid polyline: {0}")]
    Decode(#[from] DecodeError),
}

/// Great-circle distance between two coordinates in meters.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Running distance from the first point to each point. `result[0] == 0`.
pub fn cumulative_distances(path: &[Coordinate]) -> Vec<f64> {
    let mut out = Vec::with_capacity(path.len());
    let mut total = 0.0;
    for (i, point) in path.iter().enumerate() {
        if i > 0 {
            total += distance(path[i - 1], *point);
        }
        out.push(total);
    }
    out
}

/// Distance still to travel from `from`, which lies on segment `segment`.
///
/// Returns 0 when `segment` is the last vertex or beyond.
pub fn remaining_distance(path: &[Coordinate], from: Coordinate, segment: usize) -> f64 {
    if segment + 1 >= path.len() {
        return 0.0;
    }
    let mut remaining = distance(from, path[segment + 1]);
    for pair in path[segment + 1..].windows(2) {
        remaining += distance(pair[0], pair[1]);
    }
    remaining
}

/// A decoded route with precomputed cumulative distances.
#[derive(Debug, Clone)]
pub struct RoutePath {
    points: Vec<Coordinate>,
    cumulative: Vec<f64>,
}

impl RoutePath {
    /// Build a route from at least two points.
    pub fn new(points: Vec<Coordinate>) -> Result<Self, RouteError> {
        if points.len() < 2 {
            return Err(RouteError::TooFewPoints {
                found: points.len(),
            });
        }
        let cumulative = cumulative_distances(&points);
        Ok(Self { points, cumulative })
    }

    /// Decode a polyline and build a route from it.
    pub fn from_polyline(encoded: &str) -> Result<Self, RouteError> {
        Self::new(polyline::decode(encoded)?)
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn total_distance(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn last_index(&self) -> usize {
        self.points.len() - 1
    }

    /// Point reached after travelling `traveled` meters, with the index of
    /// the segment it lies on.
    ///
    /// Negative distances clamp to the start; distances at or past the end
    /// return the final point and the last vertex index.
    pub fn interpolate(&self, traveled: f64) -> (Coordinate, usize) {
        let traveled = traveled.max(0.0);
        let last = self.last_index();
        if traveled >= self.total_distance() {
            return (self.points[last], last);
        }

        let upper = self.cumulative.partition_point(|d| *d < traveled);
        let segment = upper.saturating_sub(1).min(last - 1);

        let seg_start = self.cumulative[segment];
        let seg_len = self.cumulative[segment + 1] - seg_start;
        let ratio = if seg_len > 0.0 {
            ((traveled - seg_start) / seg_len).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let a = self.points[segment];
        let b = self.points[segment + 1];
        (
            Coordinate::new(a.lat + (b.lat - a.lat) * ratio, a.lon + (b.lon - a.lon) * ratio),
            segment,
        )
    }

    /// Distance from `from` on `segment` to the end of the route.
    pub fn remaining_distance(&self, from: Coordinate, segment: usize) -> f64 {
        if segment >= self.last_index() {
            return 0.0;
        }
        let next = segment + 1;
        distance(from, self.points[next]) + self.total_distance() - self.cumulative[next]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equator_route() -> RoutePath {
        // Three points on the equator; each hop is ~1111.95 m.
        RoutePath::new(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.01),
            Coordinate::new(0.0, 0.02),
        ])
        .unwrap()
    }

    #[test]
    fn distance_is_zero_for_identical_points() {
        let p = Coordinate::new(51.5, -0.12);
        assert_eq!(distance(p, p), 0.0);
    }

    #[test]
    fn distance_one_degree_of_latitude() {
        let d = distance(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!((d - 111_194.93).abs() < 1.0, "got {d}");
    }

    #[test]
    fn cumulative_starts_at_zero_and_grows() {
        let route = equator_route();
        let cum = route.cumulative();
        assert_eq!(cum[0], 0.0);
        assert!(cum[1] > 0.0);
        assert!((cum[2] - 2.0 * cum[1]).abs() < 1e-6);
    }

    #[test]
    fn rejects_single_point_route() {
        let err = RoutePath::new(vec![Coordinate::new(0.0, 0.0)]).unwrap_err();
        assert!(matches!(err, RouteError::TooFewPoints { found: 1 }));
    }

    #[test]
    fn rejects_bad_polyline() {
        let err = RoutePath::from_polyline("_p~iF").unwrap_err();
        assert!(matches!(err, RouteError::Decode(_)));
    }

    #[test]
    fn interpolate_clamps_both_ends() {
        let route = equator_route();
        let (start, seg) = route.interpolate(-50.0);
        assert_eq!(seg, 0);
        assert_eq!(start, Coordinate::new(0.0, 0.0));

        let (end, seg) = route.interpolate(route.total_distance() + 10.0);
        assert_eq!(seg, 2);
        assert_eq!(end, Coordinate::new(0.0, 0.02));
    }

    #[test]
    fn interpolate_midway_through_second_segment() {
        let route = equator_route();
        let hop = route.cumulative()[1];
        let (point, seg) = route.interpolate(hop * 1.5);
        assert_eq!(seg, 1);
        assert!((point.lon - 0.015).abs() < 1e-9);
    }

    #[test]
    fn interpolate_exactly_on_vertex() {
        let route = equator_route();
        let hop = route.cumulative()[1];
        let (point, seg) = route.interpolate(hop);
        assert_eq!(seg, 0);
        assert!((point.lon - 0.01).abs() < 1e-9);
    }

    #[test]
    fn interpolate_skips_zero_length_segment() {
        let route = RoutePath::new(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.01),
        ])
        .unwrap();
        let (point, _) = route.interpolate(0.0);
        assert_eq!(point, Coordinate::new(0.0, 0.0));
    }

    #[test]
    fn remaining_plus_traveled_equals_total() {
        let route = equator_route();
        let traveled = 700.0;
        let (point, seg) = route.interpolate(traveled);
        let remaining = route.remaining_distance(point, seg);
        assert!((remaining + traveled - route.total_distance()).abs() < 1e-3);
    }

    #[test]
    fn remaining_is_zero_at_last_vertex() {
        let route = equator_route();
        assert_eq!(route.remaining_distance(Coordinate::new(0.0, 0.02), 2), 0.0);
    }

    #[test]
    fn free_remaining_matches_method() {
        let route = equator_route();
        let (point, seg) = route.interpolate(300.0);
        let a = route.remaining_distance(point, seg);
        let b = remaining_distance(route.points(), point, seg);
        assert!((a - b).abs() < 1e-6);
    }
}
