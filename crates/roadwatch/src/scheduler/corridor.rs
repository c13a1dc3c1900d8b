//! Look-ahead corridor extraction.

use crate::geo::{Coordinate, RoutePath};
use crate::risk::RiskQuery;
use crate::session::PositionEstimate;

/// A point ahead of the driver that will be scored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorridorPoint {
    pub coordinate: Coordinate,
    pub segment_index: usize,
    pub distance_from_start: f64,
}

impl CorridorPoint {
    pub fn to_query(&self, index: usize) -> RiskQuery {
        RiskQuery {
            lat: self.coordinate.lat,
            lon: self.coordinate.lon,
            point_index: Some(index),
            timestamp: None,
            distance_from_start: Some(self.distance_from_start),
        }
    }
}

/// Points from the current position up to `look_ahead` meters further along
/// the route, capped at `max_points`.
///
/// The first point is always the current position. Route vertices within
/// the budget follow, then the interpolated point at the budget edge if the
/// route continues past it. When more than `max_points` were collected they
/// are thinned by uniform index selection that keeps both ends.
pub fn extract_corridor(
    route: &RoutePath,
    position: &PositionEstimate,
    look_ahead: f64,
    max_points: usize,
) -> Vec<CorridorPoint> {
    let current = position.distance_from_start;
    let end = current + look_ahead.max(0.0);
    let cumulative = route.cumulative();

    let mut points = vec![CorridorPoint {
        coordinate: position.coordinate,
        segment_index: position.segment_index,
        distance_from_start: current,
    }];

    for (index, (coordinate, distance)) in route.points().iter().zip(cumulative).enumerate() {
        if *distance > current && *distance <= end {
            points.push(CorridorPoint {
                coordinate: *coordinate,
                segment_index: index,
                distance_from_start: *distance,
            });
        }
    }

    let reached = points.last().map_or(current, |p| p.distance_from_start);
    if end < route.total_distance() && reached < end {
        let (coordinate, segment_index) = route.interpolate(end);
        points.push(CorridorPoint {
            coordinate,
            segment_index,
            distance_from_start: end,
        });
    }

    downsample(points, max_points)
}

fn downsample(points: Vec<CorridorPoint>, max_points: usize) -> Vec<CorridorPoint> {
    if points.len() <= max_points {
        return points;
    }
    match max_points {
        0 => Vec::new(),
        1 => points.into_iter().take(1).collect(),
        _ => {
            let last = points.len() - 1;
            let steps = max_points - 1;
            // Rounded i * last / steps; strictly increasing since last > steps.
            (0..max_points)
                .map(|i| points[(i * last * 2 + steps) / (2 * steps)])
                .collect()
        }
    }
}
