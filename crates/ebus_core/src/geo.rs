//! Great-circle helpers. Distances are in statute miles.

use crate::LatLon;

const EARTH_RADIUS_MILES: f64 = 3958.8;

pub fn haversine_miles(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().asin()
}

/// Point reached by travelling `miles` from `start` on the given initial bearing.
pub fn destination_point(start: LatLon, bearing_deg: f64, miles: f64) -> LatLon {
    let angular = miles / EARTH_RADIUS_MILES;
    let bearing = bearing_deg.to_radians();
    let lat1 = start.lat.to_radians();
    let lon1 = start.lon.to_radians();
    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());
    LatLon::new(lat2.to_degrees(), lon2.to_degrees())
}

pub fn lerp(a: LatLon, b: LatLon, t: f64) -> LatLon {
    let t = t.clamp(0.0, 1.0);
    LatLon::new(a.lat + (b.lat - a.lat) * t, a.lon + (b.lon - a.lon) * t)
}

pub fn path_length_miles(path: &[LatLon]) -> f64 {
    path.windows(2).map(|w| haversine_miles(w[0], w[1])).sum()
}

/// Position at `fraction` of the path's length. Empty path → `None`.
pub fn interpolate_along_path(path: &[LatLon], fraction: f64) -> Option<LatLon> {
    let (first, last) = (path.first()?, path.last()?);
    let total = path_length_miles(path);
    if total <= 0.0 {
        return Some(*first);
    }
    let target = fraction.clamp(0.0, 1.0) * total;
    let mut walked = 0.0;
    for w in path.windows(2) {
        let segment = haversine_miles(w[0], w[1]);
        if walked + segment >= target {
            let t = if segment > 0.0 {
                (target - walked) / segment
            } else {
                0.0
            };
            return Some(lerp(w[0], w[1], t));
        }
        walked += segment;
    }
    Some(*last)
}

/// Distance along `path` (miles) of the point nearest to `point`, looking
/// only at positions at least `min_miles` along. Out-and-back paths revisit
/// the same coordinates, so the floor picks the later pass.
pub fn locate_on_path(path: &[LatLon], point: LatLon, min_miles: f64) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    let mut walked = 0.0;
    for w in path.windows(2) {
        let (a, b) = (w[0], w[1]);
        let segment = haversine_miles(a, b);
        if walked + segment < min_miles || segment <= 0.0 {
            walked += segment;
            continue;
        }
        // Local planar projection is plenty at route scale.
        let scale = a.lat.to_radians().cos();
        let (dx, dy) = ((b.lon - a.lon) * scale, b.lat - a.lat);
        let (px, py) = ((point.lon - a.lon) * scale, point.lat - a.lat);
        let t_min = ((min_miles - walked) / segment).max(0.0);
        let t = ((px * dx + py * dy) / (dx * dx + dy * dy)).clamp(t_min, 1.0);
        let distance = haversine_miles(point, lerp(a, b, t));
        if !best.is_some_and(|(d, _)| d <= distance) {
            best = Some((distance, walked + t * segment));
        }
        walked += segment;
    }
    best.map(|(_, along)| along)
}

/// Straight-line stand-in for a routed path, inflated by the circuity factor.
pub fn straight_line_path(from: LatLon, to: LatLon, circuity: f64) -> crate::RoutedPath {
    crate::RoutedPath {
        path: vec![from, to],
        distance_miles: haversine_miles(from, to) * circuity.max(1.0),
    }
}
