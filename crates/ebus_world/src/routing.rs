use ebus_core::collaborators::{RoutingError, RoutingService};
use ebus_core::geo::{haversine_miles, lerp};
use ebus_core::{LatLon, RoutedPath};

/// Points closer than this have no meaningful path between them.
const MIN_LEG_MILES: f64 = 0.01;

/// Offline street router: a straight polyline whose reported distance is
/// inflated by the circuity factor to approximate the street grid.
#[derive(Debug, Clone)]
pub struct StraightLineRouter {
    pub circuity: f64,
    pub waypoints: usize,
}

impl StraightLineRouter {
    pub fn new(circuity: f64) -> Self {
        Self {
            circuity: circuity.max(1.0),
            waypoints: 8,
        }
    }
}

impl RoutingService for StraightLineRouter {
    fn route_between(&self, from: LatLon, to: LatLon) -> Result<RoutedPath, RoutingError> {
        let direct = haversine_miles(from, to);
        if direct < MIN_LEG_MILES {
            return Err(RoutingError::NoPath { from, to });
        }
        let segments = self.waypoints.max(1);
        let path = (0..=segments)
            .map(|i| lerp(from, to, i as f64 / segments as f64))
            .collect();
        Ok(RoutedPath {
            path,
            distance_miles: direct * self.circuity,
        })
    }
}

/// Router that is always down. Exercises the straight-line fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRouter;

impl RoutingService for OfflineRouter {
    fn route_between(&self, _from: LatLon, _to: LatLon) -> Result<RoutedPath, RoutingError> {
        Err(RoutingError::Unavailable)
    }
}
