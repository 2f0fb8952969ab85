//! Narrow interfaces to the services the engine consumes but does not own.
//!
//! The engine never calls these itself. A driver calls them while answering
//! a [`crate::Suspension`] and hands the result back as a [`crate::Command`].

use std::fmt;

use rand::RngCore;

use crate::{ChargingStation, Constants, LatLon, LocationType, Route, RoutedPath};

/// Produces a round-trip route around `anchor` with roughly the requested
/// one-way length, plus the public chargers near it.
pub trait RouteGenerator {
    fn generate(&self, anchor: LatLon, one_way_miles: f64, rng: &mut dyn RngCore) -> Route;
}

/// Point-to-point street routing for deadhead legs.
pub trait RoutingService {
    fn route_between(&self, from: LatLon, to: LatLon) -> Result<RoutedPath, RoutingError>;
}

pub trait StationProvider {
    fn stations_for(
        &self,
        route: &Route,
        position: LatLon,
        constants: &Constants,
    ) -> Vec<ChargingStation>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutingError {
    Unavailable,
    NoPath { from: LatLon, to: LatLon },
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::Unavailable => f.write_str("routing service unavailable"),
            RoutingError::NoPath { from, to } => write!(
                f,
                "no path from ({:.5}, {:.5}) to ({:.5}, {:.5})",
                from.lat, from.lon, to.lat, to.lon
            ),
        }
    }
}

impl std::error::Error for RoutingError {}

/// On-route stations first, then cheapest, then shortest detour.
pub fn rank_stations(stations: &mut [ChargingStation]) {
    stations.sort_by(|a, b| {
        let on_route = |s: &ChargingStation| s.location_type != LocationType::School;
        on_route(a)
            .cmp(&on_route(b))
            .then_with(|| a.rate_per_kwh.total_cmp(&b.rate_per_kwh))
            .then_with(|| a.deadhead_miles.total_cmp(&b.deadhead_miles))
    });
}
