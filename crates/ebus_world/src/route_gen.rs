use ebus_core::collaborators::RouteGenerator;
use ebus_core::geo::{destination_point, path_length_miles};
use ebus_core::{ChargerSite, LatLon, Route, RouteId, StationId, Stop, StopKind};
use rand::{Rng, RngCore};

const CHARGER_POWER_KW: [f64; 3] = [50.0, 75.0, 150.0];

/// Seeded stand-in for a map-backed route generator.
///
/// The outbound leg is a wandering polyline of `pickups + 1` equal segments
/// from the depot to the school; the return leg retraces it, so the school
/// sits at exactly half the round trip.
#[derive(Debug, Clone)]
pub struct GridRouteGenerator {
    pub pickups: usize,
    pub public_chargers: usize,
    /// Largest heading change between consecutive segments.
    pub max_turn_deg: f64,
}

impl Default for GridRouteGenerator {
    fn default() -> Self {
        Self {
            pickups: 4,
            public_chargers: 3,
            max_turn_deg: 35.0,
        }
    }
}

fn stop(kind: StopKind, coords: LatLon) -> Stop {
    Stop {
        kind,
        coords,
        completed: false,
    }
}

impl RouteGenerator for GridRouteGenerator {
    fn generate(&self, anchor: LatLon, one_way_miles: f64, rng: &mut dyn RngCore) -> Route {
        let id = RouteId(format!("route_{}", ebus_core::generate_uuid(rng)));

        if !one_way_miles.is_finite() || one_way_miles <= 0.0 {
            tracing::warn!(one_way_miles, "refusing to generate a zero-length route");
            return Route {
                id,
                stops: vec![stop(StopKind::Depot, anchor)],
                path: vec![anchor],
                distance_miles: 0.0,
                one_way_miles: 0.0,
                public_chargers: Vec::new(),
            };
        }

        let legs = self.pickups + 1;
        let leg_miles = one_way_miles / legs as f64;
        let turn = self.max_turn_deg.abs();
        let mut bearing: f64 = rng.gen_range(0.0..360.0);
        let mut outbound = Vec::with_capacity(legs + 1);
        outbound.push(anchor);
        let mut at = anchor;
        for _ in 0..legs {
            bearing += rng.gen_range(-turn..=turn);
            at = destination_point(at, bearing.rem_euclid(360.0), leg_miles);
            outbound.push(at);
        }

        let school = outbound[legs];
        let pickups = &outbound[1..legs];
        let mut stops = Vec::with_capacity(2 * legs + 1);
        stops.push(stop(StopKind::Depot, anchor));
        stops.extend(pickups.iter().map(|&p| stop(StopKind::Pickup, p)));
        stops.push(stop(StopKind::School, school));
        stops.extend(pickups.iter().rev().map(|&p| stop(StopKind::Dropoff, p)));
        stops.push(stop(StopKind::Depot, anchor));

        let mut path = outbound.clone();
        path.extend(outbound.iter().rev().skip(1));
        let distance_miles = path_length_miles(&path);

        let public_chargers = (1..=self.public_chargers)
            .map(|n| {
                let near = outbound[rng.gen_range(1..=legs)];
                let offset_miles = rng.gen_range(0.5..4.0);
                let coords = destination_point(near, rng.gen_range(0.0..360.0), offset_miles);
                let rate: f64 = rng.gen_range(0.25..0.45);
                ChargerSite {
                    id: StationId(format!("station_public_{n:02}")),
                    name: format!("Public Charger {n}"),
                    coords,
                    rate_per_kwh: (rate * 100.0).round() / 100.0,
                    kwh_per_hour: CHARGER_POWER_KW[rng.gen_range(0..CHARGER_POWER_KW.len())],
                }
            })
            .collect();

        Route {
            id,
            stops,
            path,
            distance_miles,
            one_way_miles,
            public_chargers,
        }
    }
}
