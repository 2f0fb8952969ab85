//! Deadhead sub-machine: travel off the passenger route to a charger and back.
//!
//! Each leg tracks its own distance and progress so the return leg can reuse
//! the outbound path reversed.

use tracing::{debug, warn};

use crate::energy::{efficiency, energy_for_distance};
use crate::geo::{interpolate_along_path, lerp, straight_line_path};
use crate::{
    bus, charging, scoring, BusStatus, ChargingStation, Constants, DeadheadLeg, Event,
    EventEnvelope, LatLon, RoutedPath, SimulationContext, Suspension,
};

impl DeadheadLeg {
    /// Leg from `origin` to the station. A missing or unusable routed path
    /// falls back to the straight line inflated by the circuity factor.
    pub fn outbound(
        station: ChargingStation,
        origin: LatLon,
        routed: Option<&RoutedPath>,
        circuity: f64,
    ) -> Self {
        let destination = station.coords;
        let usable = routed.filter(|r| r.path.len() >= 2 && r.distance_miles > 0.0);
        let (path, distance_miles, fallback) = match usable {
            Some(r) => (r.path.clone(), r.distance_miles, false),
            None => {
                let estimate = straight_line_path(origin, destination, circuity);
                (estimate.path, estimate.distance_miles, true)
            }
        };
        Self {
            station,
            path,
            distance_miles,
            progress_miles: 0.0,
            origin,
            destination,
            fallback,
        }
    }

    /// The same leg driven the other way, from the start.
    pub fn reversed(&self) -> Self {
        let mut path = self.path.clone();
        path.reverse();
        Self {
            station: self.station.clone(),
            path,
            distance_miles: self.distance_miles,
            progress_miles: 0.0,
            origin: self.destination,
            destination: self.origin,
            fallback: self.fallback,
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.distance_miles > 0.0 {
            (self.progress_miles / self.distance_miles).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    pub fn position(&self) -> LatLon {
        let fraction = self.fraction();
        if self.path.len() >= 2 {
            interpolate_along_path(&self.path, fraction)
                .unwrap_or_else(|| lerp(self.origin, self.destination, fraction))
        } else {
            lerp(self.origin, self.destination, fraction)
        }
    }

    pub fn arrived(&self) -> bool {
        self.progress_miles >= self.distance_miles - 1e-9
    }
}

/// Routing answer for the pending detour. Starts the outbound leg.
pub(crate) fn deliver_path(
    ctx: &mut SimulationContext,
    constants: &Constants,
    routed: Option<&RoutedPath>,
    events: &mut Vec<EventEnvelope>,
) {
    let Some(Suspension::AwaitingDeadheadPath { station }) = &ctx.suspension else {
        debug!("ignoring deadhead path: no detour pending");
        return;
    };
    let station = station.clone();
    let origin = ctx
        .bus
        .mid_day
        .original_position
        .unwrap_or(ctx.bus.position);

    let leg = DeadheadLeg::outbound(station, origin, routed, constants.routing_circuity_factor);
    if leg.fallback {
        warn!(
            station = %leg.station.id,
            distance_miles = leg.distance_miles,
            "routing unavailable; using straight-line deadhead estimate"
        );
    }

    let day = ctx.week.current_day;
    #[allow(clippy::cast_possible_truncation)]
    let penalty = -(constants.deadhead_penalty_points_per_mile * leg.distance_miles).round() as i64;
    let reason = format!(
        "Deadhead to {} ({:.1} mi)",
        leg.station.name, leg.distance_miles
    );
    scoring::apply_penalty(&mut ctx.score, reason.clone(), penalty, Some(day));
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::PenaltyApplied {
            reason,
            points: penalty,
        },
    ));
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::DeadheadStarted {
            station_id: leg.station.id.clone(),
            distance_miles: leg.distance_miles,
            fallback: leg.fallback,
        },
    ));

    ctx.suspension = None;
    ctx.bus.status = BusStatus::TravelingToCharger(Box::new(leg));
}

/// Move along whichever leg is active.
pub(crate) fn advance(
    ctx: &mut SimulationContext,
    constants: &Constants,
    hours: f64,
    events: &mut Vec<EventEnvelope>,
) {
    let status = std::mem::replace(&mut ctx.bus.status, BusStatus::Moving);
    let (mut leg, outbound) = match status {
        BusStatus::TravelingToCharger(leg) => (leg, true),
        BusStatus::ReturningFromCharger(leg) => (leg, false),
        other => {
            ctx.bus.status = other;
            return;
        }
    };

    if ctx.bus.battery_kwh <= 0.0 {
        bus::strand(ctx, events);
        return;
    }

    let step = (constants.bus_speed_mph * hours)
        .min(leg.distance_miles - leg.progress_miles)
        .max(0.0);
    leg.progress_miles += step;
    ctx.bus.position = leg.position();

    let kwh_per_mile = efficiency(ctx.bus.class, ctx.week.current_weather(), constants);
    let drawn = bus::draw_energy(
        &mut ctx.bus,
        energy_for_distance(step, kwh_per_mile, true, constants),
    );
    ctx.bus.stats.deadhead_miles += step;
    ctx.bus.stats.deadhead_energy_kwh += drawn;
    ctx.bus.mid_day.layover_hours += hours;

    if ctx.bus.battery_kwh <= 0.0 {
        bus::strand(ctx, events);
        return;
    }

    if !leg.arrived() {
        ctx.bus.status = if outbound {
            BusStatus::TravelingToCharger(leg)
        } else {
            BusStatus::ReturningFromCharger(leg)
        };
        return;
    }

    ctx.bus.position = leg.destination;
    if outbound {
        let return_leg = leg.reversed();
        let station = leg.station;
        charging::start_session(ctx, constants, station, Some(return_leg), events);
    } else {
        events.push(crate::emit(
            &mut ctx.counters,
            ctx.meta.tick,
            Event::ReturnedToRoute {
                station_id: leg.station.id.clone(),
            },
        ));
        ctx.bus.mid_day.original_position = None;
        ctx.bus.status = BusStatus::Moving;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{destination_point, haversine_miles};
    use crate::LocationType;
    use crate::StationId;

    fn station_at(coords: LatLon) -> ChargingStation {
        ChargingStation {
            id: StationId("station_public_01".to_string()),
            name: "Public 1".to_string(),
            location_type: LocationType::Public,
            coords,
            rate_per_kwh: 0.35,
            kwh_per_hour: 100.0,
            deadhead_miles: 0.0,
        }
    }

    #[test]
    fn missing_path_falls_back_to_inflated_straight_line() {
        let origin = LatLon::new(40.0, -75.0);
        let coords = destination_point(origin, 90.0, 3.0);
        let leg = DeadheadLeg::outbound(station_at(coords), origin, None, 1.3);
        assert!(leg.fallback);
        assert!((leg.distance_miles - 3.9).abs() < 1e-6);
    }

    #[test]
    fn degenerate_routed_path_also_falls_back() {
        let origin = LatLon::new(40.0, -75.0);
        let coords = destination_point(origin, 90.0, 3.0);
        let routed = RoutedPath {
            path: vec![origin],
            distance_miles: 3.0,
        };
        let leg = DeadheadLeg::outbound(station_at(coords), origin, Some(&routed), 1.3);
        assert!(leg.fallback);
    }

    #[test]
    fn reversed_leg_swaps_endpoints_and_restarts() {
        let origin = LatLon::new(40.0, -75.0);
        let coords = destination_point(origin, 0.0, 2.0);
        let mut leg = DeadheadLeg::outbound(station_at(coords), origin, None, 1.0);
        leg.progress_miles = leg.distance_miles;
        let back = leg.reversed();
        assert!(back.progress_miles.abs() < 1e-12);
        assert_eq!(back.origin, coords);
        assert_eq!(back.destination, origin);
        assert!(haversine_miles(back.position(), coords) < 1e-9);
    }

    #[test]
    fn position_follows_leg_fraction() {
        let origin = LatLon::new(40.0, -75.0);
        let coords = destination_point(origin, 0.0, 4.0);
        let mut leg = DeadheadLeg::outbound(station_at(coords), origin, None, 1.0);
        leg.progress_miles = leg.distance_miles / 2.0;
        let mid = leg.position();
        assert!((haversine_miles(origin, mid) - 2.0).abs() < 1e-3);
    }
}
