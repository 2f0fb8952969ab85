//! Mid-day charging: the school-arrival check, station selection, and
//! charging sessions.

use tracing::{debug, info, warn};

use crate::energy::{efficiency, energy_for_distance};
use crate::{
    bus, collaborators, BusStatus, ChargingSession, ChargingStation, Constants, DeadheadLeg,
    Event, EventEnvelope, SimulationContext, StationId, Suspension,
};

/// Projection of the PM leg made when the bus reaches school.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnTripAssessment {
    pub remaining_miles: f64,
    pub energy_needed_kwh: f64,
    pub predicted_kwh: f64,
    pub predicted_percent: f64,
    pub needs_charge: bool,
    /// Energy that brings the bus to the reserve plus the PM leg. Zero when no charge is needed.
    pub energy_to_add_kwh: f64,
}

pub fn assess_return_trip(
    battery_kwh: f64,
    capacity_kwh: f64,
    round_trip_miles: f64,
    kwh_per_mile: f64,
    min_return_percent: f64,
) -> ReturnTripAssessment {
    let remaining_miles = round_trip_miles / 2.0;
    let energy_needed_kwh = remaining_miles * kwh_per_mile;
    let predicted_kwh = battery_kwh - energy_needed_kwh;
    let predicted_percent = if capacity_kwh > 0.0 {
        predicted_kwh / capacity_kwh * 100.0
    } else {
        0.0
    };
    let needs_charge = predicted_percent < min_return_percent;
    let energy_to_add_kwh = if needs_charge {
        (min_return_percent / 100.0 * capacity_kwh + energy_needed_kwh - battery_kwh).max(0.0)
    } else {
        0.0
    };
    ReturnTripAssessment {
        remaining_miles,
        energy_needed_kwh,
        predicted_kwh,
        predicted_percent,
        needs_charge,
        energy_to_add_kwh,
    }
}

/// Single entry point for the mid-day check. Both stop detection and the
/// progress safety net call this; only the first call per day does anything.
pub(crate) fn arrive_at_school(
    ctx: &mut SimulationContext,
    constants: &Constants,
    events: &mut Vec<EventEnvelope>,
) {
    if ctx.bus.mid_day.checked {
        return;
    }
    ctx.bus.mid_day.checked = true;
    ctx.bus.mid_day.arrived_at_school = true;
    if let Some(school) = ctx.route.school_index() {
        ctx.route.stops[school].completed = true;
        ctx.bus.current_stop_index = ctx.bus.current_stop_index.max(school + 1);
    }

    let kwh_per_mile = efficiency(ctx.bus.class, ctx.week.current_weather(), constants);
    let assessment = assess_return_trip(
        ctx.bus.battery_kwh,
        ctx.bus.battery_capacity_kwh,
        ctx.route.distance_miles,
        kwh_per_mile,
        constants.min_return_charge_percent,
    );

    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::SchoolReached {
            predicted_percent: assessment.predicted_percent,
            needs_charge: assessment.needs_charge,
        },
    ));

    if !assessment.needs_charge {
        bus::start_dwell(ctx, constants.school_dwell_hours);
        return;
    }

    info!(
        predicted_percent = assessment.predicted_percent,
        energy_to_add_kwh = assessment.energy_to_add_kwh,
        "mid-day charge required"
    );
    ctx.bus.mid_day.needs_charge = true;
    ctx.bus.mid_day.energy_to_add_kwh = assessment.energy_to_add_kwh;
    ctx.bus.status = BusStatus::AtSchool;
    ctx.suspension = Some(Suspension::AwaitingStationList {
        energy_to_add_kwh: assessment.energy_to_add_kwh,
        predicted_percent: assessment.predicted_percent,
    });
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::ChargingRequired {
            energy_to_add_kwh: assessment.energy_to_add_kwh,
            predicted_percent: assessment.predicted_percent,
        },
    ));
}

pub(crate) fn offer_stations(
    ctx: &mut SimulationContext,
    constants: &Constants,
    stations: &[ChargingStation],
    events: &mut Vec<EventEnvelope>,
) {
    let Some(Suspension::AwaitingStationList {
        energy_to_add_kwh, ..
    }) = ctx.suspension
    else {
        debug!("ignoring station list: none was requested");
        return;
    };

    if stations.is_empty() {
        warn!("no charging stations available; departing without a mid-day charge");
        ctx.suspension = None;
        bus::start_dwell(ctx, constants.school_dwell_hours);
        return;
    }

    let mut ranked = stations.to_vec();
    collaborators::rank_stations(&mut ranked);
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::StationsOffered {
            count: ranked.len(),
        },
    ));
    ctx.suspension = Some(Suspension::AwaitingStationChoice {
        stations: ranked,
        energy_to_add_kwh,
    });
}

pub(crate) fn select_station(
    ctx: &mut SimulationContext,
    constants: &Constants,
    station_id: &StationId,
    events: &mut Vec<EventEnvelope>,
) {
    let Some(Suspension::AwaitingStationChoice { stations, .. }) = &ctx.suspension else {
        debug!(%station_id, "ignoring station selection: no choice pending");
        return;
    };
    let Some(station) = stations.iter().find(|s| &s.id == station_id).cloned() else {
        debug!(%station_id, "ignoring selection of a station that was not offered");
        return;
    };

    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::StationSelected {
            station_id: station.id.clone(),
            requires_detour: station.requires_detour(),
        },
    ));

    if station.requires_detour() {
        ctx.bus.mid_day.original_position = Some(ctx.bus.position);
        ctx.suspension = Some(Suspension::AwaitingDeadheadPath { station });
    } else {
        ctx.suspension = None;
        start_session(ctx, constants, station, None, events);
    }
}

/// Energy level the session aims for: the return reserve, the PM leg, and
/// the deadhead back to the route when there is one.
pub(crate) fn charge_target_kwh(
    ctx: &SimulationContext,
    constants: &Constants,
    return_leg: Option<&DeadheadLeg>,
) -> f64 {
    let kwh_per_mile = efficiency(ctx.bus.class, ctx.week.current_weather(), constants);
    let capacity = ctx.bus.battery_capacity_kwh;
    let reserve = constants.min_return_charge_percent / 100.0 * capacity;
    let pm_leg = ctx.route.distance_miles / 2.0 * kwh_per_mile;
    let back = return_leg.map_or(0.0, |leg| {
        energy_for_distance(leg.distance_miles, kwh_per_mile, true, constants)
    });
    (reserve + pm_leg + back).min(capacity)
}

pub(crate) fn start_session(
    ctx: &mut SimulationContext,
    constants: &Constants,
    station: ChargingStation,
    return_leg: Option<DeadheadLeg>,
    events: &mut Vec<EventEnvelope>,
) {
    let target_kwh = charge_target_kwh(ctx, constants, return_leg.as_ref());
    ctx.bus.mid_day.charged = true;
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::ChargingStarted {
            station_id: station.id.clone(),
            kwh_per_hour: station.kwh_per_hour,
            target_kwh,
        },
    ));
    info!(station = %station.id, target_kwh, "charging started");
    ctx.bus.status = BusStatus::Charging(Box::new(ChargingSession {
        rate_per_kwh: station.rate_per_kwh,
        kwh_per_hour: station.kwh_per_hour,
        station,
        target_kwh,
        elapsed_hours: 0.0,
        energy_added_kwh: 0.0,
        return_leg,
    }));
}

pub(crate) fn advance_session(
    ctx: &mut SimulationContext,
    constants: &Constants,
    hours: f64,
    events: &mut Vec<EventEnvelope>,
) {
    let status = std::mem::replace(&mut ctx.bus.status, BusStatus::Moving);
    let BusStatus::Charging(mut session) = status else {
        ctx.bus.status = status;
        return;
    };

    let step = hours.min((constants.max_charging_window_hours - session.elapsed_hours).max(0.0));
    let room = ctx.bus.battery_capacity_kwh - ctx.bus.battery_kwh;
    let added = (session.kwh_per_hour * step).min(room).max(0.0);
    let cost = added * session.rate_per_kwh;

    ctx.bus.set_battery_kwh(ctx.bus.battery_kwh + added);
    session.elapsed_hours += step;
    session.energy_added_kwh += added;
    ctx.bus.stats.mid_day_kwh += added;
    ctx.bus.stats.mid_day_cost += cost;
    ctx.bus.stats.mid_day_charging_hours += step;
    ctx.bus.mid_day.layover_hours += step;

    let reached_target = ctx.bus.battery_kwh >= session.target_kwh - 1e-9;
    let reached_cap = ctx.bus.battery_percent >= constants.max_charge_percent;
    let window_expired = session.elapsed_hours >= constants.max_charging_window_hours - 1e-9;
    if !(reached_target || reached_cap || window_expired) {
        ctx.bus.status = BusStatus::Charging(session);
        return;
    }

    finish_session(ctx, *session, events);
}

fn finish_session(
    ctx: &mut SimulationContext,
    session: ChargingSession,
    events: &mut Vec<EventEnvelope>,
) {
    let under_charged = ctx.bus.battery_kwh < session.target_kwh - 1e-9;
    if under_charged {
        ctx.bus.stats.under_charged = true;
        warn!(
            battery_kwh = ctx.bus.battery_kwh,
            target_kwh = session.target_kwh,
            hours = session.elapsed_hours,
            "charging stopped short of target; departing under-charged"
        );
    }
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::ChargingFinished {
            station_id: session.station.id.clone(),
            energy_added_kwh: session.energy_added_kwh,
            hours: session.elapsed_hours,
            under_charged,
        },
    ));

    ctx.bus.status = match session.return_leg {
        Some(leg) => BusStatus::ReturningFromCharger(Box::new(leg)),
        None => BusStatus::Moving,
    };
}
