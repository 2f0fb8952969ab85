//! Bus state machine: route movement, stop arrivals, and status transitions.
//!
//! Deadhead legs live in `deadhead`, charging sessions and the school check in
//! `charging`; this module dispatches to them by status.

use smallvec::SmallVec;
use tracing::{info, warn};

use crate::energy::{co2_avoided_kg, efficiency, energy_for_distance};
use crate::geo::{haversine_miles, interpolate_along_path, locate_on_path, path_length_miles};
use crate::schedule::{ScheduledEvent, ScheduledKind};
use crate::{
    charging, deadhead, BusClass, BusId, BusState, BusStatus, Constants, DayStats, Event,
    EventEnvelope, MidDayState, Route, SimulationContext, StopKind,
};

/// Progress at which the school sits on a symmetric round trip.
pub const SCHOOL_PROGRESS: f64 = 0.5;

/// Slack when comparing a stop's position on the path with bus progress.
const PROGRESS_EPSILON: f64 = 1e-9;

/// Where each stop sits along the route path, as a fraction of its length.
/// Stops are located in order, each no earlier than the one before it.
/// Stops that cannot be placed get `f64::INFINITY` and only arrive by
/// proximity.
pub fn stop_progress(route: &Route) -> Vec<f64> {
    let total = path_length_miles(&route.path);
    let mut floor = 0.0;
    route
        .stops
        .iter()
        .map(|stop| match locate_on_path(&route.path, stop.coords, floor) {
            Some(along) if total > 0.0 => {
                floor = along;
                along / total
            }
            _ => f64::INFINITY,
        })
        .collect()
}

pub fn new_bus(id: BusId, class: BusClass, capacity_kwh: f64, route: &Route) -> BusState {
    BusState {
        id,
        route_id: route.id.clone(),
        class,
        position: route
            .path
            .first()
            .copied()
            .or_else(|| route.depot())
            .unwrap_or(crate::LatLon::new(0.0, 0.0)),
        progress: 0.0,
        current_stop_index: 0,
        battery_capacity_kwh: capacity_kwh,
        battery_kwh: 0.0,
        battery_percent: 0.0,
        energy_consumed_kwh: 0.0,
        status: BusStatus::Waiting,
        mid_day: MidDayState::default(),
        stats: DayStats::default(),
    }
}

/// Put the bus back at the depot for a new day, charged to `target_percent`.
pub fn reset_for_day(bus: &mut BusState, route: &mut Route, target_percent: f64) {
    for stop in &mut route.stops {
        stop.completed = false;
    }
    bus.route_id = route.id.clone();
    if let Some(start) = route.path.first().copied().or_else(|| route.depot()) {
        bus.position = start;
    }
    bus.progress = 0.0;
    bus.current_stop_index = 0;
    bus.energy_consumed_kwh = 0.0;
    bus.status = BusStatus::Waiting;
    bus.mid_day = MidDayState::default();
    bus.stats = DayStats::default();
    bus.set_battery_kwh(bus.battery_capacity_kwh * target_percent.clamp(0.0, 100.0) / 100.0);
}

/// Advance the bus by `hours` of simulated time.
pub(crate) fn update(
    ctx: &mut SimulationContext,
    constants: &Constants,
    hours: f64,
    events: &mut Vec<EventEnvelope>,
) {
    match &ctx.bus.status {
        BusStatus::Waiting | BusStatus::Moving if ctx.route.is_degenerate() => {
            warn!(route = %ctx.route.id, "route path is missing or degenerate; bus held in place");
        }
        BusStatus::Waiting => {
            depart(ctx, events);
            move_along_route(ctx, constants, hours, events);
        }
        BusStatus::Moving => move_along_route(ctx, constants, hours, events),
        BusStatus::TravelingToCharger(_) | BusStatus::ReturningFromCharger(_) => {
            deadhead::advance(ctx, constants, hours, events);
        }
        BusStatus::Charging(_) => charging::advance_session(ctx, constants, hours, events),
        BusStatus::Dwelling { .. }
        | BusStatus::AtSchool
        | BusStatus::Completed
        | BusStatus::Stranded => {}
    }
}

fn depart(ctx: &mut SimulationContext, events: &mut Vec<EventEnvelope>) {
    let day = ctx.week.current_day;
    if let Some(first) = ctx.route.stops.first_mut() {
        if first.kind == StopKind::Depot {
            first.completed = true;
            ctx.bus.current_stop_index = 1;
        }
    }
    ctx.bus.status = BusStatus::Moving;
    info!(day, battery_percent = ctx.bus.battery_percent, "bus departed depot");
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::DayStarted {
            day,
            weather: ctx.week.current_weather(),
            battery_percent: ctx.bus.battery_percent,
            route_miles: ctx.route.distance_miles,
        },
    ));
}

fn move_along_route(
    ctx: &mut SimulationContext,
    constants: &Constants,
    hours: f64,
    events: &mut Vec<EventEnvelope>,
) {
    if ctx.bus.battery_kwh <= 0.0 {
        strand(ctx, events);
        return;
    }

    let route_miles = ctx.route.distance_miles;
    let previous = ctx.bus.progress;
    let mut next = (previous + constants.bus_speed_mph * hours / route_miles).min(1.0);

    // Never run past the school without the mid-day check, however large the step.
    let school_pending = !ctx.bus.mid_day.checked && ctx.route.school_index().is_some();
    let reached_school = school_pending && next >= SCHOOL_PROGRESS;
    if reached_school {
        next = SCHOOL_PROGRESS.max(previous);
    }

    let miles = (next - previous) * route_miles;
    ctx.bus.progress = next;
    if let Some(position) = interpolate_along_path(&ctx.route.path, next) {
        ctx.bus.position = position;
    }

    let kwh_per_mile = efficiency(ctx.bus.class, ctx.week.current_weather(), constants);
    let drawn = draw_energy(
        &mut ctx.bus,
        energy_for_distance(miles, kwh_per_mile, false, constants),
    );
    ctx.bus.stats.route_miles += miles;
    ctx.bus.stats.route_energy_kwh += drawn;

    if ctx.bus.battery_kwh <= 0.0 {
        strand(ctx, events);
        return;
    }

    process_stop_arrivals(ctx, constants, events);
    if reached_school {
        charging::arrive_at_school(ctx, constants, events);
    }

    if matches!(ctx.bus.status, BusStatus::Moving) && ctx.bus.progress >= constants.completion_progress
    {
        complete_route(ctx, events);
    }
}

/// Deduct `kwh` from the battery, clamping at zero. Returns what was drawn.
pub(crate) fn draw_energy(bus: &mut BusState, kwh: f64) -> f64 {
    let drawn = kwh.max(0.0).min(bus.battery_kwh);
    bus.set_battery_kwh(bus.battery_kwh - kwh);
    bus.energy_consumed_kwh += drawn;
    drawn
}

/// Scan a bounded window of upcoming stops for arrivals. A stop arrives when
/// the bus is within the arrival threshold or has already passed its point
/// on the path, so a long step cannot skip it.
fn process_stop_arrivals(
    ctx: &mut SimulationContext,
    constants: &Constants,
    events: &mut Vec<EventEnvelope>,
) {
    let start = ctx.bus.current_stop_index;
    let mut end = (start + constants.max_stops_per_tick).min(ctx.route.stops.len());
    // Stops past the school only count once the school has been handled.
    if !ctx.bus.mid_day.checked {
        if let Some(school) = ctx.route.school_index() {
            end = end.min(school + 1);
        }
    }
    if start >= end {
        return;
    }

    let position = ctx.bus.position;
    let progress = ctx.bus.progress;
    let along = stop_progress(&ctx.route);
    let arrived: SmallVec<[usize; 4]> = (start..end)
        .filter(|&i| {
            let stop = &ctx.route.stops[i];
            !stop.completed
                && (along[i] <= progress + PROGRESS_EPSILON
                    || haversine_miles(position, stop.coords)
                        < constants.stop_arrival_threshold_miles)
        })
        .collect();

    let mut dwell = false;
    for index in arrived {
        let kind = ctx.route.stops[index].kind;
        ctx.route.stops[index].completed = true;
        ctx.bus.current_stop_index = index + 1;
        events.push(crate::emit(
            &mut ctx.counters,
            ctx.meta.tick,
            Event::StopArrived {
                stop_index: index,
                kind,
            },
        ));

        match kind {
            StopKind::Pickup | StopKind::Dropoff => {
                if kind == StopKind::Pickup {
                    ctx.bus.stats.pickups_completed += 1;
                } else {
                    ctx.bus.stats.dropoffs_completed += 1;
                }
                ctx.bus.stats.co2_avoided_kg +=
                    co2_avoided_kg(ctx.bus.class, constants.co2_segment_miles, constants);
                dwell = true;
            }
            StopKind::School => {
                charging::arrive_at_school(ctx, constants, events);
                return;
            }
            StopKind::Depot => {}
        }
    }

    if dwell {
        start_dwell(ctx, constants.dwell_hours);
    }
}

/// Pause at the current spot; the scheduled event queue resumes motion.
pub(crate) fn start_dwell(ctx: &mut SimulationContext, hours: f64) {
    let resume_at_hours = ctx.clock.elapsed_hours + hours;
    ctx.bus.status = BusStatus::Dwelling { resume_at_hours };
    ctx.schedule.push(ScheduledEvent {
        at_hours: resume_at_hours,
        kind: ScheduledKind::ResumeMoving,
    });
}

fn complete_route(ctx: &mut SimulationContext, events: &mut Vec<EventEnvelope>) {
    for stop in &mut ctx.route.stops {
        stop.completed = true;
    }
    ctx.bus.current_stop_index = ctx.route.stops.len();
    if let Some(end) = ctx.route.path.last() {
        ctx.bus.position = *end;
    }
    ctx.bus.status = BusStatus::Completed;

    let day = ctx.week.current_day;
    let distance_miles = ctx.bus.stats.distance_miles();
    info!(
        day,
        distance_miles,
        energy_kwh = ctx.bus.energy_consumed_kwh,
        battery_percent = ctx.bus.battery_percent,
        "route completed"
    );
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::RouteCompleted {
            day,
            distance_miles,
            energy_consumed_kwh: ctx.bus.energy_consumed_kwh,
        },
    ));
}

/// Terminal: the battery is empty away from a charger.
pub(crate) fn strand(ctx: &mut SimulationContext, events: &mut Vec<EventEnvelope>) {
    ctx.bus.set_battery_kwh(0.0);
    ctx.bus.status = BusStatus::Stranded;
    let day = ctx.week.current_day;
    warn!(day, progress = ctx.bus.progress, "bus stranded with an empty battery");
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::BusStranded {
            day,
            progress: ctx.bus.progress,
        },
    ));
}
