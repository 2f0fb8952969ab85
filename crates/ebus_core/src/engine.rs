use tracing::{debug, info, warn};

use crate::energy::battery_capacity_kwh;
use crate::schedule::{pop_due, ScheduledKind};
use crate::{
    bus, charging, clock, deadhead, scoring, BusId, BusStatus, Command, CommandEnvelope,
    Constants, Counters, DayResult, Event, EventEnvelope, MetaState, NightlyChargeDecision,
    OvernightCharge, Outcome, Route, ScenarioContent, ScenarioSetup, ScoreState, SimClock,
    SimulationContext, Suspension, TripPhase, WeekState,
};

pub const SCHEMA_VERSION: u32 = 1;

/// Build a fresh scenario with day 1 ready to depart.
///
/// The bus starts the scenario at `starting_depot_percent`; the initial
/// charge up to `setup.initial_charge_percent` is billed as day 1's
/// overnight charge.
pub fn start_scenario(
    content: &ScenarioContent,
    setup: ScenarioSetup,
    route: Route,
    seed: u64,
) -> SimulationContext {
    let c = &content.constants;
    let capacity = battery_capacity_kwh(setup.bus_class, c);
    let initial_percent = setup.initial_charge_percent.clamp(0.0, 100.0);
    let energy_added_kwh = overnight_energy_kwh(c.starting_depot_percent, initial_percent, capacity);
    let cost = energy_added_kwh * c.overnight_rate_per_kwh;

    let bus = bus::new_bus(
        BusId("bus_0001".to_string()),
        setup.bus_class,
        capacity,
        &route,
    );

    let mut ctx = SimulationContext {
        meta: MetaState {
            tick: 0,
            seed,
            schema_version: SCHEMA_VERSION,
            content_version: content.content_version.clone(),
        },
        clock: SimClock {
            elapsed_hours: 0.0,
            speed_multiplier: 0.0,
            clock_hour: c.route_start_hour,
            phase: TripPhase::Am,
        },
        schedule: std::collections::BinaryHeap::new(),
        bus,
        route,
        week: WeekState {
            current_day: 1,
            weather_schedule: setup.weather_schedule.clone(),
            overnight_cost_total: cost,
            mid_day_cost_total: 0.0,
            v2g_earnings_total: 0.0,
            v2g_discharged_kwh_total: 0.0,
            total_mid_day_charges: 0,
            current_overnight: OvernightCharge {
                target_percent: initial_percent,
                energy_added_kwh,
                cost,
            },
            day_results: Vec::new(),
        },
        score: ScoreState::default(),
        setup,
        suspension: None,
        route_regeneration_requested: false,
        outcome: Outcome::InProgress,
        counters: Counters {
            next_event_id: 0,
            next_command_id: 0,
        },
    };
    start_day(&mut ctx, c, initial_percent);
    ctx
}

/// Advance the simulation by one wall-clock step.
///
/// Order of operations:
/// 1. Apply commands answering the pending suspension.
/// 2. If nothing is pending and the scenario is live, advance simulated time
///    by `wall_dt_secs × speed_multiplier`, fire due scheduled events, move
///    the bus, and refresh the clock.
/// 3. Handle day completion or stranding.
/// 4. Increment tick counter.
///
/// Returns all events produced this tick.
pub fn tick(
    ctx: &mut SimulationContext,
    commands: &[CommandEnvelope],
    content: &ScenarioContent,
    wall_dt_secs: f64,
) -> Vec<EventEnvelope> {
    step(ctx, commands, content, |clock| {
        wall_dt_secs.max(0.0) * clock.speed_multiplier
    })
}

/// Like [`tick`], but advances a fixed amount of simulated time. Used by
/// headless drivers that do not care about wall-clock pacing.
pub fn advance(
    ctx: &mut SimulationContext,
    commands: &[CommandEnvelope],
    content: &ScenarioContent,
    sim_hours: f64,
) -> Vec<EventEnvelope> {
    step(ctx, commands, content, |_| sim_hours.max(0.0))
}

fn step(
    ctx: &mut SimulationContext,
    commands: &[CommandEnvelope],
    content: &ScenarioContent,
    hours_for: impl FnOnce(&SimClock) -> f64,
) -> Vec<EventEnvelope> {
    let mut events = Vec::new();
    let c = &content.constants;

    apply_commands(ctx, commands, c, &mut events);
    if ctx.suspension.is_none() && ctx.outcome == Outcome::InProgress {
        let hours = hours_for(&ctx.clock);
        run_day(ctx, c, hours, &mut events);
    }

    ctx.meta.tick += 1;
    events
}

fn apply_commands(
    ctx: &mut SimulationContext,
    commands: &[CommandEnvelope],
    c: &Constants,
    events: &mut Vec<EventEnvelope>,
) {
    for envelope in commands {
        if ctx.outcome != Outcome::InProgress {
            debug!(command = %envelope.id, "ignoring command: scenario is over");
            continue;
        }
        match &envelope.command {
            Command::OfferStations { stations } => {
                charging::offer_stations(ctx, c, stations, events);
            }
            Command::SelectStation { station_id } => {
                charging::select_station(ctx, c, station_id, events);
            }
            Command::DeliverDeadheadPath { path } => {
                deadhead::deliver_path(ctx, c, path.as_ref(), events);
            }
            Command::ConfirmNightlyCharge(decision) => {
                apply_nightly_decision(ctx, c, decision, events);
            }
            Command::DeliverRoute { route } => deliver_route(ctx, c, route, events),
        }
    }
}

fn run_day(
    ctx: &mut SimulationContext,
    c: &Constants,
    hours: f64,
    events: &mut Vec<EventEnvelope>,
) {
    ctx.clock.elapsed_hours += hours;
    for due in pop_due(&mut ctx.schedule, ctx.clock.elapsed_hours) {
        match due.kind {
            ScheduledKind::ResumeMoving => {
                if let BusStatus::Dwelling { resume_at_hours } = ctx.bus.status {
                    if resume_at_hours <= ctx.clock.elapsed_hours {
                        ctx.bus.status = BusStatus::Moving;
                    }
                }
            }
        }
    }

    bus::update(ctx, c, hours, events);
    clock::refresh(ctx, c);

    match ctx.bus.status {
        BusStatus::Completed => finish_day(ctx, c, events),
        BusStatus::Stranded => fail_scenario(ctx, events),
        _ => {}
    }
}

fn finish_day(ctx: &mut SimulationContext, c: &Constants, events: &mut Vec<EventEnvelope>) {
    let day = ctx.week.current_day;
    let weather = ctx.week.current_weather();
    let stats = &ctx.bus.stats;
    let cost = ctx.week.current_overnight.cost + stats.mid_day_cost;

    ctx.week.day_results.push(DayResult {
        day,
        weather,
        mid_day_charged: ctx.bus.mid_day.charged,
        distance_miles: stats.distance_miles(),
        energy_consumed_kwh: ctx.bus.energy_consumed_kwh,
        cost,
        end_battery_percent: ctx.bus.battery_percent,
        co2_avoided_kg: stats.co2_avoided_kg,
        pickups_completed: stats.pickups_completed,
    });
    ctx.week.mid_day_cost_total += stats.mid_day_cost;
    if ctx.bus.mid_day.charged {
        ctx.week.total_mid_day_charges += 1;
    }

    let day_score = scoring::score_day(ctx, c);
    let points = day_score.points;
    scoring::record_day(&mut ctx.score, day_score);
    info!(day, points, cost, "day scored");
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::DayScored { day, points },
    ));

    if day < ctx.week.days_total() {
        ctx.suspension = Some(Suspension::AwaitingNightlyDecision {
            day,
            end_percent: ctx.bus.battery_percent,
        });
        return;
    }

    let final_score = scoring::score_week(ctx, c);
    ctx.outcome = Outcome::Completed { final_score };
    info!(final_score, "week completed");
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::WeekCompleted { final_score },
    ));
}

fn fail_scenario(ctx: &mut SimulationContext, events: &mut Vec<EventEnvelope>) {
    let day = ctx.week.current_day;
    ctx.outcome = Outcome::Stranded { day };
    ctx.score.total = 0;
    ctx.suspension = None;
    warn!(day, "scenario failed: bus stranded");
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::ScenarioFailed { day },
    ));
}

/// Energy needed to bring the battery from `current_percent` up to
/// `target_percent`. Never negative.
pub fn overnight_energy_kwh(current_percent: f64, target_percent: f64, capacity_kwh: f64) -> f64 {
    ((target_percent - current_percent) / 100.0 * capacity_kwh).max(0.0)
}

fn apply_nightly_decision(
    ctx: &mut SimulationContext,
    c: &Constants,
    decision: &NightlyChargeDecision,
    events: &mut Vec<EventEnvelope>,
) {
    let Some(Suspension::AwaitingNightlyDecision { day, .. }) = ctx.suspension else {
        debug!("ignoring nightly decision: none was requested");
        return;
    };

    // V2G discharge happens before the overnight charge.
    let v2g_kwh = decision
        .v2g_discharge_kwh
        .unwrap_or(0.0)
        .max(0.0)
        .min(ctx.bus.battery_kwh);
    let v2g_credit = v2g_kwh * c.v2g_credit_per_kwh;
    ctx.bus.set_battery_kwh(ctx.bus.battery_kwh - v2g_kwh);
    ctx.week.v2g_discharged_kwh_total += v2g_kwh;
    ctx.week.v2g_earnings_total += v2g_credit;

    let capacity = ctx.bus.battery_capacity_kwh;
    let post_percent = ctx.bus.battery_percent;
    let target_percent = decision.target_percent.clamp(0.0, 100.0);
    let energy_added_kwh = overnight_energy_kwh(post_percent, target_percent, capacity);
    let cost = energy_added_kwh * c.overnight_rate_per_kwh;
    ctx.week.overnight_cost_total += cost;
    ctx.week.current_overnight = OvernightCharge {
        target_percent,
        energy_added_kwh,
        cost,
    };
    info!(
        day,
        target_percent, energy_added_kwh, cost, v2g_kwh, "overnight charge applied"
    );
    events.push(crate::emit(
        &mut ctx.counters,
        ctx.meta.tick,
        Event::NightlyChargeApplied {
            day,
            energy_added_kwh,
            cost,
            v2g_discharged_kwh: v2g_kwh,
            v2g_credit,
        },
    ));

    ctx.suspension = None;
    ctx.week.current_day += 1;

    let new_distance = decision
        .new_route_distance_one_way
        .filter(|miles| *miles > 0.0 && (*miles - ctx.route.one_way_miles).abs() > 1e-6);
    if let Some(one_way_miles) = new_distance {
        if !ctx.route_regeneration_requested {
            ctx.route_regeneration_requested = true;
            ctx.suspension = Some(Suspension::AwaitingRoute {
                one_way_miles,
                target_percent,
            });
            events.push(crate::emit(
                &mut ctx.counters,
                ctx.meta.tick,
                Event::RouteRegenerationRequested { one_way_miles },
            ));
            return;
        }
    }

    start_day(ctx, c, target_percent);
}

fn deliver_route(
    ctx: &mut SimulationContext,
    c: &Constants,
    route: &Route,
    events: &mut Vec<EventEnvelope>,
) {
    let Some(Suspension::AwaitingRoute { target_percent, .. }) = ctx.suspension else {
        debug!(route = %route.id, "ignoring route: none was requested");
        return;
    };

    if route.is_degenerate() {
        warn!(route = %route.id, "regenerated route is degenerate; keeping the previous route");
    } else {
        ctx.route = route.clone();
        events.push(crate::emit(
            &mut ctx.counters,
            ctx.meta.tick,
            Event::RouteRegenerated {
                route_id: route.id.clone(),
                one_way_miles: route.one_way_miles,
            },
        ));
    }
    start_day(ctx, c, target_percent);
}

/// Reset bus, route and clock for the current day.
fn start_day(ctx: &mut SimulationContext, c: &Constants, target_percent: f64) {
    bus::reset_for_day(&mut ctx.bus, &mut ctx.route, target_percent);
    ctx.clock = SimClock {
        elapsed_hours: 0.0,
        speed_multiplier: speed_multiplier(ctx.route.distance_miles, c),
        clock_hour: c.route_start_hour,
        phase: TripPhase::Am,
    };
    ctx.schedule.clear();
    ctx.suspension = None;
    ctx.route_regeneration_requested = false;
    info!(
        day = ctx.week.current_day,
        weather = ?ctx.week.current_weather(),
        battery_percent = ctx.bus.battery_percent,
        "day ready"
    );
}

/// Simulated hours per wall-clock second so the route takes
/// `target_day_wall_seconds` regardless of its length.
pub fn speed_multiplier(route_miles: f64, c: &Constants) -> f64 {
    if c.bus_speed_mph <= 0.0 || c.target_day_wall_seconds <= 0.0 {
        return 0.0;
    }
    (route_miles.max(0.0) / c.bus_speed_mph) / c.target_day_wall_seconds
}
