//! Decision policies that answer the engine's suspensions.
//!
//! A [`CommandSource`] looks at the context between steps and returns the
//! commands that resolve whatever the engine is waiting on. [`drive`] runs
//! the step loop for headless callers.

use ebus_core::collaborators::{RouteGenerator, RoutingService, StationProvider};
use ebus_core::energy::{battery_capacity_kwh, efficiency, energy_for_distance};
use ebus_core::{
    BusClass, ChargingStation, Command, CommandEnvelope, CommandId, Constants, EventEnvelope,
    NightlyChargeDecision, Outcome, ScenarioContent, SimulationContext, Suspension, Weather,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub trait CommandSource {
    fn generate_commands(
        &mut self,
        ctx: &SimulationContext,
        content: &ScenarioContent,
        next_command_id: &mut u64,
    ) -> Vec<CommandEnvelope>;
}

/// Tunables for [`AutopilotController`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotPolicy {
    /// Battery percent the overnight plan aims to finish the next day with.
    pub reserve_percent: f64,
    /// Sell charge above the overnight target back to the grid.
    pub use_v2g: bool,
    /// Ask for a route of this one-way length from day 2 on.
    pub next_route_miles: Option<f64>,
    /// Largest share of the current battery a one-way detour may burn.
    pub max_detour_battery_fraction: f64,
}

impl Default for AutopilotPolicy {
    fn default() -> Self {
        Self {
            reserve_percent: 17.5,
            use_v2g: true,
            next_route_miles: None,
            max_detour_battery_fraction: 0.9,
        }
    }
}

/// Answers every suspension using injected collaborators:
/// 1. Station list: ask the station provider.
/// 2. Station choice: first ranked station whose detour the battery can afford.
/// 3. Deadhead path: ask the routing service; report failures as `None`.
/// 4. Nightly charge: plan for the next day's weather plus the reserve,
///    selling any surplus through V2G.
/// 5. Route: ask the route generator.
pub struct AutopilotController {
    route_generator: Box<dyn RouteGenerator>,
    routing: Box<dyn RoutingService>,
    stations: Box<dyn StationProvider>,
    rng: Box<dyn RngCore>,
    policy: AutopilotPolicy,
}

impl AutopilotController {
    pub fn new(
        route_generator: Box<dyn RouteGenerator>,
        routing: Box<dyn RoutingService>,
        stations: Box<dyn StationProvider>,
        rng: Box<dyn RngCore>,
    ) -> Self {
        Self {
            route_generator,
            routing,
            stations,
            rng,
            policy: AutopilotPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: AutopilotPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn choose_station<'a>(
        &self,
        ctx: &SimulationContext,
        constants: &Constants,
        stations: &'a [ChargingStation],
    ) -> Option<&'a ChargingStation> {
        let eff = efficiency(ctx.bus.class, ctx.week.current_weather(), constants);
        let budget = ctx.bus.battery_kwh * self.policy.max_detour_battery_fraction;
        stations
            .iter()
            .find(|s| {
                !s.requires_detour()
                    || energy_for_distance(s.deadhead_miles, eff, true, constants) < budget
            })
            .or_else(|| {
                tracing::warn!(
                    battery_kwh = ctx.bus.battery_kwh,
                    "no affordable charger; taking the top-ranked one"
                );
                stations.first()
            })
    }

    fn nightly_decision(
        &self,
        ctx: &SimulationContext,
        constants: &Constants,
    ) -> NightlyChargeDecision {
        let next_day = ctx.week.current_day + 1;
        let weather = ctx.week.weather_for_day(next_day);
        let round_trip = self
            .policy
            .next_route_miles
            .map_or(ctx.route.distance_miles, |one_way| 2.0 * one_way);
        let target_percent = planned_target_percent(
            round_trip,
            ctx.bus.class,
            weather,
            constants,
            self.policy.reserve_percent,
        );

        let surplus_kwh =
            (ctx.bus.battery_percent - target_percent) / 100.0 * ctx.bus.battery_capacity_kwh;
        let v2g_discharge_kwh = (self.policy.use_v2g && surplus_kwh > 0.0).then_some(surplus_kwh);

        NightlyChargeDecision {
            target_percent,
            new_route_distance_one_way: self.policy.next_route_miles,
            v2g_discharge_kwh,
        }
    }
}

/// Overnight target that covers `round_trip_miles` in `weather` and leaves
/// `reserve_percent` over, rounded up to the next 5%.
pub fn planned_target_percent(
    round_trip_miles: f64,
    class: BusClass,
    weather: Weather,
    constants: &Constants,
    reserve_percent: f64,
) -> f64 {
    let capacity = battery_capacity_kwh(class, constants);
    if capacity <= 0.0 {
        return 100.0;
    }
    let need_percent =
        energy_for_distance(round_trip_miles, efficiency(class, weather, constants), false, constants)
            / capacity
            * 100.0;
    (((need_percent + reserve_percent) / 5.0).ceil() * 5.0).clamp(0.0, 100.0)
}

/// Allocates a command ID and builds a `CommandEnvelope`.
fn make_cmd(tick: u64, next_id: &mut u64, command: Command) -> CommandEnvelope {
    let cmd_id = CommandId(format!("cmd_{:06}", *next_id));
    *next_id += 1;
    CommandEnvelope {
        id: cmd_id,
        issued_tick: tick,
        command,
    }
}

impl CommandSource for AutopilotController {
    fn generate_commands(
        &mut self,
        ctx: &SimulationContext,
        content: &ScenarioContent,
        next_command_id: &mut u64,
    ) -> Vec<CommandEnvelope> {
        if ctx.outcome != Outcome::InProgress {
            return Vec::new();
        }
        let Some(suspension) = &ctx.suspension else {
            return Vec::new();
        };
        let constants = &content.constants;

        let command = match suspension {
            Suspension::AwaitingStationList { .. } => Command::OfferStations {
                stations: self
                    .stations
                    .stations_for(&ctx.route, ctx.bus.position, constants),
            },
            Suspension::AwaitingStationChoice { stations, .. } => {
                let Some(station) = self.choose_station(ctx, constants, stations) else {
                    return Vec::new();
                };
                Command::SelectStation {
                    station_id: station.id.clone(),
                }
            }
            Suspension::AwaitingDeadheadPath { station } => {
                let origin = ctx
                    .bus
                    .mid_day
                    .original_position
                    .unwrap_or(ctx.bus.position);
                let path = match self.routing.route_between(origin, station.coords) {
                    Ok(path) => Some(path),
                    Err(err) => {
                        tracing::warn!(station = %station.id, %err, "routing failed");
                        None
                    }
                };
                Command::DeliverDeadheadPath { path }
            }
            Suspension::AwaitingNightlyDecision { .. } => {
                Command::ConfirmNightlyCharge(self.nightly_decision(ctx, constants))
            }
            Suspension::AwaitingRoute { one_way_miles, .. } => Command::DeliverRoute {
                route: self.route_generator.generate(
                    ctx.setup.anchor,
                    *one_way_miles,
                    self.rng.as_mut(),
                ),
            },
        };
        vec![make_cmd(ctx.meta.tick, next_command_id, command)]
    }
}

// ---------------------------------------------------------------------------
// Step loop
// ---------------------------------------------------------------------------

/// How much time each step covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pace {
    /// Fixed simulated hours per step.
    SimHours(f64),
    /// Wall-clock seconds per step, scaled by the day's speed multiplier.
    WallSeconds(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveEnd {
    /// The scenario reached a terminal outcome.
    Finished,
    /// `max_steps` ran out first.
    StepLimit,
    /// The engine is waiting and the source had nothing to say.
    Stuck,
}

#[derive(Debug, Clone, Copy)]
pub struct DriveSummary {
    pub steps: u64,
    pub end: DriveEnd,
}

/// Run `source` against `ctx` until the scenario ends, the source stops
/// answering, or `max_steps` is reached. `on_step` sees the context and the
/// events after every step.
pub fn drive<S: CommandSource + ?Sized>(
    ctx: &mut SimulationContext,
    content: &ScenarioContent,
    source: &mut S,
    pace: Pace,
    max_steps: u64,
    mut on_step: impl FnMut(&SimulationContext, &[EventEnvelope]),
) -> DriveSummary {
    let mut next_command_id = ctx.counters.next_command_id;
    for steps in 0..max_steps {
        if ctx.outcome != Outcome::InProgress {
            return DriveSummary {
                steps,
                end: DriveEnd::Finished,
            };
        }
        let commands = source.generate_commands(ctx, content, &mut next_command_id);
        if commands.is_empty() && ctx.suspension.is_some() {
            tracing::warn!(
                waiting_for = ctx.suspension.as_ref().map_or("", Suspension::label),
                "command source has no answer"
            );
            return DriveSummary {
                steps,
                end: DriveEnd::Stuck,
            };
        }
        ctx.counters.next_command_id = next_command_id;
        let events = match pace {
            Pace::SimHours(hours) => ebus_core::advance(ctx, &commands, content, hours),
            Pace::WallSeconds(secs) => ebus_core::tick(ctx, &commands, content, secs),
        };
        on_step(ctx, &events);
    }
    let end = if ctx.outcome == Outcome::InProgress {
        DriveEnd::StepLimit
    } else {
        DriveEnd::Finished
    };
    DriveSummary {
        steps: max_steps,
        end,
    }
}
