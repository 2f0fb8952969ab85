//! Type definitions for `ebus_core`.
//!
//! All public types, structs, enums, and ID newtypes used by the simulation.

use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::schedule::ScheduledEvent;

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(BusId);
string_id!(RouteId);
string_id!(StationId);
string_id!(CommandId);
string_id!(EventId);

// ---------------------------------------------------------------------------
// Core enums
// ---------------------------------------------------------------------------

/// Class A is the small bus, class C the full-size one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusClass {
    A,
    C,
}

/// Ordered by severity so `max()` over a schedule yields the hardest day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weather {
    Fair,
    Cold,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopKind {
    Depot,
    Pickup,
    School,
    Dropoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationType {
    School,
    Depot,
    Public,
}

/// Display-only label; never consulted by simulation logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripPhase {
    Am,
    Midday,
    Pm,
}

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub kind: StopKind,
    pub coords: LatLon,
    pub completed: bool,
}

/// Round-trip route. Immutable once generated; `completed` flags on stops are
/// the only thing the engine touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub stops: Vec<Stop>,
    pub path: Vec<LatLon>,
    /// Total round-trip distance.
    pub distance_miles: f64,
    pub one_way_miles: f64,
    /// Off-route public chargers published alongside the route.
    pub public_chargers: Vec<ChargerSite>,
}

impl Route {
    pub fn school_index(&self) -> Option<usize> {
        self.stops.iter().position(|s| s.kind == StopKind::School)
    }

    pub fn depot(&self) -> Option<LatLon> {
        self.stops
            .iter()
            .find(|s| s.kind == StopKind::Depot)
            .map(|s| s.coords)
    }

    /// True when the path cannot be traversed.
    pub fn is_degenerate(&self) -> bool {
        self.path.len() < 2 || self.distance_miles <= 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerSite {
    pub id: StationId,
    pub name: String,
    pub coords: LatLon,
    pub rate_per_kwh: f64,
    pub kwh_per_hour: f64,
}

/// A candidate charger as offered to the decision maker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingStation {
    pub id: StationId,
    pub name: String,
    pub location_type: LocationType,
    pub coords: LatLon,
    pub rate_per_kwh: f64,
    pub kwh_per_hour: f64,
    /// One-way detour estimate from the bus position.
    pub deadhead_miles: f64,
}

impl ChargingStation {
    pub fn requires_detour(&self) -> bool {
        self.location_type != LocationType::School
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedPath {
    pub path: Vec<LatLon>,
    pub distance_miles: f64,
}

// ---------------------------------------------------------------------------
// Bus state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusState {
    pub id: BusId,
    pub route_id: RouteId,
    pub class: BusClass,
    pub position: LatLon,
    /// Fraction of the round trip completed. Monotonic within a day.
    pub progress: f64,
    pub current_stop_index: usize,
    pub battery_capacity_kwh: f64,
    pub battery_kwh: f64,
    /// Always `battery_kwh / battery_capacity_kwh * 100`; written only by `set_battery_kwh`.
    pub battery_percent: f64,
    pub energy_consumed_kwh: f64,
    pub status: BusStatus,
    pub mid_day: MidDayState,
    pub stats: DayStats,
}

impl BusState {
    /// Clamp to `[0, capacity]` and keep the derived percentage in step.
    pub fn set_battery_kwh(&mut self, kwh: f64) {
        self.battery_kwh = kwh.clamp(0.0, self.battery_capacity_kwh);
        self.battery_percent = if self.battery_capacity_kwh > 0.0 {
            self.battery_kwh / self.battery_capacity_kwh * 100.0
        } else {
            0.0
        };
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, BusStatus::Completed | BusStatus::Stranded)
    }
}

/// One variant per status; only the fields meaningful in that status exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusStatus {
    Waiting,
    Moving,
    Dwelling { resume_at_hours: f64 },
    AtSchool,
    TravelingToCharger(Box<DeadheadLeg>),
    Charging(Box<ChargingSession>),
    ReturningFromCharger(Box<DeadheadLeg>),
    Completed,
    Stranded,
}

impl BusStatus {
    pub fn label(&self) -> &'static str {
        match self {
            BusStatus::Waiting => "waiting",
            BusStatus::Moving => "moving",
            BusStatus::Dwelling { .. } => "dwelling",
            BusStatus::AtSchool => "at-school",
            BusStatus::TravelingToCharger(_) => "traveling-to-charger",
            BusStatus::Charging(_) => "charging",
            BusStatus::ReturningFromCharger(_) => "returning-from-charger",
            BusStatus::Completed => "completed",
            BusStatus::Stranded => "stranded",
        }
    }

    /// Statuses during which the simulated clock reads the mid-day window.
    pub fn is_mid_day_layover(&self) -> bool {
        matches!(
            self,
            BusStatus::AtSchool
                | BusStatus::TravelingToCharger(_)
                | BusStatus::Charging(_)
                | BusStatus::ReturningFromCharger(_)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadheadLeg {
    pub station: ChargingStation,
    pub path: Vec<LatLon>,
    pub distance_miles: f64,
    pub progress_miles: f64,
    pub origin: LatLon,
    pub destination: LatLon,
    /// Set when the routing service was unavailable and the straight-line
    /// estimate was used instead.
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingSession {
    pub station: ChargingStation,
    pub rate_per_kwh: f64,
    pub kwh_per_hour: f64,
    pub target_kwh: f64,
    pub elapsed_hours: f64,
    pub energy_added_kwh: f64,
    /// Leg back to the route, present when the charger was off-route.
    pub return_leg: Option<DeadheadLeg>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MidDayState {
    /// Set exactly once per day, at school arrival.
    pub checked: bool,
    pub arrived_at_school: bool,
    pub needs_charge: bool,
    pub charged: bool,
    pub energy_to_add_kwh: f64,
    /// Where the bus left the route for an off-route charger.
    pub original_position: Option<LatLon>,
    /// Simulated hours spent at school, deadheading, or charging.
    pub layover_hours: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayStats {
    pub route_miles: f64,
    pub deadhead_miles: f64,
    pub route_energy_kwh: f64,
    pub deadhead_energy_kwh: f64,
    pub co2_avoided_kg: f64,
    pub pickups_completed: u32,
    pub dropoffs_completed: u32,
    pub mid_day_kwh: f64,
    pub mid_day_cost: f64,
    pub mid_day_charging_hours: f64,
    pub under_charged: bool,
}

impl DayStats {
    pub fn distance_miles(&self) -> f64 {
        self.route_miles + self.deadhead_miles
    }
}

// ---------------------------------------------------------------------------
// Week and score state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekState {
    /// 1-based.
    pub current_day: u32,
    pub weather_schedule: Vec<Weather>,
    pub overnight_cost_total: f64,
    pub mid_day_cost_total: f64,
    pub v2g_earnings_total: f64,
    pub v2g_discharged_kwh_total: f64,
    pub total_mid_day_charges: u32,
    /// The overnight charge that preceded the current day.
    pub current_overnight: OvernightCharge,
    pub day_results: Vec<DayResult>,
}

impl WeekState {
    pub fn weather_for_day(&self, day: u32) -> Weather {
        let index = day.saturating_sub(1) as usize;
        self.weather_schedule
            .get(index)
            .or_else(|| self.weather_schedule.last())
            .copied()
            .unwrap_or(Weather::Fair)
    }

    pub fn current_weather(&self) -> Weather {
        self.weather_for_day(self.current_day)
    }

    pub fn days_total(&self) -> u32 {
        u32::try_from(self.weather_schedule.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OvernightCharge {
    pub target_percent: f64,
    pub energy_added_kwh: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayResult {
    pub day: u32,
    pub weather: Weather,
    pub mid_day_charged: bool,
    pub distance_miles: f64,
    pub energy_consumed_kwh: f64,
    pub cost: f64,
    pub end_battery_percent: f64,
    pub co2_avoided_kg: f64,
    pub pickups_completed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub reason: String,
    pub points: i64,
    pub day: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayScore {
    pub day: u32,
    pub points: i64,
    pub breakdown: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreState {
    pub total: i64,
    pub day_scores: Vec<DayScore>,
    pub bonuses: Vec<ScoreRecord>,
    pub penalties: Vec<ScoreRecord>,
}

// ---------------------------------------------------------------------------
// Simulation context
// ---------------------------------------------------------------------------

/// Everything the engine mutates. Owned by the driver, passed into every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationContext {
    pub meta: MetaState,
    pub setup: ScenarioSetup,
    pub clock: SimClock,
    pub schedule: BinaryHeap<ScheduledEvent>,
    pub bus: BusState,
    pub route: Route,
    pub week: WeekState,
    pub score: ScoreState,
    /// Outstanding external request; ticks are no-ops while this is set.
    pub suspension: Option<Suspension>,
    pub route_regeneration_requested: bool,
    pub outcome: Outcome,
    pub counters: Counters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaState {
    pub tick: u64,
    pub seed: u64,
    pub schema_version: u32,
    pub content_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counters {
    pub next_event_id: u64,
    pub next_command_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSetup {
    pub bus_class: BusClass,
    pub weather_scenario: String,
    pub weather_schedule: Vec<Weather>,
    /// The player's estimate of the longest safe one-way distance.
    pub one_way_guess_miles: f64,
    pub initial_charge_percent: f64,
    pub anchor: LatLon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    /// Simulated hours since the current day started.
    pub elapsed_hours: f64,
    /// Simulated hours per wall-clock second, fixed for the day.
    pub speed_multiplier: f64,
    pub clock_hour: f64,
    pub phase: TripPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Suspension {
    AwaitingStationList {
        energy_to_add_kwh: f64,
        predicted_percent: f64,
    },
    AwaitingStationChoice {
        stations: Vec<ChargingStation>,
        energy_to_add_kwh: f64,
    },
    AwaitingDeadheadPath {
        station: ChargingStation,
    },
    AwaitingNightlyDecision {
        day: u32,
        end_percent: f64,
    },
    AwaitingRoute {
        one_way_miles: f64,
        target_percent: f64,
    },
}

impl Suspension {
    pub fn label(&self) -> &'static str {
        match self {
            Suspension::AwaitingStationList { .. } => "station-list",
            Suspension::AwaitingStationChoice { .. } => "station-choice",
            Suspension::AwaitingDeadheadPath { .. } => "deadhead-path",
            Suspension::AwaitingNightlyDecision { .. } => "nightly-decision",
            Suspension::AwaitingRoute { .. } => "route",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    InProgress,
    Stranded { day: u32 },
    Completed { final_score: i64 },
}

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub id: CommandId,
    pub issued_tick: u64,
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Station provider answer to `AwaitingStationList`.
    OfferStations { stations: Vec<ChargingStation> },
    SelectStation { station_id: StationId },
    /// Routing service answer; `None` means the request failed.
    DeliverDeadheadPath { path: Option<RoutedPath> },
    ConfirmNightlyCharge(NightlyChargeDecision),
    /// Route generator answer to `AwaitingRoute`.
    DeliverRoute { route: Route },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightlyChargeDecision {
    pub target_percent: f64,
    pub new_route_distance_one_way: Option<f64>,
    pub v2g_discharge_kwh: Option<f64>,
}

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub tick: u64,
    pub event: Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    DayStarted {
        day: u32,
        weather: Weather,
        battery_percent: f64,
        route_miles: f64,
    },
    StopArrived {
        stop_index: usize,
        kind: StopKind,
    },
    SchoolReached {
        predicted_percent: f64,
        needs_charge: bool,
    },
    ChargingRequired {
        energy_to_add_kwh: f64,
        predicted_percent: f64,
    },
    StationsOffered {
        count: usize,
    },
    StationSelected {
        station_id: StationId,
        requires_detour: bool,
    },
    DeadheadStarted {
        station_id: StationId,
        distance_miles: f64,
        fallback: bool,
    },
    ChargingStarted {
        station_id: StationId,
        kwh_per_hour: f64,
        target_kwh: f64,
    },
    ChargingFinished {
        station_id: StationId,
        energy_added_kwh: f64,
        hours: f64,
        under_charged: bool,
    },
    ReturnedToRoute {
        station_id: StationId,
    },
    RouteCompleted {
        day: u32,
        distance_miles: f64,
        energy_consumed_kwh: f64,
    },
    BusStranded {
        day: u32,
        progress: f64,
    },
    PenaltyApplied {
        reason: String,
        points: i64,
    },
    DayScored {
        day: u32,
        points: i64,
    },
    NightlyChargeApplied {
        day: u32,
        energy_added_kwh: f64,
        cost: f64,
        v2g_discharged_kwh: f64,
        v2g_credit: f64,
    },
    RouteRegenerationRequested {
        one_way_miles: f64,
    },
    RouteRegenerated {
        route_id: RouteId,
        one_way_miles: f64,
    },
    WeekCompleted {
        final_score: i64,
    },
    ScenarioFailed {
        day: u32,
    },
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioContent {
    pub content_version: String,
    pub weather_scenarios: Vec<WeatherScenarioDef>,
    pub constants: Constants,
}

impl ScenarioContent {
    pub fn weather_scenario(&self, id: &str) -> Option<&WeatherScenarioDef> {
        self.weather_scenarios.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherScenarioDef {
    pub id: String,
    pub name: String,
    pub days: Vec<Weather>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constants {
    // Energy model
    pub efficiency_fair_kwh_per_mile: f64,
    pub efficiency_cold_kwh_per_mile: f64,
    pub efficiency_extreme_kwh_per_mile: f64,
    /// Class C efficiency as a multiple of the class A table.
    pub class_c_efficiency_multiplier: f64,
    pub deadhead_energy_penalty: f64,
    pub class_a_capacity_kwh: f64,
    pub class_c_capacity_kwh: f64,
    pub class_a_diesel_mpg: f64,
    pub class_c_diesel_mpg: f64,
    pub co2_kg_per_gallon: f64,
    /// Assumed distance served per pickup/dropoff for CO₂ accounting.
    pub co2_segment_miles: f64,

    // Motion
    pub bus_speed_mph: f64,
    pub dwell_hours: f64,
    pub school_dwell_hours: f64,
    pub stop_arrival_threshold_miles: f64,
    pub max_stops_per_tick: usize,
    pub completion_progress: f64,
    pub target_day_wall_seconds: f64,

    // Clock windows (hour of day)
    pub route_start_hour: f64,
    pub school_arrival_hour: f64,
    pub midday_window_hours: f64,
    pub pm_start_hour: f64,
    pub day_end_hour: f64,

    // Charging
    pub min_return_charge_percent: f64,
    pub max_charge_percent: f64,
    pub max_charging_window_hours: f64,
    pub school_has_charger: bool,
    pub school_charger_rate_per_kwh: f64,
    pub school_charger_kwh_per_hour: f64,
    pub depot_charger_rate_per_kwh: f64,
    pub depot_charger_kwh_per_hour: f64,
    pub routing_circuity_factor: f64,
    pub overnight_rate_per_kwh: f64,
    pub v2g_credit_per_kwh: f64,
    /// Battery level the bus sits at before the first overnight charge.
    pub starting_depot_percent: f64,
    pub safety_buffer_percent: f64,

    // Scoring
    pub base_completion_points: i64,
    pub no_mid_day_charge_bonus: i64,
    pub mid_day_charge_penalty: i64,
    pub efficient_charging_bonus: i64,
    pub efficient_end_percent_min: f64,
    pub efficient_end_percent_max: f64,
    pub overcharge_penalty_per_kwh: f64,
    pub deadhead_penalty_points_per_mile: f64,
    pub perfect_route_bonus: i64,
    pub route_guess_tolerance_miles: f64,
    pub perfect_week_bonus: i64,
    pub difficulty_multiplier_fair: f64,
    pub difficulty_multiplier_cold: f64,
    pub difficulty_multiplier_extreme: f64,
}
