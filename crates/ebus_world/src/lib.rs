//! Content loading, offline collaborators and scenario bootstrap shared
//! between ebus_cli and ebus_bench.

use anyhow::{bail, Context, Result};
use ebus_core::collaborators::RouteGenerator;
use ebus_core::{BusClass, LatLon, ScenarioContent, ScenarioSetup, SimulationContext, Weather};
use ebus_core::{Constants, WeatherScenarioDef};
use rand::RngCore;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

mod route_gen;
mod routing;
mod stations;

pub use route_gen::GridRouteGenerator;
pub use routing::{OfflineRouter, StraightLineRouter};
pub use stations::RouteStationProvider;

/// Depot location used when a run does not name one.
pub const DEFAULT_ANCHOR: LatLon = LatLon::new(39.9526, -75.1652);

#[derive(Deserialize)]
struct WeatherScenariosFile {
    content_version: String,
    scenarios: Vec<WeatherScenarioDef>,
}

/// Validates loaded content, panicking on any authoring error.
///
/// Catches mistakes like an efficiency table that improves in worse weather,
/// clock windows out of order, or a weather scenario with no days.
#[allow(clippy::too_many_lines)]
pub fn validate_content(content: &ScenarioContent) {
    let c = &content.constants;

    for (weather, value) in [
        (Weather::Fair, c.efficiency_fair_kwh_per_mile),
        (Weather::Cold, c.efficiency_cold_kwh_per_mile),
        (Weather::Extreme, c.efficiency_extreme_kwh_per_mile),
    ] {
        assert!(
            value > 0.0,
            "efficiency for {weather:?} must be positive, got {value}"
        );
    }
    assert!(
        c.efficiency_fair_kwh_per_mile <= c.efficiency_cold_kwh_per_mile
            && c.efficiency_cold_kwh_per_mile <= c.efficiency_extreme_kwh_per_mile,
        "efficiency must not improve with worse weather"
    );
    assert!(
        c.class_c_efficiency_multiplier > 0.0,
        "class_c_efficiency_multiplier must be positive"
    );
    assert!(
        c.class_a_capacity_kwh > 0.0 && c.class_c_capacity_kwh > 0.0,
        "battery capacities must be positive"
    );
    assert!(
        c.deadhead_energy_penalty >= 1.0,
        "deadhead_energy_penalty must be at least 1.0, got {}",
        c.deadhead_energy_penalty
    );
    assert!(
        c.routing_circuity_factor >= 1.0,
        "routing_circuity_factor must be at least 1.0, got {}",
        c.routing_circuity_factor
    );

    assert!(c.bus_speed_mph > 0.0, "bus_speed_mph must be positive");
    assert!(
        c.max_stops_per_tick >= 1,
        "max_stops_per_tick must be at least 1"
    );
    assert!(
        c.completion_progress > 0.5 && c.completion_progress <= 1.0,
        "completion_progress must be in (0.5, 1.0], got {}",
        c.completion_progress
    );
    assert!(
        c.target_day_wall_seconds > 0.0,
        "target_day_wall_seconds must be positive"
    );

    assert!(
        c.route_start_hour < c.school_arrival_hour
            && c.school_arrival_hour <= c.pm_start_hour
            && c.pm_start_hour < c.day_end_hour,
        "clock windows out of order: start {} school {} pm {} end {}",
        c.route_start_hour,
        c.school_arrival_hour,
        c.pm_start_hour,
        c.day_end_hour,
    );

    assert!(
        c.min_return_charge_percent >= 0.0
            && c.min_return_charge_percent < c.max_charge_percent
            && c.max_charge_percent <= 100.0,
        "charge limits must satisfy 0 <= min_return ({}) < max_charge ({}) <= 100",
        c.min_return_charge_percent,
        c.max_charge_percent,
    );
    assert!(
        c.max_charging_window_hours > 0.0,
        "max_charging_window_hours must be positive"
    );
    assert!(
        (0.0..=100.0).contains(&c.starting_depot_percent),
        "starting_depot_percent must be within 0..=100"
    );
    assert!(
        (0.0..100.0).contains(&c.safety_buffer_percent),
        "safety_buffer_percent must be within 0..100"
    );
    assert!(
        c.efficient_end_percent_min <= c.efficient_end_percent_max,
        "efficient end-of-day band is inverted"
    );

    assert!(
        !content.weather_scenarios.is_empty(),
        "at least one weather scenario is required"
    );
    let mut seen = HashSet::new();
    for scenario in &content.weather_scenarios {
        assert!(
            !scenario.id.is_empty(),
            "weather scenario '{}' has an empty id",
            scenario.name
        );
        assert!(
            seen.insert(scenario.id.as_str()),
            "duplicate weather scenario id '{}'",
            scenario.id
        );
        assert!(
            !scenario.days.is_empty(),
            "weather scenario '{}' has no days",
            scenario.id
        );
    }
}

pub fn load_content(content_dir: &str) -> Result<ScenarioContent> {
    let dir = Path::new(content_dir);
    let constants: Constants = serde_json::from_str(
        &std::fs::read_to_string(dir.join("constants.json")).context("reading constants.json")?,
    )
    .context("parsing constants.json")?;
    let scenarios_file: WeatherScenariosFile = serde_json::from_str(
        &std::fs::read_to_string(dir.join("weather_scenarios.json"))
            .context("reading weather_scenarios.json")?,
    )
    .context("parsing weather_scenarios.json")?;
    let content = ScenarioContent {
        content_version: scenarios_file.content_version,
        weather_scenarios: scenarios_file.scenarios,
        constants,
    };
    validate_content(&content);
    Ok(content)
}

/// Player-facing choices for one scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub bus_class: BusClass,
    pub weather_scenario: String,
    pub one_way_miles: f64,
    pub one_way_guess_miles: f64,
    pub initial_charge_percent: f64,
    pub anchor: LatLon,
}

/// Generate day 1's route and start the scenario.
///
/// `rng` should be the same stream later used for route regeneration so a
/// seed reproduces the whole week.
pub fn build_scenario<R: RngCore>(
    content: &ScenarioContent,
    options: &ScenarioOptions,
    generator: &dyn RouteGenerator,
    seed: u64,
    rng: &mut R,
) -> Result<SimulationContext> {
    let Some(weather) = content.weather_scenario(&options.weather_scenario) else {
        let known: Vec<&str> = content
            .weather_scenarios
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        bail!(
            "unknown weather scenario '{}' (known: {})",
            options.weather_scenario,
            known.join(", ")
        );
    };
    if !options.one_way_miles.is_finite() || options.one_way_miles <= 0.0 {
        bail!(
            "route distance must be a positive number of miles, got {}",
            options.one_way_miles
        );
    }
    if !(0.0..=100.0).contains(&options.initial_charge_percent) {
        bail!(
            "initial charge must be within 0..=100%, got {}",
            options.initial_charge_percent
        );
    }

    let route = generator.generate(options.anchor, options.one_way_miles, rng);
    if route.is_degenerate() {
        bail!(
            "route generator produced an unusable route for {} miles",
            options.one_way_miles
        );
    }
    tracing::info!(
        route = %route.id,
        one_way_miles = options.one_way_miles,
        round_trip_miles = route.distance_miles,
        weather = %weather.name,
        "route generated"
    );

    let setup = ScenarioSetup {
        bus_class: options.bus_class,
        weather_scenario: weather.id.clone(),
        weather_schedule: weather.days.clone(),
        one_way_guess_miles: options.one_way_guess_miles,
        initial_charge_percent: options.initial_charge_percent,
        anchor: options.anchor,
    };
    Ok(ebus_core::start_scenario(content, setup, route, seed))
}
