//! Shared test fixtures for `ebus_core` and downstream crates.
//!
//! `base_content()` carries the stock constants and a few weather scenarios.
//! `straight_route()` builds a symmetric out-and-back route heading due north
//! so progress, distance and stop positions line up exactly.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::geo::{destination_point, path_length_miles};
use crate::{
    BusClass, ChargerSite, ChargingStation, Constants, LatLon, LocationType, Route, RouteId,
    ScenarioContent, ScenarioSetup, SimulationContext, StationId, Stop, StopKind, Weather,
    WeatherScenarioDef,
};

pub const ANCHOR: LatLon = LatLon::new(40.0, -75.0);

pub fn base_constants() -> Constants {
    Constants {
        efficiency_fair_kwh_per_mile: 1.2,
        efficiency_cold_kwh_per_mile: 1.5,
        efficiency_extreme_kwh_per_mile: 1.9,
        class_c_efficiency_multiplier: 1.6,
        deadhead_energy_penalty: 1.25,
        class_a_capacity_kwh: 120.0,
        class_c_capacity_kwh: 210.0,
        class_a_diesel_mpg: 10.0,
        class_c_diesel_mpg: 7.0,
        co2_kg_per_gallon: 10.21,
        co2_segment_miles: 2.0,

        bus_speed_mph: 20.0,
        dwell_hours: 0.05,
        school_dwell_hours: 0.1,
        stop_arrival_threshold_miles: 0.15,
        max_stops_per_tick: 3,
        completion_progress: 0.99,
        target_day_wall_seconds: 60.0,

        route_start_hour: 6.0,
        school_arrival_hour: 8.0,
        midday_window_hours: 6.5,
        pm_start_hour: 14.5,
        day_end_hour: 17.0,

        min_return_charge_percent: 15.0,
        max_charge_percent: 95.0,
        max_charging_window_hours: 6.0,
        school_has_charger: true,
        school_charger_rate_per_kwh: 0.18,
        school_charger_kwh_per_hour: 19.2,
        depot_charger_rate_per_kwh: 0.12,
        depot_charger_kwh_per_hour: 60.0,
        routing_circuity_factor: 1.3,
        overnight_rate_per_kwh: 0.12,
        v2g_credit_per_kwh: 0.30,
        starting_depot_percent: 20.0,
        safety_buffer_percent: 20.0,

        base_completion_points: 100,
        no_mid_day_charge_bonus: 50,
        mid_day_charge_penalty: 40,
        efficient_charging_bonus: 25,
        efficient_end_percent_min: 10.0,
        efficient_end_percent_max: 25.0,
        overcharge_penalty_per_kwh: 1.0,
        deadhead_penalty_points_per_mile: 5.0,
        perfect_route_bonus: 200,
        route_guess_tolerance_miles: 0.5,
        perfect_week_bonus: 150,
        difficulty_multiplier_fair: 1.0,
        difficulty_multiplier_cold: 1.25,
        difficulty_multiplier_extreme: 1.5,
    }
}

pub fn base_content() -> ScenarioContent {
    ScenarioContent {
        content_version: "test".to_string(),
        weather_scenarios: vec![
            WeatherScenarioDef {
                id: "fair_week".to_string(),
                name: "Fair Week".to_string(),
                days: vec![Weather::Fair; 3],
            },
            WeatherScenarioDef {
                id: "cold_snap".to_string(),
                name: "Cold Snap".to_string(),
                days: vec![Weather::Fair, Weather::Cold, Weather::Extreme],
            },
            WeatherScenarioDef {
                id: "polar".to_string(),
                name: "Polar Vortex".to_string(),
                days: vec![Weather::Extreme; 3],
            },
        ],
        constants: base_constants(),
    }
}

/// Out-and-back route of `one_way_miles` heading north from [`ANCHOR`]:
/// depot, three evenly spaced pickups, school at the turnaround, dropoffs at
/// the pickup points in reverse, depot. One public charger sits two miles
/// east of the school.
pub fn straight_route(one_way_miles: f64) -> Route {
    let at = |fraction: f64| destination_point(ANCHOR, 0.0, one_way_miles * fraction);
    let pickups = [at(0.25), at(0.5), at(0.75)];
    let school = at(1.0);

    let mut stops = vec![Stop {
        kind: StopKind::Depot,
        coords: ANCHOR,
        completed: false,
    }];
    stops.extend(pickups.iter().map(|&coords| Stop {
        kind: StopKind::Pickup,
        coords,
        completed: false,
    }));
    stops.push(Stop {
        kind: StopKind::School,
        coords: school,
        completed: false,
    });
    stops.extend(pickups.iter().rev().map(|&coords| Stop {
        kind: StopKind::Dropoff,
        coords,
        completed: false,
    }));
    stops.push(Stop {
        kind: StopKind::Depot,
        coords: ANCHOR,
        completed: false,
    });

    let path: Vec<LatLon> = stops.iter().map(|s| s.coords).collect();
    let distance_miles = path_length_miles(&path);

    Route {
        id: RouteId(format!("route_test_{one_way_miles}")),
        stops,
        path,
        distance_miles,
        one_way_miles,
        public_chargers: vec![ChargerSite {
            id: StationId("station_public_01".to_string()),
            name: "Public Charger 1".to_string(),
            coords: destination_point(school, 90.0, 2.0),
            rate_per_kwh: 0.35,
            kwh_per_hour: 100.0,
        }],
    }
}

pub fn base_setup(one_way_guess_miles: f64) -> ScenarioSetup {
    ScenarioSetup {
        bus_class: BusClass::A,
        weather_scenario: "fair_week".to_string(),
        weather_schedule: vec![Weather::Fair; 3],
        one_way_guess_miles,
        initial_charge_percent: 80.0,
        anchor: ANCHOR,
    }
}

/// Class A bus, fair week, 10-mile route, 80% initial charge.
pub fn base_context(content: &ScenarioContent) -> SimulationContext {
    crate::start_scenario(content, base_setup(10.0), straight_route(10.0), 42)
}

pub fn school_station(route: &Route, constants: &Constants) -> ChargingStation {
    let coords = route
        .school_index()
        .map_or(ANCHOR, |i| route.stops[i].coords);
    ChargingStation {
        id: StationId("station_school".to_string()),
        name: "School".to_string(),
        location_type: LocationType::School,
        coords,
        rate_per_kwh: constants.school_charger_rate_per_kwh,
        kwh_per_hour: constants.school_charger_kwh_per_hour,
        deadhead_miles: 0.0,
    }
}

pub fn public_station(route: &Route) -> ChargingStation {
    let site = &route.public_chargers[0];
    ChargingStation {
        id: site.id.clone(),
        name: site.name.clone(),
        location_type: LocationType::Public,
        coords: site.coords,
        rate_per_kwh: site.rate_per_kwh,
        kwh_per_hour: site.kwh_per_hour,
        deadhead_miles: 2.0,
    }
}

/// Deterministic RNG seeded with 42.
pub fn make_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(42)
}
