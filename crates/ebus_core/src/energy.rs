//! Energy model: pure lookups and conversions, no mutation.

use crate::{BusClass, Constants, Weather};

/// Energy per mile for the class in the given weather.
pub fn efficiency(class: BusClass, weather: Weather, constants: &Constants) -> f64 {
    let class_a = match weather {
        Weather::Fair => constants.efficiency_fair_kwh_per_mile,
        Weather::Cold => constants.efficiency_cold_kwh_per_mile,
        Weather::Extreme => constants.efficiency_extreme_kwh_per_mile,
    };
    match class {
        BusClass::A => class_a,
        BusClass::C => class_a * constants.class_c_efficiency_multiplier,
    }
}

/// Energy drawn over `distance_miles`. Deadhead travel pays the detour penalty.
pub fn energy_for_distance(
    distance_miles: f64,
    efficiency_kwh_per_mile: f64,
    deadhead: bool,
    constants: &Constants,
) -> f64 {
    let base = distance_miles * efficiency_kwh_per_mile;
    if deadhead {
        base * constants.deadhead_energy_penalty
    } else {
        base
    }
}

pub fn battery_capacity_kwh(class: BusClass, constants: &Constants) -> f64 {
    match class {
        BusClass::A => constants.class_a_capacity_kwh,
        BusClass::C => constants.class_c_capacity_kwh,
    }
}

/// Diesel CO₂ avoided by electrically serving `miles`.
pub fn co2_avoided_kg(class: BusClass, miles: f64, constants: &Constants) -> f64 {
    let mpg = match class {
        BusClass::A => constants.class_a_diesel_mpg,
        BusClass::C => constants.class_c_diesel_mpg,
    };
    if mpg <= 0.0 {
        return 0.0;
    }
    miles / mpg * constants.co2_kg_per_gallon
}
