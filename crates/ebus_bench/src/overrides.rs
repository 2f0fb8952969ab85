use anyhow::{bail, Result};
use ebus_core::Constants;
use std::collections::HashMap;

const VALID_KEYS: &[&str] = &[
    "efficiency_fair_kwh_per_mile",
    "efficiency_cold_kwh_per_mile",
    "efficiency_extreme_kwh_per_mile",
    "class_c_efficiency_multiplier",
    "deadhead_energy_penalty",
    "class_a_capacity_kwh",
    "class_c_capacity_kwh",
    "bus_speed_mph",
    "min_return_charge_percent",
    "max_charge_percent",
    "max_charging_window_hours",
    "school_has_charger",
    "school_charger_kwh_per_hour",
    "school_charger_rate_per_kwh",
    "depot_charger_kwh_per_hour",
    "depot_charger_rate_per_kwh",
    "routing_circuity_factor",
    "overnight_rate_per_kwh",
    "v2g_credit_per_kwh",
    "safety_buffer_percent",
    "mid_day_charge_penalty",
    "perfect_week_bonus",
];

pub fn apply_overrides(
    constants: &mut Constants,
    overrides: &HashMap<String, serde_json::Value>,
) -> Result<()> {
    for (key, value) in overrides {
        match key.as_str() {
            "efficiency_fair_kwh_per_mile" => {
                constants.efficiency_fair_kwh_per_mile = as_f64(key, value)?;
            }
            "efficiency_cold_kwh_per_mile" => {
                constants.efficiency_cold_kwh_per_mile = as_f64(key, value)?;
            }
            "efficiency_extreme_kwh_per_mile" => {
                constants.efficiency_extreme_kwh_per_mile = as_f64(key, value)?;
            }
            "class_c_efficiency_multiplier" => {
                constants.class_c_efficiency_multiplier = as_f64(key, value)?;
            }
            "deadhead_energy_penalty" => constants.deadhead_energy_penalty = as_f64(key, value)?,
            "class_a_capacity_kwh" => constants.class_a_capacity_kwh = as_f64(key, value)?,
            "class_c_capacity_kwh" => constants.class_c_capacity_kwh = as_f64(key, value)?,
            "bus_speed_mph" => constants.bus_speed_mph = as_f64(key, value)?,
            "min_return_charge_percent" => {
                constants.min_return_charge_percent = as_f64(key, value)?;
            }
            "max_charge_percent" => constants.max_charge_percent = as_f64(key, value)?,
            "max_charging_window_hours" => {
                constants.max_charging_window_hours = as_f64(key, value)?;
            }
            "school_has_charger" => constants.school_has_charger = as_bool(key, value)?,
            "school_charger_kwh_per_hour" => {
                constants.school_charger_kwh_per_hour = as_f64(key, value)?;
            }
            "school_charger_rate_per_kwh" => {
                constants.school_charger_rate_per_kwh = as_f64(key, value)?;
            }
            "depot_charger_kwh_per_hour" => {
                constants.depot_charger_kwh_per_hour = as_f64(key, value)?;
            }
            "depot_charger_rate_per_kwh" => {
                constants.depot_charger_rate_per_kwh = as_f64(key, value)?;
            }
            "routing_circuity_factor" => constants.routing_circuity_factor = as_f64(key, value)?,
            "overnight_rate_per_kwh" => constants.overnight_rate_per_kwh = as_f64(key, value)?,
            "v2g_credit_per_kwh" => constants.v2g_credit_per_kwh = as_f64(key, value)?,
            "safety_buffer_percent" => constants.safety_buffer_percent = as_f64(key, value)?,
            "mid_day_charge_penalty" => constants.mid_day_charge_penalty = as_i64(key, value)?,
            "perfect_week_bonus" => constants.perfect_week_bonus = as_i64(key, value)?,
            _ => bail!(
                "unknown override key '{key}'. Valid keys: {}",
                VALID_KEYS.join(", ")
            ),
        }
    }
    Ok(())
}

fn as_f64(key: &str, value: &serde_json::Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| anyhow::anyhow!("override '{key}': expected a number, got {value}"))
}

fn as_i64(key: &str, value: &serde_json::Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| anyhow::anyhow!("override '{key}': expected an integer, got {value}"))
}

fn as_bool(key: &str, value: &serde_json::Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| anyhow::anyhow!("override '{key}': expected true or false, got {value}"))
}
