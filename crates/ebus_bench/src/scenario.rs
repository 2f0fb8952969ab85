use anyhow::{bail, Context, Result};
use ebus_control::AutopilotPolicy;
use ebus_core::BusClass;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seeds: SeedSpec,
    #[serde(default = "default_content_dir")]
    pub content_dir: String,
    /// Weather scenario id from weather_scenarios.json.
    pub weather: String,
    #[serde(default = "default_bus_class")]
    pub bus_class: BusClass,
    pub one_way_miles: f64,
    /// Defaults to `one_way_miles`.
    #[serde(default)]
    pub one_way_guess_miles: Option<f64>,
    /// Defaults to the autopilot's plan for day 1.
    #[serde(default)]
    pub initial_charge_percent: Option<f64>,
    #[serde(default = "default_step_minutes")]
    pub step_minutes: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    #[serde(default)]
    pub offline_routing: bool,
    #[serde(default)]
    pub autopilot: AutopilotPolicy,
    #[serde(default)]
    pub overrides: HashMap<String, serde_json::Value>,
}

fn default_content_dir() -> String {
    "./content".to_string()
}

fn default_bus_class() -> BusClass {
    BusClass::A
}

fn default_step_minutes() -> f64 {
    3.0
}

fn default_max_steps() -> u64 {
    20_000
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SeedSpec {
    List(Vec<u64>),
    Range { range: [u64; 2] },
}

impl SeedSpec {
    pub fn expand(&self) -> Vec<u64> {
        match self {
            SeedSpec::List(seeds) => seeds.clone(),
            SeedSpec::Range { range } => (range[0]..=range[1]).collect(),
        }
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario file: {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&json)
        .with_context(|| format!("parsing scenario file: {}", path.display()))?;
    if scenario.name.is_empty() {
        bail!("scenario 'name' must not be empty");
    }
    if !scenario.one_way_miles.is_finite() || scenario.one_way_miles <= 0.0 {
        bail!("scenario 'one_way_miles' must be > 0");
    }
    if scenario.step_minutes <= 0.0 {
        bail!("scenario 'step_minutes' must be > 0");
    }
    if scenario.max_steps == 0 {
        bail!("scenario 'max_steps' must be > 0");
    }
    if scenario.seeds.expand().is_empty() {
        bail!("scenario 'seeds' must produce at least one seed");
    }
    Ok(scenario)
}
