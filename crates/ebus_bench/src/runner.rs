use crate::scenario::Scenario;
use anyhow::{Context, Result};
use ebus_control::{drive, AutopilotController, DriveEnd, Pace};
use ebus_core::collaborators::RoutingService;
use ebus_core::{Event, MetricsFileWriter, Outcome, ScenarioContent, SimulationContext};
use ebus_world::{
    build_scenario, GridRouteGenerator, OfflineRouter, RouteStationProvider, ScenarioOptions,
    StraightLineRouter, DEFAULT_ANCHOR,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// One seed's result, flattened for the CSV and the summary statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub run_id: String,
    pub outcome: &'static str,
    pub final_score: i64,
    pub days_completed: u32,
    pub stranded_day: Option<u32>,
    pub mid_day_charges: u32,
    pub distance_miles: f64,
    pub deadhead_miles: f64,
    pub energy_kwh: f64,
    pub overnight_cost: f64,
    pub mid_day_cost: f64,
    pub v2g_earnings: f64,
    pub net_cost: f64,
    pub co2_avoided_kg: f64,
    pub steps: u64,
    pub wall_time_ms: u64,
}

impl RunSummary {
    pub fn from_context(
        seed: u64,
        run_id: String,
        ctx: &SimulationContext,
        deadhead_miles: f64,
        steps: u64,
        wall_time_ms: u64,
    ) -> Self {
        let (outcome, final_score, stranded_day) = match ctx.outcome {
            Outcome::Completed { final_score } => ("completed", final_score, None),
            Outcome::Stranded { day } => ("stranded", 0, Some(day)),
            Outcome::InProgress => ("unfinished", ctx.score.total, None),
        };
        let week = &ctx.week;
        let overnight_cost = week.overnight_cost_total;
        let mid_day_cost = week.mid_day_cost_total;
        Self {
            seed,
            run_id,
            outcome,
            final_score,
            days_completed: u32::try_from(week.day_results.len()).unwrap_or(u32::MAX),
            stranded_day,
            mid_day_charges: week.total_mid_day_charges,
            distance_miles: week.day_results.iter().map(|d| d.distance_miles).sum(),
            deadhead_miles,
            energy_kwh: week.day_results.iter().map(|d| d.energy_consumed_kwh).sum(),
            overnight_cost,
            mid_day_cost,
            v2g_earnings: week.v2g_earnings_total,
            net_cost: overnight_cost + mid_day_cost - week.v2g_earnings_total,
            co2_avoided_kg: week.day_results.iter().map(|d| d.co2_avoided_kg).sum(),
            steps,
            wall_time_ms,
        }
    }
}

/// Write JSON atomically: write to `.tmp` then rename.
fn write_json_atomic(value: &impl Serialize, path: &Path) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value)?;
    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn run_seed(
    content: &ScenarioContent,
    scenario: &Scenario,
    seed: u64,
    seed_dir: &Path,
) -> Result<RunSummary> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let start = Instant::now();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let initial_charge_percent = scenario.initial_charge_percent.unwrap_or_else(|| {
        let first_day = content
            .weather_scenario(&scenario.weather)
            .and_then(|s| s.days.first().copied())
            .unwrap_or(ebus_core::Weather::Fair);
        ebus_control::planned_target_percent(
            2.0 * scenario.one_way_miles,
            scenario.bus_class,
            first_day,
            &content.constants,
            scenario.autopilot.reserve_percent,
        )
    });
    let options = ScenarioOptions {
        bus_class: scenario.bus_class,
        weather_scenario: scenario.weather.clone(),
        one_way_miles: scenario.one_way_miles,
        one_way_guess_miles: scenario
            .one_way_guess_miles
            .unwrap_or(scenario.one_way_miles),
        initial_charge_percent,
        anchor: DEFAULT_ANCHOR,
    };
    let mut ctx = build_scenario(
        content,
        &options,
        &GridRouteGenerator::default(),
        seed,
        &mut rng,
    )?;

    std::fs::create_dir_all(seed_dir)
        .with_context(|| format!("creating seed directory: {}", seed_dir.display()))?;
    write_json_atomic(
        &serde_json::json!({
            "run_id": run_id,
            "seed": seed,
            "scenario_name": scenario.name,
            "content_version": content.content_version,
            "runner": "ebus_bench",
            "route_id": ctx.route.id,
            "autopilot": scenario.autopilot,
        }),
        &seed_dir.join("run_info.json"),
    )
    .context("writing run_info.json")?;
    let mut metrics_writer = MetricsFileWriter::new(seed_dir)
        .with_context(|| format!("opening metrics CSV in {}", seed_dir.display()))?;

    let routing: Box<dyn RoutingService> = if scenario.offline_routing {
        Box::new(OfflineRouter)
    } else {
        Box::new(StraightLineRouter::new(
            content.constants.routing_circuity_factor,
        ))
    };
    let mut autopilot = AutopilotController::new(
        Box::new(GridRouteGenerator::default()),
        routing,
        Box::new(RouteStationProvider),
        Box::new(rng),
    )
    .with_policy(scenario.autopilot.clone());

    let mut deadhead_miles = 0.0;
    let mut write_error: Option<std::io::Error> = None;
    let drive_summary = drive(
        &mut ctx,
        content,
        &mut autopilot,
        Pace::SimHours(scenario.step_minutes / 60.0),
        scenario.max_steps,
        |ctx, events| {
            if !events
                .iter()
                .any(|e| matches!(e.event, Event::DayScored { .. }))
            {
                return;
            }
            if let Some(metrics) = ebus_core::compute_day_metrics(ctx) {
                deadhead_miles += metrics.deadhead_miles;
                if let Err(err) = metrics_writer.write_row(&metrics) {
                    write_error.get_or_insert(err);
                }
            }
        },
    );
    if let Some(err) = write_error {
        return Err(err).context("writing metrics row");
    }
    metrics_writer.flush().context("flushing metrics")?;
    if drive_summary.end != DriveEnd::Finished {
        tracing::warn!(seed, end = ?drive_summary.end, "run did not reach a terminal outcome");
    }

    #[allow(clippy::cast_possible_truncation)]
    let wall_time_ms = start.elapsed().as_millis() as u64;
    let summary = RunSummary::from_context(
        seed,
        run_id,
        &ctx,
        deadhead_miles,
        drive_summary.steps,
        wall_time_ms,
    );
    write_json_atomic(&summary, &seed_dir.join("run_result.json"))
        .context("writing run_result.json")?;
    Ok(summary)
}
