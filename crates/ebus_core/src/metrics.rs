//! Read-only views computed from `SimulationContext`.
//!
//! `bus_snapshot` is the per-tick presentation view; `compute_day_metrics`
//! summarises a completed day for time-series analysis. No state mutation.

use serde::Serialize;
use std::io::Write;

use crate::clock::format_clock;
use crate::{BusStatus, LatLon, SimulationContext, TripPhase, Weather};

/// Current schema version. Bump when fields are added, removed or reordered.
const METRICS_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct BusSnapshot {
    pub tick: u64,
    pub day: u32,
    pub position: LatLon,
    pub progress: f64,
    pub battery_kwh: f64,
    pub battery_percent: f64,
    pub status: &'static str,
    pub phase: TripPhase,
    pub clock_hour: f64,
    pub clock: String,
}

pub fn bus_snapshot(ctx: &SimulationContext) -> BusSnapshot {
    BusSnapshot {
        tick: ctx.meta.tick,
        day: ctx.week.current_day,
        position: ctx.bus.position,
        progress: ctx.bus.progress,
        battery_kwh: ctx.bus.battery_kwh,
        battery_percent: ctx.bus.battery_percent,
        status: ctx.bus.status.label(),
        phase: ctx.clock.phase,
        clock_hour: ctx.clock.clock_hour,
        clock: format_clock(ctx.clock.clock_hour),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayMetrics {
    pub day: u32,
    pub metrics_version: u32,
    pub weather: Weather,

    // Distance
    pub route_miles: f64,
    pub deadhead_miles: f64,
    pub distance_miles: f64,

    // Energy
    pub energy_consumed_kwh: f64,
    pub end_battery_percent: f64,
    pub overnight_target_percent: f64,
    pub overnight_kwh: f64,

    // Mid-day charging
    pub mid_day_charged: bool,
    pub mid_day_kwh: f64,
    pub mid_day_charging_hours: f64,
    pub under_charged: bool,

    // Cost and impact
    pub cost: f64,
    pub co2_avoided_kg: f64,
    pub pickups_completed: u32,
    pub dropoffs_completed: u32,

    // Score
    pub day_points: i64,
    pub score_total: i64,
}

/// Metrics for the day that just finished. `None` unless the bus is sitting
/// at the end of a completed, scored day.
pub fn compute_day_metrics(ctx: &SimulationContext) -> Option<DayMetrics> {
    if !matches!(ctx.bus.status, BusStatus::Completed) {
        return None;
    }
    let day = ctx.week.current_day;
    let result = ctx.week.day_results.iter().rfind(|r| r.day == day)?;
    let day_points = ctx
        .score
        .day_scores
        .iter()
        .rfind(|s| s.day == day)
        .map_or(0, |s| s.points);
    let stats = &ctx.bus.stats;
    let overnight = &ctx.week.current_overnight;

    Some(DayMetrics {
        day,
        metrics_version: METRICS_VERSION,
        weather: result.weather,
        route_miles: stats.route_miles,
        deadhead_miles: stats.deadhead_miles,
        distance_miles: result.distance_miles,
        energy_consumed_kwh: result.energy_consumed_kwh,
        end_battery_percent: result.end_battery_percent,
        overnight_target_percent: overnight.target_percent,
        overnight_kwh: overnight.energy_added_kwh,
        mid_day_charged: result.mid_day_charged,
        mid_day_kwh: stats.mid_day_kwh,
        mid_day_charging_hours: stats.mid_day_charging_hours,
        under_charged: stats.under_charged,
        cost: result.cost,
        co2_avoided_kg: result.co2_avoided_kg,
        pickups_completed: result.pickups_completed,
        dropoffs_completed: stats.dropoffs_completed,
        day_points,
        score_total: ctx.score.total,
    })
}

/// Write the CSV header row for day metrics.
pub fn write_metrics_header(writer: &mut impl Write) -> std::io::Result<()> {
    writeln!(
        writer,
        "day,metrics_version,weather,\
         route_miles,deadhead_miles,distance_miles,\
         energy_consumed_kwh,end_battery_percent,overnight_target_percent,overnight_kwh,\
         mid_day_charged,mid_day_kwh,mid_day_charging_hours,under_charged,\
         cost,co2_avoided_kg,pickups_completed,dropoffs_completed,\
         day_points,score_total"
    )
}

/// Append one day as a CSV row.
pub fn append_metrics_row(writer: &mut impl Write, m: &DayMetrics) -> std::io::Result<()> {
    writeln!(
        writer,
        "{},{},{:?},{:.3},{:.3},{:.3},{:.3},{:.2},{:.2},{:.3},{},{:.3},{:.3},{},{:.2},{:.3},{},{},{},{}",
        m.day,
        m.metrics_version,
        m.weather,
        m.route_miles,
        m.deadhead_miles,
        m.distance_miles,
        m.energy_consumed_kwh,
        m.end_battery_percent,
        m.overnight_target_percent,
        m.overnight_kwh,
        m.mid_day_charged,
        m.mid_day_kwh,
        m.mid_day_charging_hours,
        m.under_charged,
        m.cost,
        m.co2_avoided_kg,
        m.pickups_completed,
        m.dropoffs_completed,
        m.day_points,
        m.score_total,
    )
}

/// Appends `day_metrics.csv` in a run directory, one row per completed day.
pub struct MetricsFileWriter {
    writer: std::io::BufWriter<std::fs::File>,
}

impl MetricsFileWriter {
    /// Create the file and write the header row.
    pub fn new(run_dir: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(run_dir.join("day_metrics.csv"))?;
        let mut writer = std::io::BufWriter::new(file);
        write_metrics_header(&mut writer)?;
        Ok(Self { writer })
    }

    pub fn write_row(&mut self, metrics: &DayMetrics) -> std::io::Result<()> {
        append_metrics_row(&mut self.writer, metrics)?;
        self.writer.flush()
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
