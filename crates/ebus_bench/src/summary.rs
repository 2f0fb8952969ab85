use crate::runner::RunSummary;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

type Extractor = (&'static str, fn(&RunSummary) -> f64);

const EXTRACTORS: &[Extractor] = &[
    ("final_score", |r| r.final_score as f64),
    ("days_completed", |r| f64::from(r.days_completed)),
    ("mid_day_charges", |r| f64::from(r.mid_day_charges)),
    ("distance_miles", |r| r.distance_miles),
    ("deadhead_miles", |r| r.deadhead_miles),
    ("energy_kwh", |r| r.energy_kwh),
    ("overnight_cost", |r| r.overnight_cost),
    ("mid_day_cost", |r| r.mid_day_cost),
    ("v2g_earnings", |r| r.v2g_earnings),
    ("net_cost", |r| r.net_cost),
    ("co2_avoided_kg", |r| r.co2_avoided_kg),
];

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub seed_count: usize,
    pub completed_count: usize,
    pub stranded_count: usize,
    pub metrics: Vec<MetricSummary>,
}

#[derive(Debug, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

pub fn compute_summary(runs: &[RunSummary]) -> SummaryStats {
    let count_outcome = |outcome: &str| runs.iter().filter(|r| r.outcome == outcome).count();
    let metrics = EXTRACTORS
        .iter()
        .map(|(name, extract)| {
            let values: Vec<f64> = runs.iter().map(extract).collect();
            compute_metric_summary(name, &values)
        })
        .collect();

    SummaryStats {
        seed_count: runs.len(),
        completed_count: count_outcome("completed"),
        stranded_count: count_outcome("stranded"),
        metrics,
    }
}

fn compute_metric_summary(name: &str, values: &[f64]) -> MetricSummary {
    if values.is_empty() {
        return MetricSummary {
            name: name.to_string(),
            mean: 0.0,
            min: 0.0,
            max: 0.0,
            stddev: 0.0,
        };
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

    MetricSummary {
        name: name.to_string(),
        mean,
        min,
        max,
        stddev: variance.sqrt(),
    }
}

/// One row per seed.
pub fn write_seeds_csv(path: &Path, runs: &[RunSummary]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for run in runs {
        writer
            .serialize(run)
            .with_context(|| format!("writing seed {} to {}", run.seed, path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

pub fn print_summary(scenario_name: &str, stats: &SummaryStats) {
    println!(
        "\n=== {} ({} seeds) ===\n",
        scenario_name, stats.seed_count
    );
    println!(
        "{:<20} {:>10} {:>10} {:>10} {:>10}",
        "Metric", "Mean", "Min", "Max", "StdDev"
    );
    println!("{}", "-".repeat(64));
    for metric in &stats.metrics {
        println!(
            "{:<20} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            metric.name, metric.mean, metric.min, metric.max, metric.stddev
        );
    }
    println!(
        "{:<20} {}/{}",
        "completion_rate", stats.completed_count, stats.seed_count
    );
    println!(
        "{:<20} {}/{}",
        "stranding_rate", stats.stranded_count, stats.seed_count
    );
}
