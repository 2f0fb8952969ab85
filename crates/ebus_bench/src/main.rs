use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod overrides;
mod runner;
mod scenario;
mod summary;

#[derive(Parser)]
#[command(
    name = "ebus_bench",
    about = "Sweep an electric bus scenario across seeds"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file across multiple seeds.
    Run {
        /// Path to the scenario JSON file.
        #[arg(long)]
        scenario: String,
        /// Output directory (default: runs/).
        #[arg(long, default_value = "runs")]
        output_dir: String,
    },
}

fn run(scenario_path: &str, output_dir: &str) -> Result<()> {
    let scenario = scenario::load_scenario(Path::new(scenario_path))?;
    let seeds = scenario.seeds.expand();

    println!(
        "Loading scenario '{}': {} seeds, {} weather, {:.1} mi one-way",
        scenario.name,
        seeds.len(),
        scenario.weather,
        scenario.one_way_miles
    );

    let mut content = ebus_world::load_content(&scenario.content_dir)?;
    overrides::apply_overrides(&mut content.constants, &scenario.overrides)?;
    // Overrides can break cross-field constraints the loader already checked.
    ebus_world::validate_content(&content);

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_dir = PathBuf::from(output_dir).join(format!("{}_{}", scenario.name, timestamp));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("creating output directory: {}", run_dir.display()))?;
    std::fs::copy(scenario_path, run_dir.join("scenario.json")).context("copying scenario file")?;

    println!("Output: {}", run_dir.display());
    println!("Running {} seeds in parallel...", seeds.len());

    let results: Vec<Result<runner::RunSummary>> = seeds
        .par_iter()
        .map(|&seed| {
            let seed_dir = run_dir.join(format!("seed_{seed}"));
            runner::run_seed(&content, &scenario, seed, &seed_dir)
        })
        .collect();

    let mut runs = Vec::new();
    for (seed, result) in seeds.iter().zip(results) {
        match result {
            Ok(summary) => runs.push(summary),
            Err(err) => eprintln!("Seed {seed} failed: {err:#}"),
        }
    }
    if runs.is_empty() {
        anyhow::bail!("all seeds failed");
    }

    let stats = summary::compute_summary(&runs);
    summary::print_summary(&scenario.name, &stats);

    let seeds_path = run_dir.join("seeds.csv");
    summary::write_seeds_csv(&seeds_path, &runs)?;

    let batch_summary = serde_json::json!({
        "batch_schema_version": 1,
        "batch_id": Uuid::new_v4().to_string(),
        "scenario_name": scenario.name,
        "engine_schema_version": ebus_core::SCHEMA_VERSION,
        "content_version": content.content_version,
        "run_ids": runs.iter().map(|r| r.run_id.as_str()).collect::<Vec<_>>(),
        "stats": stats,
    });
    let batch_path = run_dir.join("batch_summary.json");
    let batch_json =
        serde_json::to_string_pretty(&batch_summary).context("serializing batch summary")?;
    std::fs::write(&batch_path, batch_json)
        .with_context(|| format!("writing {}", batch_path.display()))?;

    println!("Per-seed results written to {}", seeds_path.display());
    println!("Batch summary written to {}", batch_path.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            scenario,
            output_dir,
        } => run(&scenario, &output_dir)?,
    }
    Ok(())
}
