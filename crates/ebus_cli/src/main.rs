use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ebus_control::{drive, AutopilotController, AutopilotPolicy, DriveEnd, Pace};
use ebus_core::collaborators::RoutingService;
use ebus_core::{
    BusClass, Event, EventEnvelope, MetricsFileWriter, Outcome, ScenarioContent,
    SimulationContext, Weather,
};
use ebus_world::{
    build_scenario, load_content, GridRouteGenerator, OfflineRouter, RouteStationProvider,
    ScenarioOptions, StraightLineRouter, DEFAULT_ANCHOR,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "ebus_cli", about = "Electric school bus week simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a three-day scenario with the autopilot making every decision.
    Run(RunArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassArg {
    A,
    C,
}

impl From<ClassArg> for BusClass {
    fn from(arg: ClassArg) -> Self {
        match arg {
            ClassArg::A => BusClass::A,
            ClassArg::C => BusClass::C,
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Generate the scenario with this seed. Mutually exclusive with --state.
    #[arg(long, conflicts_with = "state_file")]
    seed: Option<u64>,
    /// Resume a saved SimulationContext JSON. Mutually exclusive with --seed.
    #[arg(long = "state", conflicts_with = "seed")]
    state_file: Option<String>,
    #[arg(long, default_value = "./content")]
    content_dir: String,
    #[arg(long, value_enum, default_value = "a")]
    class: ClassArg,
    /// Weather scenario id from weather_scenarios.json.
    #[arg(long, default_value = "cold_snap")]
    weather: String,
    /// One-way route length in miles.
    #[arg(long, default_value_t = 15.0)]
    miles: f64,
    /// Your estimate of the longest safe one-way distance (defaults to --miles).
    #[arg(long)]
    guess: Option<f64>,
    /// Day-1 charge percent (defaults to the autopilot's overnight plan).
    #[arg(long)]
    initial_charge: Option<f64>,
    /// Ask for a route of this one-way length from day 2 on.
    #[arg(long)]
    next_route_miles: Option<f64>,
    /// Never sell surplus charge back to the grid.
    #[arg(long)]
    no_v2g: bool,
    /// Pretend the routing service is down so deadheads use the estimate.
    #[arg(long)]
    offline_routing: bool,
    /// Simulated minutes per step.
    #[arg(long, default_value_t = 3.0)]
    step_minutes: f64,
    /// Step by wall-clock seconds instead, scaled by the day's speed multiplier.
    #[arg(long, conflicts_with = "step_minutes")]
    wall_dt_secs: Option<f64>,
    #[arg(long, default_value_t = 10_000)]
    max_steps: u64,
    #[arg(long, default_value_t = 20)]
    print_every: u64,
    /// Write the final SimulationContext to this file.
    #[arg(long)]
    save_state: Option<String>,
    #[arg(long, default_value = "runs")]
    runs_dir: String,
    /// Disable the per-run directory with run_info.json and day_metrics.csv.
    #[arg(long)]
    no_metrics: bool,
}

// ---------------------------------------------------------------------------
// Run setup
// ---------------------------------------------------------------------------

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn generate_run_id(seed: u64) -> String {
    format!("{}_seed{seed}", chrono::Utc::now().format("%Y%m%d_%H%M%S"))
}

fn create_run_dir(runs_dir: &str, run_id: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(runs_dir).join(run_id);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating run directory: {}", dir.display()))?;
    Ok(dir)
}

fn write_run_info(
    dir: &Path,
    run_id: &str,
    ctx: &SimulationContext,
    content_version: &str,
    args: &RunArgs,
) -> Result<()> {
    let info = serde_json::json!({
        "run_id": run_id,
        "seed": ctx.meta.seed,
        "schema_version": ctx.meta.schema_version,
        "content_version": content_version,
        "runner": "ebus_cli",
        "scenario": {
            "bus_class": ctx.setup.bus_class,
            "weather_scenario": ctx.setup.weather_scenario,
            "weather_schedule": ctx.setup.weather_schedule,
            "one_way_miles": ctx.route.one_way_miles,
            "one_way_guess_miles": ctx.setup.one_way_guess_miles,
            "initial_charge_percent": ctx.setup.initial_charge_percent,
        },
        "args": {
            "step_minutes": args.step_minutes,
            "wall_dt_secs": args.wall_dt_secs,
            "next_route_miles": args.next_route_miles,
            "no_v2g": args.no_v2g,
            "offline_routing": args.offline_routing,
            "resumed_from": args.state_file,
        }
    });
    let path = dir.join("run_info.json");
    let file =
        std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, &info)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Day-1 charge: the flag if given, else the autopilot's plan for day 1.
fn resolve_initial_charge(
    args: &RunArgs,
    content: &ScenarioContent,
    policy: &AutopilotPolicy,
) -> f64 {
    if let Some(percent) = args.initial_charge {
        return percent;
    }
    let first_day = content
        .weather_scenario(&args.weather)
        .and_then(|s| s.days.first().copied())
        .unwrap_or(Weather::Fair);
    ebus_control::planned_target_percent(
        2.0 * args.miles,
        args.class.into(),
        first_day,
        &content.constants,
        policy.reserve_percent,
    )
}

fn load_or_build(
    args: &RunArgs,
    content: &ScenarioContent,
    policy: &AutopilotPolicy,
) -> Result<(SimulationContext, ChaCha8Rng)> {
    if let Some(path) = &args.state_file {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading state file: {path}"))?;
        let loaded: SimulationContext =
            serde_json::from_str(&json).with_context(|| format!("parsing state file: {path}"))?;
        if loaded.meta.schema_version != ebus_core::SCHEMA_VERSION {
            bail!(
                "state file schema {} does not match engine schema {}",
                loaded.meta.schema_version,
                ebus_core::SCHEMA_VERSION
            );
        }
        let rng = ChaCha8Rng::seed_from_u64(loaded.meta.seed);
        return Ok((loaded, rng));
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let options = ScenarioOptions {
        bus_class: args.class.into(),
        weather_scenario: args.weather.clone(),
        one_way_miles: args.miles,
        one_way_guess_miles: args.guess.unwrap_or(args.miles),
        initial_charge_percent: resolve_initial_charge(args, content, policy),
        anchor: DEFAULT_ANCHOR,
    };
    let ctx = build_scenario(content, &options, &GridRouteGenerator::default(), seed, &mut rng)?;
    Ok((ctx, rng))
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

fn run(args: &RunArgs) -> Result<()> {
    let content = load_content(&args.content_dir)?;
    let policy = AutopilotPolicy {
        use_v2g: !args.no_v2g,
        next_route_miles: args.next_route_miles,
        ..AutopilotPolicy::default()
    };
    let (mut ctx, rng) = load_or_build(args, &content, &policy)?;

    let mut metrics_writer: Option<MetricsFileWriter> = None;
    if !args.no_metrics {
        let run_id = generate_run_id(ctx.meta.seed);
        let run_dir = create_run_dir(&args.runs_dir, &run_id)?;
        write_run_info(&run_dir, &run_id, &ctx, &content.content_version, args)?;
        let writer = MetricsFileWriter::new(&run_dir)
            .with_context(|| format!("opening metrics CSV in {}", run_dir.display()))?;
        metrics_writer = Some(writer);
        println!("Run directory: {}", run_dir.display());
    }

    let routing: Box<dyn RoutingService> = if args.offline_routing {
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
    .with_policy(policy);

    let pace = match args.wall_dt_secs {
        Some(secs) => Pace::WallSeconds(secs),
        None => Pace::SimHours(args.step_minutes / 60.0),
    };

    println!(
        "Starting week: seed={} class={:?} weather={} route={:.1} mi one-way initial={:.0}% content_version={}",
        ctx.meta.seed,
        ctx.bus.class,
        ctx.setup.weather_scenario,
        ctx.route.one_way_miles,
        ctx.bus.battery_percent,
        content.content_version,
    );
    println!("{}", "-".repeat(80));

    let print_every = args.print_every.max(1);
    let mut write_error: Option<std::io::Error> = None;
    let summary = drive(
        &mut ctx,
        &content,
        &mut autopilot,
        pace,
        args.max_steps,
        |ctx, events| {
            for envelope in events {
                if let Some(line) = describe_event(envelope) {
                    println!("{line}");
                }
                if matches!(envelope.event, Event::DayScored { .. }) {
                    if let (Some(writer), Some(metrics)) =
                        (metrics_writer.as_mut(), ebus_core::compute_day_metrics(ctx))
                    {
                        if let Err(err) = writer.write_row(&metrics) {
                            write_error.get_or_insert(err);
                        }
                    }
                }
            }
            if ctx.meta.tick % print_every == 0 {
                print_status(ctx);
            }
        },
    );
    if let Some(err) = write_error {
        return Err(err).context("writing day metrics row");
    }

    println!("{}", "-".repeat(80));
    match summary.end {
        DriveEnd::Finished => {}
        DriveEnd::StepLimit => println!(
            "Stopped after {} steps with the week unfinished.",
            summary.steps
        ),
        DriveEnd::Stuck => println!("Stopped: the autopilot had no answer for the engine."),
    }
    print_summary(&ctx);

    if let Some(ref mut writer) = metrics_writer {
        writer.flush().context("final metrics flush")?;
    }
    if let Some(path) = &args.save_state {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating state file: {path}"))?;
        serde_json::to_writer_pretty(file, &ctx)
            .with_context(|| format!("writing state file: {path}"))?;
        println!("State saved to {path}");
    }
    Ok(())
}

/// One-line description of the events worth showing; `None` for routine ones.
fn describe_event(envelope: &EventEnvelope) -> Option<String> {
    let line = match &envelope.event {
        Event::DayStarted {
            day,
            weather,
            battery_percent,
            route_miles,
        } => format!(
            "=== Day {day} ({weather:?}) battery {battery_percent:.1}% route {route_miles:.1} mi ==="
        ),
        Event::ChargingRequired {
            energy_to_add_kwh,
            predicted_percent,
        } => format!(
            "  school: return trip would end at {predicted_percent:.1}%, need {energy_to_add_kwh:.1} kWh"
        ),
        Event::StationSelected { station_id, .. } => format!("  charging at {station_id}"),
        Event::DeadheadStarted {
            station_id,
            distance_miles,
            fallback,
        } => format!(
            "  deadhead to {station_id}: {distance_miles:.1} mi{}",
            if *fallback { " (estimated)" } else { "" }
        ),
        Event::ChargingFinished {
            energy_added_kwh,
            hours,
            under_charged,
            ..
        } => format!(
            "  charged {energy_added_kwh:.1} kWh in {hours:.2} h{}",
            if *under_charged { " (window ran out)" } else { "" }
        ),
        Event::ReturnedToRoute { .. } => "  back on route".to_string(),
        Event::BusStranded { day, progress } => {
            format!("*** STRANDED on day {day} at {:.0}% of the route ***", progress * 100.0)
        }
        Event::PenaltyApplied { reason, points } => format!("  {reason}: {points}"),
        Event::DayScored { day, points } => format!("  day {day} scored {points:+}"),
        Event::NightlyChargeApplied {
            energy_added_kwh,
            cost,
            v2g_discharged_kwh,
            v2g_credit,
            ..
        } => format!(
            "  overnight: +{energy_added_kwh:.1} kWh (${cost:.2}), V2G {v2g_discharged_kwh:.1} kWh (+${v2g_credit:.2})"
        ),
        Event::RouteRegenerated {
            route_id,
            one_way_miles,
        } => format!("  new route {route_id}: {one_way_miles:.1} mi one-way"),
        Event::WeekCompleted { final_score } => format!("*** WEEK COMPLETE: {final_score} ***"),
        _ => return None,
    };
    Some(line)
}

fn print_status(ctx: &SimulationContext) {
    let snap = ebus_core::bus_snapshot(ctx);
    println!(
        "[tick={:05}  day={}  {}  {:?}]  {:<22} progress={:5.1}%  battery={:5.1}% ({:.1} kWh)",
        snap.tick,
        snap.day,
        snap.clock,
        snap.phase,
        snap.status,
        snap.progress * 100.0,
        snap.battery_percent,
        snap.battery_kwh,
    );
}

fn print_summary(ctx: &SimulationContext) {
    match &ctx.outcome {
        Outcome::Completed { final_score } => println!("Week completed. Final score: {final_score}"),
        Outcome::Stranded { day } => println!("Bus stranded on day {day}. Final score: 0"),
        Outcome::InProgress => println!(
            "Week in progress (day {}). Score so far: {}",
            ctx.week.current_day, ctx.score.total
        ),
    }
    for day in &ctx.score.day_scores {
        println!("  Day {}: {:+}", day.day, day.points);
        for line in &day.breakdown {
            println!("    {line}");
        }
    }
    for record in ctx.score.bonuses.iter().chain(&ctx.score.penalties) {
        println!("  {}: {:+}", record.reason, record.points);
    }

    let week = &ctx.week;
    let distance: f64 = week.day_results.iter().map(|d| d.distance_miles).sum();
    let energy: f64 = week.day_results.iter().map(|d| d.energy_consumed_kwh).sum();
    let co2: f64 = week.day_results.iter().map(|d| d.co2_avoided_kg).sum();
    println!(
        "Distance {distance:.1} mi, energy {energy:.1} kWh, CO2 avoided {co2:.1} kg, mid-day charges {}",
        week.total_mid_day_charges
    );
    println!(
        "Costs: overnight ${:.2}, mid-day ${:.2}, V2G earnings ${:.2}",
        week.overnight_cost_total, week.mid_day_cost_total, week.v2g_earnings_total
    );
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(&args)?,
    }
    Ok(())
}
