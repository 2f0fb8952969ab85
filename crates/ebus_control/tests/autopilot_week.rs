//! Full-week runs with the autopilot answering every suspension.
//!
//! These drive the engine through `drive` with the offline collaborators from
//! `ebus_world` and check end-to-end outcomes: scoring, charging detours,
//! determinism, and how the loop stops.

use ebus_control::{
    drive, AutopilotController, AutopilotPolicy, CommandSource, DriveEnd, DriveSummary, Pace,
};
use ebus_core::collaborators::RoutingService;
use ebus_core::test_fixtures::{base_content, base_setup, straight_route};
use ebus_core::*;
use ebus_world::{
    GridRouteGenerator, OfflineRouter, RouteStationProvider, ScenarioOptions, StraightLineRouter,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const STEP: Pace = Pace::SimHours(0.05);
const MAX_STEPS: u64 = 20_000;

fn autopilot(routing: Box<dyn RoutingService>, seed: u64) -> AutopilotController {
    AutopilotController::new(
        Box::new(GridRouteGenerator::default()),
        routing,
        Box::new(RouteStationProvider),
        Box::new(ChaCha8Rng::seed_from_u64(seed)),
    )
}

/// Fixture route (10 mi one-way, due north) on a fair week.
fn fixture_context(content: &ScenarioContent, initial_percent: f64) -> SimulationContext {
    let setup = ScenarioSetup {
        initial_charge_percent: initial_percent,
        ..base_setup(10.0)
    };
    start_scenario(content, setup, straight_route(10.0), 42)
}

fn run_collecting(
    ctx: &mut SimulationContext,
    content: &ScenarioContent,
    source: &mut impl CommandSource,
    pace: Pace,
) -> (DriveSummary, Vec<EventEnvelope>) {
    let mut all = Vec::new();
    let summary = drive(ctx, content, source, pace, MAX_STEPS, |ctx, events| {
        assert!(ctx.bus.battery_kwh >= 0.0);
        assert!(ctx.bus.battery_kwh <= ctx.bus.battery_capacity_kwh + 1e-9);
        let expected = ctx.bus.battery_kwh / ctx.bus.battery_capacity_kwh * 100.0;
        assert!((ctx.bus.battery_percent - expected).abs() < 1e-9);
        all.extend_from_slice(events);
    });
    (summary, all)
}

fn count(events: &[EventEnvelope], pred: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| pred(&e.event)).count()
}

#[test]
fn well_planned_fair_week_scores_every_bonus_but_route() {
    let content = base_content();
    let mut ctx = fixture_context(&content, 40.0);
    let mut ap = autopilot(Box::new(StraightLineRouter::new(1.3)), 1);

    let (summary, events) = run_collecting(&mut ctx, &content, &mut ap, STEP);

    assert_eq!(summary.end, DriveEnd::Finished);
    // 3 × (100 completion + 50 no charge + 25 efficient) + 150 perfect week
    assert_eq!(ctx.outcome, Outcome::Completed { final_score: 675 });
    assert_eq!(ctx.week.total_mid_day_charges, 0);
    assert_eq!(count(&events, |e| matches!(e, Event::DayScored { .. })), 3);
    assert_eq!(count(&events, |e| matches!(e, Event::WeekCompleted { .. })), 1);
    assert!(ctx
        .score
        .bonuses
        .iter()
        .all(|b| b.reason != "Perfect route prediction"));
}

#[test]
fn low_start_charges_at_school_and_finishes() {
    let content = base_content();
    let mut ctx = fixture_context(&content, 30.0);
    let mut ap = autopilot(Box::new(StraightLineRouter::new(1.3)), 2);

    let (summary, events) = run_collecting(&mut ctx, &content, &mut ap, STEP);

    assert_eq!(summary.end, DriveEnd::Finished);
    assert!(matches!(ctx.outcome, Outcome::Completed { .. }));
    assert!(ctx.week.total_mid_day_charges >= 1);
    assert!(ctx.week.day_results[0].mid_day_charged);
    assert_eq!(
        count(&events, |e| matches!(e, Event::DeadheadStarted { .. })),
        0,
        "school charger needs no detour"
    );
    assert!(ctx
        .score
        .bonuses
        .iter()
        .all(|b| !b.reason.starts_with("Perfect week")));
}

#[test]
fn routing_outage_falls_back_to_estimated_detour() {
    let mut content = base_content();
    content.constants.school_has_charger = false;
    let mut ctx = fixture_context(&content, 30.0);
    let mut ap = autopilot(Box::new(OfflineRouter), 3);

    let (summary, events) = run_collecting(&mut ctx, &content, &mut ap, STEP);

    assert_eq!(summary.end, DriveEnd::Finished);
    assert!(matches!(ctx.outcome, Outcome::Completed { .. }));
    let fallbacks = count(&events, |e| {
        matches!(e, Event::DeadheadStarted { fallback: true, .. })
    });
    assert!(fallbacks >= 1);
    assert_eq!(
        count(&events, |e| matches!(e, Event::ReturnedToRoute { .. })),
        fallbacks
    );
    assert!(ctx
        .score
        .penalties
        .iter()
        .any(|p| p.reason.starts_with("Deadhead to") && p.points < 0));
}

#[test]
fn same_seed_same_week() {
    let content = base_content();
    let options = ScenarioOptions {
        bus_class: BusClass::A,
        weather_scenario: "cold_snap".to_string(),
        one_way_miles: 14.0,
        one_way_guess_miles: 20.0,
        initial_charge_percent: 45.0,
        anchor: ebus_world::DEFAULT_ANCHOR,
    };
    let run = || {
        let mut rng = ChaCha8Rng::seed_from_u64(77);
        let mut ctx = ebus_world::build_scenario(
            &content,
            &options,
            &GridRouteGenerator::default(),
            77,
            &mut rng,
        )
        .unwrap();
        let mut ap = AutopilotController::new(
            Box::new(GridRouteGenerator::default()),
            Box::new(StraightLineRouter::new(1.3)),
            Box::new(RouteStationProvider),
            Box::new(rng),
        );
        drive(&mut ctx, &content, &mut ap, STEP, MAX_STEPS, |_, _| {});
        serde_json::to_string(&ctx).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn requested_route_arrives_before_day_two() {
    let content = base_content();
    let mut ctx = fixture_context(&content, 40.0);
    let mut ap = autopilot(Box::new(StraightLineRouter::new(1.3)), 4).with_policy(
        AutopilotPolicy {
            next_route_miles: Some(14.0),
            ..AutopilotPolicy::default()
        },
    );
    let first_route = ctx.route.id.clone();

    let (summary, events) = run_collecting(&mut ctx, &content, &mut ap, STEP);

    assert_eq!(summary.end, DriveEnd::Finished);
    assert_eq!(
        count(&events, |e| matches!(e, Event::RouteRegenerated { .. })),
        1
    );
    assert_ne!(ctx.route.id, first_route);
    assert!((ctx.route.one_way_miles - 14.0).abs() < 1e-9);
    assert!(matches!(ctx.outcome, Outcome::Completed { .. }));
}

#[test]
fn wall_clock_pace_finishes_the_week() {
    let content = base_content();
    let mut ctx = fixture_context(&content, 40.0);
    let mut ap = autopilot(Box::new(StraightLineRouter::new(1.3)), 5);

    let (summary, _) = run_collecting(&mut ctx, &content, &mut ap, Pace::WallSeconds(1.0));

    assert_eq!(summary.end, DriveEnd::Finished);
    assert!(matches!(ctx.outcome, Outcome::Completed { .. }));
}

#[test]
fn three_minute_steps_serve_every_stop_on_generated_routes() {
    let content = base_content();
    let generator = GridRouteGenerator::default();
    for seed in 1..=5 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let options = ScenarioOptions {
            bus_class: BusClass::A,
            weather_scenario: "fair_week".to_string(),
            one_way_miles: 13.7,
            one_way_guess_miles: 13.7,
            initial_charge_percent: 90.0,
            anchor: ebus_world::DEFAULT_ANCHOR,
        };
        let mut ctx =
            ebus_world::build_scenario(&content, &options, &generator, seed, &mut rng).unwrap();
        let mut ap = autopilot(Box::new(StraightLineRouter::new(1.3)), seed);

        let (summary, events) =
            run_collecting(&mut ctx, &content, &mut ap, Pace::SimHours(0.05));

        assert_eq!(summary.end, DriveEnd::Finished, "seed {seed}");
        let pickups = u32::try_from(generator.pickups).unwrap();
        for day in &ctx.week.day_results {
            assert_eq!(day.pickups_completed, pickups, "seed {seed} day {}", day.day);
        }
        let dropoffs = count(&events, |e| {
            matches!(e, Event::StopArrived { kind: StopKind::Dropoff, .. })
        });
        assert_eq!(dropoffs, 3 * generator.pickups, "seed {seed}");
    }
}

struct Silent;

impl CommandSource for Silent {
    fn generate_commands(
        &mut self,
        _ctx: &SimulationContext,
        _content: &ScenarioContent,
        _next_command_id: &mut u64,
    ) -> Vec<CommandEnvelope> {
        Vec::new()
    }
}

#[test]
fn silent_source_stops_at_first_suspension() {
    let content = base_content();
    let mut ctx = fixture_context(&content, 30.0);

    let summary = drive(&mut ctx, &content, &mut Silent, STEP, MAX_STEPS, |_, _| {});

    assert_eq!(summary.end, DriveEnd::Stuck);
    assert!(matches!(
        ctx.suspension,
        Some(Suspension::AwaitingStationList { .. })
    ));
}

#[test]
fn step_limit_leaves_week_in_progress() {
    let content = base_content();
    let mut ctx = fixture_context(&content, 40.0);
    let mut ap = autopilot(Box::new(StraightLineRouter::new(1.3)), 6);

    let summary = drive(&mut ctx, &content, &mut ap, STEP, 5, |_, _| {});

    assert_eq!(summary.end, DriveEnd::StepLimit);
    assert_eq!(summary.steps, 5);
    assert_eq!(ctx.outcome, Outcome::InProgress);
    assert_eq!(ctx.meta.tick, 5);
}
