use super::*;
use crate::test_fixtures::{base_content, base_context, base_setup, straight_route};

mod movement;
mod week;

// --- Shared test helpers ------------------------------------------------

/// Simulated hours per step: 0.2 mi at 20 mph, finer than the stop threshold.
const STEP_HOURS: f64 = 0.01;
const MAX_STEPS: usize = 20_000;

fn command(ctx: &mut SimulationContext, command: Command) -> CommandEnvelope {
    let id = CommandId(format!("cmd_{:06}", ctx.counters.next_command_id));
    ctx.counters.next_command_id += 1;
    CommandEnvelope {
        id,
        issued_tick: ctx.meta.tick,
        command,
    }
}

fn nightly(ctx: &mut SimulationContext, target_percent: f64) -> CommandEnvelope {
    command(
        ctx,
        Command::ConfirmNightlyCharge(NightlyChargeDecision {
            target_percent,
            new_route_distance_one_way: None,
            v2g_discharge_kwh: None,
        }),
    )
}

/// Step with no commands until something needs an answer or the scenario ends.
fn run_until_blocked(ctx: &mut SimulationContext, content: &ScenarioContent) -> Vec<EventEnvelope> {
    let mut events = Vec::new();
    for _ in 0..MAX_STEPS {
        if ctx.suspension.is_some() || ctx.outcome != Outcome::InProgress {
            return events;
        }
        events.extend(advance(ctx, &[], content, STEP_HOURS));
    }
    panic!("simulation did not block within {MAX_STEPS} steps");
}

fn context_with_initial_charge(content: &ScenarioContent, percent: f64) -> SimulationContext {
    let mut setup = base_setup(10.0);
    setup.initial_charge_percent = percent;
    start_scenario(content, setup, straight_route(10.0), 42)
}

fn count_events(events: &[EventEnvelope], pred: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| pred(&e.event)).count()
}

fn assert_battery_consistent(bus: &BusState) {
    assert!(bus.battery_kwh >= 0.0, "negative battery: {}", bus.battery_kwh);
    assert!(
        bus.battery_kwh <= bus.battery_capacity_kwh + 1e-9,
        "battery above capacity: {}",
        bus.battery_kwh
    );
    let expected = bus.battery_kwh / bus.battery_capacity_kwh * 100.0;
    assert!(
        (bus.battery_percent - expected).abs() < 1e-9,
        "percent {} != {}",
        bus.battery_percent,
        expected
    );
}
