use super::*;

/// Run the whole scenario, answering every nightly decision with `target`.
fn run_week(ctx: &mut SimulationContext, content: &ScenarioContent, target: f64) -> Vec<EventEnvelope> {
    let mut events = Vec::new();
    for _ in 0..10 {
        events.extend(run_until_blocked(ctx, content));
        match ctx.suspension {
            Some(Suspension::AwaitingNightlyDecision { .. }) => {
                let decision = nightly(ctx, target);
                events.extend(advance(ctx, &[decision], content, STEP_HOURS));
            }
            None => return events,
            Some(ref other) => panic!("unexpected suspension {}", other.label()),
        }
    }
    events
}

fn perfect_week_bonuses(score: &ScoreState) -> usize {
    score
        .bonuses
        .iter()
        .filter(|b| b.reason.starts_with("Perfect week"))
        .count()
}

#[test]
fn completed_day_waits_for_nightly_decision() {
    let content = base_content();
    let mut ctx = base_context(&content);
    let events = run_until_blocked(&mut ctx, &content);

    let Some(Suspension::AwaitingNightlyDecision { day, end_percent }) = ctx.suspension else {
        panic!("expected nightly decision");
    };
    assert_eq!(day, 1);
    assert!((end_percent - ctx.bus.battery_percent).abs() < 1e-12);
    assert_eq!(ctx.week.day_results.len(), 1);
    assert_eq!(ctx.score.day_scores.len(), 1);
    assert_eq!(count_events(&events, |e| matches!(e, Event::RouteCompleted { day: 1, .. })), 1);
    assert_eq!(count_events(&events, |e| matches!(e, Event::DayScored { day: 1, .. })), 1);

    let result = &ctx.week.day_results[0];
    assert!(!result.mid_day_charged);
    assert_eq!(result.weather, Weather::Fair);
    let overnight_cost = ctx.week.current_overnight.cost;
    assert!((result.cost - overnight_cost).abs() < 1e-12);
    // Initial 20% → 80% of 120 kWh at the overnight rate.
    assert!((ctx.week.current_overnight.energy_added_kwh - 72.0).abs() < 1e-9);
    assert!((overnight_cost - 72.0 * 0.12).abs() < 1e-9);
}

#[test]
fn day_score_penalises_overcharge() {
    let content = base_content();
    let mut ctx = base_context(&content);
    run_until_blocked(&mut ctx, &content);

    let day_score = &ctx.score.day_scores[0];
    let end_percent = scoring::end_of_day_percent(80.0, ctx.bus.energy_consumed_kwh, 120.0);
    let wasted = (end_percent - 25.0) / 100.0 * 120.0;
    #[allow(clippy::cast_possible_truncation)]
    let expected = 100 + 50 - wasted.round() as i64;
    assert_eq!(day_score.points, expected);
    assert_eq!(day_score.breakdown.len(), 3);
    assert_eq!(ctx.score.total, expected);
}

#[test]
fn efficient_overnight_target_earns_bonus() {
    let content = base_content();
    // 20 mi at 1.2 kWh/mi is 20% of 120 kWh; start at 38% to end near 18%.
    let mut ctx = context_with_initial_charge(&content, 38.0);
    run_until_blocked(&mut ctx, &content);
    assert_eq!(ctx.score.day_scores[0].points, 100 + 50 + 25);
}

#[test]
fn nightly_charge_adds_energy_to_reach_target() {
    let mut content = base_content();
    content.constants.class_a_capacity_kwh = 100.0;
    let mut ctx = base_context(&content);
    run_until_blocked(&mut ctx, &content);

    // Park the bus at 20% and ask for 40%.
    ctx.bus.set_battery_kwh(20.0);
    let decision = nightly(&mut ctx, 40.0);
    let events = advance(&mut ctx, &[decision], &content, STEP_HOURS);

    let applied = events.iter().find_map(|e| match &e.event {
        Event::NightlyChargeApplied {
            energy_added_kwh,
            cost,
            ..
        } => Some((*energy_added_kwh, *cost)),
        _ => None,
    });
    let (energy, cost) = applied.expect("nightly charge applied");
    assert!((energy - 20.0).abs() < 1e-9);
    assert!((cost - 20.0 * content.constants.overnight_rate_per_kwh).abs() < 1e-9);
    assert_eq!(ctx.week.current_day, 2);
    assert!(ctx.suspension.is_none());
    // Day 2 departed this step from exactly 40%.
    assert!(matches!(ctx.bus.status, BusStatus::Moving));
    assert!(ctx.bus.progress > 0.0);
    assert!(ctx.bus.battery_percent < 40.0);
    assert!(ctx.bus.battery_percent > 39.0);
}

#[test]
fn v2g_discharges_before_overnight_charge() {
    let content = base_content();
    let mut ctx = base_context(&content);
    run_until_blocked(&mut ctx, &content);
    let before_kwh = ctx.bus.battery_kwh;

    let decision = command(
        &mut ctx,
        Command::ConfirmNightlyCharge(NightlyChargeDecision {
            target_percent: 50.0,
            new_route_distance_one_way: None,
            v2g_discharge_kwh: Some(30.0),
        }),
    );
    advance(&mut ctx, &[decision], &content, STEP_HOURS);

    assert!((ctx.week.v2g_discharged_kwh_total - 30.0).abs() < 1e-9);
    assert!((ctx.week.v2g_earnings_total - 30.0 * 0.30).abs() < 1e-9);
    let post_kwh = before_kwh - 30.0;
    let expected = (0.5 * 120.0 - post_kwh).max(0.0);
    assert!((ctx.week.current_overnight.energy_added_kwh - expected).abs() < 1e-9);
}

#[test]
fn v2g_is_clamped_to_available_energy() {
    let content = base_content();
    let mut ctx = base_context(&content);
    run_until_blocked(&mut ctx, &content);
    let available = ctx.bus.battery_kwh;

    let decision = command(
        &mut ctx,
        Command::ConfirmNightlyCharge(NightlyChargeDecision {
            target_percent: 60.0,
            new_route_distance_one_way: None,
            v2g_discharge_kwh: Some(10_000.0),
        }),
    );
    advance(&mut ctx, &[decision], &content, STEP_HOURS);
    assert!((ctx.week.v2g_discharged_kwh_total - available).abs() < 1e-9);
    assert!((ctx.week.current_overnight.energy_added_kwh - 72.0).abs() < 1e-9);
}

#[test]
fn target_below_current_level_resets_to_target_for_free() {
    let content = base_content();
    let mut ctx = base_context(&content);
    run_until_blocked(&mut ctx, &content);
    assert!(ctx.bus.battery_percent > 30.0);
    let overnight_before = ctx.week.overnight_cost_total;

    let decision = nightly(&mut ctx, 30.0);
    advance(&mut ctx, &[decision], &content, 0.0);

    assert_eq!(ctx.week.current_day, 2);
    assert!((ctx.bus.battery_percent - 30.0).abs() < 1e-9);
    assert!((ctx.bus.battery_kwh - 0.30 * ctx.bus.battery_capacity_kwh).abs() < 1e-9);
    assert!(ctx.week.current_overnight.energy_added_kwh.abs() < 1e-12);
    assert!(ctx.week.current_overnight.cost.abs() < 1e-12);
    assert!((ctx.week.current_overnight.target_percent - 30.0).abs() < 1e-9);
    assert!((ctx.week.overnight_cost_total - overnight_before).abs() < 1e-12);
}

#[test]
fn fair_week_without_mid_day_charges_earns_perfect_week_once() {
    let content = base_content();
    let mut ctx = base_context(&content);
    let events = run_week(&mut ctx, &content, 80.0);

    let Outcome::Completed { final_score } = ctx.outcome else {
        panic!("expected completed week, got {:?}", ctx.outcome);
    };
    assert_eq!(ctx.week.day_results.len(), 3);
    assert_eq!(ctx.week.total_mid_day_charges, 0);
    assert_eq!(perfect_week_bonuses(&ctx.score), 1);

    let day_total: i64 = ctx.score.day_scores.iter().map(|d| d.points).sum();
    assert_eq!(final_score, day_total + content.constants.perfect_week_bonus);
    assert_eq!(final_score, ctx.score.total);
    assert_eq!(count_events(&events, |e| matches!(e, Event::WeekCompleted { .. })), 1);

    // Scoring the week again does not duplicate the bonus.
    scoring::score_week(&mut ctx, &content.constants);
    assert_eq!(perfect_week_bonuses(&ctx.score), 1);
}

#[test]
fn mid_day_charge_forfeits_perfect_week() {
    let content = base_content();
    let mut ctx = context_with_initial_charge(&content, 30.0);
    run_until_blocked(&mut ctx, &content);
    let school = crate::test_fixtures::school_station(&ctx.route, &content.constants);
    let offer = command(
        &mut ctx,
        Command::OfferStations {
            stations: vec![school.clone()],
        },
    );
    let select = command(
        &mut ctx,
        Command::SelectStation {
            station_id: school.id,
        },
    );
    advance(&mut ctx, &[offer, select], &content, STEP_HOURS);
    run_week(&mut ctx, &content, 80.0);

    assert!(matches!(ctx.outcome, Outcome::Completed { .. }));
    assert_eq!(ctx.week.total_mid_day_charges, 1);
    assert_eq!(perfect_week_bonuses(&ctx.score), 0);
    assert!(ctx.week.day_results[0].mid_day_charged);
    assert!(ctx.week.mid_day_cost_total > 0.0);
    assert!(ctx.week.day_results[0].cost >= ctx.week.mid_day_cost_total);
}

#[test]
fn optimal_guess_earns_perfect_route_bonus() {
    let content = base_content();
    let optimal = scoring::optimal_one_way_miles(BusClass::A, &content.constants);
    let mut setup = base_setup(optimal);
    setup.weather_schedule = vec![Weather::Fair; 3];
    let mut ctx = start_scenario(&content, setup, straight_route(10.0), 42);
    run_week(&mut ctx, &content, 80.0);

    assert!(ctx
        .score
        .bonuses
        .iter()
        .any(|b| b.reason == "Perfect route prediction"
            && b.points == content.constants.perfect_route_bonus));
}

#[test]
fn poor_guess_earns_no_route_bonus() {
    let content = base_content();
    let mut ctx = base_context(&content);
    run_week(&mut ctx, &content, 80.0);
    assert!(!ctx
        .score
        .bonuses
        .iter()
        .any(|b| b.reason == "Perfect route prediction"));
}

#[test]
fn hardest_day_sets_difficulty_bonus() {
    let content = base_content();
    let mut setup = base_setup(10.0);
    setup.weather_schedule = vec![Weather::Fair, Weather::Cold, Weather::Fair];
    let mut ctx = start_scenario(&content, setup, straight_route(10.0), 42);
    run_week(&mut ctx, &content, 80.0);

    let difficulty = ctx
        .score
        .bonuses
        .iter()
        .find(|b| b.reason.starts_with("Difficulty"))
        .expect("difficulty bonus");
    let before = ctx.score.total - difficulty.points;
    #[allow(clippy::cast_possible_truncation)]
    let expected = (before as f64 * 0.25).round() as i64;
    assert_eq!(difficulty.points, expected);
    assert_eq!(ctx.week.day_results[1].weather, Weather::Cold);
}

#[test]
fn route_regeneration_is_requested_once_and_applied() {
    let content = base_content();
    let mut ctx = base_context(&content);
    run_until_blocked(&mut ctx, &content);

    let decision = command(
        &mut ctx,
        Command::ConfirmNightlyCharge(NightlyChargeDecision {
            target_percent: 80.0,
            new_route_distance_one_way: Some(12.0),
            v2g_discharge_kwh: None,
        }),
    );
    let events = advance(&mut ctx, &[decision.clone()], &content, STEP_HOURS);
    assert!(matches!(
        ctx.suspension,
        Some(Suspension::AwaitingRoute { .. })
    ));
    assert!(ctx.route_regeneration_requested);
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::RouteRegenerationRequested { .. })),
        1
    );

    // A repeated confirmation is ignored while the route is pending.
    let events = advance(&mut ctx, &[decision], &content, STEP_HOURS);
    assert!(events.is_empty());
    assert_eq!(ctx.week.current_day, 2);

    let deliver = command(
        &mut ctx,
        Command::DeliverRoute {
            route: straight_route(12.0),
        },
    );
    let events = advance(&mut ctx, &[deliver], &content, STEP_HOURS);
    assert!((ctx.route.one_way_miles - 12.0).abs() < 1e-12);
    assert!(!ctx.route_regeneration_requested);
    assert!(ctx.suspension.is_none());
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::RouteRegenerated { .. })),
        1
    );
    assert!(matches!(ctx.bus.status, BusStatus::Moving));
}

#[test]
fn degenerate_regenerated_route_keeps_previous_route() {
    let content = base_content();
    let mut ctx = base_context(&content);
    run_until_blocked(&mut ctx, &content);
    let previous = ctx.route.id.clone();

    let decision = command(
        &mut ctx,
        Command::ConfirmNightlyCharge(NightlyChargeDecision {
            target_percent: 80.0,
            new_route_distance_one_way: Some(12.0),
            v2g_discharge_kwh: None,
        }),
    );
    advance(&mut ctx, &[decision], &content, STEP_HOURS);

    let mut broken = straight_route(12.0);
    broken.path.clear();
    let deliver = command(&mut ctx, Command::DeliverRoute { route: broken });
    advance(&mut ctx, &[deliver], &content, STEP_HOURS);
    assert_eq!(ctx.route.id, previous);
    assert!(ctx.suspension.is_none());
    assert!(ctx.bus.progress > 0.0);
}

#[test]
fn stranding_mid_week_ends_scenario_with_zero() {
    let content = base_content();
    let mut ctx = base_context(&content);
    run_until_blocked(&mut ctx, &content);
    assert!(ctx.score.total != 0);

    // Day 2 starts nearly empty.
    let decision = nightly(&mut ctx, 0.0);
    ctx.bus.set_battery_kwh(1.0);
    advance(&mut ctx, &[decision], &content, STEP_HOURS);
    run_until_blocked(&mut ctx, &content);

    assert_eq!(ctx.outcome, Outcome::Stranded { day: 2 });
    assert_eq!(ctx.score.total, 0);
    assert_eq!(ctx.week.day_results.len(), 1);
}
