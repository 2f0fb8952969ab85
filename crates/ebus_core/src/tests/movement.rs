use super::*;

#[test]
fn first_step_departs_and_emits_day_started() {
    let content = base_content();
    let mut ctx = base_context(&content);
    assert!(matches!(ctx.bus.status, BusStatus::Waiting));

    let events = advance(&mut ctx, &[], &content, STEP_HOURS);
    assert!(matches!(ctx.bus.status, BusStatus::Moving));
    assert!(ctx.route.stops[0].completed);
    assert_eq!(ctx.bus.current_stop_index, 1);
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::DayStarted { day: 1, .. })),
        1
    );
    assert!(ctx.bus.progress > 0.0);
}

#[test]
fn reset_yields_exact_target_charge() {
    let content = base_content();
    let mut ctx = base_context(&content);
    run_until_blocked(&mut ctx, &content);

    bus::reset_for_day(&mut ctx.bus, &mut ctx.route, 65.0);
    assert!((ctx.bus.battery_percent - 65.0).abs() < 1e-9);
    assert!((ctx.bus.battery_kwh - 0.65 * ctx.bus.battery_capacity_kwh).abs() < 1e-9);
    assert!(ctx.bus.progress.abs() < 1e-12);
    assert!(ctx.route.stops.iter().all(|s| !s.completed));
    assert!(!ctx.bus.mid_day.checked);
}

#[test]
fn battery_stays_bounded_and_consistent_every_step() {
    let content = base_content();
    let mut ctx = base_context(&content);
    for _ in 0..MAX_STEPS {
        if ctx.suspension.is_some() || ctx.outcome != Outcome::InProgress {
            break;
        }
        advance(&mut ctx, &[], &content, STEP_HOURS);
        assert_battery_consistent(&ctx.bus);
    }
    assert!(matches!(ctx.bus.status, BusStatus::Completed));
}

#[test]
fn progress_is_monotonic_within_a_day() {
    let content = base_content();
    let mut ctx = base_context(&content);
    let mut last = 0.0;
    while ctx.suspension.is_none() && ctx.outcome == Outcome::InProgress {
        advance(&mut ctx, &[], &content, STEP_HOURS);
        assert!(ctx.bus.progress >= last);
        last = ctx.bus.progress;
    }
}

#[test]
fn energy_matches_distance_times_efficiency() {
    let content = base_content();
    let mut ctx = base_context(&content);
    run_until_blocked(&mut ctx, &content);

    let stats = &ctx.bus.stats;
    let expected = stats.route_miles * content.constants.efficiency_fair_kwh_per_mile;
    assert!((ctx.bus.energy_consumed_kwh - expected).abs() < 1e-6);
    assert!((stats.route_energy_kwh - expected).abs() < 1e-6);
    assert!(stats.deadhead_miles.abs() < 1e-12);
    assert!(stats.route_miles > 0.99 * ctx.route.distance_miles - 1e-6);
}

#[test]
fn all_stops_served_with_dwells() {
    let content = base_content();
    let mut ctx = base_context(&content);
    let events = run_until_blocked(&mut ctx, &content);

    assert_eq!(ctx.bus.stats.pickups_completed, 3);
    assert_eq!(ctx.bus.stats.dropoffs_completed, 3);
    assert!(ctx.route.stops.iter().all(|s| s.completed));
    let expected_co2 = 6.0 * 2.0 / 10.0 * 10.21;
    assert!((ctx.bus.stats.co2_avoided_kg - expected_co2).abs() < 1e-9);
    let arrivals = count_events(&events, |e| matches!(e, Event::StopArrived { .. }));
    assert!(arrivals >= 7, "expected pickups, school and dropoffs, got {arrivals}");
}

#[test]
fn stops_sit_in_order_along_out_and_back_path() {
    let route = straight_route(10.0);
    let along = bus::stop_progress(&route);
    let expected = [0.0, 0.125, 0.25, 0.375, 0.5, 0.625, 0.75, 0.875, 1.0];
    assert_eq!(along.len(), expected.len());
    for (got, want) in along.iter().zip(expected) {
        assert!((got - want).abs() < 1e-6, "got {along:?}");
    }
}

#[test]
fn mile_long_steps_still_serve_every_stop() {
    let content = base_content();
    let mut ctx = base_context(&content);
    // 3 simulated minutes: one mile per step, stops at 2.5 / 5 / 7.5 mi.
    let mut events = Vec::new();
    for _ in 0..MAX_STEPS {
        if ctx.suspension.is_some() || ctx.outcome != Outcome::InProgress {
            break;
        }
        events.extend(advance(&mut ctx, &[], &content, 0.05));
    }

    assert!(matches!(ctx.bus.status, BusStatus::Completed));
    assert_eq!(ctx.bus.stats.pickups_completed, 3);
    assert_eq!(ctx.bus.stats.dropoffs_completed, 3);
    let arrived = |kind: StopKind| {
        count_events(&events, |e| {
            matches!(e, Event::StopArrived { kind: k, .. } if *k == kind)
        })
    };
    assert_eq!(arrived(StopKind::Pickup), 3);
    assert_eq!(arrived(StopKind::School), 1);
    assert_eq!(arrived(StopKind::Dropoff), 3);
}

#[test]
fn dwell_pauses_then_resumes_via_schedule() {
    let content = base_content();
    let mut ctx = base_context(&content);
    for _ in 0..MAX_STEPS {
        advance(&mut ctx, &[], &content, STEP_HOURS);
        if matches!(ctx.bus.status, BusStatus::Dwelling { .. }) {
            break;
        }
    }
    let BusStatus::Dwelling { resume_at_hours } = ctx.bus.status else {
        panic!("bus never dwelled");
    };
    let parked = ctx.bus.progress;
    assert_eq!(ctx.schedule.len(), 1);

    // Still dwelling before the resume time.
    advance(&mut ctx, &[], &content, STEP_HOURS);
    assert!((ctx.bus.progress - parked).abs() < 1e-12);

    while ctx.clock.elapsed_hours < resume_at_hours {
        advance(&mut ctx, &[], &content, STEP_HOURS);
    }
    assert!(ctx.bus.progress > parked);
    assert!(ctx.schedule.is_empty());
}

#[test]
fn empty_battery_while_moving_strands_without_moving() {
    let content = base_content();
    let mut ctx = base_context(&content);
    advance(&mut ctx, &[], &content, STEP_HOURS);
    assert!(matches!(ctx.bus.status, BusStatus::Moving));

    ctx.bus.set_battery_kwh(0.0);
    let position = ctx.bus.position;
    let progress = ctx.bus.progress;
    let events = advance(&mut ctx, &[], &content, STEP_HOURS);

    assert!(matches!(ctx.bus.status, BusStatus::Stranded));
    assert_eq!(ctx.bus.position, position);
    assert!((ctx.bus.progress - progress).abs() < 1e-12);
    assert_eq!(ctx.outcome, Outcome::Stranded { day: 1 });
    assert_eq!(ctx.score.total, 0);
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::BusStranded { .. })),
        1
    );
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::ScenarioFailed { day: 1 })),
        1
    );
}

#[test]
fn draining_the_battery_strands_and_clamps_at_zero() {
    let content = base_content();
    // 5% of 120 kWh covers 5 of the 20 miles.
    let mut ctx = context_with_initial_charge(&content, 5.0);
    run_until_blocked(&mut ctx, &content);

    assert!(matches!(ctx.bus.status, BusStatus::Stranded));
    assert!(ctx.bus.battery_kwh.abs() < 1e-12);
    assert!(ctx.bus.progress < 0.5);
    assert_eq!(ctx.outcome, Outcome::Stranded { day: 1 });
}

#[test]
fn stranded_scenario_ignores_further_steps() {
    let content = base_content();
    let mut ctx = context_with_initial_charge(&content, 5.0);
    run_until_blocked(&mut ctx, &content);
    let position = ctx.bus.position;

    let events = advance(&mut ctx, &[], &content, 1.0);
    assert!(events.is_empty());
    assert_eq!(ctx.bus.position, position);
    assert!(matches!(ctx.bus.status, BusStatus::Stranded));
}

#[test]
fn degenerate_route_holds_the_bus() {
    let content = base_content();
    let mut route = straight_route(10.0);
    route.path.truncate(1);
    let mut ctx = start_scenario(&content, base_setup(10.0), route, 42);
    let battery = ctx.bus.battery_kwh;

    for _ in 0..10 {
        advance(&mut ctx, &[], &content, STEP_HOURS);
    }
    assert!(matches!(ctx.bus.status, BusStatus::Waiting));
    assert!(ctx.bus.progress.abs() < 1e-12);
    assert!((ctx.bus.battery_kwh - battery).abs() < 1e-12);
    assert_eq!(ctx.outcome, Outcome::InProgress);
}

#[test]
fn wall_clock_tick_uses_speed_multiplier() {
    let content = base_content();
    let mut ctx = base_context(&content);
    let multiplier = ctx.clock.speed_multiplier;
    assert!(multiplier > 0.0);

    tick(&mut ctx, &[], &content, 1.0);
    let expected = content.constants.bus_speed_mph * multiplier / ctx.route.distance_miles;
    assert!((ctx.bus.progress - expected).abs() < 1e-9);
    assert_eq!(ctx.meta.tick, 1);
}

#[test]
fn clock_tracks_am_leg() {
    let content = base_content();
    let mut ctx = base_context(&content);
    advance(&mut ctx, &[], &content, STEP_HOURS);
    let expected = clock::clock_hour(ctx.bus.progress, 0.0, false, &content.constants);
    assert!((ctx.clock.clock_hour - expected).abs() < 1e-9);
    assert_eq!(ctx.clock.phase, TripPhase::Am);
}

#[test]
fn context_round_trips_through_json() {
    let content = base_content();
    let mut ctx = base_context(&content);
    for _ in 0..50 {
        advance(&mut ctx, &[], &content, STEP_HOURS);
    }
    let json = serde_json::to_string(&ctx).unwrap();
    let mut restored: SimulationContext = serde_json::from_str(&json).unwrap();

    advance(&mut ctx, &[], &content, STEP_HOURS);
    advance(&mut restored, &[], &content, STEP_HOURS);
    assert!((ctx.bus.progress - restored.bus.progress).abs() < 1e-12);
    assert!((ctx.bus.battery_kwh - restored.bus.battery_kwh).abs() < 1e-12);
}
