//! Day and week scoring.
//!
//! Day points go into `day_scores`; one-off adjustments (deadhead penalties,
//! week bonuses) are kept as separate records. Everything lands in `total`.

use crate::energy::efficiency;
use crate::{BusClass, Constants, DayScore, ScoreRecord, ScoreState, SimulationContext, Weather};

const PERFECT_ROUTE_REASON: &str = "Perfect route prediction";
const PERFECT_WEEK_REASON: &str = "Perfect week (no mid-day charges)";

/// End-of-day battery as measured against the overnight target, ignoring
/// mid-day top-ups. Used only for the charging-efficiency grade.
pub fn end_of_day_percent(target_percent: f64, energy_consumed_kwh: f64, capacity_kwh: f64) -> f64 {
    if capacity_kwh <= 0.0 {
        return target_percent;
    }
    target_percent - energy_consumed_kwh / capacity_kwh * 100.0
}

/// Longest one-way distance the class can run on worst-case weather while
/// keeping the safety buffer untouched.
pub fn optimal_one_way_miles(class: BusClass, constants: &Constants) -> f64 {
    let capacity = crate::energy::battery_capacity_kwh(class, constants);
    let usable = capacity * (1.0 - constants.safety_buffer_percent / 100.0);
    let worst = efficiency(class, Weather::Extreme, constants);
    if worst <= 0.0 {
        return 0.0;
    }
    usable / (2.0 * worst)
}

pub fn difficulty_multiplier(schedule: &[Weather], constants: &Constants) -> f64 {
    match schedule.iter().max() {
        Some(Weather::Extreme) => constants.difficulty_multiplier_extreme,
        Some(Weather::Cold) => constants.difficulty_multiplier_cold,
        Some(Weather::Fair) | None => constants.difficulty_multiplier_fair,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn round_points(value: f64) -> i64 {
    value.round() as i64
}

/// Score the day that just completed. Does not touch `ctx.score`.
pub fn score_day(ctx: &SimulationContext, constants: &Constants) -> DayScore {
    let mut points = constants.base_completion_points;
    let mut breakdown = vec![format!(
        "Route completed: +{}",
        constants.base_completion_points
    )];

    if ctx.bus.mid_day.charged {
        points -= constants.mid_day_charge_penalty;
        breakdown.push(format!(
            "Mid-day charge: -{}",
            constants.mid_day_charge_penalty
        ));
    } else {
        points += constants.no_mid_day_charge_bonus;
        breakdown.push(format!(
            "No mid-day charge: +{}",
            constants.no_mid_day_charge_bonus
        ));
    }

    let capacity = ctx.bus.battery_capacity_kwh;
    let end_percent = end_of_day_percent(
        ctx.week.current_overnight.target_percent,
        ctx.bus.energy_consumed_kwh,
        capacity,
    );
    if (constants.efficient_end_percent_min..=constants.efficient_end_percent_max)
        .contains(&end_percent)
    {
        points += constants.efficient_charging_bonus;
        breakdown.push(format!(
            "Efficient overnight charge ({end_percent:.1}% left): +{}",
            constants.efficient_charging_bonus
        ));
    } else if end_percent > constants.efficient_end_percent_max {
        let wasted_kwh = (end_percent - constants.efficient_end_percent_max) / 100.0 * capacity;
        let penalty = round_points(constants.overcharge_penalty_per_kwh * wasted_kwh);
        points -= penalty;
        breakdown.push(format!(
            "Overcharged by {wasted_kwh:.1} kWh ({end_percent:.1}% left): -{penalty}"
        ));
    }

    DayScore {
        day: ctx.week.current_day,
        points,
        breakdown,
    }
}

pub fn record_day(score: &mut ScoreState, day_score: DayScore) {
    score.total += day_score.points;
    score.day_scores.push(day_score);
}

/// Record a negative adjustment. `points` is expected to be ≤ 0.
pub fn apply_penalty(score: &mut ScoreState, reason: String, points: i64, day: Option<u32>) {
    score.total += points;
    score.penalties.push(ScoreRecord {
        reason,
        points,
        day,
    });
}

fn apply_bonus(score: &mut ScoreState, reason: String, points: i64) {
    score.total += points;
    score.bonuses.push(ScoreRecord {
        reason,
        points,
        day: None,
    });
}

/// Add the week-level bonuses and return the final total. Calling it twice
/// does not award the fixed bonuses twice.
pub fn score_week(ctx: &mut SimulationContext, constants: &Constants) -> i64 {
    let already = |score: &ScoreState, reason: &str| score.bonuses.iter().any(|b| b.reason == reason);

    let optimal = optimal_one_way_miles(ctx.bus.class, constants);
    let guess = ctx.setup.one_way_guess_miles;
    if (guess - optimal).abs() <= constants.route_guess_tolerance_miles
        && !already(&ctx.score, PERFECT_ROUTE_REASON)
    {
        apply_bonus(
            &mut ctx.score,
            PERFECT_ROUTE_REASON.to_string(),
            constants.perfect_route_bonus,
        );
    }

    if ctx.week.total_mid_day_charges == 0 && !already(&ctx.score, PERFECT_WEEK_REASON) {
        apply_bonus(
            &mut ctx.score,
            PERFECT_WEEK_REASON.to_string(),
            constants.perfect_week_bonus,
        );
    }

    let multiplier = difficulty_multiplier(&ctx.week.weather_schedule, constants);
    let reason = format!("Difficulty bonus (x{multiplier:.2})");
    if ctx.score.total > 0 && multiplier > 1.0 && !already(&ctx.score, &reason) {
        let bonus = round_points(ctx.score.total as f64 * (multiplier - 1.0));
        apply_bonus(&mut ctx.score, reason, bonus);
    }

    ctx.score.total
}
