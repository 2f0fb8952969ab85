//! Progress → simulated hour-of-day, and the advisory trip phase.

use crate::bus::SCHOOL_PROGRESS;
use crate::{BusStatus, Constants, SimulationContext, TripPhase};

/// Simulated hour for the given progress.
///
/// AM leg interpolates route start → school arrival, the school layover reads
/// `school_arrival + min(layover, midday window)`, and the PM leg interpolates
/// PM start → day end over progress 0.5 → 1.0.
pub fn clock_hour(
    progress: f64,
    layover_hours: f64,
    at_school_or_deadheading: bool,
    constants: &Constants,
) -> f64 {
    let c = constants;
    if at_school_or_deadheading {
        return c.school_arrival_hour + layover_hours.clamp(0.0, c.midday_window_hours);
    }
    if progress < SCHOOL_PROGRESS {
        let t = (progress / SCHOOL_PROGRESS).clamp(0.0, 1.0);
        c.route_start_hour + (c.school_arrival_hour - c.route_start_hour) * t
    } else {
        let t = ((progress - SCHOOL_PROGRESS) / (1.0 - SCHOOL_PROGRESS)).clamp(0.0, 1.0);
        c.pm_start_hour + (c.day_end_hour - c.pm_start_hour) * t
    }
}

pub fn trip_phase(progress: f64, charging: bool) -> TripPhase {
    if charging || (0.45..0.55).contains(&progress) {
        TripPhase::Midday
    } else if progress < 0.45 {
        TripPhase::Am
    } else {
        TripPhase::Pm
    }
}

/// "HH:MM" for a fractional hour.
pub fn format_clock(hour: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total_minutes = (hour.max(0.0) * 60.0).round() as u64;
    format!("{:02}:{:02}", (total_minutes / 60) % 24, total_minutes % 60)
}

/// Recompute the displayed clock and phase from the bus snapshot.
pub(crate) fn refresh(ctx: &mut SimulationContext, constants: &Constants) {
    let bus = &ctx.bus;
    // The brief dwell at school after a passing check is still the layover.
    let dwelling_at_school = matches!(bus.status, BusStatus::Dwelling { .. })
        && bus.mid_day.arrived_at_school
        && bus.progress <= SCHOOL_PROGRESS + 1e-9;
    let layover = bus.status.is_mid_day_layover() || dwelling_at_school;
    let charging = matches!(bus.status, BusStatus::Charging(_));
    ctx.clock.clock_hour = clock_hour(bus.progress, bus.mid_day.layover_hours, layover, constants);
    ctx.clock.phase = trip_phase(bus.progress, charging);
}
