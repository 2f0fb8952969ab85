//! `ebus_core`: deterministic electric school bus simulation.
//!
//! No IO, no network. External services are reached through the traits in
//! [`collaborators`]; their answers come back in as commands.

pub mod bus;
mod charging;
pub mod clock;
pub mod collaborators;
mod deadhead;
pub mod energy;
mod engine;
pub mod geo;
mod id;
pub mod metrics;
pub mod schedule;
pub mod scoring;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

pub use charging::{assess_return_trip, ReturnTripAssessment};
pub use engine::{
    advance, overnight_energy_kwh, speed_multiplier, start_scenario, tick, SCHEMA_VERSION,
};
pub use id::generate_uuid;
pub use metrics::{bus_snapshot, compute_day_metrics, BusSnapshot, DayMetrics, MetricsFileWriter};
pub use types::*;

pub(crate) fn emit(counters: &mut Counters, tick: u64, event: Event) -> EventEnvelope {
    let id = EventId(format!("evt_{:06}", counters.next_event_id));
    counters.next_event_id += 1;
    EventEnvelope { id, tick, event }
}

#[cfg(test)]
mod tests;
