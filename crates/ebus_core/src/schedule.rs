//! Virtual-time event queue. Replaces wall-clock timers for dwell pauses.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScheduledKind {
    ResumeMoving,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Simulated hours since day start.
    pub at_hours: f64,
    pub kind: ScheduledKind,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEvent {}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by time.
        other
            .at_hours
            .total_cmp(&self.at_hours)
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pop every event due at or before `now`, earliest first.
pub(crate) fn pop_due(queue: &mut BinaryHeap<ScheduledEvent>, now: f64) -> Vec<ScheduledEvent> {
    let mut due = Vec::new();
    while queue.peek().is_some_and(|e| e.at_hours <= now) {
        if let Some(event) = queue.pop() {
            due.push(event);
        }
    }
    due
}
