//! In-process tracker implementations.

use super::{EventKind, ExperimentTracker, TrackingEvent};
use crate::core::RunStatus;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, Level};
use uuid::Uuid;

/// A tracker that discards all events.
///
/// Used as the default when no tracker is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTracker;

impl ExperimentTracker for NoOpTracker {
    fn record(&self, _event: TrackingEvent) {}
}

/// A tracker that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingTracker {
    level: Level,
}

impl Default for LoggingTracker {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingTracker {
    /// Creates a logging tracker at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging tracker.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl ExperimentTracker for LoggingTracker {
    fn record(&self, event: TrackingEvent) {
        let payload = serde_json::to_value(&event.kind).unwrap_or_default();
        if self.level == Level::DEBUG {
            debug!(run_id = %event.run_id, event = event.kind.name(), data = %payload, "Tracking event");
        } else {
            info!(run_id = %event.run_id, event = event.kind.name(), data = %payload, "Tracking event");
        }
    }
}

/// A tracker that keeps every event in memory, queryable by run.
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    events: parking_lot::RwLock<Vec<TrackingEvent>>,
}

impl InMemoryTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all events in recording order.
    #[must_use]
    pub fn events(&self) -> Vec<TrackingEvent> {
        self.events.read().clone()
    }

    /// Returns the events of one run.
    #[must_use]
    pub fn events_for(&self, run_id: Uuid) -> Vec<TrackingEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }

    /// Returns run ids in the order they were opened.
    #[must_use]
    pub fn runs(&self) -> Vec<Uuid> {
        self.events
            .read()
            .iter()
            .filter(|e| matches!(e.kind, EventKind::RunOpened { .. }))
            .map(|e| e.run_id)
            .collect()
    }

    /// Returns all metrics of a run, keyed `<step>.<name>`.
    #[must_use]
    pub fn metrics_for(&self, run_id: Uuid) -> BTreeMap<String, f64> {
        let mut merged = BTreeMap::new();
        for event in self.events_for(run_id) {
            if let EventKind::Metrics { step, metrics } = event.kind {
                for (name, value) in metrics {
                    merged.insert(format!("{step}.{name}"), value);
                }
            }
        }
        merged
    }

    /// Returns the closing status of a run, if closed.
    #[must_use]
    pub fn status_of(&self, run_id: Uuid) -> Option<RunStatus> {
        self.events_for(run_id).into_iter().find_map(|e| match e.kind {
            EventKind::RunClosed { status } => Some(status),
            _ => None,
        })
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl ExperimentTracker for InMemoryTracker {
    fn record(&self, event: TrackingEvent) {
        self.events.write().push(event);
    }
}

/// Forwards every event to several trackers.
#[derive(Default)]
pub struct CompositeTracker {
    trackers: Vec<Arc<dyn ExperimentTracker>>,
}

impl CompositeTracker {
    /// Creates an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tracker.
    #[must_use]
    pub fn with(mut self, tracker: Arc<dyn ExperimentTracker>) -> Self {
        self.trackers.push(tracker);
        self
    }

    /// Returns the number of trackers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    /// Returns true if there are no trackers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

impl ExperimentTracker for CompositeTracker {
    fn record(&self, event: TrackingEvent) {
        for tracker in &self.trackers {
            tracker.record(event.clone());
        }
    }
}
