//! Experiment tracking scoped to explicit runs.
//!
//! A [`RunContext`] is opened by the executor for every pipeline run and
//! passed to each step. Steps log parameters and metrics through it; the
//! executor logs artifact references and closes the run. Events are handed to
//! an [`ExperimentTracker`], which never fails the caller.

mod file;
mod sinks;

pub use file::JsonlTracker;
pub use sinks::{CompositeTracker, InMemoryTracker, LoggingTracker, NoOpTracker};

use crate::core::{ArtifactRef, RunStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Destination for tracking events.
///
/// Implementations must not panic and must suppress their own failures.
pub trait ExperimentTracker: Send + Sync {
    /// Records one event.
    fn record(&self, event: TrackingEvent);
}

/// A tracking event tied to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// The run the event belongs to.
    pub run_id: Uuid,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The payload of a tracking event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// A run started.
    RunOpened {
        /// Pipeline name.
        pipeline: String,
    },
    /// A step reported its parameters.
    Params {
        /// Reporting step.
        step: String,
        /// Parameters as JSON.
        params: serde_json::Value,
    },
    /// A step reported metrics.
    Metrics {
        /// Reporting step.
        step: String,
        /// Named values.
        metrics: BTreeMap<String, f64>,
    },
    /// A step's outputs were produced or reused.
    Artifact {
        /// The step.
        step: String,
        /// The stored artifact.
        artifact: ArtifactRef,
        /// True when reused from the store.
        cached: bool,
    },
    /// The run ended.
    RunClosed {
        /// Final status.
        status: RunStatus,
    },
}

impl EventKind {
    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunOpened { .. } => "run_opened",
            Self::Params { .. } => "params",
            Self::Metrics { .. } => "metrics",
            Self::Artifact { .. } => "artifact",
            Self::RunClosed { .. } => "run_closed",
        }
    }
}

/// An open tracking run.
pub struct RunContext {
    run_id: Uuid,
    pipeline: String,
    tracker: Arc<dyn ExperimentTracker>,
    status: Mutex<Option<RunStatus>>,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("pipeline", &self.pipeline)
            .field("status", &*self.status.lock())
            .finish_non_exhaustive()
    }
}

impl RunContext {
    /// Opens a run with a fresh id and records `RunOpened`.
    #[must_use]
    pub fn open(pipeline: impl Into<String>, tracker: Arc<dyn ExperimentTracker>) -> Arc<Self> {
        let ctx = Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            tracker,
            status: Mutex::new(None),
        };
        ctx.emit(EventKind::RunOpened {
            pipeline: ctx.pipeline.clone(),
        });
        Arc::new(ctx)
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Logs a step's parameters.
    pub fn log_params(&self, step: &str, params: serde_json::Value) {
        self.emit_open(EventKind::Params {
            step: step.to_string(),
            params,
        });
    }

    /// Logs a step's metrics.
    pub fn log_metrics(&self, step: &str, metrics: BTreeMap<String, f64>) {
        self.emit_open(EventKind::Metrics {
            step: step.to_string(),
            metrics,
        });
    }

    /// Logs the artifact a step produced or reused.
    pub fn log_artifact(&self, step: &str, artifact: ArtifactRef, cached: bool) {
        self.emit_open(EventKind::Artifact {
            step: step.to_string(),
            artifact,
            cached,
        });
    }

    /// Closes the run. Only the first call is recorded; returns whether this
    /// call closed it.
    pub fn close(&self, status: RunStatus) -> bool {
        {
            let mut current = self.status.lock();
            if current.is_some() {
                return false;
            }
            *current = Some(status);
        }
        self.emit(EventKind::RunClosed { status });
        true
    }

    /// The final status, once closed.
    #[must_use]
    pub fn status(&self) -> Option<RunStatus> {
        *self.status.lock()
    }

    /// Returns true once the run has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status().is_some()
    }

    fn emit_open(&self, kind: EventKind) {
        if self.is_closed() {
            debug!(run_id = %self.run_id, event = kind.name(), "Dropping event for closed run");
            return;
        }
        self.emit(kind);
    }

    fn emit(&self, kind: EventKind) {
        self.tracker.record(TrackingEvent {
            run_id: self.run_id,
            timestamp: Utc::now(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fingerprint;

    #[test]
    fn test_run_lifecycle_events() {
        let tracker = Arc::new(InMemoryTracker::new());
        let run = RunContext::open("housing", tracker.clone());

        run.log_params("train", serde_json::json!({"alpha": 1.0}));
        run.log_metrics("evaluate", BTreeMap::from([("rmse".to_string(), 2.5)]));
        run.log_artifact(
            "train",
            ArtifactRef {
                step: "train".to_string(),
                version: 1,
                fingerprint: Fingerprint::of_bytes(b"t"),
            },
            false,
        );
        assert!(run.close(RunStatus::Succeeded));

        let names: Vec<&str> = tracker
            .events_for(run.run_id())
            .iter()
            .map(|e| e.kind.name())
            .collect();
        assert_eq!(names, vec!["run_opened", "params", "metrics", "artifact", "run_closed"]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let tracker = Arc::new(InMemoryTracker::new());
        let run = RunContext::open("housing", tracker.clone());

        assert!(run.close(RunStatus::Failed));
        assert!(!run.close(RunStatus::Succeeded));
        assert_eq!(run.status(), Some(RunStatus::Failed));

        run.log_metrics("late", BTreeMap::new());
        let closed: Vec<_> = tracker
            .events_for(run.run_id())
            .into_iter()
            .filter(|e| matches!(e.kind, EventKind::RunClosed { .. }))
            .collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(tracker.events_for(run.run_id()).len(), 2);
    }

    #[test]
    fn test_event_serialization_is_flat() {
        let event = TrackingEvent {
            run_id: Uuid::nil(),
            timestamp: Utc::now(),
            kind: EventKind::RunClosed {
                status: RunStatus::Cancelled,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "run_closed");
        assert_eq!(value["status"], "cancelled");

        let back: TrackingEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
