//! Append-only JSON-lines tracker.

use super::{ExperimentTracker, TrackingEvent};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Writes each run to `<dir>/<run_id>.jsonl`, one event per line.
///
/// Write failures are logged and suppressed.
#[derive(Debug)]
pub struct JsonlTracker {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTracker {
    /// Creates the tracker, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// The directory holding run files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a run's event file.
    #[must_use]
    pub fn run_path(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{run_id}.jsonl"))
    }

    /// Reads every event of a run. Undecodable lines are skipped.
    pub fn read_run(&self, run_id: Uuid) -> std::io::Result<Vec<TrackingEvent>> {
        let file = std::fs::File::open(self.run_path(run_id))?;
        let mut events = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(%run_id, line = number + 1, error = %e, "Skipping undecodable tracking line"),
            }
        }
        Ok(events)
    }

    fn append(&self, event: &TrackingEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.run_path(event.run_id))?;
        file.write_all(line.as_bytes())
    }
}

impl ExperimentTracker for JsonlTracker {
    fn record(&self, event: TrackingEvent) {
        if let Err(e) = self.append(&event) {
            warn!(run_id = %event.run_id, error = %e, "Failed to write tracking event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;
    use crate::tracking::{EventKind, RunContext};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_writes_and_reads_run() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(JsonlTracker::new(dir.path().join("runs")).unwrap());

        let run = RunContext::open("housing", tracker.clone());
        run.log_metrics("evaluate", BTreeMap::from([("rmse".to_string(), 1.5)]));
        run.close(RunStatus::Succeeded);

        let events = tracker.read_run(run.run_id()).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0].kind, EventKind::RunOpened { .. }));
        assert_eq!(
            events[2].kind,
            EventKind::RunClosed {
                status: RunStatus::Succeeded
            }
        );
    }

    #[test]
    fn test_write_failure_is_suppressed() {
        let dir = TempDir::new().unwrap();
        let tracker = JsonlTracker::new(dir.path()).unwrap();
        std::fs::remove_dir_all(dir.path()).unwrap();

        let run = RunContext::open("p", Arc::new(tracker));
        run.close(RunStatus::Failed);
    }

    #[test]
    fn test_skips_bad_lines() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(JsonlTracker::new(dir.path()).unwrap());
        let run = RunContext::open("p", tracker.clone());
        std::fs::OpenOptions::new()
            .append(true)
            .open(tracker.run_path(run.run_id()))
            .unwrap()
            .write_all(b"garbage\n")
            .unwrap();
        run.close(RunStatus::Succeeded);

        assert_eq!(tracker.read_run(run.run_id()).unwrap().len(), 2);
    }
}
