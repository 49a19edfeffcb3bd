//! Step and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a step's outputs were obtained in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step ran and its outputs were stored.
    Executed,
    /// The outputs were reused from the artifact store.
    Cached,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executed => write!(f, "executed"),
            Self::Cached => write!(f, "cached"),
        }
    }
}

impl StepStatus {
    /// Returns true if the outputs came from the store.
    #[must_use]
    pub fn is_cache_hit(&self) -> bool {
        matches!(self, Self::Cached)
    }
}

/// The final state of a tracked run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step completed.
    Succeeded,
    /// A step failed.
    Failed,
    /// The run was cancelled between steps.
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl RunStatus {
    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_display() {
        assert_eq!(StepStatus::Executed.to_string(), "executed");
        assert_eq!(StepStatus::Cached.to_string(), "cached");
        assert!(StepStatus::Cached.is_cache_hit());
        assert!(!StepStatus::Executed.is_cache_hit());
    }

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(RunStatus::Failed.to_string(), "failed");
        assert_eq!(RunStatus::Cancelled.to_string(), "cancelled");
        assert!(RunStatus::Succeeded.is_success());
        assert!(!RunStatus::Cancelled.is_success());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&StepStatus::Cached).unwrap(), "\"cached\"");
        let status: RunStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, RunStatus::Failed);
    }
}
