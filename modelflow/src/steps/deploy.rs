//! Deployment trigger.

use super::{outputs, CachePolicy, SlotSpec, Step, StepContext};
use crate::core::{ArtifactValue, StepOutputs, ValueKind};
use crate::errors::StepError;
use crate::models::RegressionMetrics;
use crate::serving::{DeployableModel, ModelDeployer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Quality gate deciding whether a model is deployed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployGate {
    /// Deploy at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum test R².
    #[serde(default)]
    pub min_r2: Option<f64>,
    /// Maximum test RMSE.
    #[serde(default)]
    pub max_rmse: Option<f64>,
}

fn default_enabled() -> bool {
    true
}

impl Default for DeployGate {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            min_r2: None,
            max_rmse: None,
        }
    }
}

impl DeployGate {
    /// Returns why `metrics` fail the gate, or `None` when they pass.
    #[must_use]
    pub fn rejection(&self, metrics: &RegressionMetrics) -> Option<String> {
        if !self.enabled {
            return Some("deployment disabled".to_string());
        }
        if let Some(min) = self.min_r2 {
            if metrics.r2 < min {
                return Some(format!("r2 {:.4} below minimum {min}", metrics.r2));
            }
        }
        if let Some(max) = self.max_rmse {
            if metrics.rmse > max {
                return Some(format!("rmse {:.4} above maximum {max}", metrics.rmse));
            }
        }
        None
    }
}

/// Hands the packaged bundle to the deployer when the gate passes.
#[derive(Debug)]
pub struct DeployModelStep {
    deployer: Arc<ModelDeployer>,
}

impl DeployModelStep {
    /// Creates the step around a shared deployer.
    #[must_use]
    pub fn new(deployer: Arc<ModelDeployer>) -> Self {
        Self { deployer }
    }
}

#[async_trait]
impl Step for DeployModelStep {
    fn name(&self) -> &str {
        "deploy_model"
    }

    fn inputs(&self) -> Vec<SlotSpec> {
        vec![
            SlotSpec::new("bundle", ValueKind::Bundle),
            SlotSpec::new("metrics", ValueKind::Metrics),
        ]
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::new("deployment", ValueKind::Json)]
    }

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::Always
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutputs, StepError> {
        let gate: DeployGate = ctx.config()?;
        let inputs = ctx.inputs();
        let metrics = RegressionMetrics::from_map(inputs.metrics("metrics")?).ok_or_else(|| {
            StepError::InvalidConfig("metrics input lacks rmse/mse/mae/r2".to_string())
        })?;

        if let Some(reason) = gate.rejection(&metrics) {
            info!(step = ctx.step(), %reason, "Skipping deployment");
            ctx.log_params(json!({"deployed": false, "reason": reason}));
            return Ok(outputs([(
                "deployment",
                ArtifactValue::Json(json!({
                    "deployed": false,
                    "reason": reason,
                    "status": self.deployer.status(),
                })),
            )]));
        }

        let artifact = inputs.artifact_ref("bundle").cloned().ok_or_else(|| {
            StepError::InvalidConfig("bundle must come from a stored artifact".to_string())
        })?;
        let status = self
            .deployer
            .deploy(DeployableModel {
                bundle: inputs.bundle("bundle")?.clone(),
                artifact: artifact.clone(),
            })
            .await?;

        ctx.log_params(json!({
            "deployed": true,
            "model": artifact.to_string(),
            "endpoint": status.endpoint,
            "generation": status.generation,
        }));
        Ok(outputs([(
            "deployment",
            ArtifactValue::Json(json!({
                "deployed": true,
                "status": status,
            })),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(r2: f64, rmse: f64) -> RegressionMetrics {
        RegressionMetrics {
            rmse,
            mse: rmse * rmse,
            mae: rmse,
            r2,
        }
    }

    #[test]
    fn test_gate() {
        let gate = DeployGate {
            enabled: true,
            min_r2: Some(0.5),
            max_rmse: Some(10.0),
        };
        assert_eq!(gate.rejection(&metrics(0.8, 5.0)), None);
        assert!(gate.rejection(&metrics(0.2, 5.0)).is_some());
        assert!(gate.rejection(&metrics(0.8, 50.0)).is_some());

        let disabled = DeployGate {
            enabled: false,
            ..DeployGate::default()
        };
        assert_eq!(
            disabled.rejection(&metrics(1.0, 0.0)).as_deref(),
            Some("deployment disabled")
        );
    }

    #[test]
    fn test_gate_defaults() {
        let gate: DeployGate = serde_json::from_str("{}").unwrap();
        assert!(gate.enabled);
        assert_eq!(gate.min_r2, None);
    }
}
