//! The deployment state machine.

use super::protocol::{HealthResponse, PredictRequest, PredictResponse};
use super::service::{LoadedModel, RunningService};
use super::{DeployError, ModelLoadError};
use crate::core::{ArtifactRef, ArtifactValue};
use crate::models::ModelBundle;
use crate::store::{ArtifactStore, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle state of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    /// No deployment record exists.
    Absent,
    /// The service is being started.
    Deploying,
    /// The service answers requests.
    Running,
    /// The service was stopped; the record remains.
    Stopped,
    /// The service stopped answering.
    Failed,
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Deploying => "deploying",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Binds a model artifact version to an inference endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Deployment id.
    pub id: Uuid,
    /// The deployed artifact.
    pub model: ArtifactRef,
    /// Current state.
    pub state: DeploymentState,
    /// Base URL while running.
    pub endpoint: Option<String>,
    /// Incremented on every start or hot-swap.
    pub generation: u64,
    /// Last transition.
    pub updated_at: DateTime<Utc>,
}

/// A point-in-time view of the deployer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    /// Current state.
    pub state: DeploymentState,
    /// Deployment id, when a record exists.
    pub deployment_id: Option<Uuid>,
    /// The deployed artifact, when a record exists.
    pub model: Option<ArtifactRef>,
    /// Base URL while running.
    pub endpoint: Option<String>,
    /// Start/hot-swap counter.
    pub generation: u64,
}

impl DeploymentStatus {
    fn absent() -> Self {
        Self {
            state: DeploymentState::Absent,
            deployment_id: None,
            model: None,
            endpoint: None,
            generation: 0,
        }
    }

    fn from_record(record: Option<&DeploymentRecord>) -> Self {
        record.map_or_else(Self::absent, |r| Self {
            state: r.state,
            deployment_id: Some(r.id),
            model: Some(r.model.clone()),
            endpoint: r.endpoint.clone(),
            generation: r.generation,
        })
    }
}

/// A bundle together with the artifact it was read from.
#[derive(Debug, Clone)]
pub struct DeployableModel {
    /// The bundle to serve.
    pub bundle: ModelBundle,
    /// Its artifact reference; the version decides hot-swaps.
    pub artifact: ArtifactRef,
}

/// Where the service listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployerConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port; 0 picks an ephemeral port.
    #[serde(default)]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
        }
    }
}

/// Hosts at most one model behind the inference service.
///
/// State transitions:
/// `absent -> deploying -> running -> stopped -> (torn down)` and
/// `running -> failed` when a health check fails.
#[derive(Debug)]
pub struct ModelDeployer {
    config: DeployerConfig,
    record: RwLock<Option<DeploymentRecord>>,
    service: Mutex<Option<RunningService>>,
    http: reqwest::Client,
}

impl Default for ModelDeployer {
    fn default() -> Self {
        Self::new(DeployerConfig::default())
    }
}

impl ModelDeployer {
    /// Creates a deployer with no deployment.
    #[must_use]
    pub fn new(config: DeployerConfig) -> Self {
        Self {
            config,
            record: RwLock::new(None),
            service: Mutex::new(None),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
        }
    }

    /// The listener configuration.
    #[must_use]
    pub fn config(&self) -> &DeployerConfig {
        &self.config
    }

    /// A snapshot of the current deployment.
    #[must_use]
    pub fn status(&self) -> DeploymentStatus {
        DeploymentStatus::from_record(self.record.read().as_ref())
    }

    /// The full deployment record, if any.
    #[must_use]
    pub fn record(&self) -> Option<DeploymentRecord> {
        self.record.read().clone()
    }

    fn state(&self) -> DeploymentState {
        self.record
            .read()
            .as_ref()
            .map_or(DeploymentState::Absent, |r| r.state)
    }

    fn transition(&self, state: DeploymentState, endpoint: Option<String>) {
        if let Some(record) = self.record.write().as_mut() {
            debug!(from = %record.state, to = %state, deployment = %record.id, "Deployment transition");
            record.state = state;
            record.endpoint = endpoint;
            record.updated_at = Utc::now();
        }
    }

    /// Deploys `model`.
    ///
    /// Running the same artifact version is a no-op. A different version is
    /// hot-swapped into the running service. Otherwise a new service is
    /// started. A bundle that fails validation leaves the state unchanged.
    pub async fn deploy(&self, model: DeployableModel) -> Result<DeploymentStatus, DeployError> {
        let mut service = self.service.lock().await;

        if let (Some(running), Some(current)) = (service.as_ref(), self.record()) {
            if current.state == DeploymentState::Running {
                if current.model.same_version(&model.artifact) {
                    debug!(model = %model.artifact, "Model already deployed");
                    return Ok(self.status());
                }
                let loaded = load(model)?;
                let artifact = loaded.artifact.clone();
                running.state.swap(loaded);
                if let Some(record) = self.record.write().as_mut() {
                    record.model = artifact.clone();
                    record.generation += 1;
                    record.updated_at = Utc::now();
                }
                info!(model = %artifact, "Hot-swapped model");
                return Ok(self.status());
            }
        }

        // A failed service may still hold its listener.
        if let Some(stale) = service.take() {
            stale.shutdown().await;
        }

        let previous = self.record();
        {
            let mut record = self.record.write();
            *record = Some(DeploymentRecord {
                id: previous.as_ref().map_or_else(Uuid::new_v4, |r| r.id),
                model: model.artifact.clone(),
                state: DeploymentState::Deploying,
                endpoint: None,
                generation: previous.as_ref().map_or(0, |r| r.generation),
                updated_at: Utc::now(),
            });
        }

        let started = match load(model) {
            Ok(loaded) => RunningService::start(&self.config.host, self.config.port, loaded).await,
            Err(e) => Err(e),
        };
        match started {
            Ok(running) => {
                let endpoint = running.endpoint.clone();
                if let Some(record) = self.record.write().as_mut() {
                    record.state = DeploymentState::Running;
                    record.endpoint = Some(endpoint.clone());
                    record.generation += 1;
                    record.updated_at = Utc::now();
                }
                *service = Some(running);
                info!(%endpoint, "Model deployed");
                Ok(self.status())
            }
            Err(e) => {
                warn!(error = %e, "Deployment failed");
                *self.record.write() = previous;
                Err(e)
            }
        }
    }

    /// Loads a bundle artifact from `store` and deploys it.
    ///
    /// Without a version the latest artifact of `step` is used.
    pub async fn deploy_from_store(
        &self,
        store: &dyn ArtifactStore,
        step: &str,
        version: Option<u64>,
    ) -> Result<DeploymentStatus, DeployError> {
        let corrupt = |e: StoreError| ModelLoadError::Corrupt {
            step: step.to_string(),
            reason: e.to_string(),
        };
        let artifact = match version {
            Some(v) => store.get_version(step, v).await,
            None => store.latest(step).await,
        }
        .map_err(corrupt)?
        .ok_or_else(|| ModelLoadError::NotFound {
            step: step.to_string(),
            version,
        })?;

        let bundle = artifact
            .outputs
            .values()
            .find_map(|v| match v {
                ArtifactValue::Bundle(b) => Some(b.clone()),
                _ => None,
            })
            .ok_or_else(|| ModelLoadError::Corrupt {
                step: step.to_string(),
                reason: "artifact holds no model bundle".to_string(),
            })?;

        self.deploy(DeployableModel {
            bundle,
            artifact: artifact.reference(),
        })
        .await
    }

    /// Scores one request in-process; only valid while running.
    pub async fn predict(&self, request: &PredictRequest) -> Result<PredictResponse, DeployError> {
        let model = {
            let service = self.service.lock().await;
            match (self.state(), service.as_ref()) {
                (DeploymentState::Running, Some(running)) => running.state.current(),
                (state, _) => return Err(DeployError::ServiceUnavailable { state }),
            }
        };
        Ok(model.predict(&request.features)?)
    }

    /// Probes the running service; marks the deployment failed when it does
    /// not answer.
    ///
    /// The service lock is released during the HTTP probe. A failure is only
    /// recorded if the probed service is still the one running afterwards.
    pub async fn health_check(&self) -> DeploymentStatus {
        let (endpoint, finished) = {
            let service = self.service.lock().await;
            match service.as_ref() {
                Some(running) if self.state() == DeploymentState::Running => {
                    (running.endpoint.clone(), running.is_finished())
                }
                _ => return self.status(),
            }
        };

        let healthy = !finished && self.probe(&endpoint).await;
        if !healthy {
            let service = self.service.lock().await;
            let current = service.as_ref().is_some_and(|r| r.endpoint == endpoint);
            if current && self.state() == DeploymentState::Running {
                self.transition(DeploymentState::Failed, None);
            }
        }
        self.status()
    }

    async fn probe(&self, endpoint: &str) -> bool {
        let url = format!("{endpoint}/health");
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                response.json::<HealthResponse>().await.is_ok()
            }
            Ok(response) => {
                warn!(status = %response.status(), "Health check rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "Health check failed");
                false
            }
        }
    }

    /// Stops the service and releases its port.
    ///
    /// Stopping a stopped deployment is a no-op.
    pub async fn stop(&self) -> Result<DeploymentStatus, DeployError> {
        let mut service = self.service.lock().await;
        match self.state() {
            DeploymentState::Absent => {
                return Err(DeployError::InvalidTransition {
                    from: DeploymentState::Absent,
                    action: "stop",
                })
            }
            DeploymentState::Stopped => return Ok(self.status()),
            _ => {}
        }
        if let Some(running) = service.take() {
            running.shutdown().await;
        }
        self.transition(DeploymentState::Stopped, None);
        Ok(self.status())
    }

    /// Stops the service if needed and destroys the record.
    pub async fn teardown(&self) {
        let mut service = self.service.lock().await;
        if let Some(running) = service.take() {
            running.shutdown().await;
        }
        if let Some(record) = self.record.write().take() {
            info!(deployment = %record.id, "Deployment torn down");
        }
    }
}

fn load(model: DeployableModel) -> Result<LoadedModel, DeployError> {
    model
        .bundle
        .validate()
        .map_err(ModelLoadError::Invalid)?;
    Ok(LoadedModel {
        bundle: model.bundle,
        artifact: model.artifact,
    })
}
