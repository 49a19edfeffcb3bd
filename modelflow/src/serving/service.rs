//! The axum inference service.

use super::protocol::{ErrorResponse, HealthResponse, ModelInfo, PredictRequest, PredictResponse};
use super::DeployError;
use crate::core::ArtifactRef;
use crate::models::{ModelBundle, ModelError};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

/// A validated bundle and the artifact it came from.
#[derive(Debug)]
pub(crate) struct LoadedModel {
    pub bundle: ModelBundle,
    pub artifact: ArtifactRef,
}

impl LoadedModel {
    pub fn predict(&self, features: &BTreeMap<String, Value>) -> Result<PredictResponse, ModelError> {
        let predictions = self.bundle.predict_records(std::slice::from_ref(features))?;
        let prediction = predictions.first().copied().ok_or(ModelError::EmptyEvaluation)?;
        if !prediction.is_finite() {
            return Err(ModelError::NonFinitePrediction(prediction));
        }
        Ok(PredictResponse {
            prediction,
            model: ModelInfo::from(&self.artifact),
        })
    }
}

/// State shared by every request handler.
#[derive(Debug, Clone)]
pub(crate) struct ServiceState {
    model: Arc<RwLock<Arc<LoadedModel>>>,
    requests: Arc<AtomicU64>,
}

impl ServiceState {
    fn new(model: LoadedModel) -> Self {
        Self {
            model: Arc::new(RwLock::new(Arc::new(model))),
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The model requests are currently scored with.
    pub fn current(&self) -> Arc<LoadedModel> {
        Arc::clone(&self.model.read())
    }

    /// Replaces the model; in-flight requests finish on the old one.
    pub fn swap(&self, model: LoadedModel) {
        *self.model.write() = Arc::new(model);
    }

    pub fn requests_served(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

pub(crate) fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(state)
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    let model = state.current();
    Json(HealthResponse {
        status: "running".to_string(),
        model: ModelInfo::from(&model.artifact),
        requests_served: state.requests_served(),
    })
}

async fn predict(
    State(state): State<ServiceState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return unprocessable(rejection.body_text()),
    };
    let model = state.current();
    match model.predict(&request.features) {
        Ok(response) => {
            state.requests.fetch_add(1, Ordering::Relaxed);
            Json(response).into_response()
        }
        Err(err) => unprocessable(err.to_string()),
    }
}

fn unprocessable(error: String) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse { error })).into_response()
}

/// A spawned server and the means to stop it.
#[derive(Debug)]
pub(crate) struct RunningService {
    pub endpoint: String,
    pub state: ServiceState,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningService {
    /// Binds the listener and spawns the server.
    pub async fn start(host: &str, port: u16, model: LoadedModel) -> Result<Self, DeployError> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| DeployError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local: SocketAddr = listener
            .local_addr()
            .map_err(|source| DeployError::Bind { addr, source })?;

        let state = ServiceState::new(model);
        let app = router(state.clone());
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
        });
        info!(%local, "Inference service listening");

        Ok(Self {
            endpoint: format!("http://{local}"),
            state,
            shutdown: Some(tx),
            task,
        })
    }

    /// Whether the server task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals graceful shutdown and waits for the listener to close.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => info!(endpoint = %self.endpoint, "Inference service stopped"),
            Ok(Err(e)) => warn!(endpoint = %self.endpoint, error = %e, "Inference service exited with error"),
            Err(e) => warn!(endpoint = %self.endpoint, error = %e, "Inference service task failed"),
        }
    }
}
