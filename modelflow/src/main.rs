//! Command-line entry point.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use modelflow::cancellation::CancellationToken;
use modelflow::config::{LoggingConfig, PipelineConfig};
use modelflow::core::ArtifactValue;
use modelflow::observability::init_tracing;
use modelflow::pipeline::{nodes, training_pipeline, Externals, PipelineExecutor};
use modelflow::serving::{
    DeployerConfig, DeploymentState, ModelDeployer, PredictionRequest, Predictor,
};
use modelflow::steps::StepRegistry;
use modelflow::store::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore};
use modelflow::tracking::{CompositeTracker, JsonlTracker, LoggingTracker};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter directive; RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the training pipeline
    Run(RunArgs),
    /// Deploy a stored model bundle and serve it until Ctrl-C
    Serve(ServeArgs),
    /// Call a running inference service
    Predict(PredictArgs),
    /// List stored versions of a step
    Artifacts(ArtifactsArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Pipeline configuration file (JSON)
    #[arg(short, long)]
    config: PathBuf,
    /// Execute every step even when a stored artifact matches
    #[arg(long)]
    no_cache: bool,
    /// Keep the deployed service up until Ctrl-C
    #[arg(long)]
    serve: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Artifact store directory
    #[arg(long)]
    store: PathBuf,
    /// Step whose bundle is deployed
    #[arg(long, default_value = nodes::PACKAGE)]
    step: String,
    /// Artifact version; the latest when omitted
    #[arg(long)]
    version: Option<u64>,
    /// Bind host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Bind port
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// Base URL of the service
    #[arg(long)]
    endpoint: String,
    /// Feature value as column=value; repeatable
    #[arg(short, long = "feature", value_name = "COLUMN=VALUE")]
    features: Vec<String>,
}

#[derive(Args, Debug)]
struct ArtifactsArgs {
    /// Artifact store directory
    #[arg(long)]
    store: PathBuf,
    /// Step name
    #[arg(long)]
    step: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let logging = |mut base: LoggingConfig| {
        if let Some(level) = &cli.log_level {
            base.level.clone_from(level);
        }
        base.json |= cli.json_logs;
        base
    };

    match cli.command {
        Commands::Run(ref args) => {
            let config = PipelineConfig::load(&args.config)
                .with_context(|| format!("loading {}", args.config.display()))?;
            init_tracing(&logging(config.logging.clone()));
            run(config, args).await
        }
        Commands::Serve(ref args) => {
            init_tracing(&logging(LoggingConfig::default()));
            serve(args).await
        }
        Commands::Predict(ref args) => {
            init_tracing(&logging(LoggingConfig::default()));
            predict(args).await
        }
        Commands::Artifacts(ref args) => {
            init_tracing(&logging(LoggingConfig::default()));
            artifacts(args).await
        }
    }
}

/// A token cancelled by the first Ctrl-C.
fn interrupt_token() -> Arc<CancellationToken> {
    let token = Arc::new(CancellationToken::new());
    let watcher = Arc::clone(&token);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received");
            watcher.cancel("interrupted");
        }
    });
    token
}

async fn run(config: PipelineConfig, args: &RunArgs) -> Result<()> {
    let store: Arc<dyn ArtifactStore> = match &config.store.path {
        Some(path) => Arc::new(FileArtifactStore::open(path).await?),
        None => Arc::new(InMemoryArtifactStore::new()),
    };
    let mut tracker = CompositeTracker::new().with(Arc::new(LoggingTracker::default()));
    if let Some(dir) = &config.tracking.path {
        let jsonl = JsonlTracker::new(dir)
            .with_context(|| format!("opening tracking directory {}", dir.display()))?;
        tracker = tracker.with(Arc::new(jsonl));
    }

    let deployer = Arc::new(ModelDeployer::new(config.deploy.deployer()));
    let registry = StepRegistry::standard(Arc::clone(&deployer));
    let graph = training_pipeline(&config, &registry)?;
    let executor = PipelineExecutor::new(store, Arc::new(tracker))
        .with_caching(config.store.caching && !args.no_cache);

    let cancel = interrupt_token();
    let result = match executor.run(&graph, &Externals::new(), &cancel).await {
        Ok(result) => result,
        Err(e) => {
            deployer.teardown().await;
            return Err(e.into());
        }
    };

    let metrics = match result.output(nodes::EVALUATE, "metrics") {
        Some(ArtifactValue::Metrics(m)) => json!(m),
        _ => json!(null),
    };
    let status = deployer.status();
    let summary = json!({
        "run_id": result.run_id,
        "pipeline": result.pipeline,
        "steps": result.steps,
        "metrics": metrics,
        "deployment": status,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if args.serve {
        if status.state == DeploymentState::Running {
            info!(endpoint = ?status.endpoint, "Serving until interrupted");
            cancel.cancelled().await;
        } else {
            warn!(state = %status.state, "Nothing deployed; --serve ignored");
        }
    }
    deployer.teardown().await;
    Ok(())
}

async fn serve(args: &ServeArgs) -> Result<()> {
    let store = FileArtifactStore::open(&args.store).await?;
    let deployer = ModelDeployer::new(DeployerConfig {
        host: args.host.clone(),
        port: args.port,
    });
    let status = deployer
        .deploy_from_store(&store, &args.step, args.version)
        .await?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    let cancel = interrupt_token();
    let mut interval = tokio::time::interval(HEALTH_INTERVAL);
    interval.tick().await;
    let outcome = loop {
        tokio::select! {
            () = cancel.cancelled() => break Ok(()),
            _ = interval.tick() => {
                let health = deployer.health_check().await;
                if health.state != DeploymentState::Running {
                    break Err(anyhow::anyhow!("inference service is {}", health.state));
                }
            }
        }
    };
    deployer.teardown().await;
    outcome
}

async fn predict(args: &PredictArgs) -> Result<()> {
    if args.features.is_empty() {
        bail!("at least one --feature column=value is required");
    }
    let request = args
        .features
        .iter()
        .try_fold(PredictionRequest::new(), |request, pair| request.with_pair(pair))?;
    let response = Predictor::new(&args.endpoint)?.predict(&request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn artifacts(args: &ArtifactsArgs) -> Result<()> {
    let store = FileArtifactStore::open(&args.store).await?;
    let versions = store.list_versions(&args.step).await?;
    if versions.is_empty() {
        bail!("no artifacts stored for step '{}'", args.step);
    }
    for meta in versions {
        println!(
            "{}\tv{}\t{}\t{}",
            meta.step,
            meta.version,
            meta.fingerprint.short(),
            meta.created_at.to_rfc3339()
        );
    }
    Ok(())
}
