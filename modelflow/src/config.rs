//! Pipeline configuration.
//!
//! A single JSON document, loaded once before a run. Every section has serde
//! defaults so a minimal file only names the data source.

use crate::models::ModelSpec;
use crate::preprocess::{FeatureConfig, ImputeConfig, OutlierConfig, SplitConfig};
use crate::serving::DeployerConfig;
use crate::steps::DeployGate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Cannot read configuration {}: {source}", path.display())]
    Io {
        /// The configuration path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid configuration JSON.
    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration is well-formed but unusable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// CSV file; relative paths resolve against the configuration file.
    #[serde(default)]
    pub path: PathBuf,
    /// Target column.
    #[serde(default = "default_target")]
    pub target: String,
    /// Columns forced to categorical.
    #[serde(default)]
    pub categorical: Vec<String>,
    /// Field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_target() -> String {
    "price".to_string()
}

fn default_delimiter() -> char {
    ','
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            target: default_target(),
            categorical: Vec::new(),
            delimiter: default_delimiter(),
        }
    }
}

/// Deployment toggle, quality gate and listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Add the deploy step to the pipeline.
    #[serde(default)]
    pub enabled: bool,
    /// Minimum test R² required to deploy.
    #[serde(default)]
    pub min_r2: Option<f64>,
    /// Maximum test RMSE allowed to deploy.
    #[serde(default)]
    pub max_rmse: Option<f64>,
    /// Bind host of the inference service.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port; 0 picks an ephemeral port.
    #[serde(default)]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_r2: None,
            max_rmse: None,
            host: default_host(),
            port: 0,
        }
    }
}

impl DeployConfig {
    /// The quality gate of the deploy step.
    #[must_use]
    pub fn gate(&self) -> DeployGate {
        DeployGate {
            enabled: self.enabled,
            min_r2: self.min_r2,
            max_rmse: self.max_rmse,
        }
    }

    /// The listener configuration of the deployer.
    #[must_use]
    pub fn deployer(&self) -> DeployerConfig {
        DeployerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Artifact store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store root; in-memory when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Reuse stored artifacts.
    #[serde(default = "default_caching")]
    pub caching: bool,
}

fn default_caching() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            caching: default_caching(),
        }
    }
}

/// Experiment tracking settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TrackingConfig {
    /// Directory for JSONL run files; log-only when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

/// The full training pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, used for tracking.
    #[serde(default = "default_name")]
    pub name: String,
    /// Data source.
    #[serde(default)]
    pub data: DataConfig,
    /// Partition ratios and seed.
    #[serde(default)]
    pub split: SplitConfig,
    /// Missing value strategies.
    #[serde(default)]
    pub imputation: ImputeConfig,
    /// Outlier filter.
    #[serde(default)]
    pub outliers: OutlierConfig,
    /// Feature transformations.
    #[serde(default)]
    pub features: FeatureConfig,
    /// Model family and hyperparameters.
    #[serde(default)]
    pub model: ModelSpec,
    /// Deployment.
    #[serde(default)]
    pub deploy: DeployConfig,
    /// Artifact store.
    #[serde(default)]
    pub store: StoreConfig,
    /// Experiment tracking.
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_name() -> String {
    "house_prices".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data: DataConfig::default(),
            split: SplitConfig::default(),
            imputation: ImputeConfig::default(),
            outliers: OutlierConfig::default(),
            features: FeatureConfig::default(),
            model: ModelSpec::default(),
            deploy: DeployConfig::default(),
            store: StoreConfig::default(),
            tracking: TrackingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads, parses and validates a configuration file.
    ///
    /// Relative paths inside the file resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".into()));
        }
        if self.data.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data.path is required".into()));
        }
        if self.data.target.trim().is_empty() {
            return Err(ConfigError::Invalid("data.target must not be empty".into()));
        }
        let (validation, test) = (self.split.validation_ratio, self.split.test_ratio);
        if !(0.0..1.0).contains(&validation)
            || !(0.0..1.0).contains(&test)
            || validation + test >= 1.0
        {
            return Err(ConfigError::Invalid(format!(
                "split ratios must be non-negative and leave rows for training \
                 (validation {validation}, test {test})"
            )));
        }
        if let Some(min) = self.deploy.min_r2 {
            if !min.is_finite() {
                return Err(ConfigError::Invalid("deploy.min_r2 must be finite".into()));
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() && !p.as_os_str().is_empty() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.data.path);
        if let Some(p) = self.store.path.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.tracking.path.as_mut() {
            resolve(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinearParams;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = PipelineConfig::from_json(r#"{"data": {"path": "houses.csv"}}"#).unwrap();
        assert_eq!(config.name, "house_prices");
        assert_eq!(config.data.target, "price");
        assert!(config.store.caching);
        assert!(!config.deploy.enabled);
        assert!(config.outliers.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_model_section() {
        let config = PipelineConfig::from_json(
            r#"{"data": {"path": "h.csv"}, "model": {"family": "linear", "alpha": 0.5}}"#,
        )
        .unwrap();
        assert_eq!(config.model, ModelSpec::Linear(LinearParams { alpha: 0.5 }));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            PipelineConfig::from_json("{}"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json(
                r#"{"data": {"path": "h.csv"}, "split": {"validation_ratio": 0.6, "test_ratio": 0.5}}"#
            ),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"data": {{"path": "houses.csv"}}, "store": {{"path": "artifacts"}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.data.path, dir.path().join("houses.csv"));
        assert_eq!(config.store.path, Some(dir.path().join("artifacts")));
    }

    #[test]
    fn test_demo_config_parses() {
        let config = PipelineConfig::from_json(include_str!("../../demos/pipeline.json")).unwrap();
        assert!(config.deploy.enabled);
        assert_eq!(config.features.transformations.len(), 3);
        assert_eq!(config.deploy.gate().min_r2, Some(0.6));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            PipelineConfig::load("/no/such/config.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
