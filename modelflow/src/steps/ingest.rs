//! CSV ingestion.

use super::{outputs, CachePolicy, SlotSpec, Step, StepContext};
use crate::core::{ArtifactValue, StepOutputs};
use crate::data::{load_csv, ColumnType, CsvOptions};
use crate::errors::{DataSourceError, StepError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Configuration of the `ingest_csv` behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// CSV file to read.
    pub path: PathBuf,
    /// Target column; must be present and numeric.
    pub target: String,
    /// Columns forced to categorical.
    #[serde(default)]
    pub categorical: Vec<String>,
    /// Field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            target: String::new(),
            categorical: Vec::new(),
            delimiter: default_delimiter(),
        }
    }
}

/// Loads the raw table from a CSV file.
///
/// Always executes: the file may change between runs without the
/// configuration changing. Its artifact is keyed by the loaded content.
#[derive(Debug, Default)]
pub struct IngestCsvStep;

#[async_trait]
impl Step for IngestCsvStep {
    fn name(&self) -> &str {
        "ingest_csv"
    }

    fn inputs(&self) -> Vec<SlotSpec> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::table("table")]
    }

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::Always
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutputs, StepError> {
        let config: IngestConfig = ctx.config()?;
        if config.target.is_empty() {
            return Err(StepError::InvalidConfig("ingest requires a target column".into()));
        }
        let options = CsvOptions {
            delimiter: config.delimiter,
            categorical: config.categorical.clone(),
        };
        let path = config.path.clone();
        let table = tokio::task::spawn_blocking(move || load_csv(&path, &options))
            .await??;

        match table.column(&config.target).map(|c| c.data.column_type()) {
            Some(ColumnType::Numeric) => {}
            Some(ColumnType::Categorical) => {
                return Err(DataSourceError::Malformed {
                    path: config.path,
                    message: format!("target column '{}' is not numeric", config.target),
                }
                .into())
            }
            None => {
                return Err(DataSourceError::MissingColumn {
                    path: config.path,
                    column: config.target,
                }
                .into())
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let rows = table.num_rows() as f64;
        ctx.log_params(json!({
            "path": config.path.display().to_string(),
            "target": config.target,
            "columns": table.column_names(),
        }));
        ctx.log_metrics(BTreeMap::from([("rows".to_string(), rows)]));
        tracing::info!(step = ctx.step(), rows = table.num_rows(), "Ingested data");

        Ok(outputs([("table", ArtifactValue::Table(table))]))
    }
}
