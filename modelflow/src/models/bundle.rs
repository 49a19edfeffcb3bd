//! The deployable model bundle.

use super::{ModelError, TrainedModel};
use crate::data::{ColumnSchema, Table};
use crate::preprocess::{FeatureTransform, FittedImputer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Everything needed to score raw feature records.
///
/// Raw records are imputed, transformed and fed to the model exactly as the
/// training rows were.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    /// Target column the model predicts.
    pub target: String,
    /// Raw input columns an inference record may carry.
    pub input_schema: Vec<ColumnSchema>,
    /// Fitted imputer.
    pub imputer: FittedImputer,
    /// Fitted feature transform.
    pub transform: FeatureTransform,
    /// Fitted model.
    pub model: TrainedModel,
}

impl ModelBundle {
    /// Assembles a bundle from fitted components.
    #[must_use]
    pub fn new(imputer: FittedImputer, transform: FeatureTransform, model: TrainedModel) -> Self {
        Self {
            target: model.target.clone(),
            input_schema: imputer.schema.clone(),
            imputer,
            transform,
            model,
        }
    }

    /// Checks that a record with only missing values can be scored.
    ///
    /// This exercises the whole preprocessing chain and fails when the
    /// components were fitted on incompatible layouts.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.model.feature_columns.is_empty() {
            return Err(ModelError::EmptyTraining {
                rows: 0,
                cols: 0,
            });
        }
        self.predict_records(&[BTreeMap::new()]).map(|_| ())
    }

    /// Scores raw records.
    ///
    /// Unknown keys are ignored; absent or null values are imputed.
    pub fn predict_records(
        &self,
        records: &[BTreeMap<String, Value>],
    ) -> Result<Vec<f64>, ModelError> {
        let raw = Table::from_records(&self.input_schema, records)?;
        let imputed = self.imputer.transform(&raw)?;
        let features = self.transform.apply(&imputed)?;
        self.model.predict_table(&features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use crate::models::{LinearParams, ModelSpec};
    use crate::preprocess::{FeatureConfig, ImputeConfig};
    use serde_json::json;

    fn bundle() -> (ModelBundle, Table) {
        let train = Table::new(vec![
            Column::numeric("sqft", vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)]),
            Column::categorical(
                "city",
                vec![
                    Some("a".to_string()),
                    Some("b".to_string()),
                    Some("a".to_string()),
                    Some("b".to_string()),
                    Some("a".to_string()),
                ],
            ),
            Column::numeric("price", vec![Some(10.0), Some(25.0), Some(30.0), Some(45.0), Some(50.0)]),
        ])
        .unwrap();

        let imputer = FittedImputer::fit(&train, "price", &ImputeConfig::default()).unwrap();
        let imputed = imputer.transform(&train).unwrap();
        let (transform, features) =
            FeatureTransform::fit(&imputed, "price", &FeatureConfig::default()).unwrap();
        let columns = transform.feature_columns(&features);
        let model = TrainedModel::fit(
            &features,
            "price",
            columns,
            &ModelSpec::Linear(LinearParams::default()),
        )
        .unwrap();
        (ModelBundle::new(imputer, transform, model), imputed)
    }

    #[test]
    fn test_bundle_matches_in_process_prediction() {
        let (bundle, imputed) = bundle();
        let features = bundle.transform.apply(&imputed).unwrap();
        let expected = bundle.model.predict_table(&features).unwrap();

        let record = BTreeMap::from([
            ("sqft".to_string(), json!(1.0)),
            ("city".to_string(), json!("a")),
        ]);
        let got = bundle.predict_records(&[record]).unwrap();
        assert!((got[0] - expected[0]).abs() < 1e-9);
    }

    #[test]
    fn test_validate_and_missing_fields() {
        let (bundle, _) = bundle();
        assert!(bundle.validate().is_ok());
        assert_eq!(bundle.input_schema.len(), 2);

        let record = BTreeMap::from([("extra".to_string(), json!("ignored"))]);
        let got = bundle.predict_records(&[record]).unwrap();
        assert!(got[0].is_finite());
    }

    #[test]
    fn test_rejects_wrong_type() {
        let (bundle, _) = bundle();
        let record = BTreeMap::from([("sqft".to_string(), json!("large"))]);
        assert!(matches!(
            bundle.predict_records(&[record]),
            Err(ModelError::Table(_))
        ));
    }
}
