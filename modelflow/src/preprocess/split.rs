//! Seed-controlled train/validation/test partitioning.

use super::PreprocessError;
use crate::data::Table;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Partition proportions and the shuffle seed.
///
/// The train share is whatever remains after validation and test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Share of rows assigned to validation.
    #[serde(default = "default_ratio")]
    pub validation_ratio: f64,
    /// Share of rows assigned to test.
    #[serde(default = "default_ratio")]
    pub test_ratio: f64,
    /// Shuffle seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_ratio() -> f64 {
    0.15
}

fn default_seed() -> u64 {
    42
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_ratio: default_ratio(),
            test_ratio: default_ratio(),
            seed: default_seed(),
        }
    }
}

impl SplitConfig {
    /// Checks that both ratios are in `[0, 1)` and leave rows for training.
    pub fn validate(&self) -> Result<(), PreprocessError> {
        let in_range = |r: f64| (0.0..1.0).contains(&r);
        if !in_range(self.validation_ratio)
            || !in_range(self.test_ratio)
            || self.validation_ratio + self.test_ratio >= 1.0
        {
            return Err(PreprocessError::InvalidRatios {
                validation: self.validation_ratio,
                test: self.test_ratio,
            });
        }
        Ok(())
    }
}

/// Row indices of each partition, ascending within a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitions {
    /// Training rows.
    pub train: Vec<usize>,
    /// Validation rows.
    pub validation: Vec<usize>,
    /// Test rows.
    pub test: Vec<usize>,
}

/// Assigns each of `n` rows to exactly one partition.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn partition_indices(n: usize, config: &SplitConfig) -> Result<Partitions, PreprocessError> {
    config.validate()?;

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64) * config.test_ratio).round() as usize;
    let n_validation = ((n as f64) * config.validation_ratio).round() as usize;
    let n_validation = n_validation.min(n - n_test.min(n));
    let n_test = n_test.min(n);

    let mut test = indices[..n_test].to_vec();
    let mut validation = indices[n_test..n_test + n_validation].to_vec();
    let mut train = indices[n_test + n_validation..].to_vec();
    test.sort_unstable();
    validation.sort_unstable();
    train.sort_unstable();

    Ok(Partitions {
        train,
        validation,
        test,
    })
}

/// Splits a table into train, validation and test tables.
pub fn split_table(
    table: &Table,
    config: &SplitConfig,
) -> Result<(Table, Table, Table), PreprocessError> {
    let parts = partition_indices(table.num_rows(), config)?;
    Ok((
        table.take(&parts.train),
        table.take(&parts.validation),
        table.take(&parts.test),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_partition_sizes() {
        let parts = partition_indices(1000, &SplitConfig::default()).unwrap();
        assert_eq!(parts.train.len(), 700);
        assert_eq!(parts.validation.len(), 150);
        assert_eq!(parts.test.len(), 150);
    }

    #[test]
    fn test_partitions_cover_and_are_disjoint() {
        for n in [0, 1, 2, 7, 99, 1000] {
            for seed in [0, 1, 42] {
                let config = SplitConfig {
                    validation_ratio: 0.2,
                    test_ratio: 0.3,
                    seed,
                };
                let parts = partition_indices(n, &config).unwrap();
                assert_eq!(parts.train.len() + parts.validation.len() + parts.test.len(), n);

                let all: HashSet<usize> = parts
                    .train
                    .iter()
                    .chain(&parts.validation)
                    .chain(&parts.test)
                    .copied()
                    .collect();
                assert_eq!(all.len(), n);
                assert!(all.iter().all(|&i| i < n));
            }
        }
    }

    #[test]
    fn test_same_seed_same_partition() {
        let a = partition_indices(500, &SplitConfig::default()).unwrap();
        let b = partition_indices(500, &SplitConfig::default()).unwrap();
        assert_eq!(a, b);

        let other = SplitConfig {
            seed: 7,
            ..SplitConfig::default()
        };
        let c = partition_indices(500, &other).unwrap();
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn test_invalid_ratios() {
        let config = SplitConfig {
            validation_ratio: 0.5,
            test_ratio: 0.5,
            seed: 1,
        };
        assert!(matches!(
            partition_indices(10, &config),
            Err(PreprocessError::InvalidRatios { .. })
        ));

        let negative = SplitConfig {
            validation_ratio: -0.1,
            ..SplitConfig::default()
        };
        assert!(negative.validate().is_err());
    }
}
