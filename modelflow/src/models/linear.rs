//! Ridge linear regression solved through the normal equations.

use super::{ModelError, Regressor};
use crate::data::Matrix;
use serde::{Deserialize, Serialize};

const PIVOT_EPSILON: f64 = 1e-12;

/// Hyperparameters for [`LinearModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    /// L2 penalty; the intercept is never penalised.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_alpha() -> f64 {
    1.0
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
        }
    }
}

/// A fitted linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    /// One weight per feature.
    pub coefficients: Vec<f64>,
    /// Bias term.
    pub intercept: f64,
}

impl Regressor for LinearModel {
    type Params = LinearParams;

    #[allow(clippy::cast_precision_loss)]
    fn fit(x: &Matrix, y: &[f64], params: &LinearParams) -> Result<Self, ModelError> {
        let (n, p) = (x.rows(), x.cols());
        if n == 0 || p == 0 {
            return Err(ModelError::EmptyTraining { rows: n, cols: p });
        }
        if y.len() != n {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                actual: y.len(),
            });
        }
        if params.alpha < 0.0 || !params.alpha.is_finite() {
            return Err(ModelError::InvalidParameter(format!(
                "alpha must be a non-negative number, got {}",
                params.alpha
            )));
        }

        // Centering removes the intercept from the system.
        let x_mean: Vec<f64> = (0..p)
            .map(|j| (0..n).map(|i| x.get(i, j)).sum::<f64>() / n as f64)
            .collect();
        let y_mean = y.iter().sum::<f64>() / n as f64;

        let mut gram = vec![vec![0.0; p]; p];
        let mut rhs = vec![0.0; p];
        for i in 0..n {
            let row = x.row(i);
            let yc = y[i] - y_mean;
            for a in 0..p {
                let xa = row[a] - x_mean[a];
                rhs[a] += xa * yc;
                for b in a..p {
                    gram[a][b] += xa * (row[b] - x_mean[b]);
                }
            }
        }
        for a in 0..p {
            for b in 0..a {
                gram[a][b] = gram[b][a];
            }
            gram[a][a] += params.alpha;
        }

        let coefficients = solve(gram, rhs)?;
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(&x_mean)
                .map(|(w, m)| w * m)
                .sum::<f64>();

        Ok(Self {
            coefficients,
            intercept,
        })
    }

    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, ModelError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return Err(ModelError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> (Matrix, Vec<f64>) {
        // y = 2*x0 - x1 + 5
        let rows: Vec<[f64; 2]> = vec![[1.0, 0.0], [2.0, 1.0], [3.0, 5.0], [4.0, 2.0], [0.0, 3.0]];
        let y = rows.iter().map(|r| 2.0 * r[0] - r[1] + 5.0).collect();
        let data = rows.iter().flatten().copied().collect();
        (Matrix::new(5, 2, data), y)
    }

    #[test]
    fn test_exact_fit_without_penalty() {
        let (x, y) = data();
        let model = LinearModel::fit(&x, &y, &LinearParams { alpha: 0.0 }).unwrap();

        assert!((model.coefficients[0] - 2.0).abs() < 1e-9);
        assert!((model.coefficients[1] + 1.0).abs() < 1e-9);
        assert!((model.intercept - 5.0).abs() < 1e-9);
        assert!((model.predict_row(&[10.0, 10.0]) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_penalty_shrinks_coefficients() {
        let (x, y) = data();
        let free = LinearModel::fit(&x, &y, &LinearParams { alpha: 0.0 }).unwrap();
        let ridge = LinearModel::fit(&x, &y, &LinearParams { alpha: 10.0 }).unwrap();
        assert!(ridge.coefficients[0].abs() < free.coefficients[0].abs());
    }

    #[test]
    fn test_collinear_features_are_singular_without_penalty() {
        let x = Matrix::new(3, 2, vec![1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        let y = [1.0, 2.0, 3.0];
        assert_eq!(
            LinearModel::fit(&x, &y, &LinearParams { alpha: 0.0 }),
            Err(ModelError::Singular)
        );
        assert!(LinearModel::fit(&x, &y, &LinearParams { alpha: 1.0 }).is_ok());
    }

    #[test]
    fn test_empty_training_rejected() {
        let x = Matrix::new(0, 1, vec![]);
        assert!(matches!(
            LinearModel::fit(&x, &[], &LinearParams::default()),
            Err(ModelError::EmptyTraining { .. })
        ));
    }
}
