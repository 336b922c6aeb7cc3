//! Local linear surrogate: sample weighting and weighted ridge regression.

use ndarray::{s, Array1, Array2, Axis};

use super::ExplanationError;

/// Pivot magnitude below which the normal equations count as singular.
const SINGULAR_EPSILON: f64 = 1e-12;

/// Fitted surrogate model.
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeFit {
    /// One coefficient per feature (segment).
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Weighted R² of the fit on its own training samples.
    pub score: f64,
}

impl RidgeFit {
    pub fn predict(&self, row: &[f64]) -> f64 {
        self.intercept
            + row
                .iter()
                .zip(&self.coefficients)
                .map(|(x, c)| x * c)
                .sum::<f64>()
    }
}

/// Cosine distance of each binary row to the all-ones row.
///
/// For a row with `k` of `n` features on, this is `1 - sqrt(k / n)`; the
/// all-off row is at distance 1.
pub fn cosine_distances_to_all_on(rows: &[Vec<bool>]) -> Vec<f64> {
    rows.iter()
        .map(|row| {
            let n = row.len();
            let k = row.iter().filter(|on| **on).count();
            if n == 0 || k == 0 {
                1.0
            } else {
                1.0 - (k as f64 / n as f64).sqrt()
            }
        })
        .collect()
}

/// Exponential kernel: `sqrt(exp(-d² / width²))`.
pub fn exponential_kernel(distances: &[f64], width: f64) -> Vec<f64> {
    distances
        .iter()
        .map(|d| (-(d * d) / (width * width)).exp().sqrt())
        .collect()
}

/// Weighted ridge regression with an unpenalized intercept.
///
/// Minimizes `Σ wᵢ (yᵢ - b - xᵢ·β)² + α |β|²` by centering on the weighted
/// means and solving the normal equations.
pub fn weighted_ridge(
    features: &[Vec<f64>],
    targets: &[f64],
    weights: &[f64],
    alpha: f64,
) -> Result<RidgeFit, ExplanationError> {
    let n = features.len();
    if n == 0 || targets.len() != n || weights.len() != n {
        return Err(ExplanationError::Regression(format!(
            "{n} samples, {} targets, {} weights",
            targets.len(),
            weights.len()
        )));
    }
    let p = features[0].len();
    if features.iter().any(|row| row.len() != p) {
        return Err(ExplanationError::Regression("ragged feature rows".into()));
    }

    let weight_sum: f64 = weights.iter().sum();
    if !(weight_sum > 0.0) {
        return Err(ExplanationError::Regression("sample weights sum to zero".into()));
    }

    let x = Array2::from_shape_fn((n, p), |(i, j)| features[i][j]);
    let y = Array1::from(targets.to_vec());
    let w = Array1::from(weights.to_vec());

    let x_mean = x.t().dot(&w) / weight_sum;
    let y_mean = y.dot(&w) / weight_sum;

    // Normal equations: (Xcᵀ W Xc + αI) β = Xcᵀ W yc
    let xc = &x - &x_mean.view().insert_axis(Axis(0));
    let yc = &y - y_mean;
    let weighted_xc = &xc * &w.view().insert_axis(Axis(1));
    let gram = weighted_xc.t().dot(&xc) + Array2::<f64>::eye(p) * alpha;
    let rhs = weighted_xc.t().dot(&yc);

    let coefficients = solve(gram, rhs)?;
    let intercept = y_mean - x_mean.dot(&coefficients);
    let coefficients = coefficients.to_vec();

    let mut fit = RidgeFit {
        coefficients,
        intercept,
        score: 0.0,
    };
    fit.score = weighted_r2(&fit, features, targets, weights, y_mean);
    Ok(fit)
}

fn weighted_r2(fit: &RidgeFit, features: &[Vec<f64>], targets: &[f64], weights: &[f64], y_mean: f64) -> f64 {
    let mut residual = 0.0;
    let mut total = 0.0;
    for ((row, y), w) in features.iter().zip(targets).zip(weights) {
        residual += w * (y - fit.predict(row)).powi(2);
        total += w * (y - y_mean).powi(2);
    }
    if total == 0.0 {
        if residual == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - residual / total
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, ExplanationError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < SINGULAR_EPSILON {
            return Err(ExplanationError::Regression("singular normal equations".into()));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail = a.slice(s![row, row + 1..]).dot(&x.slice(s![row + 1..]));
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}
