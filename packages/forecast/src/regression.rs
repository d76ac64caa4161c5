//! Gaussian-prior linear regression.
//!
//! With coefficient prior `b ~ N(0, sigma^2 * diag(1 / penalty))` and
//! Gaussian noise of variance `sigma^2`, the posterior mean solves
//! `(X'X + P) b = X'y` and the posterior covariance is
//! `sigma^2 (X'X + P)^-1`. The normal equations are solved by Cholesky
//! factorisation; `X'X + P` is positive definite whenever every penalty is
//! positive.

use ndarray::{Array1, Array2, ArrayView1};

use crate::ForecastError;

/// Posterior of a penalized fit.
#[derive(Debug, Clone)]
pub struct Posterior {
    /// Posterior mean of the coefficients.
    pub coefficients: Array1<f64>,
    /// `(X'X + P)^-1`; the coefficient covariance divided by `sigma^2`.
    pub precision_inverse: Array2<f64>,
    /// Residual sum of squares at the posterior mean.
    pub rss: f64,
    /// Effective degrees of freedom, `tr((X'X + P)^-1 X'X)`.
    pub edf: f64,
    /// Number of rows fitted.
    pub n_rows: usize,
}

impl Posterior {
    /// Residual degrees of freedom, at least one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn residual_dof(&self) -> f64 {
        (self.n_rows as f64 - self.edf).max(1.0)
    }

    /// Noise variance estimate `RSS / residual_dof`.
    #[must_use]
    pub fn noise_variance(&self) -> f64 {
        self.rss / self.residual_dof()
    }

    /// Posterior mean prediction for one design row.
    #[must_use]
    pub fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        row.dot(&self.coefficients)
    }

    /// Predictive variance for one design row: noise plus coefficient
    /// uncertainty.
    #[must_use]
    pub fn predictive_variance(&self, row: ArrayView1<'_, f64>) -> f64 {
        let leverage = row.dot(&self.precision_inverse.dot(&row));
        self.noise_variance() * (1.0 + leverage.max(0.0))
    }
}

/// Lower-triangular Cholesky factor of a symmetric positive definite matrix,
/// or `None` if the matrix is not positive definite.
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if !(diag > 0.0 && diag.is_finite()) {
            return None;
        }
        let diag = diag.sqrt();
        l[[j, j]] = diag;
        for i in j + 1..n {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = sum / diag;
        }
    }
    Some(l)
}

/// Solves `L L' x = b` given the Cholesky factor `L`.
fn cholesky_solve(l: &Array2<f64>, b: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in i + 1..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Fits `y ~ X b` under per-column ridge `penalty` (the prior precision of
/// each coefficient in units of the noise).
///
/// # Errors
///
/// Returns [`ForecastError::Numerical`] if the shapes disagree or the
/// penalized normal equations are not positive definite.
pub fn fit_penalized(
    x: &Array2<f64>,
    y: &Array1<f64>,
    penalty: &Array1<f64>,
) -> Result<Posterior, ForecastError> {
    let (n_rows, n_cols) = x.dim();
    if y.len() != n_rows || penalty.len() != n_cols {
        return Err(ForecastError::Numerical {
            message: format!(
                "design is {n_rows}x{n_cols} but got {} responses and {} penalties",
                y.len(),
                penalty.len()
            ),
        });
    }

    let mut precision = x.t().dot(x);
    for (j, p) in penalty.iter().enumerate() {
        precision[[j, j]] += p;
    }

    let l = cholesky(&precision).ok_or_else(|| ForecastError::Numerical {
        message: "penalized normal equations are not positive definite".to_string(),
    })?;

    let rhs = x.t().dot(y);
    let coefficients = cholesky_solve(&l, rhs.view());

    let mut precision_inverse = Array2::<f64>::zeros((n_cols, n_cols));
    let mut unit = Array1::<f64>::zeros(n_cols);
    for j in 0..n_cols {
        unit[j] = 1.0;
        let column = cholesky_solve(&l, unit.view());
        precision_inverse.column_mut(j).assign(&column);
        unit[j] = 0.0;
    }

    let residuals = y - &x.dot(&coefficients);
    let rss = residuals.dot(&residuals);

    // tr(C X'X) = n_cols - tr(C P) for diagonal P.
    #[allow(clippy::cast_precision_loss)]
    let edf = (n_cols as f64
        - precision_inverse
            .diag()
            .iter()
            .zip(penalty)
            .map(|(c, p)| c * p)
            .sum::<f64>())
    .max(0.0);

    log::debug!(
        "Penalized fit: {n_rows} rows, {n_cols} columns, rss {rss:.6}, edf {edf:.2}"
    );

    Ok(Posterior {
        coefficients,
        precision_inverse,
        rss,
        edf,
        n_rows,
    })
}

/// Sum of `coefficients[cols] * row[cols]` for a column range.
#[must_use]
pub fn partial_dot(
    row: ArrayView1<'_, f64>,
    coefficients: &Array1<f64>,
    cols: std::ops::Range<usize>,
) -> f64 {
    row.slice(ndarray::s![cols.clone()])
        .dot(&coefficients.slice(ndarray::s![cols]))
}

/// Stacks design rows into a matrix.
///
/// # Errors
///
/// Returns [`ForecastError::Numerical`] if rows have different lengths.
pub fn stack_rows(rows: &[Vec<f64>], n_cols: usize) -> Result<Array2<f64>, ForecastError> {
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), n_cols), flat).map_err(|e| ForecastError::Numerical {
        message: format!("ragged design matrix: {e}"),
    })
}
