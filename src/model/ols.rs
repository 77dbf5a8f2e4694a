//! Ordinary least squares, the baseline and SLX specifications.

use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};

use crate::weights::SpatialWeights;

use super::{design_matrix, ols_solve, two_sided_p, Coefficient, LN_2PI};

/// A fitted least-squares model.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub name: String,
    pub coefficients: Vec<Coefficient>,
    pub residuals: Vec<f64>,
    pub sigma2: f64,
    pub r_squared: f64,
    pub log_lik: f64,
    pub aic: f64,
    pub n: usize,
}

/// Fit `y ~ 1 + predictors` by OLS (normal equations, Cholesky).
pub fn fit_ols(name: &str, y: &[f64], predictors: &[(&str, &[f64])]) -> Result<OlsFit> {
    let n = y.len();
    let k = predictors.len() + 1;
    if n <= k {
        bail!("OLS '{name}': {n} observations for {k} parameters");
    }

    let x: DMatrix<f64> = design_matrix(n, predictors)?;
    let yv = DVector::from_column_slice(y);

    let (beta, xtx_inv) = ols_solve(&x, &yv)
        .map_err(|e| e.context(format!("OLS '{name}'")))?;

    let fitted = &x * &beta;
    let residuals = &yv - &fitted;
    let rss: f64 = residuals.iter().map(|e| e * e).sum();

    let mean = yv.iter().sum::<f64>() / n as f64;
    let tss: f64 = yv.iter().map(|v| (v - mean) * (v - mean)).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };

    let sigma2 = rss / (n - k) as f64;
    let log_lik = -0.5 * n as f64 * (LN_2PI + (rss / n as f64).ln() + 1.0);
    // Parameter count for AIC includes the error variance.
    let aic = -2.0 * log_lik + 2.0 * (k as f64 + 1.0);

    let mut names = vec!["(Intercept)".to_string()];
    names.extend(predictors.iter().map(|(name, _)| name.to_string()));

    let coefficients = names.into_iter().enumerate()
        .map(|(j, coef_name)| {
            let estimate = beta[j];
            let std_err = (sigma2 * xtx_inv[(j, j)]).sqrt();
            let t_value = estimate / std_err;
            Coefficient {
                name: coef_name,
                estimate,
                std_err,
                t_value,
                p_value: two_sided_p(t_value),
            }
        })
        .collect();

    Ok(OlsFit {
        name: name.to_string(),
        coefficients,
        residuals: residuals.iter().copied().collect(),
        sigma2,
        r_squared,
        log_lik,
        aic,
        n,
    })
}

/// Fit the spatially-lagged-X model: `y ~ 1 + x + Wx`, estimated by OLS on
/// the augmented design matrix.
pub fn fit_slx(
    name: &str,
    y: &[f64],
    x_name: &str,
    x: &[f64],
    weights: &SpatialWeights,
) -> Result<OlsFit> {
    if x.len() != weights.len() {
        bail!("SLX '{name}': {} observations against {} weight rows", x.len(), weights.len());
    }
    let lagged = weights.lag(x);
    let lag_name = format!("lag.{x_name}");
    fit_ols(name, y, &[(x_name, x), (&lag_name, &lagged)])
}
