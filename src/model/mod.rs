//! The regression suite: OLS → SLX → SAR lag, per distance measure.
//!
//! Each specification gets a Moran's I residual diagnostic against the same
//! weights structure, and the three are ranked by AIC.

mod moran;
mod ols;
mod sar;

pub use moran::{moran_test, MoranTest};
pub use ols::{fit_ols, fit_slx, OlsFit};
pub use sar::{fit_sar, Impact, SarFit, DEFAULT_IMPACT_REPLICATIONS};

use std::fmt;

use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::weights::SpatialWeights;

pub(crate) const LN_2PI: f64 = 1.8378770664093453;

/// One row of a coefficient table.
#[derive(Debug, Clone)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_err: f64,
    pub t_value: f64,
    pub p_value: f64,
}

/// Design matrix [1 | predictors], column-major.
pub(crate) fn design_matrix(n: usize, predictors: &[(&str, &[f64])]) -> Result<DMatrix<f64>> {
    for (name, column) in predictors {
        if column.len() != n {
            bail!("predictor '{name}' has {} values for {n} observations", column.len());
        }
        if column.iter().any(|v| !v.is_finite()) {
            bail!("predictor '{name}' contains non-finite values");
        }
    }

    let k = predictors.len() + 1;
    let mut x = DMatrix::zeros(n, k);
    x.column_mut(0).fill(1.0);
    for (j, (_, column)) in predictors.iter().enumerate() {
        x.column_mut(j + 1).copy_from_slice(column);
    }
    Ok(x)
}

/// Normal-equation solve: returns (β̂, (X'X)⁻¹). Errors on a singular
/// (collinear) design.
pub(crate) fn ols_solve(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
) -> Result<(DVector<f64>, DMatrix<f64>)> {
    let xtx = x.transpose() * x;
    let chol = nalgebra::Cholesky::new(xtx)
        .ok_or_else(|| anyhow!("design matrix is singular (collinear predictors?)"))?;
    let beta = chol.solve(&(x.transpose() * y));
    let xtx_inv = chol.inverse();
    Ok((beta, xtx_inv))
}

/// Standard normal CDF via the Abramowitz–Stegun erf approximation
/// (7.1.26, |error| < 1.5e-7, plenty for p-values).
pub(crate) fn normal_cdf(z: f64) -> f64 {
    let x = z / std::f64::consts::SQRT_2;
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t * (0.254829592
        + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let erf = sign * (1.0 - poly * (-x * x).exp());

    0.5 * (1.0 + erf)
}

/// Two-sided p-value for a z (or large-sample t) statistic.
pub(crate) fn two_sided_p(z: f64) -> f64 {
    2.0 * (1.0 - normal_cdf(z.abs()))
}

/// One standard-normal draw (Box–Muller; no distribution crate in the stack).
pub(crate) fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Per-specification diagnostic row for the comparison table.
#[derive(Debug, Clone)]
pub struct ModelDiagnostics {
    pub model: String,
    pub aic: f64,
    pub log_lik: f64,
    pub residual_moran: MoranTest,
}

/// All three specifications fitted against one distance measure.
#[derive(Debug)]
pub struct MeasureAnalysis {
    pub measure: String,
    pub ols: OlsFit,
    pub slx: OlsFit,
    pub sar: SarFit,
    pub diagnostics: Vec<ModelDiagnostics>,
    /// Name of the AIC-preferred specification.
    pub preferred: String,
}

/// Fit the whole suite for one measure: turnout ~ distance.
pub fn analyze_measure(
    measure: &str,
    turnout: &[f64],
    distance: &[f64],
    weights: &SpatialWeights,
    replications: usize,
    rng: &mut impl Rng,
) -> Result<MeasureAnalysis> {
    if turnout.len() != distance.len() {
        bail!(
            "measure '{measure}': {} turnout values against {} distances",
            turnout.len(),
            distance.len()
        );
    }

    let ols = fit_ols(&format!("{measure}: OLS"), turnout, &[("distance_m", distance)])?;
    let slx = fit_slx(&format!("{measure}: SLX"), turnout, "distance_m", distance, weights)?;
    let sar = fit_sar(
        &format!("{measure}: SAR lag"),
        turnout,
        &[("distance_m", distance)],
        weights,
        replications,
        rng,
    )?;

    let diagnostics = vec![
        ModelDiagnostics {
            model: ols.name.clone(),
            aic: ols.aic,
            log_lik: ols.log_lik,
            residual_moran: moran_test(&ols.residuals, weights)?,
        },
        ModelDiagnostics {
            model: slx.name.clone(),
            aic: slx.aic,
            log_lik: slx.log_lik,
            residual_moran: moran_test(&slx.residuals, weights)?,
        },
        ModelDiagnostics {
            model: sar.name.clone(),
            aic: sar.aic,
            log_lik: sar.log_lik,
            residual_moran: moran_test(&sar.residuals, weights)?,
        },
    ];

    let preferred = diagnostics.iter()
        .min_by(|a, b| a.aic.total_cmp(&b.aic))
        .map(|d| d.model.clone())
        .unwrap_or_default();

    Ok(MeasureAnalysis { measure: measure.to_string(), ols, slx, sar, diagnostics, preferred })
}

fn write_coefficients(f: &mut fmt::Formatter<'_>, coefficients: &[Coefficient]) -> fmt::Result {
    writeln!(
        f,
        "  {:<16} {:>12} {:>12} {:>8} {:>8}",
        "term", "estimate", "std.err", "t", "p"
    )?;
    for c in coefficients {
        writeln!(
            f,
            "  {:<16} {:>12.6} {:>12.6} {:>8.3} {:>8.4}",
            c.name, c.estimate, c.std_err, c.t_value, c.p_value
        )?;
    }
    Ok(())
}

impl fmt::Display for MeasureAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.measure)?;

        writeln!(f, "{} (R² = {:.4})", self.ols.name, self.ols.r_squared)?;
        write_coefficients(f, &self.ols.coefficients)?;

        writeln!(f, "{} (R² = {:.4})", self.slx.name, self.slx.r_squared)?;
        write_coefficients(f, &self.slx.coefficients)?;

        writeln!(
            f,
            "{} (rho = {:.4}, se = {:.4}, p = {:.4})",
            self.sar.name, self.sar.rho, self.sar.rho_std_err, self.sar.rho_p_value
        )?;
        write_coefficients(f, &self.sar.coefficients)?;

        writeln!(f, "  impacts (simulated):")?;
        for impact in &self.sar.impacts {
            writeln!(
                f,
                "    {:<12} direct {:>10.6} (p {:.4})  indirect {:>10.6} (p {:.4})  total {:>10.6} (p {:.4})",
                impact.name,
                impact.direct, impact.direct_p,
                impact.indirect, impact.indirect_p,
                impact.total, impact.total_p,
            )?;
        }

        writeln!(f, "  model comparison:")?;
        writeln!(
            f,
            "    {:<28} {:>10} {:>10} {:>10} {:>10}",
            "model", "AIC", "logLik", "Moran I", "Moran p"
        )?;
        for d in &self.diagnostics {
            writeln!(
                f,
                "    {:<28} {:>10.2} {:>10.2} {:>10.4} {:>10.4}",
                d.model, d.aic, d.log_lik, d.residual_moran.statistic, d.residual_moran.p_value
            )?;
        }
        writeln!(f, "  preferred (lowest AIC): {}", self.preferred)
    }
}
