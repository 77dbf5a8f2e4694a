//! Moran's I: is a vector (here, regression residuals) spatially clustered?

use anyhow::{bail, Result};

use crate::weights::SpatialWeights;

use super::{normal_cdf, two_sided_p};

/// Moran's I statistic with the normality-assumption z-test
/// (Cliff–Ord moments from n, S0, S1, S2).
#[derive(Debug, Clone)]
pub struct MoranTest {
    pub statistic: f64,
    pub expectation: f64,
    pub variance: f64,
    pub z_value: f64,
    pub p_value: f64,
}

impl MoranTest {
    /// One-sided p for positive autocorrelation (clustering).
    pub fn p_clustered(&self) -> f64 {
        1.0 - normal_cdf(self.z_value)
    }
}

/// Test `values` against the weights structure.
pub fn moran_test(values: &[f64], weights: &SpatialWeights) -> Result<MoranTest> {
    let n = values.len();
    if n != weights.len() {
        bail!("Moran test: {} values against {} weight rows", n, weights.len());
    }
    if n < 3 {
        bail!("Moran test needs at least 3 observations, got {n}");
    }

    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let z: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let ss: f64 = z.iter().map(|v| v * v).sum();
    if ss == 0.0 {
        bail!("Moran test: input vector is constant");
    }

    let s0 = weights.s0();
    let s1 = weights.s1();
    let s2 = weights.s2();
    if s0 == 0.0 {
        bail!("Moran test: weights structure has no edges");
    }

    let statistic = (nf / s0) * weights.cross_product(&z) / ss;
    let expectation = -1.0 / (nf - 1.0);
    let variance = (nf * nf * s1 - nf * s2 + 3.0 * s0 * s0)
        / ((nf * nf - 1.0) * s0 * s0)
        - expectation * expectation;
    if variance <= 0.0 {
        bail!("Moran test: non-positive variance {variance}");
    }

    let z_value = (statistic - expectation) / variance.sqrt();
    Ok(MoranTest {
        statistic,
        expectation,
        variance,
        z_value,
        p_value: two_sided_p(z_value),
    })
}

#[cfg(test)]
mod tests {
    use crate::weights::{grid_neighbors, SpatialWeights};

    use super::*;

    fn grid_weights(rows: usize, cols: usize) -> SpatialWeights {
        SpatialWeights::from_neighbors(grid_neighbors(rows, cols))
    }

    #[test]
    fn gradient_is_clustered() {
        // Smooth east-west gradient over a 6x6 grid: strong positive I.
        let weights = grid_weights(6, 6);
        let values: Vec<f64> = (0..36).map(|i| (i % 6) as f64).collect();

        let test = moran_test(&values, &weights).unwrap();
        assert!(test.statistic > 0.4, "I = {}", test.statistic);
        assert!(test.p_value < 0.05);
    }

    #[test]
    fn checkerboard_is_dispersed() {
        let weights = grid_weights(6, 6);
        let values: Vec<f64> = (0..36)
            .map(|i| if (i / 6 + i % 6) % 2 == 0 { 1.0 } else { -1.0 })
            .collect();

        let test = moran_test(&values, &weights).unwrap();
        assert!(test.statistic < -0.9, "I = {}", test.statistic);
        assert!(test.p_value < 0.05);
    }

    #[test]
    fn constant_vector_is_rejected() {
        let weights = grid_weights(3, 3);
        assert!(moran_test(&[5.0; 9], &weights).is_err());
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let weights = grid_weights(3, 3);
        assert!(moran_test(&[1.0, 2.0], &weights).is_err());
    }
}
