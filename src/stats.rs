//! Chi-square tail probabilities

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Probability that a chi-square variable with `dof` degrees of freedom
/// exceeds `chi2`. NaN and zero degrees of freedom give 0.
pub fn chi_square_survival(chi2: f64, dof: u32) -> f64 {
    if chi2.is_nan() {
        return 0.0;
    }
    if chi2 <= 0.0 {
        return if dof == 0 { 0.0 } else { 1.0 };
    }
    match ChiSquared::new(f64::from(dof)) {
        Ok(dist) => dist.sf(chi2),
        Err(_) => 0.0,
    }
}
