use ndarray::Array1;
use statrs::distribution::Continuous;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;
use statrs::statistics::Distribution;

use crate::error::CopulaError;
use crate::error::CopulaResult;
use crate::traits::MarginalExt;

/// Normal marginal fitted by sample mean and standard deviation.
#[derive(Debug, Clone)]
pub struct GaussianUnivariate {
  dist: Normal,
}

impl GaussianUnivariate {
  pub fn new(mean: f64, std: f64) -> CopulaResult<Self> {
    let dist = Normal::new(mean, std)
      .map_err(|e| CopulaError::InvalidParameter(format!("normal marginal: {e}")))?;
    Ok(Self { dist })
  }

  pub fn fit(column: &Array1<f64>) -> CopulaResult<Self> {
    let n = column.len() as f64;
    if n < 2.0 {
      return Err(CopulaError::InvalidInput(
        "a marginal needs at least 2 observations".into(),
      ));
    }
    let mean = column.mean().unwrap_or(0.0);
    let var = column.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Self::new(mean, var.sqrt().max(1e-12))
  }

  pub fn mean(&self) -> f64 {
    self.dist.mean().unwrap_or(0.0)
  }

  pub fn std_dev(&self) -> f64 {
    self.dist.std_dev().unwrap_or(1.0)
  }

  pub fn pdf(&self, x: f64) -> f64 {
    self.dist.pdf(x)
  }
}

impl MarginalExt for GaussianUnivariate {
  fn cdf(&self, x: f64) -> f64 {
    self.dist.cdf(x)
  }

  fn ppf(&self, p: f64) -> f64 {
    self.dist.inverse_cdf(p)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  #[test]
  fn fit_recovers_moments() {
    let m = GaussianUnivariate::fit(&array![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    assert_abs_diff_eq!(m.mean(), 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(m.std_dev(), 2.5f64.sqrt(), epsilon = 1e-12);
    assert_abs_diff_eq!(m.ppf(m.cdf(4.2)), 4.2, epsilon = 1e-9);
  }

  #[test]
  fn too_few_points_are_rejected() {
    assert!(GaussianUnivariate::fit(&array![1.0]).is_err());
  }
}
