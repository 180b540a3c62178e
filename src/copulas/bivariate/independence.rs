//! # Independence
//!
//! $$
//! C(u,v)=uv
//! $$
//!
use super::inversion::RootFindResult;
use super::CopulaType;
use crate::error::CopulaResult;
use crate::traits::BivariateExt;

#[derive(Debug, Clone, Copy, Default)]
pub struct Independence;

impl BivariateExt for Independence {
  fn r#type(&self) -> CopulaType {
    CopulaType::Independence
  }

  fn theta_bounds(&self) -> Vec<(f64, f64)> {
    Vec::new()
  }

  fn theta0(&self) -> Vec<f64> {
    Vec::new()
  }

  fn pdf(&self, _u: f64, _v: f64, _theta: &[f64]) -> f64 {
    1.0
  }

  fn log_pdf(&self, _u: f64, _v: f64, _theta: &[f64]) -> f64 {
    0.0
  }

  fn cdf(&self, u: f64, v: f64, _theta: &[f64]) -> f64 {
    u * v
  }

  fn h(&self, u: f64, _v: f64, _theta: &[f64]) -> f64 {
    u
  }

  fn hinv(&self, p: f64, _v: f64, _theta: &[f64]) -> RootFindResult {
    RootFindResult::analytic(p)
  }

  fn kendall_tau(&self, _theta: &[f64]) -> f64 {
    0.0
  }

  fn theta_from_tau(&self, _tau: f64) -> CopulaResult<Vec<f64>> {
    Ok(Vec::new())
  }
}
