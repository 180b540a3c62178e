//! # Gaussian
//!
//! $$
//! C_\rho(u,v)=\Phi_2\!\left(\Phi^{-1}(u),\Phi^{-1}(v);\rho\right),\qquad
//! h(u\mid v)=\Phi\!\left(\frac{\Phi^{-1}(u)-\rho\,\Phi^{-1}(v)}{\sqrt{1-\rho^2}}\right)
//! $$
//!
use std::f64::consts::FRAC_2_PI;
use std::f64::consts::FRAC_PI_2;

use super::inversion::RootFindResult;
use super::CopulaType;
use crate::copulas::rectangle::bvn_cdf;
use crate::copulas::rectangle::norm_cdf;
use crate::copulas::rectangle::norm_ppf;
use crate::error::CopulaResult;
use crate::traits::BivariateExt;

pub(crate) const RHO_BOUND: f64 = 1.0 - 1e-4;

#[derive(Debug, Clone, Copy, Default)]
pub struct Gaussian;

impl BivariateExt for Gaussian {
  fn r#type(&self) -> CopulaType {
    CopulaType::Gaussian
  }

  fn theta_bounds(&self) -> Vec<(f64, f64)> {
    vec![(-RHO_BOUND, RHO_BOUND)]
  }

  fn theta0(&self) -> Vec<f64> {
    vec![0.7]
  }

  fn pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    self.log_pdf(u, v, theta).exp()
  }

  fn log_pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let rho = theta[0];
    let (x, y) = (norm_ppf(u), norm_ppf(v));
    let det = 1.0 - rho * rho;
    -0.5 * det.ln() - (rho * rho * (x * x + y * y) - 2.0 * rho * x * y) / (2.0 * det)
  }

  fn cdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    bvn_cdf(norm_ppf(u), norm_ppf(v), theta[0])
  }

  fn h(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let rho = theta[0];
    norm_cdf((norm_ppf(u) - rho * norm_ppf(v)) / (1.0 - rho * rho).sqrt())
  }

  fn hinv(&self, p: f64, v: f64, theta: &[f64]) -> RootFindResult {
    let rho = theta[0];
    RootFindResult::analytic(norm_cdf(
      norm_ppf(p) * (1.0 - rho * rho).sqrt() + rho * norm_ppf(v),
    ))
  }

  fn kendall_tau(&self, theta: &[f64]) -> f64 {
    FRAC_2_PI * theta[0].asin()
  }

  fn theta_from_tau(&self, tau: f64) -> CopulaResult<Vec<f64>> {
    Ok(vec![(FRAC_PI_2 * tau).sin().clamp(-RHO_BOUND, RHO_BOUND)])
  }
}
