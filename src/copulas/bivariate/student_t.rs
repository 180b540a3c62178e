//! # Student-t
//!
//! $$
//! h(u\mid v)=T_{\nu+1}\!\left(\frac{x-\rho y}{\sqrt{(\nu+y^2)(1-\rho^2)/(\nu+1)}}\right),
//! \quad x=T_\nu^{-1}(u),\;y=T_\nu^{-1}(v)
//! $$
//!
use std::f64::consts::FRAC_2_PI;
use std::f64::consts::FRAC_PI_2;

use statrs::function::gamma::ln_gamma;

use super::gaussian::RHO_BOUND;
use super::inversion::RootFindResult;
use super::CopulaType;
use crate::copulas::rectangle::bvt_cdf;
use crate::copulas::rectangle::t_cdf;
use crate::copulas::rectangle::t_conditional;
use crate::copulas::rectangle::t_ppf;
use crate::error::CopulaResult;
use crate::traits::BivariateExt;

/// `theta = [rho, nu]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StudentT;

impl BivariateExt for StudentT {
  fn r#type(&self) -> CopulaType {
    CopulaType::StudentT
  }

  fn theta_bounds(&self) -> Vec<(f64, f64)> {
    vec![(-RHO_BOUND, RHO_BOUND), (2.0, 100.0)]
  }

  fn theta0(&self) -> Vec<f64> {
    vec![0.7, 10.0]
  }

  fn pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    self.log_pdf(u, v, theta).exp()
  }

  fn log_pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let (rho, nu) = (theta[0], theta[1]);
    let (x, y) = (t_ppf(u, nu), t_ppf(v, nu));
    let det = 1.0 - rho * rho;
    let q = (x * x + y * y - 2.0 * rho * x * y) / (nu * det);

    ln_gamma(0.5 * (nu + 2.0)) + ln_gamma(0.5 * nu)
      - 2.0 * ln_gamma(0.5 * (nu + 1.0))
      - 0.5 * det.ln()
      - 0.5 * (nu + 2.0) * q.ln_1p()
      + 0.5 * (nu + 1.0) * ((x * x / nu).ln_1p() + (y * y / nu).ln_1p())
  }

  fn cdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let (rho, nu) = (theta[0], theta[1]);
    bvt_cdf(t_ppf(u, nu), t_ppf(v, nu), rho, nu)
  }

  fn h(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let (rho, nu) = (theta[0], theta[1]);
    t_conditional(t_ppf(u, nu), t_ppf(v, nu), rho, nu)
  }

  fn hinv(&self, p: f64, v: f64, theta: &[f64]) -> RootFindResult {
    let (rho, nu) = (theta[0], theta[1]);
    let y = t_ppf(v, nu);
    let scale = ((nu + y * y) * (1.0 - rho * rho) / (nu + 1.0)).sqrt();
    RootFindResult::analytic(t_cdf(t_ppf(p, nu + 1.0) * scale + rho * y, nu))
  }

  fn kendall_tau(&self, theta: &[f64]) -> f64 {
    FRAC_2_PI * theta[0].asin()
  }

  /// Correlation from tau; the degrees of freedom stay at the initial guess.
  fn theta_from_tau(&self, tau: f64) -> CopulaResult<Vec<f64>> {
    Ok(vec![
      (FRAC_PI_2 * tau).sin().clamp(-RHO_BOUND, RHO_BOUND),
      self.theta0()[1],
    ])
  }
}
