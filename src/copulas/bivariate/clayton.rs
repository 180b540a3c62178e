//! # Clayton
//!
//! $$
//! C_\theta(u,v)=\left(u^{-\theta}+v^{-\theta}-1\right)^{-1/\theta},\qquad \tau=\frac{\theta}{\theta+2}
//! $$
//!
use super::inversion::RootFindResult;
use super::CopulaType;
use crate::error::CopulaResult;
use crate::traits::BivariateExt;

#[derive(Debug, Clone, Copy, Default)]
pub struct Clayton;

/// `ln(u^-t + v^-t - 1)` without overflowing for small margins.
fn ln_s(u: f64, v: f64, t: f64) -> f64 {
  let (lu, lv) = (-t * u.ln(), -t * v.ln());
  let m = lu.max(lv);
  m + ((lu - m).exp() + (lv - m).exp() - (-m).exp()).ln()
}

fn softplus(x: f64) -> f64 {
  if x > 30.0 {
    x + (-x).exp().ln_1p()
  } else {
    x.exp().ln_1p()
  }
}

impl BivariateExt for Clayton {
  fn r#type(&self) -> CopulaType {
    CopulaType::Clayton
  }

  fn theta_bounds(&self) -> Vec<(f64, f64)> {
    vec![(1e-6, 60.0)]
  }

  fn theta0(&self) -> Vec<f64> {
    vec![1.0]
  }

  fn pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    self.log_pdf(u, v, theta).exp()
  }

  fn log_pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let t = theta[0];
    t.ln_1p() - (1.0 + t) * (u.ln() + v.ln()) - (1.0 + 2.0 * t) / t * ln_s(u, v, t)
  }

  fn cdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let t = theta[0];
    (-ln_s(u, v, t) / t).exp()
  }

  fn h(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let t = theta[0];
    (-(1.0 + t) * v.ln() - (1.0 + t) / t * ln_s(u, v, t)).exp()
  }

  fn hinv(&self, p: f64, v: f64, theta: &[f64]) -> RootFindResult {
    let t = theta[0];
    // u^-t = v^-t (p^(-t / (1 + t)) - 1) + 1
    let a = -t * v.ln() + (-t / (1.0 + t) * p.ln()).exp_m1().ln();
    RootFindResult::analytic((-softplus(a) / t).exp())
  }

  fn generator(&self, t: f64, theta: &[f64]) -> Option<f64> {
    let th = theta[0];
    Some((t.powf(-th) - 1.0) / th)
  }

  fn generator_prime(&self, t: f64, theta: &[f64]) -> Option<f64> {
    Some(-t.powf(-theta[0] - 1.0))
  }

  fn kendall_tau(&self, theta: &[f64]) -> f64 {
    theta[0] / (theta[0] + 2.0)
  }

  fn theta_from_tau(&self, tau: f64) -> CopulaResult<Vec<f64>> {
    let (lo, hi) = self.theta_bounds()[0];
    if tau <= 0.0 {
      return Ok(vec![lo]);
    }
    Ok(vec![(2.0 * tau / (1.0 - tau)).clamp(lo, hi)])
  }
}
