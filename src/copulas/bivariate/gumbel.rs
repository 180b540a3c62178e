//! # Gumbel
//!
//! $$
//! C_\theta(u,v)=\exp\!\left(-\left[(-\ln u)^\theta+(-\ln v)^\theta\right]^{1/\theta}\right),
//! \qquad \tau=1-\frac1\theta
//! $$
//!
use super::CopulaType;
use crate::error::CopulaResult;
use crate::traits::BivariateExt;

#[derive(Debug, Clone, Copy, Default)]
pub struct Gumbel;

/// `ln((-ln u)^t + (-ln v)^t)`.
fn ln_a(u: f64, v: f64, t: f64) -> f64 {
  let (lx, ly) = (t * (-u.ln()).ln(), t * (-v.ln()).ln());
  let m = lx.max(ly);
  m + ((lx - m).exp() + (ly - m).exp()).ln()
}

impl BivariateExt for Gumbel {
  fn r#type(&self) -> CopulaType {
    CopulaType::Gumbel
  }

  fn theta_bounds(&self) -> Vec<(f64, f64)> {
    vec![(1.0 + 1e-6, 40.0)]
  }

  fn theta0(&self) -> Vec<f64> {
    vec![2.0]
  }

  fn pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    self.log_pdf(u, v, theta).exp()
  }

  fn log_pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let t = theta[0];
    let (x, y) = (-u.ln(), -v.ln());
    let la = ln_a(u, v, t);
    let a_root = (la / t).exp();
    -a_root + (t - 1.0) * (x.ln() + y.ln()) + x + y + (1.0 / t - 2.0) * la
      + (a_root + t - 1.0).ln()
  }

  fn cdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let t = theta[0];
    (-(ln_a(u, v, t) / t).exp()).exp()
  }

  fn h(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let t = theta[0];
    let y = -v.ln();
    let la = ln_a(u, v, t);
    (-(la / t).exp() + (1.0 / t - 1.0) * la + (t - 1.0) * y.ln() + y).exp()
  }

  fn generator(&self, t: f64, theta: &[f64]) -> Option<f64> {
    Some((-t.ln()).powf(theta[0]))
  }

  fn generator_prime(&self, t: f64, theta: &[f64]) -> Option<f64> {
    let th = theta[0];
    Some(-th * (-t.ln()).powf(th - 1.0) / t)
  }

  fn kendall_tau(&self, theta: &[f64]) -> f64 {
    1.0 - 1.0 / theta[0]
  }

  fn theta_from_tau(&self, tau: f64) -> CopulaResult<Vec<f64>> {
    let (lo, hi) = self.theta_bounds()[0];
    if tau <= 0.0 {
      return Ok(vec![lo]);
    }
    Ok(vec![(1.0 / (1.0 - tau)).clamp(lo, hi)])
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::copulas::bivariate::legendre_64;

  #[test]
  fn generator_integral_matches_closed_form_tau() {
    for theta in [1.3, 2.0, 5.0] {
      let ratio = |t: f64| {
        Gumbel.generator(t, &[theta]).unwrap() / Gumbel.generator_prime(t, &[theta]).unwrap()
      };
      let tau = 1.0 + 4.0 * legendre_64().integrate(0.0, 1.0, ratio);
      assert_abs_diff_eq!(tau, Gumbel.kendall_tau(&[theta]), epsilon = 1e-8);
    }
  }

  #[test]
  fn density_is_derivative_of_h() {
    let du = 1e-6;
    for theta in [1.2, 3.5] {
      for (u, v) in [(0.25, 0.4), (0.7, 0.85)] {
        let fd = (Gumbel.h(u + du, v, &[theta]) - Gumbel.h(u - du, v, &[theta])) / (2.0 * du);
        assert_abs_diff_eq!(Gumbel.pdf(u, v, &[theta]), fd, epsilon = 1e-5);
      }
    }
  }

  #[test]
  fn numeric_inverse_recovers_h() {
    for (p, v) in [(0.1, 0.6), (0.5, 0.5), (0.97, 0.05)] {
      let u = Gumbel.hinv(p, v, &[2.5]);
      assert!(u.converged);
      assert_abs_diff_eq!(Gumbel.h(u.value, v, &[2.5]), p, epsilon = 1e-8);
    }
  }
}
