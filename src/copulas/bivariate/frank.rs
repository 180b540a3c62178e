//! # Frank
//!
//! $$
//! C_\theta(u,v)=-\frac1\theta\ln\!\left(1+\frac{(e^{-\theta u}-1)(e^{-\theta v}-1)}{e^{-\theta}-1}\right),
//! \qquad \tau=1-\frac4\theta\bigl(1-D_1(\theta)\bigr)
//! $$
//!
use super::inversion::RootFindResult;
use super::legendre_64;
use super::CopulaType;
use crate::traits::BivariateExt;

#[derive(Debug, Clone, Copy, Default)]
pub struct Frank;

impl Frank {
  /// Debye function of order one, `D_1(x) = x^-1 \int_0^x t / (e^t - 1) dt`.
  fn debye1(x: f64) -> f64 {
    legendre_64().integrate(0.0, x, |t| t / t.exp_m1()) / x
  }

  /// `ln(1 - e^{-x})` for `x >= 0`.
  fn ln_one_minus_exp(x: f64) -> f64 {
    (-(-x).exp_m1()).ln()
  }

  /// Logs of the two nonnegative terms whose sum is `|(e^{-t} - 1) + (e^{-tu} - 1)(e^{-tv} - 1)|`:
  /// `e^{-tv}(1 - e^{-tu})` and `e^{-tu}(1 - e^{-t(1-u)})`.
  fn ln_terms(u: f64, v: f64, t: f64) -> (f64, f64) {
    (
      -t * v + Self::ln_one_minus_exp(t * u),
      -t * u + Self::ln_one_minus_exp(t * (1.0 - u)),
    )
  }
}

fn log_add_exp(a: f64, b: f64) -> f64 {
  let m = a.max(b);
  if m.is_infinite() {
    return m;
  }
  m + (-(a - b).abs()).exp().ln_1p()
}

impl BivariateExt for Frank {
  fn r#type(&self) -> CopulaType {
    CopulaType::Frank
  }

  fn theta_bounds(&self) -> Vec<(f64, f64)> {
    vec![(1e-6, 80.0)]
  }

  fn theta0(&self) -> Vec<f64> {
    vec![1.0]
  }

  fn pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    self.log_pdf(u, v, theta).exp()
  }

  fn log_pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let t = theta[0];
    let (ln_n, ln_m) = Self::ln_terms(u, v, t);
    t.ln() + Self::ln_one_minus_exp(t) - t * (u + v) - 2.0 * log_add_exp(ln_n, ln_m)
  }

  fn cdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let t = theta[0];
    let (ln_n, ln_m) = Self::ln_terms(u, v, t);
    let c = (Self::ln_one_minus_exp(t) - log_add_exp(ln_n, ln_m)) / t;
    c.clamp(0.0, u.min(v))
  }

  /// `h = 1 / (1 + r)` with `r` the ratio of the two denominator terms.
  fn h(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let t = theta[0];
    let (ln_n, ln_m) = Self::ln_terms(u, v, t);
    1.0 / (1.0 + (ln_m - ln_n).exp())
  }

  /// Solves `r = (1 - p) / p` for `x = e^{-tu}`:
  /// `x = (e^{-t} + r e^{-tv}) / (1 + r e^{-tv})`.
  fn hinv(&self, p: f64, v: f64, theta: &[f64]) -> RootFindResult {
    let t = theta[0];
    let ln_rv = (1.0 - p).ln() - p.ln() - t * v;
    let ln_scale = log_add_exp(0.0, ln_rv);
    let ln_x = log_add_exp(-t, ln_rv) - ln_scale;
    let u = if ln_x > -std::f64::consts::LN_2 {
      // near u = 0, go through 1 - x to keep relative accuracy
      let one_minus_x = (Self::ln_one_minus_exp(t) - ln_scale).exp();
      -(-one_minus_x).ln_1p() / t
    } else {
      -ln_x / t
    };
    RootFindResult::analytic(u.clamp(0.0, 1.0))
  }

  fn generator(&self, t: f64, theta: &[f64]) -> Option<f64> {
    let th = theta[0];
    Some(-((-th * t).exp_m1() / (-th).exp_m1()).ln())
  }

  fn generator_prime(&self, t: f64, theta: &[f64]) -> Option<f64> {
    let th = theta[0];
    Some(th * (-th * t).exp() / (-th * t).exp_m1())
  }

  fn kendall_tau(&self, theta: &[f64]) -> f64 {
    let t = theta[0];
    1.0 - 4.0 / t * (1.0 - Self::debye1(t))
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::copulas::bivariate::CopulaModel;
  use crate::copulas::bivariate::Rotation;

  #[test]
  fn tau_matches_tabulated_value() {
    assert_abs_diff_eq!(Frank.kendall_tau(&[5.7363]), 0.5, epsilon = 1e-3);
    assert!(Frank.kendall_tau(&[1e-4]).abs() < 1e-4);
  }

  #[test]
  fn tau_inversion_round_trips() {
    for theta in [0.5, 3.0, 12.0, 40.0] {
      let tau = Frank.kendall_tau(&[theta]);
      let back = Frank.theta_from_tau(tau).unwrap()[0];
      assert_abs_diff_eq!(back, theta, epsilon = 1e-6 * theta.max(1.0));
    }
  }

  #[test]
  fn closed_form_inverse_agrees_with_h() {
    for theta in [0.3, 7.0, 60.0] {
      for (p, v) in [(0.1, 0.2), (0.5, 0.5), (0.93, 0.71)] {
        let u = Frank.hinv(p, v, &[theta]).value;
        assert_abs_diff_eq!(Frank.h(u, v, &[theta]), p, epsilon = 1e-9);
      }
    }
  }

  #[test]
  fn density_is_derivative_of_h() {
    let du = 1e-6;
    for (u, v) in [(0.2, 0.3), (0.6, 0.9)] {
      let fd = (Frank.h(u + du, v, &[4.0]) - Frank.h(u - du, v, &[4.0])) / (2.0 * du);
      assert_abs_diff_eq!(Frank.pdf(u, v, &[4.0]), fd, epsilon = 1e-5);
    }
  }

  #[test]
  fn strong_dependence_keeps_inverse_law_in_every_rotation() {
    let grid = [1e-3, 0.05, 0.3, 0.5, 0.8, 0.97, 0.999];
    for theta in [40.0, 80.0] {
      for rotation in Rotation::ALL {
        let m = CopulaModel::with_theta(CopulaType::Frank, rotation, vec![theta]).unwrap();
        for &p in &grid {
          for &v in &grid {
            let u = m.hinv(p, v).value_or_clamped();
            assert_abs_diff_eq!(m.h(u, v), p, epsilon = 1e-8);
          }
        }
        for &u in &grid {
          for &v in &grid {
            assert!(m.pdf(u, v).is_finite(), "{rotation} {theta} ({u}, {v})");
            let c = m.cdf(u, v);
            assert!((0.0..=1.0).contains(&c));
          }
        }
      }
    }
  }

  #[test]
  fn strong_dependence_density_matches_h_slope() {
    let du = 1e-6;
    for (u, v) in [(0.3, 0.35), (0.6, 0.62)] {
      let fd = (Frank.h(u + du, v, &[40.0]) - Frank.h(u - du, v, &[40.0])) / (2.0 * du);
      assert_abs_diff_eq!(Frank.pdf(u, v, &[40.0]), fd, epsilon = 1e-4);
    }
  }
}
