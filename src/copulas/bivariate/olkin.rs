//! # Marshall-Olkin
//!
//! $$
//! C_{\alpha,\beta}(u,v)=\min\!\left(u^{1-\alpha}v,\;u\,v^{1-\beta}\right),\qquad
//! \tau=\frac{\alpha\beta}{\alpha+\beta-\alpha\beta}
//! $$
//!
//! The copula puts mass `alpha beta / (alpha + beta - alpha beta)` on the curve
//! `u^alpha = v^beta`, so `h(. | v)` jumps there. The H-inverse maps every probability
//! inside the jump to the curve itself.
//!
use super::inversion::RootFindResult;
use super::CopulaType;
use crate::error::CopulaResult;
use crate::traits::BivariateExt;

/// `theta = [alpha, beta]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Olkin;

const BOUND: f64 = 1e-4;

impl BivariateExt for Olkin {
  fn r#type(&self) -> CopulaType {
    CopulaType::Olkin
  }

  fn theta_bounds(&self) -> Vec<(f64, f64)> {
    vec![(BOUND, 1.0 - BOUND), (BOUND, 1.0 - BOUND)]
  }

  fn theta0(&self) -> Vec<f64> {
    vec![0.5, 0.7]
  }

  fn pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let (alpha, beta) = (theta[0], theta[1]);
    if u.powf(alpha) >= v.powf(beta) {
      (1.0 - alpha) * u.powf(-alpha)
    } else {
      (1.0 - beta) * v.powf(-beta)
    }
  }

  fn cdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let (alpha, beta) = (theta[0], theta[1]);
    if u.powf(alpha) >= v.powf(beta) {
      u.powf(1.0 - alpha) * v
    } else {
      u * v.powf(1.0 - beta)
    }
  }

  fn h(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let (alpha, beta) = (theta[0], theta[1]);
    if u.powf(alpha) >= v.powf(beta) {
      u.powf(1.0 - alpha)
    } else {
      (1.0 - beta) * u * v.powf(-beta)
    }
  }

  fn hinv(&self, p: f64, v: f64, theta: &[f64]) -> RootFindResult {
    let (alpha, beta) = (theta[0], theta[1]);
    let curve = v.powf(beta / alpha);

    let below = p * v.powf(beta) / (1.0 - beta);
    if below < curve {
      return RootFindResult::analytic(below);
    }
    let above = p.powf(1.0 / (1.0 - alpha));
    if above >= curve {
      return RootFindResult::analytic(above);
    }
    RootFindResult::analytic(curve)
  }

  fn kendall_tau(&self, theta: &[f64]) -> f64 {
    let (alpha, beta) = (theta[0], theta[1]);
    alpha * beta / (alpha + beta - alpha * beta)
  }

  /// Symmetric solution `alpha = beta`.
  fn theta_from_tau(&self, tau: f64) -> CopulaResult<Vec<f64>> {
    let s = if tau <= 0.0 {
      BOUND
    } else {
      (2.0 * tau / (1.0 + tau)).clamp(BOUND, 1.0 - BOUND)
    };
    Ok(vec![s, s])
  }

  fn transpose_theta(&self, theta: &[f64]) -> Vec<f64> {
    vec![theta[1], theta[0]]
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  const THETA: [f64; 2] = [0.4, 0.7];

  #[test]
  fn inverse_recovers_h_off_the_singular_curve() {
    let v: f64 = 0.5;
    let curve = v.powf(THETA[1] / THETA[0]);
    let jump_lo = (1.0 - THETA[1]) * curve * v.powf(-THETA[1]);
    let jump_hi = curve.powf(1.0 - THETA[0]);

    for p in [0.05, 0.5 * jump_lo, 0.5 * (jump_hi + 1.0), 0.99] {
      let u = Olkin.hinv(p, v, &THETA).value;
      assert_abs_diff_eq!(Olkin.h(u, v, &THETA), p, epsilon = 1e-10);
    }
  }

  #[test]
  fn probabilities_inside_the_jump_map_to_the_curve() {
    let v: f64 = 0.5;
    let curve = v.powf(THETA[1] / THETA[0]);
    let jump_lo = (1.0 - THETA[1]) * curve * v.powf(-THETA[1]);
    let jump_hi = curve.powf(1.0 - THETA[0]);
    assert!(jump_lo < jump_hi);

    let u = Olkin.hinv(0.5 * (jump_lo + jump_hi), v, &THETA).value;
    assert_abs_diff_eq!(u, curve, epsilon = 1e-12);
  }

  #[test]
  fn transposition_swaps_the_parameters() {
    let swapped = Olkin.transpose_theta(&THETA);
    for (u, v) in [(0.2, 0.7), (0.6, 0.3)] {
      assert_abs_diff_eq!(
        Olkin.cdf(v, u, &swapped),
        Olkin.cdf(u, v, &THETA),
        epsilon = 1e-14
      );
    }
  }

  #[test]
  fn symmetric_tau_inversion() {
    let theta = Olkin.theta_from_tau(0.25).unwrap();
    assert_abs_diff_eq!(theta[0], theta[1]);
    assert_abs_diff_eq!(Olkin.kendall_tau(&theta), 0.25, epsilon = 1e-12);
  }
}
