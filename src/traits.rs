//! # Traits
//!
//! $$
//! h(u\mid v;\theta)=\frac{\partial C(u,v;\theta)}{\partial v},\qquad
//! \tau=1+4\int_0^1\frac{\varphi(t)}{\varphi'(t)}\,dt
//! $$
//!
use roots::find_root_brent;
use roots::SimpleConvergency;

use crate::copulas::bivariate::inversion::invert_h;
use crate::copulas::bivariate::inversion::RootFindResult;
use crate::copulas::bivariate::legendre_32;
use crate::copulas::bivariate::legendre_64;
use crate::copulas::bivariate::CopulaType;
use crate::error::CopulaError;
use crate::error::CopulaResult;

/// Contract every bivariate family implements in its unrotated (0 degree) form.
///
/// All functions take the parameter vector explicitly so one family value can be
/// evaluated at many candidate parameters during likelihood maximisation. Inputs are
/// assumed to lie strictly inside the unit square; clipping and rotation are the
/// caller's job (see [`crate::copulas::bivariate::CopulaModel`]).
pub trait BivariateExt: Send + Sync {
  fn r#type(&self) -> CopulaType;

  /// Open box the parameters live in, one `(lower, upper)` pair per parameter.
  fn theta_bounds(&self) -> Vec<(f64, f64)>;

  fn theta0(&self) -> Vec<f64>;

  fn n_params(&self) -> usize {
    self.theta_bounds().len()
  }

  /// Parameters counted by information criteria.
  fn n_free(&self) -> usize {
    self.n_params()
  }

  fn check_theta(&self, theta: &[f64]) -> CopulaResult<()> {
    let bounds = self.theta_bounds();
    if theta.len() != bounds.len() {
      return Err(CopulaError::InvalidParameter(format!(
        "{:?} expects {} parameters, got {}",
        self.r#type(),
        bounds.len(),
        theta.len()
      )));
    }

    for (i, (&t, &(lo, hi))) in theta.iter().zip(bounds.iter()).enumerate() {
      if !t.is_finite() || t < lo || t > hi {
        return Err(CopulaError::InvalidParameter(format!(
          "{:?} parameter {i} = {t} outside [{lo}, {hi}]",
          self.r#type()
        )));
      }
    }

    Ok(())
  }

  fn pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64;

  fn log_pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    self.pdf(u, v, theta).ln()
  }

  /// Distribution function. Falls back to a Gauss-Legendre double integral of the density.
  fn cdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let quad = legendre_32();
    let inner = |s: f64| quad.integrate(0.0, v, |t| self.pdf(s, t, theta));
    quad.integrate(0.0, u, inner).clamp(0.0, 1.0)
  }

  fn h(&self, u: f64, v: f64, theta: &[f64]) -> f64;

  /// Inverse of `h` in its first argument. Numeric unless overridden.
  fn hinv(&self, p: f64, v: f64, theta: &[f64]) -> RootFindResult {
    invert_h(p, |x| self.h(x, v, theta), |x| self.pdf(x, v, theta))
  }

  /// Archimedean generator, `None` for non-Archimedean families.
  fn generator(&self, _t: f64, _theta: &[f64]) -> Option<f64> {
    None
  }

  fn generator_prime(&self, _t: f64, _theta: &[f64]) -> Option<f64> {
    None
  }

  fn kendall_tau(&self, theta: &[f64]) -> f64 {
    let quad = legendre_64();
    if self.generator(0.5, theta).is_some() {
      let ratio = |t: f64| match (self.generator(t, theta), self.generator_prime(t, theta)) {
        (Some(g), Some(dg)) if dg != 0.0 => g / dg,
        _ => 0.0,
      };
      return 1.0 + 4.0 * quad.integrate(0.0, 1.0, ratio);
    }

    // tau = 4 E[C(U, V)] - 1
    let quad = legendre_32();
    let inner = |u: f64| quad.integrate(0.0, 1.0, |v| self.cdf(u, v, theta) * self.pdf(u, v, theta));
    4.0 * quad.integrate(0.0, 1.0, inner) - 1.0
  }

  /// Parameters matching a Kendall's tau. One-parameter families solve `tau(theta)` by
  /// Brent's method and saturate at the bounds when tau is out of reach.
  fn theta_from_tau(&self, tau: f64) -> CopulaResult<Vec<f64>> {
    let bounds = self.theta_bounds();
    if bounds.len() != 1 {
      return Err(CopulaError::InvalidParameter(format!(
        "{:?} cannot be fitted from Kendall's tau alone",
        self.r#type()
      )));
    }

    let (lo, hi) = bounds[0];
    let f = |t: f64| self.kendall_tau(&[t]) - tau;
    let (f_lo, f_hi) = (f(lo), f(hi));
    if f_lo >= 0.0 {
      return Ok(vec![lo]);
    }
    if f_hi <= 0.0 {
      return Ok(vec![hi]);
    }

    let mut convergency = SimpleConvergency {
      eps: 1e-10,
      max_iter: 200,
    };
    find_root_brent(lo, hi, f, &mut convergency)
      .map(|t| vec![t])
      .map_err(|e| CopulaError::FitConvergence(format!("tau inversion: {e:?}")))
  }

  /// Parameters of the copula of `(V, U)`.
  fn transpose_theta(&self, theta: &[f64]) -> Vec<f64> {
    theta.to_vec()
  }
}

/// Univariate marginal model, used to map copula samples back to data units.
pub trait MarginalExt {
  fn cdf(&self, x: f64) -> f64;

  fn ppf(&self, p: f64) -> f64;
}
