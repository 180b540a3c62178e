//! # Mixture
//!
//! $$
//! C(u,v)=\frac{w_a\,C_a(u,v;\theta_a)+w_b\,C_b(u,v;\theta_b)}{w_a+w_b}
//! $$
//!
//! Parameter layout is `theta_a ++ theta_b ++ [w_a, w_b]`. Components keep their own
//! rotation; the mixture itself is always unrotated.
//!
use super::CopulaModel;
use super::CopulaType;
use crate::error::CopulaError;
use crate::error::CopulaResult;
use crate::traits::BivariateExt;

const WEIGHT_BOUNDS: (f64, f64) = (1e-3, 1.0);

#[derive(Debug, Clone)]
pub struct Mixture {
  a: Box<CopulaModel>,
  b: Box<CopulaModel>,
}

impl Mixture {
  pub fn new(a: CopulaModel, b: CopulaModel) -> Self {
    Self {
      a: Box::new(a),
      b: Box::new(b),
    }
  }

  pub fn components(&self) -> (&CopulaModel, &CopulaModel) {
    (&self.a, &self.b)
  }

  pub(crate) fn transposed(&self) -> Self {
    Self::new(self.a.transposed(), self.b.transposed())
  }

  /// Splits `theta` into both component vectors and the normalised weights.
  fn split<'t>(&self, theta: &'t [f64]) -> (&'t [f64], &'t [f64], f64, f64) {
    let na = self.a.n_params();
    let nb = self.b.n_params();
    let (wa, wb) = (theta[na + nb], theta[na + nb + 1]);
    let total = wa + wb;
    (&theta[..na], &theta[na..na + nb], wa / total, wb / total)
  }

  fn blend(&self, theta: &[f64], f: impl Fn(&CopulaModel, &[f64]) -> f64) -> f64 {
    let (ta, tb, wa, wb) = self.split(theta);
    wa * f(&self.a, ta) + wb * f(&self.b, tb)
  }
}

impl BivariateExt for Mixture {
  fn r#type(&self) -> CopulaType {
    CopulaType::Mixture
  }

  fn theta_bounds(&self) -> Vec<(f64, f64)> {
    let mut bounds = self.a.theta_bounds();
    bounds.extend(self.b.theta_bounds());
    bounds.extend([WEIGHT_BOUNDS, WEIGHT_BOUNDS]);
    bounds
  }

  /// Components are checked against their own bounds; weights only need to be positive.
  /// `WEIGHT_BOUNDS` is the box the optimiser searches.
  fn check_theta(&self, theta: &[f64]) -> CopulaResult<()> {
    let na = self.a.n_params();
    let nb = self.b.n_params();
    if theta.len() != na + nb + 2 {
      return Err(CopulaError::InvalidParameter(format!(
        "Mixture expects {} parameters, got {}",
        na + nb + 2,
        theta.len()
      )));
    }
    self.a.family().ext().check_theta(&theta[..na])?;
    self.b.family().ext().check_theta(&theta[na..na + nb])?;
    let (wa, wb) = (theta[na + nb], theta[na + nb + 1]);
    if !(wa.is_finite() && wb.is_finite() && wa > 0.0 && wb > 0.0) {
      return Err(CopulaError::InvalidParameter(format!(
        "mixture weights must be positive and finite, got ({wa}, {wb})"
      )));
    }
    Ok(())
  }

  /// Current component parameters with equal weights.
  fn theta0(&self) -> Vec<f64> {
    let mut theta = self.a.theta().to_vec();
    theta.extend_from_slice(self.b.theta());
    theta.extend([0.5, 0.5]);
    theta
  }

  /// Weights only carry one degree of freedom.
  fn n_free(&self) -> usize {
    self.n_params() - 1
  }

  fn pdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    self.blend(theta, |m, t| m.pdf_at(u, v, t))
  }

  fn cdf(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    self.blend(theta, |m, t| m.cdf_at(u, v, t))
  }

  fn h(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    self.blend(theta, |m, t| m.h_at(u, v, t))
  }

  fn theta_from_tau(&self, _tau: f64) -> CopulaResult<Vec<f64>> {
    Err(CopulaError::InvalidParameter(
      "mixtures cannot be fitted from Kendall's tau".into(),
    ))
  }

  fn transpose_theta(&self, theta: &[f64]) -> Vec<f64> {
    let (ta, tb, _, _) = self.split(theta);
    let n = theta.len();
    let mut out = self.a.family().ext().transpose_theta(ta);
    out.extend(self.b.family().ext().transpose_theta(tb));
    out.extend_from_slice(&theta[n - 2..]);
    out
  }
}
