//! # Bivariate
//!
//! $$
//! C(u,v;\theta),\qquad c(u,v;\theta)=\frac{\partial^2 C}{\partial u\,\partial v},\qquad
//! \mathrm{AIC}=2\,\mathrm{NLL}+2k+\frac{2k(k+1)}{n-k-1}
//! $$
//!
//! A closed set of parametric families behind one [`BivariateExt`] contract, wrapped in a
//! [`CopulaModel`] that owns the rotation and the parameter vector.
//!
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use gauss_quad::GaussLegendre;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

use crate::error::CopulaError;
use crate::error::CopulaResult;
pub use crate::traits::BivariateExt;

pub mod clayton;
pub mod frank;
pub mod gaussian;
pub mod gumbel;
pub mod independence;
pub mod inversion;
pub mod mixture;
pub mod mle;
pub mod olkin;
pub mod rotation;
pub mod student_t;

use clayton::Clayton;
use frank::Frank;
use gaussian::Gaussian;
use gumbel::Gumbel;
use independence::Independence;
use inversion::RootFindResult;
use mixture::Mixture;
use olkin::Olkin;
pub use rotation::Rotation;
use student_t::StudentT;

/// Pseudo-observations are kept inside `(EPS, 1 - EPS)`.
pub const EPS: f64 = 1e-10;

static LEGENDRE_32: OnceLock<GaussLegendre> = OnceLock::new();
static LEGENDRE_64: OnceLock<GaussLegendre> = OnceLock::new();

pub(crate) fn legendre_32() -> &'static GaussLegendre {
  LEGENDRE_32.get_or_init(|| GaussLegendre::new(32).expect("32 is a valid Gauss-Legendre degree"))
}

pub(crate) fn legendre_64() -> &'static GaussLegendre {
  LEGENDRE_64.get_or_init(|| GaussLegendre::new(64).expect("64 is a valid Gauss-Legendre degree"))
}

pub(crate) fn clip(x: f64) -> f64 {
  if x.is_nan() {
    0.5
  } else {
    x.clamp(EPS, 1.0 - EPS)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopulaType {
  Gaussian,
  StudentT,
  Frank,
  Gumbel,
  Clayton,
  Independence,
  Olkin,
  Mixture,
}

impl CopulaType {
  pub fn name(self) -> &'static str {
    match self {
      CopulaType::Gaussian => "gauss",
      CopulaType::StudentT => "t",
      CopulaType::Frank => "frank",
      CopulaType::Gumbel => "gumbel",
      CopulaType::Clayton => "clayton",
      CopulaType::Independence => "indep",
      CopulaType::Olkin => "olkin",
      CopulaType::Mixture => "mixture",
    }
  }

  pub fn is_archimedean(self) -> bool {
    matches!(self, CopulaType::Frank | CopulaType::Gumbel | CopulaType::Clayton)
  }
}

impl FromStr for CopulaType {
  type Err = CopulaError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "gauss" | "gaussian" => Ok(CopulaType::Gaussian),
      "t" | "student" | "studentt" | "student-t" => Ok(CopulaType::StudentT),
      "frank" => Ok(CopulaType::Frank),
      "gumbel" => Ok(CopulaType::Gumbel),
      "clayton" => Ok(CopulaType::Clayton),
      "indep" | "independence" => Ok(CopulaType::Independence),
      "olkin" | "marshall-olkin" => Ok(CopulaType::Olkin),
      "mixture" => Ok(CopulaType::Mixture),
      _ => Err(CopulaError::UnknownFamily(s.to_string())),
    }
  }
}

impl fmt::Display for CopulaType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Closed set of families; every variant exposes the [`BivariateExt`] contract.
#[derive(Debug, Clone)]
pub enum Family {
  Gaussian(Gaussian),
  StudentT(StudentT),
  Frank(Frank),
  Gumbel(Gumbel),
  Clayton(Clayton),
  Independence(Independence),
  Olkin(Olkin),
  Mixture(Mixture),
}

impl Family {
  pub fn from_type(r#type: CopulaType) -> CopulaResult<Self> {
    Ok(match r#type {
      CopulaType::Gaussian => Family::Gaussian(Gaussian),
      CopulaType::StudentT => Family::StudentT(StudentT),
      CopulaType::Frank => Family::Frank(Frank),
      CopulaType::Gumbel => Family::Gumbel(Gumbel),
      CopulaType::Clayton => Family::Clayton(Clayton),
      CopulaType::Independence => Family::Independence(Independence),
      CopulaType::Olkin => Family::Olkin(Olkin),
      CopulaType::Mixture => {
        return Err(CopulaError::InvalidParameter(
          "a mixture needs its two components, use CopulaModel::mixture".into(),
        ))
      }
    })
  }

  pub fn ext(&self) -> &dyn BivariateExt {
    match self {
      Family::Gaussian(c) => c,
      Family::StudentT(c) => c,
      Family::Frank(c) => c,
      Family::Gumbel(c) => c,
      Family::Clayton(c) => c,
      Family::Independence(c) => c,
      Family::Olkin(c) => c,
      Family::Mixture(c) => c,
    }
  }

  fn transposed(&self) -> Family {
    match self {
      Family::Mixture(m) => Family::Mixture(m.transposed()),
      other => other.clone(),
    }
  }
}

/// A family together with its rotation and parameter vector.
#[derive(Debug, Clone)]
pub struct CopulaModel {
  family: Family,
  rotation: Rotation,
  theta: Vec<f64>,
  fitted: bool,
}

impl CopulaModel {
  /// Model at the family's initial guess.
  pub fn new(r#type: CopulaType, rotation: Rotation) -> CopulaResult<Self> {
    let family = Family::from_type(r#type)?;
    let theta = family.ext().theta0();
    Ok(Self {
      family,
      rotation,
      theta,
      fitted: false,
    })
  }

  pub fn with_theta(r#type: CopulaType, rotation: Rotation, theta: Vec<f64>) -> CopulaResult<Self> {
    let mut model = Self::new(r#type, rotation)?;
    model.set_theta(theta)?;
    Ok(model)
  }

  /// Two-component mixture with weights `wa`, `wb` (renormalised to sum to one).
  pub fn mixture(a: CopulaModel, b: CopulaModel, wa: f64, wb: f64) -> CopulaResult<Self> {
    if !(wa.is_finite() && wb.is_finite() && wa > 0.0 && wb > 0.0) {
      return Err(CopulaError::InvalidParameter(format!(
        "mixture weights must be positive and finite, got ({wa}, {wb})"
      )));
    }
    let family = Family::Mixture(Mixture::new(a, b));
    let mut theta = family.ext().theta0();
    let n = theta.len();
    theta[n - 2] = wa / (wa + wb);
    theta[n - 1] = wb / (wa + wb);
    family.ext().check_theta(&theta)?;
    Ok(Self {
      family,
      rotation: Rotation::R0,
      theta,
      fitted: false,
    })
  }

  pub fn r#type(&self) -> CopulaType {
    self.family.ext().r#type()
  }

  pub fn family(&self) -> &Family {
    &self.family
  }

  pub fn rotation(&self) -> Rotation {
    self.rotation
  }

  pub fn theta(&self) -> &[f64] {
    &self.theta
  }

  pub fn theta_bounds(&self) -> Vec<(f64, f64)> {
    self.family.ext().theta_bounds()
  }

  pub fn theta0(&self) -> Vec<f64> {
    self.family.ext().theta0()
  }

  pub fn n_params(&self) -> usize {
    self.family.ext().n_params()
  }

  pub fn n_free(&self) -> usize {
    self.family.ext().n_free()
  }

  pub fn is_fitted(&self) -> bool {
    self.fitted
  }

  pub fn set_theta(&mut self, theta: Vec<f64>) -> CopulaResult<()> {
    self.family.ext().check_theta(&theta)?;
    self.theta = theta;
    Ok(())
  }

  pub(crate) fn mark_fitted(&mut self, theta: Vec<f64>, fitted: bool) {
    self.theta = theta;
    self.fitted = fitted;
  }

  /// Copula of `(V, U)`. Used for the conditional distribution of the second margin.
  pub fn transposed(&self) -> CopulaModel {
    let ext = self.family.ext();
    Self {
      theta: ext.transpose_theta(&self.theta),
      family: self.family.transposed(),
      rotation: self.rotation.transposed(),
      fitted: self.fitted,
    }
  }

  pub fn pdf(&self, u: f64, v: f64) -> f64 {
    self.pdf_at(u, v, &self.theta)
  }

  pub fn log_pdf(&self, u: f64, v: f64) -> f64 {
    self.log_pdf_at(u, v, &self.theta)
  }

  pub fn cdf(&self, u: f64, v: f64) -> f64 {
    self.cdf_at(u, v, &self.theta)
  }

  /// `P(U <= u | V = v)`.
  pub fn h(&self, u: f64, v: f64) -> f64 {
    self.h_at(u, v, &self.theta)
  }

  /// Solves `h(x, v) = p` for `x`.
  pub fn hinv(&self, p: f64, v: f64) -> RootFindResult {
    self.hinv_at(p, v, &self.theta)
  }

  pub fn kendall_tau(&self) -> f64 {
    self.kendall_tau_at(&self.theta)
  }

  pub(crate) fn pdf_at(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let (ru, rv) = self.rotation.reflect(clip(u), clip(v));
    self.family.ext().pdf(clip(ru), clip(rv), theta).max(0.0)
  }

  pub(crate) fn log_pdf_at(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let (ru, rv) = self.rotation.reflect(clip(u), clip(v));
    self.family.ext().log_pdf(clip(ru), clip(rv), theta)
  }

  pub(crate) fn cdf_at(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    if u <= 0.0 || v <= 0.0 {
      return 0.0;
    }
    if u >= 1.0 {
      return v.min(1.0);
    }
    if v >= 1.0 {
      return u;
    }
    let (ru, rv) = self.rotation.reflect(u, v);
    let base = self.family.ext().cdf(clip(ru), clip(rv), theta);
    self.rotation.correct_cdf(base, u, v).clamp(0.0, u.min(v))
  }

  pub(crate) fn h_at(&self, u: f64, v: f64, theta: &[f64]) -> f64 {
    let (ru, rv) = self.rotation.reflect(clip(u), clip(v));
    let base = self.family.ext().h(clip(ru), clip(rv), theta);
    self.rotation.correct_h(base).clamp(0.0, 1.0)
  }

  pub(crate) fn hinv_at(&self, p: f64, v: f64, theta: &[f64]) -> RootFindResult {
    let p = self.rotation.reflect_probability(clip(p));
    let (_, rv) = self.rotation.reflect(0.5, clip(v));
    let mut res = self.family.ext().hinv(clip(p), clip(rv), theta);
    res.value = clip(self.rotation.correct_hinv(res.value_or_clamped()));
    res
  }

  pub(crate) fn kendall_tau_at(&self, theta: &[f64]) -> f64 {
    self.rotation.tau_sign() * self.family.ext().kendall_tau(theta)
  }

  /// Parameters whose Kendall's tau matches `tau` under this model's rotation.
  pub fn theta_from_tau(&self, tau: f64) -> CopulaResult<Vec<f64>> {
    self.family.ext().theta_from_tau(self.rotation.tau_sign() * tau)
  }

  /// Sets the parameters from a target Kendall's tau.
  pub fn fit_ktau(&mut self, tau: f64) -> CopulaResult<()> {
    if !(-1.0..=1.0).contains(&tau) {
      return Err(CopulaError::InvalidParameter(format!(
        "Kendall's tau {tau} outside [-1, 1]"
      )));
    }
    let theta = self.theta_from_tau(tau)?;
    self.set_theta(theta)?;
    self.fitted = true;
    Ok(())
  }

  /// Weighted negative log-likelihood at `theta`. Log densities are floored so the
  /// objective stays finite for optimisers.
  pub fn nll_at(&self, u: &[f64], v: &[f64], weights: Option<&[f64]>, theta: &[f64]) -> f64 {
    const LOG_FLOOR: f64 = -690.0;
    let mut total = 0.0;
    for i in 0..u.len() {
      let lp = self.log_pdf_at(u[i], v[i], theta);
      let lp = if lp.is_nan() { LOG_FLOOR } else { lp.max(LOG_FLOOR) };
      let w = weights.map_or(1.0, |w| w[i]);
      total -= w * lp;
    }
    total
  }

  pub fn nll(&self, u: &[f64], v: &[f64], weights: Option<&[f64]>) -> f64 {
    self.nll_at(u, v, weights, &self.theta)
  }

  /// Small-sample corrected AIC at the current parameters.
  pub fn aic(&self, u: &[f64], v: &[f64], weights: Option<&[f64]>) -> f64 {
    aic(self.nll(u, v, weights), self.n_free(), n_effective(u.len(), weights))
  }

  pub fn pdf_array(&self, u: &Array1<f64>, v: &Array1<f64>) -> Array1<f64> {
    ndarray::Zip::from(u).and(v).map_collect(|&a, &b| self.pdf(a, b))
  }

  pub fn cdf_array(&self, u: &Array1<f64>, v: &Array1<f64>) -> Array1<f64> {
    ndarray::Zip::from(u).and(v).map_collect(|&a, &b| self.cdf(a, b))
  }

  pub fn h_array(&self, u: &Array1<f64>, v: &Array1<f64>) -> Array1<f64> {
    ndarray::Zip::from(u).and(v).map_collect(|&a, &b| self.h(a, b))
  }

  pub fn hinv_array(&self, p: &Array1<f64>, v: &Array1<f64>) -> Array1<f64> {
    ndarray::Zip::from(p)
      .and(v)
      .map_collect(|&a, &b| self.hinv(a, b).value_or_clamped())
  }

  /// `n x 2` sample: `v` uniform, `u = hinv(w, v)` for an independent uniform `w`.
  pub fn sample(&self, n: usize) -> Array2<f64> {
    self.sample_with_rng(n, &mut rand::thread_rng())
  }

  pub fn sample_with_rng<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Array2<f64> {
    let unif = Uniform::new(0.0, 1.0);
    let v = Array1::<f64>::random_using(n, unif, rng);
    let w = Array1::<f64>::random_using(n, unif, rng);
    let u = self.hinv_array(&w, &v);
    ndarray::stack![Axis(1), u, v]
  }
}

/// Rows that enter the likelihood; zero-weight rows do not count.
pub fn n_effective(n: usize, weights: Option<&[f64]>) -> usize {
  weights.map_or(n, |w| w.iter().filter(|&&x| x > 0.0).count())
}

/// `2 NLL + 2k` with the small-sample correction `2k(k + 1) / (n - k - 1)`.
pub fn aic(nll: f64, k: usize, n: usize) -> f64 {
  let kf = k as f64;
  let mut score = 2.0 * nll + 2.0 * kf;
  if n > k + 1 {
    score += 2.0 * kf * (kf + 1.0) / (n - k - 1) as f64;
  }
  score
}
