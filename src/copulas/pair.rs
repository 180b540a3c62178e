//! # Pair copula
//!
//! $$
//! \hat m=\arg\min_{m\in\mathcal M}\;\mathrm{AIC}_m
//! \quad\text{or}\quad
//! \arg\min_{m\in\mathcal M}\;\frac1n\sum_{i=1}^n\Bigl(\tfrac in-K_m\bigl(Z_{(i)}\bigr)\Bigr)^2
//! $$
//!
//! A bivariate sample, its pseudo-observations and the tournament that picks the best
//! family and rotation for it.
//!
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::debug;
use tracing::info;

use super::bivariate::aic;
use super::bivariate::clip;
use super::bivariate::n_effective;
use super::bivariate::mle::fit_mle;
use super::bivariate::mle::FitConfig;
use super::bivariate::CopulaModel;
use super::bivariate::CopulaType;
use super::bivariate::Rotation;
use super::bivariate::EPS;
use super::correlation::kendall_tau;
use super::empirical::ecdf_sorted;
use super::empirical::kendall_pseudo_obs;
use super::empirical::rank_transform;
use super::kde::GaussianKDE;
use crate::error::CopulaError;
use crate::error::CopulaResult;

/// Seed of the Monte-Carlo Kendall function, fixed so scores are reproducible.
const KENDALL_MC_SEED: u64 = 0x6b656e64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PseudoObsMethod {
  /// `rank / (n + 1)` with averaged ties.
  #[default]
  Rank,
  /// Gaussian kernel CDF with Silverman bandwidth.
  KernelCdf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionCriterion {
  #[default]
  Aic,
  /// Squared distance between the empirical and the model Kendall function.
  KendallL2,
}

#[derive(Debug, Clone)]
pub struct PairCopulaConfig {
  /// Trial set of the tournament, evaluated in order; ties keep the earlier entry.
  pub families: Vec<(CopulaType, Rotation)>,
  pub transform: PseudoObsMethod,
  pub criterion: SelectionCriterion,
  /// Tournament is skipped when the independence test p-value reaches this level.
  pub independence_alpha: f64,
  pub fit: FitConfig,
  pub kendall_mc_samples: usize,
}

impl Default for PairCopulaConfig {
  fn default() -> Self {
    let mut families = vec![
      (CopulaType::StudentT, Rotation::R0),
      (CopulaType::Gaussian, Rotation::R0),
    ];
    for t in [CopulaType::Frank, CopulaType::Clayton, CopulaType::Gumbel] {
      families.extend(Rotation::ALL.iter().map(|&r| (t, r)));
    }

    Self {
      families,
      transform: PseudoObsMethod::default(),
      criterion: SelectionCriterion::default(),
      independence_alpha: 0.05,
      fit: FitConfig::default(),
      kendall_mc_samples: 4000,
    }
  }
}

impl PairCopulaConfig {
  /// Trial set from `(name, rotation code)` pairs.
  pub fn with_named_families(mut self, families: &[(&str, i64)]) -> CopulaResult<Self> {
    self.families = families
      .iter()
      .map(|&(name, code)| Ok((name.parse::<CopulaType>()?, Rotation::try_from(code)?)))
      .collect::<CopulaResult<Vec<_>>>()?;
    Ok(self)
  }
}

/// Two aligned columns, their optional weights and the derived pseudo-observations.
#[derive(Debug, Clone)]
pub struct BivariateSample {
  x: Array1<f64>,
  y: Array1<f64>,
  weights: Option<Array1<f64>>,
  u: Array1<f64>,
  v: Array1<f64>,
  rotation: Rotation,
  uu: Array1<f64>,
  vv: Array1<f64>,
}

fn check_lengths(x: &Array1<f64>, y: &Array1<f64>, weights: Option<&Array1<f64>>) -> CopulaResult<()> {
  if x.len() != y.len() {
    return Err(CopulaError::InvalidInput(format!(
      "columns differ in length: {} vs {}",
      x.len(),
      y.len()
    )));
  }
  if x.len() < 2 {
    return Err(CopulaError::InvalidInput(
      "a pair copula needs at least 2 observations".into(),
    ));
  }
  if x.iter().chain(y.iter()).any(|t| !t.is_finite()) {
    return Err(CopulaError::InvalidInput("non-finite observation".into()));
  }
  if let Some(w) = weights {
    if w.len() != x.len() {
      return Err(CopulaError::InvalidInput(format!(
        "{} weights for {} observations",
        w.len(),
        x.len()
      )));
    }
    if w.iter().any(|&wi| !wi.is_finite() || wi < 0.0) {
      return Err(CopulaError::InvalidInput("weights must be finite and nonnegative".into()));
    }
    if w.sum() <= 0.0 {
      return Err(CopulaError::InvalidInput("weights sum to zero".into()));
    }
  }
  Ok(())
}

/// Rescales weights to mean one so unit weights reproduce the unweighted fit.
pub(crate) fn normalise(weights: Array1<f64>) -> Array1<f64> {
  let mean = weights.sum() / weights.len() as f64;
  weights / mean
}

fn slice(a: &Array1<f64>) -> CopulaResult<&[f64]> {
  a.as_slice()
    .ok_or_else(|| CopulaError::InvalidInput("non-contiguous column".into()))
}

impl BivariateSample {
  /// Raw data; pseudo-observations come from `method`.
  pub fn new(
    x: Array1<f64>,
    y: Array1<f64>,
    weights: Option<Array1<f64>>,
    method: PseudoObsMethod,
  ) -> CopulaResult<Self> {
    check_lengths(&x, &y, weights.as_ref())?;
    let (u, v) = match method {
      PseudoObsMethod::Rank => (rank_transform(&x), rank_transform(&y)),
      PseudoObsMethod::KernelCdf => (
        GaussianKDE::with_silverman_bandwidth(x.clone()).transform(),
        GaussianKDE::with_silverman_bandwidth(y.clone()).transform(),
      ),
    };
    Ok(Self {
      uu: u.clone(),
      vv: v.clone(),
      x,
      y,
      weights: weights.map(normalise),
      u,
      v,
      rotation: Rotation::R0,
    })
  }

  /// Data already on the copula scale; values are only clipped.
  pub fn from_pseudo_obs(
    u: Array1<f64>,
    v: Array1<f64>,
    weights: Option<Array1<f64>>,
  ) -> CopulaResult<Self> {
    check_lengths(&u, &v, weights.as_ref())?;
    let (u, v) = (u.mapv(clip), v.mapv(clip));
    Ok(Self {
      x: u.clone(),
      y: v.clone(),
      uu: u.clone(),
      vv: v.clone(),
      weights: weights.map(normalise),
      u,
      v,
      rotation: Rotation::R0,
    })
  }

  pub fn len(&self) -> usize {
    self.u.len()
  }

  pub fn is_empty(&self) -> bool {
    self.u.is_empty()
  }

  pub fn x(&self) -> &Array1<f64> {
    &self.x
  }

  pub fn y(&self) -> &Array1<f64> {
    &self.y
  }

  pub fn u(&self) -> &Array1<f64> {
    &self.u
  }

  pub fn v(&self) -> &Array1<f64> {
    &self.v
  }

  pub fn weights(&self) -> Option<&Array1<f64>> {
    self.weights.as_ref()
  }

  pub fn rotation(&self) -> Rotation {
    self.rotation
  }

  /// Pseudo-observations reflected into the unrotated frame of `rotation`.
  pub fn rotated(&self) -> (&Array1<f64>, &Array1<f64>) {
    (&self.uu, &self.vv)
  }

  pub fn set_rotation(&mut self, rotation: Rotation) {
    let (uu, vv) = reflect_all(&self.u, &self.v, rotation);
    self.uu = uu;
    self.vv = vv;
    self.rotation = rotation;
  }
}

fn reflect_all(u: &Array1<f64>, v: &Array1<f64>, rotation: Rotation) -> (Array1<f64>, Array1<f64>) {
  let (uu, vv): (Vec<f64>, Vec<f64>) = u
    .iter()
    .zip(v.iter())
    .map(|(&a, &b)| rotation.reflect(a, b))
    .unzip();
  (Array1::from_vec(uu), Array1::from_vec(vv))
}

/// Outcome of fitting one family: `(family, theta, score, rotation, success)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CopulaFit {
  pub family: CopulaType,
  pub rotation: Rotation,
  pub theta: Vec<f64>,
  /// AIC or Kendall L2 distance, `+inf` for failed fits.
  pub score: f64,
  pub nll: f64,
  pub success: bool,
}

#[derive(Debug, Clone)]
pub struct PairCopula {
  sample: BivariateSample,
  config: PairCopulaConfig,
  model: Option<CopulaModel>,
  fit: Option<CopulaFit>,
}

impl PairCopula {
  pub fn new(
    x: Array1<f64>,
    y: Array1<f64>,
    weights: Option<Array1<f64>>,
    config: PairCopulaConfig,
  ) -> CopulaResult<Self> {
    let sample = BivariateSample::new(x, y, weights, config.transform)?;
    Ok(Self::from_sample(sample, config))
  }

  pub fn from_sample(sample: BivariateSample, config: PairCopulaConfig) -> Self {
    Self {
      sample,
      config,
      model: None,
      fit: None,
    }
  }

  pub fn sample(&self) -> &BivariateSample {
    &self.sample
  }

  pub fn config(&self) -> &PairCopulaConfig {
    &self.config
  }

  pub fn model(&self) -> Option<&CopulaModel> {
    self.model.as_ref()
  }

  pub fn fit_result(&self) -> Option<&CopulaFit> {
    self.fit.as_ref()
  }

  /// Empirical Kendall's tau of the pseudo-observations and its p-value.
  pub fn empirical_tau(&self) -> CopulaResult<(f64, f64)> {
    kendall_tau(&self.sample.u, &self.sample.v)
  }

  /// Fits `template` starting from its current parameters and scores it. Never fails on
  /// convergence: a failed fit is reported with `success = false` and an infinite score.
  fn evaluate(&self, template: CopulaModel, tau: f64) -> CopulaResult<(CopulaModel, CopulaFit)> {
    let (u, v) = (slice(&self.sample.u)?, slice(&self.sample.v)?);
    let weights = self.weight_slice()?;

    let mut model = template;
    // moment start; families without a tau map keep their initial guess
    if !model.is_fitted() {
      if let Err(e) = model.theta_from_tau(tau).and_then(|theta| model.set_theta(theta)) {
        debug!(family = %model.r#type(), error = %e, "no moment start");
      }
    }

    let mle = fit_mle(&model, u, v, weights, &self.config.fit);
    model.mark_fitted(mle.theta.clone(), mle.success);

    let score = if !mle.success {
      f64::INFINITY
    } else {
      self.score(&model, mle.nll)?
    };

    debug!(
      family = %model.r#type(),
      rotation = %model.rotation(),
      theta = ?mle.theta,
      nll = mle.nll,
      score,
      success = mle.success,
      "fitted pair copula"
    );

    let fit = CopulaFit {
      family: model.r#type(),
      rotation: model.rotation(),
      theta: mle.theta,
      score,
      nll: mle.nll,
      success: mle.success,
    };
    Ok((model, fit))
  }

  fn weight_slice(&self) -> CopulaResult<Option<&[f64]>> {
    self.sample.weights.as_ref().map(slice).transpose()
  }

  /// Selection score of `model` under the configured criterion.
  fn score(&self, model: &CopulaModel, nll: f64) -> CopulaResult<f64> {
    Ok(match self.config.criterion {
      SelectionCriterion::Aic => aic(
        nll,
        model.n_free(),
        n_effective(self.sample.len(), self.weight_slice()?),
      ),
      SelectionCriterion::KendallL2 => self.kendall_l2(model),
    })
  }

  /// Fits and scores a single family without changing the selected model.
  pub fn fit_family(&self, r#type: CopulaType, rotation: Rotation) -> CopulaResult<CopulaFit> {
    let (tau, _) = self.empirical_tau()?;
    let (_, fit) = self.evaluate(CopulaModel::new(r#type, rotation)?, tau)?;
    Ok(fit)
  }

  /// Fits `template` (any family, including mixtures) and makes it the selected model.
  /// Unlike the tournament this surfaces a failed fit as an error.
  pub fn fit_model(&mut self, template: CopulaModel) -> CopulaResult<&CopulaFit> {
    let (tau, _) = self.empirical_tau()?;
    let (model, fit) = self.evaluate(template, tau)?;
    if !fit.success {
      return Err(CopulaError::FitConvergence(format!(
        "{} at {} degrees",
        fit.family, fit.rotation
      )));
    }
    Ok(self.install(model, fit))
  }

  /// Fits a single named family and makes it the selected model.
  pub fn fit(&mut self, r#type: CopulaType, rotation: Rotation) -> CopulaResult<&CopulaFit> {
    self.fit_model(CopulaModel::new(r#type, rotation)?)
  }

  /// Runs the tournament over the configured trial set and keeps the best candidate.
  pub fn select(&mut self) -> CopulaResult<&CopulaFit> {
    if self.config.families.is_empty() {
      return Err(CopulaError::InvalidParameter("empty trial family set".into()));
    }
    let (tau, p_value) = self.empirical_tau()?;

    if p_value >= self.config.independence_alpha && self.sample.weights.is_none() {
      let model = CopulaModel::with_theta(CopulaType::Gaussian, Rotation::R0, vec![0.0])?;
      let nll = model.nll(slice(&self.sample.u)?, slice(&self.sample.v)?, None);
      let fit = CopulaFit {
        family: CopulaType::Gaussian,
        rotation: Rotation::R0,
        theta: vec![0.0],
        score: aic(nll, 0, self.sample.len()),
        nll,
        success: true,
      };
      info!(tau, p_value, "independence not rejected, skipping tournament");
      let mut model = model;
      model.mark_fitted(vec![0.0], true);
      return Ok(self.install(model, fit));
    }

    let candidates = self
      .config
      .families
      .par_iter()
      .map(|&(t, r)| self.evaluate(CopulaModel::new(t, r)?, tau))
      .collect::<CopulaResult<Vec<_>>>()?;

    let mut best: Option<(CopulaModel, CopulaFit)> = None;
    for (model, fit) in candidates {
      let better = match &best {
        None => true,
        Some((_, b)) => fit.score < b.score,
      };
      if better {
        best = Some((model, fit));
      }
    }

    let (model, fit) = best.ok_or_else(|| CopulaError::InvalidParameter("empty trial family set".into()))?;
    info!(
      family = %fit.family,
      rotation = %fit.rotation,
      theta = ?fit.theta,
      score = fit.score,
      "selected pair copula"
    );
    Ok(self.install(model, fit))
  }

  fn install(&mut self, model: CopulaModel, fit: CopulaFit) -> &CopulaFit {
    self.sample.set_rotation(model.rotation());
    self.model = Some(model);
    self.fit.insert(fit)
  }

  /// Overrides the selected model's parameters, e.g. after a joint refinement. The
  /// stored fit is rescored against the same weighted sample.
  pub fn set_theta(&mut self, theta: Vec<f64>) -> CopulaResult<()> {
    let mut model = self
      .model
      .clone()
      .ok_or_else(|| CopulaError::InvalidState("pair copula has not been fitted".into()))?;
    model.set_theta(theta.clone())?;
    let nll = model.nll(slice(&self.sample.u)?, slice(&self.sample.v)?, self.weight_slice()?);
    let score = self.score(&model, nll)?;
    if let Some(fit) = self.fit.as_mut() {
      fit.theta = theta;
      fit.nll = nll;
      fit.score = score;
    }
    self.model = Some(model);
    Ok(())
  }

  /// Swaps in new pseudo-observations and rescores the selected model on them.
  pub fn set_sample(&mut self, mut sample: BivariateSample) -> CopulaResult<()> {
    if let Some(model) = &self.model {
      sample.set_rotation(model.rotation());
    }
    self.sample = sample;
    match self.model.as_ref().map(|m| m.theta().to_vec()) {
      Some(theta) => self.set_theta(theta),
      None => Ok(()),
    }
  }

  /// Mean squared distance between the empirical Kendall function of the data and the
  /// Kendall function of `model`.
  pub fn kendall_l2(&self, model: &CopulaModel) -> f64 {
    let n = self.sample.len();
    let (u, v) = (&self.sample.u, &self.sample.v);

    let model_k: Vec<f64> = if model.r#type().is_archimedean() {
      // reflect the data into the frame of the unrotated generator
      let (uu, vv) = reflect_all(u, v, model.rotation());
      let base = model.family().ext();
      let theta = model.theta();
      kendall_pseudo_obs(&uu.to_vec(), &vv.to_vec())
        .into_iter()
        .map(|z| {
          let t = z.clamp(EPS, 1.0 - EPS);
          match (base.generator(t, theta), base.generator_prime(t, theta)) {
            (Some(g), Some(dg)) if dg != 0.0 => (t - g / dg).clamp(0.0, 1.0),
            _ => t,
          }
        })
        .collect()
    } else {
      let mut rng = StdRng::seed_from_u64(KENDALL_MC_SEED);
      let mc = model.sample_with_rng(self.config.kendall_mc_samples, &mut rng);
      let mut c: Vec<f64> = mc
        .rows()
        .into_iter()
        .map(|row| model.cdf(row[0], row[1]))
        .collect();
      c.sort_by(|a, b| a.total_cmp(b));
      kendall_pseudo_obs(&u.to_vec(), &v.to_vec())
        .into_iter()
        .map(|z| ecdf_sorted(&c, z))
        .collect()
    };

    model_k
      .iter()
      .enumerate()
      .map(|(i, &k)| ((i + 1) as f64 / n as f64 - k).powi(2))
      .sum::<f64>()
      / n as f64
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use tracing_test::traced_test;

  use super::*;

  const N: usize = 2000;

  fn simulated(model: &CopulaModel, n: usize, seed: u64) -> (Array1<f64>, Array1<f64>) {
    let s = model.sample_with_rng(n, &mut StdRng::seed_from_u64(seed));
    (s.column(0).to_owned(), s.column(1).to_owned())
  }

  fn config(families: &[(CopulaType, Rotation)]) -> PairCopulaConfig {
    PairCopulaConfig {
      families: families.to_vec(),
      ..PairCopulaConfig::default()
    }
  }

  #[test]
  #[traced_test]
  fn tournament_selects_generating_family() {
    let truth = CopulaModel::with_theta(CopulaType::Clayton, Rotation::R0, vec![3.0]).unwrap();
    let (x, y) = simulated(&truth, N, 1);
    let cfg = config(&[
      (CopulaType::Gaussian, Rotation::R0),
      (CopulaType::Frank, Rotation::R0),
      (CopulaType::Gumbel, Rotation::R0),
      (CopulaType::Clayton, Rotation::R0),
      (CopulaType::Gumbel, Rotation::R180),
    ]);
    let mut pair = PairCopula::new(x, y, None, cfg).unwrap();
    let fit = pair.select().unwrap().clone();
    assert_eq!(fit.family, CopulaType::Clayton);
    assert_eq!(fit.rotation, Rotation::R0);
    assert!(fit.success);
    assert_abs_diff_eq!(fit.theta[0], 3.0, epsilon = 0.4);
    assert_eq!(pair.sample().rotation(), Rotation::R0);
    assert!(logs_contain("selected pair copula"));
  }

  #[test]
  fn refit_recovers_rotation_and_parameter() {
    let truth = CopulaModel::with_theta(CopulaType::Gumbel, Rotation::R90, vec![2.0]).unwrap();
    let (x, y) = simulated(&truth, N, 9);
    let cfg = config(&Rotation::ALL.map(|r| (CopulaType::Gumbel, r)));
    let mut pair = PairCopula::new(x, y, None, cfg).unwrap();
    let fit = pair.select().unwrap();
    assert_eq!(fit.rotation, Rotation::R90);
    assert!((fit.theta[0] - 2.0).abs() / 2.0 < 0.1);
  }

  #[test]
  fn gaussian_target_tau_is_recovered() {
    let truth = CopulaModel::with_theta(CopulaType::Gaussian, Rotation::R0, vec![0.7387]).unwrap();
    let (x, y) = simulated(&truth, N, 4);
    let cfg = config(&[
      (CopulaType::Gaussian, Rotation::R0),
      (CopulaType::Frank, Rotation::R0),
      (CopulaType::Clayton, Rotation::R0),
      (CopulaType::Gumbel, Rotation::R0),
    ]);
    let mut pair = PairCopula::new(x, y, None, cfg).unwrap();
    let fit = pair.select().unwrap();
    assert_eq!(fit.family, CopulaType::Gaussian);
    assert_abs_diff_eq!(fit.theta[0], 0.7387, epsilon = 0.03);
  }

  #[test]
  #[traced_test]
  fn independent_data_short_circuits_to_zero_correlation_gaussian() {
    // V shape: tau is exactly zero
    let x = Array1::from_iter((0..21).map(f64::from));
    let y = x.mapv(|t| (t - 10.0).abs());
    let mut pair = PairCopula::new(x, y, None, PairCopulaConfig::default()).unwrap();
    let fit = pair.select().unwrap();
    assert_eq!(fit.family, CopulaType::Gaussian);
    assert_eq!(fit.theta, vec![0.0]);
    assert!(logs_contain("skipping tournament"));
  }

  #[test]
  fn kendall_criterion_prefers_generating_family() {
    let truth = CopulaModel::with_theta(CopulaType::Clayton, Rotation::R0, vec![4.0]).unwrap();
    let (x, y) = simulated(&truth, 1000, 3);
    let cfg = PairCopulaConfig {
      criterion: SelectionCriterion::KendallL2,
      ..config(&[
        (CopulaType::Gumbel, Rotation::R0),
        (CopulaType::Clayton, Rotation::R0),
        (CopulaType::Frank, Rotation::R0),
      ])
    };
    let mut pair = PairCopula::new(x, y, None, cfg).unwrap();
    assert_eq!(pair.select().unwrap().family, CopulaType::Clayton);
  }

  #[test]
  fn unit_weights_reproduce_unweighted_fit() {
    let truth = CopulaModel::with_theta(CopulaType::Frank, Rotation::R0, vec![5.0]).unwrap();
    let (x, y) = simulated(&truth, 500, 8);
    let plain = PairCopula::new(x.clone(), y.clone(), None, PairCopulaConfig::default()).unwrap();
    let weighted =
      PairCopula::new(x, y, Some(Array1::from_elem(500, 3.0)), PairCopulaConfig::default()).unwrap();
    let a = plain.fit_family(CopulaType::Frank, Rotation::R0).unwrap();
    let b = weighted.fit_family(CopulaType::Frank, Rotation::R0).unwrap();
    assert_abs_diff_eq!(a.theta[0], b.theta[0], epsilon = 1e-6);
    assert_abs_diff_eq!(a.score, b.score, epsilon = 1e-6);
  }

  #[test]
  fn weights_pull_the_fit_toward_the_upweighted_cluster() {
    let weak = CopulaModel::with_theta(CopulaType::Clayton, Rotation::R0, vec![1.0]).unwrap();
    let strong = CopulaModel::with_theta(CopulaType::Clayton, Rotation::R0, vec![6.0]).unwrap();
    let (xw, yw) = simulated(&weak, 1500, 31);
    let (xs, ys) = simulated(&strong, 1500, 32);
    let x = ndarray::concatenate![ndarray::Axis(0), xw, xs];
    let y = ndarray::concatenate![ndarray::Axis(0), yw, ys];
    let w = Array1::from_iter((0..3000).map(|i| if i < 1500 { 0.05 } else { 1.0 }));

    let cfg = config(&[
      (CopulaType::Clayton, Rotation::R0),
      (CopulaType::Gumbel, Rotation::R0),
    ]);
    let plain = PairCopula::new(x.clone(), y.clone(), None, cfg.clone()).unwrap();
    let plain_theta = plain.fit_family(CopulaType::Clayton, Rotation::R0).unwrap().theta[0];

    let mut weighted = PairCopula::new(x, y, Some(w), cfg).unwrap();
    let fit = weighted.select().unwrap().clone();
    assert_eq!(fit.family, CopulaType::Clayton);
    assert!(fit.theta[0] > plain_theta + 1.0, "{} vs {plain_theta}", fit.theta[0]);
    assert_abs_diff_eq!(fit.theta[0], 6.0, epsilon = 1.0);
  }

  #[test]
  fn set_theta_rescores_with_the_fit_weights() {
    let truth = CopulaModel::with_theta(CopulaType::Gumbel, Rotation::R0, vec![2.0]).unwrap();
    let (x, y) = simulated(&truth, 400, 17);
    let w = Array1::from_iter((0..400).map(|i| if i % 4 == 0 { 0.0 } else { 2.0 }));
    let mut pair = PairCopula::new(x, y, Some(w), PairCopulaConfig::default()).unwrap();
    pair.fit(CopulaType::Gumbel, Rotation::R0).unwrap();
    let before = pair.fit_result().unwrap().clone();

    pair.set_theta(vec![2.6]).unwrap();
    let model = pair.model().unwrap().clone();
    let after = pair.fit_result().unwrap();
    let (u, v) = (pair.sample().u(), pair.sample().v());
    let weights = pair.sample().weights().unwrap();
    let nll = model.nll(
      u.as_slice().unwrap(),
      v.as_slice().unwrap(),
      Some(weights.as_slice().unwrap()),
    );
    assert_eq!(after.theta, vec![2.6]);
    assert_abs_diff_eq!(after.nll, nll, epsilon = 1e-9);
    assert_abs_diff_eq!(after.score, aic(nll, 1, 300), epsilon = 1e-9);
    assert!(after.score > before.score);
  }

  #[test]
  fn large_sample_refit_recovers_rotation_and_parameter_tightly() {
    let truth = CopulaModel::with_theta(CopulaType::Clayton, Rotation::R270, vec![3.0]).unwrap();
    let (x, y) = simulated(&truth, 10_000, 41);
    let cfg = config(&Rotation::ALL.map(|r| (CopulaType::Clayton, r)));
    let mut pair = PairCopula::new(x, y, None, cfg).unwrap();
    let fit = pair.select().unwrap();
    assert_eq!(fit.rotation, Rotation::R270);
    assert!((fit.theta[0] - 3.0).abs() / 3.0 < 0.05);
  }

  #[test]
  fn large_sample_tournament_selects_generating_family() {
    let truth = CopulaModel::with_theta(CopulaType::Gumbel, Rotation::R180, vec![1.8]).unwrap();
    let (x, y) = simulated(&truth, 5_000, 43);
    let mut pair = PairCopula::new(x, y, None, PairCopulaConfig::default()).unwrap();
    let fit = pair.select().unwrap();
    assert_eq!((fit.family, fit.rotation), (CopulaType::Gumbel, Rotation::R180));
  }

  #[test]
  fn kernel_transform_yields_interior_pseudo_obs() {
    let truth = CopulaModel::with_theta(CopulaType::Gaussian, Rotation::R0, vec![0.5]).unwrap();
    let (x, y) = simulated(&truth, 300, 12);
    let sample = BivariateSample::new(x, y, None, PseudoObsMethod::KernelCdf).unwrap();
    assert!(sample.u().iter().chain(sample.v().iter()).all(|&p| p > 0.0 && p < 1.0));
  }

  #[test]
  fn malformed_input_is_rejected() {
    let x = Array1::from_vec(vec![0.1, 0.2, 0.3]);
    let cfg = PairCopulaConfig::default;
    assert!(PairCopula::new(x.clone(), Array1::from_vec(vec![0.1, 0.2]), None, cfg()).is_err());
    assert!(PairCopula::new(x.clone(), x.clone(), Some(Array1::from_vec(vec![1.0, -1.0, 1.0])), cfg()).is_err());
    assert!(PairCopula::new(Array1::from_vec(vec![0.1]), Array1::from_vec(vec![0.2]), None, cfg()).is_err());
  }

  #[test]
  fn named_trial_sets_validate_names_and_rotations() {
    let cfg = PairCopulaConfig::default()
      .with_named_families(&[("clayton", 2), ("gauss", 0)])
      .unwrap();
    assert_eq!(cfg.families[0], (CopulaType::Clayton, Rotation::R180));
    assert!(matches!(
      PairCopulaConfig::default().with_named_families(&[("joe", 0)]),
      Err(CopulaError::UnknownFamily(_))
    ));
    assert!(matches!(
      PairCopulaConfig::default().with_named_families(&[("frank", 7)]),
      Err(CopulaError::InvalidRotation(7))
    ));
  }

  #[test]
  fn single_family_fit_installs_model() {
    let truth = CopulaModel::with_theta(CopulaType::Clayton, Rotation::R0, vec![2.0]).unwrap();
    let (x, y) = simulated(&truth, 300, 21);
    let mut pair = PairCopula::new(x, y, None, PairCopulaConfig::default()).unwrap();
    let fit = pair.fit(CopulaType::Clayton, Rotation::R0).unwrap();
    assert!(fit.success && fit.score.is_finite());
    assert!(pair.model().unwrap().is_fitted());
  }
}
