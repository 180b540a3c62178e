//! # Maximum likelihood
//!
//! $$
//! \hat\theta=\arg\min_{\theta\in\Theta}\;-\sum_i w_i\ln c(u_i,v_i;\theta),\qquad
//! \theta_j=\ell_j+(h_j-\ell_j)\,\sigma(z_j)
//! $$
//!
//! One-parameter families use Brent's method directly on the bounded interval. Larger
//! families run L-BFGS on the logistic reparametrisation, and Nelder-Mead is the fallback
//! whenever the primary solver errors or ends worse than the starting point.
//!
use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::solver::brent::BrentOpt;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use impl_new_derive::ImplNew;
use tracing::debug;
use tracing::warn;

use super::CopulaModel;

/// Cost reported for parameters where the likelihood is not finite.
pub(crate) const PENALTY: f64 = 1e100;

#[derive(Debug, Clone, Copy, ImplNew)]
pub struct FitConfig {
  pub max_iters: u64,
  /// Parameter tolerance of the bracketing search and the simplex spread.
  pub tolerance: f64,
}

impl Default for FitConfig {
  fn default() -> Self {
    Self {
      max_iters: 500,
      tolerance: 1e-8,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MleSolver {
  /// Nothing to optimise.
  Closed,
  Brent,
  Lbfgs,
  NelderMead,
  /// Every solver failed; the starting point is reported.
  Failed,
}

#[derive(Debug, Clone)]
pub struct MleFit {
  pub theta: Vec<f64>,
  pub nll: f64,
  pub success: bool,
  pub solver: MleSolver,
}

fn sigmoid(z: f64) -> f64 {
  1.0 / (1.0 + (-z).exp())
}

pub(crate) fn to_theta(z: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
  z.iter()
    .zip(bounds)
    .map(|(&z, &(lo, hi))| lo + (hi - lo) * sigmoid(z))
    .collect()
}

pub(crate) fn to_z(theta: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
  theta
    .iter()
    .zip(bounds)
    .map(|(&t, &(lo, hi))| {
      let s = ((t - lo) / (hi - lo)).clamp(1e-6, 1.0 - 1e-6);
      (s / (1.0 - s)).ln()
    })
    .collect()
}

/// Weighted negative log-likelihood of a model over a fixed sample.
struct Nll<'a> {
  model: &'a CopulaModel,
  u: &'a [f64],
  v: &'a [f64],
  weights: Option<&'a [f64]>,
  bounds: Vec<(f64, f64)>,
}

impl Nll<'_> {
  fn at(&self, theta: &[f64]) -> f64 {
    let nll = self.model.nll_at(self.u, self.v, self.weights, theta);
    if nll.is_finite() {
      nll
    } else {
      PENALTY
    }
  }
}

/// Cost over the bounded parameter itself, used by Brent.
struct ScalarNll<'a>(&'a Nll<'a>);

impl CostFunction for ScalarNll<'_> {
  type Param = f64;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    Ok(self.0.at(&[*x]))
  }
}

/// Cost over the unconstrained logistic coordinates.
struct LogisticNll<'a>(&'a Nll<'a>);

impl CostFunction for LogisticNll<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, z: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    Ok(self.0.at(&to_theta(z, &self.0.bounds)))
  }
}

impl Gradient for LogisticNll<'_> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, z: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    let h = 1e-6;
    let mut grad = vec![0.0; z.len()];
    for i in 0..z.len() {
      let mut zp = z.clone();
      let mut zm = z.clone();
      zp[i] += h;
      zm[i] -= h;
      grad[i] = (self.cost(&zp)? - self.cost(&zm)?) / (2.0 * h);
    }
    Ok(grad)
  }
}

fn run_brent(problem: &Nll<'_>, config: &FitConfig) -> Option<(Vec<f64>, f64)> {
  let (lo, hi) = problem.bounds[0];
  let solver = BrentOpt::new(lo, hi).set_tolerance(f64::EPSILON.sqrt(), config.tolerance);
  match Executor::new(ScalarNll(problem), solver)
    .configure(|state| state.max_iters(config.max_iters))
    .run()
  {
    Ok(res) => res
      .state
      .best_param
      .map(|x| (vec![x], res.state.best_cost)),
    Err(e) => {
      debug!(error = %e, "brent search failed");
      None
    }
  }
}

fn run_lbfgs(problem: &Nll<'_>, z0: &[f64], config: &FitConfig) -> Option<(Vec<f64>, f64)> {
  let solver = LBFGS::new(MoreThuenteLineSearch::new(), 7);
  let init = z0.to_vec();
  match Executor::new(LogisticNll(problem), solver)
    .configure(|state| state.param(init).max_iters(config.max_iters))
    .run()
  {
    Ok(res) => res
      .state
      .best_param
      .map(|z| (to_theta(&z, &problem.bounds), res.state.best_cost)),
    Err(e) => {
      debug!(error = %e, "l-bfgs failed");
      None
    }
  }
}

fn run_nelder_mead(problem: &Nll<'_>, z0: &[f64], config: &FitConfig) -> Option<(Vec<f64>, f64)> {
  let mut simplex = Vec::with_capacity(z0.len() + 1);
  simplex.push(z0.to_vec());
  for i in 0..z0.len() {
    let mut point = z0.to_vec();
    point[i] += 0.5;
    simplex.push(point);
  }

  let solver = match NelderMead::new(simplex).with_sd_tolerance(config.tolerance) {
    Ok(solver) => solver,
    Err(e) => {
      debug!(error = %e, "invalid simplex");
      return None;
    }
  };
  match Executor::new(LogisticNll(problem), solver)
    .configure(|state| state.max_iters(config.max_iters))
    .run()
  {
    Ok(res) => res
      .state
      .best_param
      .map(|z| (to_theta(&z, &problem.bounds), res.state.best_cost)),
    Err(e) => {
      debug!(error = %e, "nelder-mead failed");
      None
    }
  }
}

/// Maximises the weighted likelihood of `model` over `(u, v)` starting at its current
/// parameters. Never fails: when no solver improves on the start, `success` is `false`
/// and the start is returned.
pub fn fit_mle(
  model: &CopulaModel,
  u: &[f64],
  v: &[f64],
  weights: Option<&[f64]>,
  config: &FitConfig,
) -> MleFit {
  let problem = Nll {
    model,
    u,
    v,
    weights,
    bounds: model.theta_bounds(),
  };
  let theta0 = model.theta().to_vec();
  let nll0 = problem.at(&theta0);

  if problem.bounds.is_empty() {
    return MleFit {
      theta: theta0,
      nll: nll0,
      success: nll0 < PENALTY,
      solver: MleSolver::Closed,
    };
  }

  let accept = |candidate: Option<(Vec<f64>, f64)>| {
    candidate.and_then(|(theta, _)| {
      // re-evaluate; solvers may report the cost of a clamped trial point
      let nll = problem.at(&theta);
      (nll < PENALTY && nll <= nll0 + 1e-9).then_some((theta, nll))
    })
  };

  let z0 = to_z(&theta0, &problem.bounds);
  let primary = if problem.bounds.len() == 1 {
    accept(run_brent(&problem, config)).map(|r| (r, MleSolver::Brent))
  } else {
    accept(run_lbfgs(&problem, &z0, config)).map(|r| (r, MleSolver::Lbfgs))
  };

  let outcome = primary.or_else(|| {
    debug!(family = %model.r#type(), "primary solver rejected, falling back to nelder-mead");
    accept(run_nelder_mead(&problem, &z0, config)).map(|r| (r, MleSolver::NelderMead))
  });

  match outcome {
    Some(((theta, nll), solver)) => MleFit {
      theta,
      nll,
      success: true,
      solver,
    },
    None => {
      warn!(
        family = %model.r#type(),
        rotation = %model.rotation(),
        "likelihood maximisation failed"
      );
      MleFit {
        theta: theta0,
        nll: nll0,
        success: false,
        solver: MleSolver::Failed,
      }
    }
  }
}
