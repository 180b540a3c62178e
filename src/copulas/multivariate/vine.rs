//! # Vine
//!
//! $$
//! c(u_1,\dots,u_d)=\prod_{k=0}^{d-2}\prod_{e\in E_k}
//! c_{c_0c_1;D_e}\bigl(F(u_{c_0}\mid u_{D_e}),F(u_{c_1}\mid u_{D_e})\bigr),\qquad
//! F(u_j\mid u_{D})=h^{-1}\bigl(F(u_j\mid u_o,u_{D}),F(u_o\mid u_{D})\bigr)
//! $$
//!
//! Level-by-level construction of canonical and regular vines. Sampling peels one
//! variable per level off the deepest tree, then draws variables in the reverse order by
//! inverting each one's chain of conditional distributions down to tree 0.
//!
use std::collections::HashMap;

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::solver::neldermead::NelderMead;
use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray::Zip;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;
use tracing::debug;
use tracing::info;
use tracing::info_span;
use tracing::warn;

use super::tree::Tree;
use super::VineKind;
use crate::copulas::bivariate::clip;
use crate::copulas::bivariate::mle::to_theta;
use crate::copulas::bivariate::mle::to_z;
use crate::copulas::bivariate::mle::PENALTY;
use crate::copulas::bivariate::CopulaModel;
use crate::copulas::bivariate::CopulaType;
use crate::copulas::bivariate::Rotation;
use crate::copulas::empirical::rank_transform;
use crate::copulas::kde::GaussianKDE;
use crate::copulas::pair::normalise;
use crate::copulas::pair::PairCopulaConfig;
use crate::copulas::pair::PseudoObsMethod;
use crate::error::CopulaError;
use crate::error::CopulaResult;
use crate::traits::MarginalExt;

#[derive(Debug, Clone, ImplNew)]
pub struct VineConfig {
  pub kind: VineKind,
  /// Tournament settings shared by every edge.
  pub pair: PairCopulaConfig,
  /// Run the joint refinement after the last level.
  pub refine: bool,
  pub refine_max_iters: u64,
}

impl Default for VineConfig {
  fn default() -> Self {
    Self {
      kind: VineKind::default(),
      pair: PairCopulaConfig::default(),
      refine: false,
      refine_max_iters: 200,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VineState {
  Empty,
  /// Trees `0..=k` are built and fitted.
  LevelBuilt(usize),
  Constructed,
}

/// Per-edge view of a fitted vine.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSummary {
  pub level: usize,
  pub conditioned: (usize, usize),
  pub conditioning: Vec<usize>,
  pub family: CopulaType,
  pub rotation: Rotation,
  pub theta: Vec<f64>,
}

/// Model of every edge together with its transpose, indexed `[level][edge]`.
type EdgeModels = Vec<Vec<(CopulaModel, CopulaModel)>>;

/// `(level, node, variable)`.
type CacheKey = (usize, usize, usize);

/// One inversion step of a variable's chain.
#[derive(Debug, Clone, Copy)]
struct Link {
  level: usize,
  edge: usize,
  /// The variable is `c0` of the edge.
  first: bool,
  /// Endpoint on the variable's side.
  node: usize,
  other_node: usize,
  other_var: usize,
}

#[derive(Debug, Clone)]
struct Step {
  var: usize,
  /// From the deepest tree the variable reaches down to tree 0.
  chain: Vec<Link>,
}

/// Variables in sampling order with the edges each one is inverted through.
#[derive(Debug, Clone)]
struct SamplingPlan {
  steps: Vec<Step>,
}

impl SamplingPlan {
  fn from_trees(trees: &[Tree]) -> CopulaResult<Self> {
    let d = trees.first().map_or(0, |t| t.nodes.len());
    if d < 2 || trees.len() + 1 != d {
      return Err(CopulaError::Structural(format!(
        "{} trees for {d} variables",
        trees.len()
      )));
    }

    let mut open: Vec<Vec<bool>> = trees.iter().map(|t| vec![true; t.edges.len()]).collect();
    let mut peeled = Vec::with_capacity(d);
    for remaining in (2..=d).rev() {
      let top = remaining - 2;
      let left: Vec<usize> = (0..trees[top].edges.len())
        .filter(|&e| open[top][e])
        .collect();
      let &[edge] = left.as_slice() else {
        return Err(CopulaError::Structural(format!(
          "tree {top} has {} open edges while peeling",
          left.len()
        )));
      };

      let var = trees[top].edges[edge].conditioned.1;
      let chain = descend(trees, top, edge, var)?;
      for link in &chain {
        open[link.level][link.edge] = false;
      }
      for (level, tree) in trees.iter().enumerate() {
        if let Some(e) = tree.edges.iter().find(|e| open[level][e.id] && e.touches(var)) {
          return Err(CopulaError::Structural(format!(
            "variable {var} still feeds edge {} of tree {level}",
            e.id
          )));
        }
      }
      peeled.push(Step { var, chain });
    }

    let last = (0..d)
      .find(|v| peeled.iter().all(|s| s.var != *v))
      .ok_or_else(|| CopulaError::Structural("every variable was peeled".into()))?;
    peeled.push(Step {
      var: last,
      chain: Vec::new(),
    });
    peeled.reverse();
    Ok(Self { steps: peeled })
  }
}

/// Chain of `var` from `edge` of tree `top` down to tree 0, routed by one-fold triplets.
fn descend(trees: &[Tree], top: usize, edge: usize, var: usize) -> CopulaResult<Vec<Link>> {
  let mut chain = Vec::with_capacity(top + 1);
  let (mut level, mut edge) = (top, edge);
  loop {
    let e = &trees[level].edges[edge];
    let link = if e.conditioned.0 == var {
      Link {
        level,
        edge,
        first: true,
        node: e.a,
        other_node: e.b,
        other_var: e.conditioned.1,
      }
    } else if e.conditioned.1 == var {
      Link {
        level,
        edge,
        first: false,
        node: e.b,
        other_node: e.a,
        other_var: e.conditioned.0,
      }
    } else {
      return Err(CopulaError::Structural(format!(
        "variable {var} is not conditioned on edge {edge} of tree {level}"
      )));
    };
    chain.push(link);
    if level == 0 {
      return Ok(chain);
    }

    let triplet = e.triplet.ok_or_else(|| {
      CopulaError::Structural(format!("edge {edge} of tree {level} has no one-fold triplet"))
    })?;
    let side = if link.first {
      triplet.sides.0
    } else {
      triplet.sides.1
    };
    let below = trees[level].nodes[link.node].source_edge().ok_or_else(|| {
      CopulaError::Structural(format!("node {} of tree {level} has no source edge", link.node))
    })?;
    let be = &trees[level - 1].edges[below];
    let joins = (be.a == side && be.b == triplet.anchor) || (be.b == side && be.a == triplet.anchor);
    if !joins {
      return Err(CopulaError::Structural(format!(
        "triplet of edge {edge} in tree {level} does not match node {}",
        link.node
      )));
    }
    level -= 1;
    edge = below;
  }
}

/// Conditional pseudo-observations resolved during one `sample` or `log_pdf` call.
/// Created empty for every call and dropped with it.
#[derive(Debug, Default)]
pub(crate) struct SampleSession {
  cache: HashMap<CacheKey, Array1<f64>>,
}

impl SampleSession {
  fn with_observations(u: &Array2<f64>) -> Self {
    let mut session = Self::default();
    for (var, col) in u.axis_iter(Axis(1)).enumerate() {
      session.cache.insert((0, var, var), col.to_owned());
    }
    session
  }

  /// `F(var | rest of node)` at `(level, node)`, evaluated from tree 0 upward with an
  /// explicit stack.
  fn resolve(&mut self, trees: &[Tree], models: &EdgeModels, key: CacheKey) -> CopulaResult<Array1<f64>> {
    let mut stack = vec![key];
    while let Some(&(level, node, var)) = stack.last() {
      if self.cache.contains_key(&(level, node, var)) {
        stack.pop();
        continue;
      }
      if level == 0 {
        return Err(CopulaError::Structural(format!(
          "variable {var} is needed before it is sampled"
        )));
      }

      let source = trees[level]
        .nodes
        .get(node)
        .and_then(|n| n.source_edge())
        .ok_or_else(|| {
          CopulaError::Structural(format!("node {node} of tree {level} has no source edge"))
        })?;
      let e = &trees[level - 1].edges[source];
      let (lhs, rhs, first) = if var == e.conditioned.0 {
        ((level - 1, e.a, e.conditioned.0), (level - 1, e.b, e.conditioned.1), true)
      } else if var == e.conditioned.1 {
        ((level - 1, e.b, e.conditioned.1), (level - 1, e.a, e.conditioned.0), false)
      } else {
        return Err(CopulaError::Structural(format!(
          "variable {var} is not conditioned on node {node} of tree {level}"
        )));
      };

      let missing: Vec<CacheKey> = [lhs, rhs]
        .into_iter()
        .filter(|k| !self.cache.contains_key(k))
        .collect();
      if !missing.is_empty() {
        stack.extend(missing);
        continue;
      }

      let (model, transposed) = &models[level - 1][source];
      let m = if first { model } else { transposed };
      let value = m.h_array(&self.cache[&lhs], &self.cache[&rhs]);
      self.cache.insert((level, node, var), value);
      stack.pop();
    }

    self
      .cache
      .get(&key)
      .cloned()
      .ok_or_else(|| CopulaError::Structural(format!("unresolved key {key:?}")))
  }
}

/// Indices of the edges whose parameters enter the joint refinement.
#[derive(Debug, Clone)]
struct Slot {
  level: usize,
  edge: usize,
  bounds: Vec<(f64, f64)>,
}

/// Negative vine log-likelihood over the concatenated logistic coordinates of every edge.
struct JointNll<'a> {
  vine: &'a Vine,
  slots: &'a [Slot],
}

impl JointNll<'_> {
  fn models_at(&self, z: &[f64]) -> CopulaResult<EdgeModels> {
    let mut models = self.vine.edge_models();
    let mut offset = 0;
    for slot in self.slots {
      let k = slot.bounds.len();
      let theta = to_theta(&z[offset..offset + k], &slot.bounds);
      offset += k;
      let (model, transposed) = &mut models[slot.level][slot.edge];
      model.set_theta(theta)?;
      *transposed = model.transposed();
    }
    Ok(models)
  }
}

impl CostFunction for JointNll<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, z: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let nll = self
      .models_at(z)
      .and_then(|models| self.vine.weighted_log_likelihood(&models))
      .map_or(PENALTY, |ll| -ll);
    Ok(if nll.is_finite() { nll } else { PENALTY })
  }
}

#[derive(Debug, Clone)]
pub struct Vine {
  config: VineConfig,
  pseudo: Array2<f64>,
  weights: Option<Array1<f64>>,
  trees: Vec<Tree>,
  state: VineState,
  plan: Option<SamplingPlan>,
}

fn check_input(data: &Array2<f64>, weights: Option<&Array1<f64>>) -> CopulaResult<()> {
  if data.ncols() < 2 {
    return Err(CopulaError::InvalidInput(format!(
      "a vine needs at least 2 variables, got {}",
      data.ncols()
    )));
  }
  if data.nrows() < 2 {
    return Err(CopulaError::InvalidInput(
      "a vine needs at least 2 observations".into(),
    ));
  }
  if data.iter().any(|x| !x.is_finite()) {
    return Err(CopulaError::InvalidInput("non-finite observation".into()));
  }
  if let Some(w) = weights {
    if w.len() != data.nrows() {
      return Err(CopulaError::InvalidInput(format!(
        "{} weights for {} observations",
        w.len(),
        data.nrows()
      )));
    }
    if w.iter().any(|&wi| !wi.is_finite() || wi < 0.0) || w.sum() <= 0.0 {
      return Err(CopulaError::InvalidInput(
        "weights must be nonnegative with a positive sum".into(),
      ));
    }
  }
  Ok(())
}

impl Vine {
  /// Vine over the columns of `data`, mapped to pseudo-observations with the configured
  /// transform. Nothing is fitted until [`Vine::construct`] or [`Vine::build_next_level`].
  pub fn new(data: &Array2<f64>, weights: Option<Array1<f64>>, config: VineConfig) -> CopulaResult<Self> {
    check_input(data, weights.as_ref())?;
    let mut pseudo = Array2::<f64>::zeros(data.raw_dim());
    for (j, col) in data.axis_iter(Axis(1)).enumerate() {
      let col = col.to_owned();
      let u = match config.pair.transform {
        PseudoObsMethod::Rank => rank_transform(&col),
        PseudoObsMethod::KernelCdf => GaussianKDE::with_silverman_bandwidth(col).transform(),
      };
      pseudo.column_mut(j).assign(&u);
    }
    Ok(Self::assemble(pseudo, weights, config))
  }

  /// Vine over data already on the copula scale.
  pub fn from_pseudo_obs(u: Array2<f64>, weights: Option<Array1<f64>>, config: VineConfig) -> CopulaResult<Self> {
    check_input(&u, weights.as_ref())?;
    if u.iter().any(|&p| !(0.0..=1.0).contains(&p)) {
      return Err(CopulaError::InvalidInput(
        "pseudo-observations must lie in [0, 1]".into(),
      ));
    }
    Ok(Self::assemble(u.mapv(clip), weights, config))
  }

  fn assemble(pseudo: Array2<f64>, weights: Option<Array1<f64>>, config: VineConfig) -> Self {
    Self {
      config,
      pseudo,
      weights: weights.map(normalise),
      trees: Vec::new(),
      state: VineState::Empty,
      plan: None,
    }
  }

  pub fn dim(&self) -> usize {
    self.pseudo.ncols()
  }

  pub fn n_obs(&self) -> usize {
    self.pseudo.nrows()
  }

  pub fn config(&self) -> &VineConfig {
    &self.config
  }

  pub fn state(&self) -> VineState {
    self.state
  }

  pub fn trees(&self) -> &[Tree] {
    &self.trees
  }

  pub fn pseudo_obs(&self) -> &Array2<f64> {
    &self.pseudo
  }

  /// Advances the state machine by one transition. The step after the last tree checks
  /// the structure and prepares sampling.
  pub fn build_next_level(&mut self) -> CopulaResult<VineState> {
    let d = self.dim();
    let kind = self.config.kind;
    let next = match self.state {
      VineState::Empty => {
        let tree = Tree::first(&self.pseudo, self.weights.as_ref(), kind, &self.config.pair)?;
        self.push_tree(tree)
      }
      VineState::LevelBuilt(k) if k + 2 < d => {
        let tree = self.trees[k].next(self.weights.as_ref(), kind, &self.config.pair)?;
        self.push_tree(tree)
      }
      VineState::LevelBuilt(_) => {
        self.plan = Some(SamplingPlan::from_trees(&self.trees)?);
        VineState::Constructed
      }
      VineState::Constructed => {
        return Err(CopulaError::InvalidState(
          "vine is already constructed".into(),
        ))
      }
    };
    self.state = next;
    Ok(next)
  }

  fn push_tree(&mut self, tree: Tree) -> VineState {
    let level = tree.level;
    info!(level, edges = tree.edges.len(), "built vine level");
    self.trees.push(tree);
    VineState::LevelBuilt(level)
  }

  /// Builds every remaining level, then optionally refines all parameters jointly.
  pub fn construct(&mut self) -> CopulaResult<()> {
    if self.state == VineState::Constructed {
      return Err(CopulaError::InvalidState(
        "vine is already constructed".into(),
      ));
    }
    let span = info_span!("construct_vine", dim = self.dim(), kind = ?self.config.kind);
    let _guard = span.enter();

    while self.state != VineState::Constructed {
      self.build_next_level()?;
    }
    if self.config.refine {
      self.refine()?;
    }
    Ok(())
  }

  fn require_constructed(&self) -> CopulaResult<()> {
    if self.state != VineState::Constructed {
      return Err(CopulaError::InvalidState(format!(
        "vine is not constructed (state {:?})",
        self.state
      )));
    }
    Ok(())
  }

  fn plan(&self) -> CopulaResult<&SamplingPlan> {
    self.require_constructed()?;
    self
      .plan
      .as_ref()
      .ok_or_else(|| CopulaError::Structural("vine has no sampling plan".into()))
  }

  fn edge_models(&self) -> EdgeModels {
    self
      .trees
      .iter()
      .map(|t| {
        t.edges
          .iter()
          .map(|e| (e.model.clone(), e.transposed.clone()))
          .collect()
      })
      .collect()
  }

  pub fn edges_summary(&self) -> Vec<EdgeSummary> {
    self
      .trees
      .iter()
      .flat_map(|t| {
        t.edges.iter().map(move |e| EdgeSummary {
          level: t.level,
          conditioned: e.conditioned,
          conditioning: e.conditioning.iter().copied().collect(),
          family: e.model.r#type(),
          rotation: e.model.rotation(),
          theta: e.model.theta().to_vec(),
        })
      })
      .collect()
  }

  pub fn sample(&self, n: usize) -> CopulaResult<Array2<f64>> {
    self.sample_with_rng(n, &mut rand::thread_rng())
  }

  /// `n x d` draw on the copula scale.
  pub fn sample_with_rng<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> CopulaResult<Array2<f64>> {
    let plan = self.plan()?;
    let models = self.edge_models();
    let mut session = SampleSession::default();
    let unif = Uniform::new(0.0, 1.0);
    let mut out = Array2::<f64>::zeros((n, self.dim()));

    for step in &plan.steps {
      let mut x = Array1::<f64>::random_using(n, unif, rng).mapv(clip);
      if step.chain.is_empty() {
        session.cache.insert((0, step.var, step.var), x.clone());
      }
      for link in &step.chain {
        let other = session.resolve(&self.trees, &models, (link.level, link.other_node, link.other_var))?;
        let (model, transposed) = &models[link.level][link.edge];
        let m = if link.first { model } else { transposed };
        x = m.hinv_array(&x, &other);
        session.cache.insert((link.level, link.node, step.var), x.clone());
      }
      out.column_mut(step.var).assign(&x);
    }
    Ok(out)
  }

  /// Sample mapped into data units through each column's marginal.
  pub fn sample_scaled<M: MarginalExt>(&self, n: usize, marginals: &[M]) -> CopulaResult<Array2<f64>> {
    if marginals.len() != self.dim() {
      return Err(CopulaError::InvalidInput(format!(
        "{} marginals for {} variables",
        marginals.len(),
        self.dim()
      )));
    }
    let mut s = self.sample(n)?;
    for (j, m) in marginals.iter().enumerate() {
      s.column_mut(j).mapv_inplace(|p| m.ppf(p));
    }
    Ok(s)
  }

  /// Log density of the vine copula at each row of `u`.
  pub fn log_pdf(&self, u: &Array2<f64>) -> CopulaResult<Array1<f64>> {
    self.require_constructed()?;
    if u.ncols() != self.dim() {
      return Err(CopulaError::InvalidInput(format!(
        "{} columns for a vine over {} variables",
        u.ncols(),
        self.dim()
      )));
    }
    if u.iter().any(|&p| !p.is_finite() || !(0.0..=1.0).contains(&p)) {
      return Err(CopulaError::InvalidInput(
        "pseudo-observations must lie in [0, 1]".into(),
      ));
    }
    self.log_pdf_with(&u.mapv(clip), &self.edge_models())
  }

  fn log_pdf_with(&self, u: &Array2<f64>, models: &EdgeModels) -> CopulaResult<Array1<f64>> {
    let mut session = SampleSession::with_observations(u);
    let mut out = Array1::<f64>::zeros(u.nrows());
    for (level, tree) in self.trees.iter().enumerate() {
      for e in &tree.edges {
        let x = session.resolve(&self.trees, models, (level, e.a, e.conditioned.0))?;
        let y = session.resolve(&self.trees, models, (level, e.b, e.conditioned.1))?;
        let (model, _) = &models[level][e.id];
        out += &Zip::from(&x).and(&y).map_collect(|&a, &b| model.log_pdf(a, b));
      }
    }
    Ok(out)
  }

  fn weighted_log_likelihood(&self, models: &EdgeModels) -> CopulaResult<f64> {
    let lp = self.log_pdf_with(&self.pseudo, models)?;
    Ok(match &self.weights {
      Some(w) => (&lp * w).sum(),
      None => lp.sum(),
    })
  }

  /// Weighted log-likelihood of the fitted vine on its own pseudo-observations.
  pub fn log_likelihood(&self) -> CopulaResult<f64> {
    self.require_constructed()?;
    self.weighted_log_likelihood(&self.edge_models())
  }

  /// Jointly re-estimates every edge parameter by maximising the full vine likelihood
  /// with Nelder-Mead. Returns whether the parameters changed. A failed or non-improving
  /// optimisation is logged and leaves the vine untouched.
  pub fn refine(&mut self) -> CopulaResult<bool> {
    self.require_constructed()?;
    let slots: Vec<Slot> = self
      .trees
      .iter()
      .flat_map(|t| {
        t.edges
          .iter()
          .filter(|e| e.model.n_params() > 0)
          .map(move |e| Slot {
            level: t.level,
            edge: e.id,
            bounds: e.model.theta_bounds(),
          })
      })
      .collect();
    if slots.is_empty() {
      return Ok(false);
    }

    let z0: Vec<f64> = slots
      .iter()
      .flat_map(|s| to_z(self.trees[s.level].edges[s.edge].model.theta(), &s.bounds))
      .collect();

    let outcome = {
      let problem = JointNll {
        vine: self,
        slots: &slots,
      };
      let start = problem.cost(&z0)?;

      let mut simplex = Vec::with_capacity(z0.len() + 1);
      simplex.push(z0.clone());
      for i in 0..z0.len() {
        let mut point = z0.clone();
        point[i] += 0.5;
        simplex.push(point);
      }

      match NelderMead::new(simplex).with_sd_tolerance(1e-8) {
        Err(e) => {
          warn!(error = %e, "joint refinement could not start");
          None
        }
        Ok(solver) => match Executor::new(problem, solver)
          .configure(|state| state.max_iters(self.config.refine_max_iters))
          .run()
        {
          Ok(res) => res
            .state
            .best_param
            .map(|z| (z, start, res.state.best_cost)),
          Err(e) => {
            warn!(error = %e, "joint refinement failed");
            None
          }
        },
      }
    };

    let Some((z, start, best)) = outcome else {
      return Ok(false);
    };
    if !(best < start - 1e-9) {
      debug!(start, best, "joint refinement did not improve the likelihood");
      return Ok(false);
    }

    let mut offset = 0;
    for slot in &slots {
      let k = slot.bounds.len();
      let theta = to_theta(&z[offset..offset + k], &slot.bounds);
      offset += k;
      let edge = &mut self.trees[slot.level].edges[slot.edge];
      edge.model.set_theta(theta.clone())?;
      edge.transposed = edge.model.transposed();
      edge.pair.set_theta(theta)?;
    }
    // conditional columns above tree 0 were computed from the sequential fit
    for level in 1..self.trees.len() {
      let (below, above) = self.trees.split_at_mut(level);
      above[0].refresh_from(&below[level - 1])?;
    }
    info!(before = -start, after = -best, "refined vine parameters");
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray_rand::RandomExt;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::StandardNormal;
  use tracing_test::traced_test;

  use super::*;
  use crate::copulas::correlation::kendall_tau_matrix;
  use crate::copulas::univariate::gaussian::GaussianUnivariate;

  const N: usize = 1000;

  fn pair_config() -> PairCopulaConfig {
    PairCopulaConfig {
      families: vec![
        (CopulaType::Gaussian, Rotation::R0),
        (CopulaType::Frank, Rotation::R0),
        (CopulaType::Clayton, Rotation::R0),
        (CopulaType::Clayton, Rotation::R90),
        (CopulaType::Gumbel, Rotation::R0),
        (CopulaType::Gumbel, Rotation::R270),
      ],
      ..PairCopulaConfig::default()
    }
  }

  fn config(kind: VineKind) -> VineConfig {
    VineConfig {
      kind,
      pair: pair_config(),
      ..VineConfig::default()
    }
  }

  /// One-factor Gaussian data: `x_j = l_j f + sqrt(1 - l_j^2) e_j`.
  fn factor_data(loadings: &[f64], n: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let d = loadings.len();
    let z = Array2::<f64>::random_using((n, d + 1), StandardNormal, &mut rng);
    let mut x = Array2::<f64>::zeros((n, d));
    for (j, &l) in loadings.iter().enumerate() {
      let col = &z.column(d) * l + &z.column(j) * (1.0 - l * l).sqrt();
      x.column_mut(j).assign(&col);
    }
    x
  }

  fn fitted(kind: VineKind, loadings: &[f64], seed: u64) -> Vine {
    let data = factor_data(loadings, N, seed);
    let mut vine = Vine::new(&data, None, config(kind)).unwrap();
    vine.construct().unwrap();
    vine
  }

  #[test]
  fn vine_has_d_minus_one_trees() {
    let vine = fitted(VineKind::Canonical, &[0.9, 0.7, 0.5, 0.6], 1);
    let d = vine.dim();
    assert_eq!(vine.trees().len(), d - 1);
    for (k, tree) in vine.trees().iter().enumerate() {
      assert_eq!(tree.level, k);
      assert_eq!(tree.nodes.len(), d - k);
      assert_eq!(tree.edges.len(), d - k - 1);
      for e in &tree.edges {
        assert_eq!(e.conditioning.len(), k);
        assert_eq!(e.triplet.is_some(), k > 0);
      }
    }
    assert_eq!(vine.edges_summary().len(), d * (d - 1) / 2);
  }

  #[test]
  fn regular_vine_resample_matches_kendall_matrix() {
    let data = factor_data(&[0.9, -0.7, 0.5, 0.6], N, 7);
    let mut vine = Vine::new(&data, None, config(VineKind::Regular)).unwrap();
    vine.construct().unwrap();

    let resampled = vine.sample_with_rng(3000, &mut StdRng::seed_from_u64(8)).unwrap();
    assert_eq!(resampled.dim(), (3000, 4));
    assert!(resampled.iter().all(|&p| p > 0.0 && p < 1.0));

    let source = kendall_tau_matrix(&data).unwrap();
    let drawn = kendall_tau_matrix(&resampled).unwrap();
    for (a, b) in source.iter().zip(drawn.iter()) {
      assert_abs_diff_eq!(a, b, epsilon = 0.1);
    }
  }

  #[test]
  fn canonical_vine_resample_matches_kendall_matrix() {
    let data = factor_data(&[0.8, 0.6, -0.5], N, 17);
    let mut vine = Vine::new(&data, None, config(VineKind::Canonical)).unwrap();
    vine.construct().unwrap();

    let resampled = vine.sample_with_rng(3000, &mut StdRng::seed_from_u64(2)).unwrap();
    let source = kendall_tau_matrix(&data).unwrap();
    let drawn = kendall_tau_matrix(&resampled).unwrap();
    for (a, b) in source.iter().zip(drawn.iter()) {
      assert_abs_diff_eq!(a, b, epsilon = 0.1);
    }
  }

  #[test]
  fn two_variable_vine_is_one_pair_copula() {
    let vine = fitted(VineKind::Regular, &[0.8, 0.8], 4);
    assert_eq!(vine.trees().len(), 1);
    assert_eq!(vine.trees()[0].edges.len(), 1);
    assert_eq!(vine.sample(10).unwrap().dim(), (10, 2));
  }

  #[test]
  fn state_machine_advances_one_level_at_a_time() {
    let data = factor_data(&[0.8, 0.6, 0.7], 400, 3);
    let mut vine = Vine::new(&data, None, config(VineKind::Regular)).unwrap();
    assert_eq!(vine.state(), VineState::Empty);
    assert!(matches!(vine.sample(5), Err(CopulaError::InvalidState(_))));

    assert_eq!(vine.build_next_level().unwrap(), VineState::LevelBuilt(0));
    assert_eq!(vine.build_next_level().unwrap(), VineState::LevelBuilt(1));
    assert!(matches!(vine.log_likelihood(), Err(CopulaError::InvalidState(_))));
    assert_eq!(vine.build_next_level().unwrap(), VineState::Constructed);

    let err = vine.build_next_level().unwrap_err();
    assert!(matches!(err, CopulaError::InvalidState(_)));
    assert!(matches!(vine.construct(), Err(CopulaError::InvalidState(_))));
  }

  #[test]
  fn missing_triplet_is_a_structural_error() {
    let mut vine = fitted(VineKind::Canonical, &[0.8, 0.6, 0.7], 5);
    vine.trees[1].edges[0].triplet = None;
    let err = SamplingPlan::from_trees(&vine.trees).unwrap_err();
    assert!(matches!(err, CopulaError::Structural(_)));

    vine.plan = None;
    assert!(matches!(vine.sample(5), Err(CopulaError::Structural(_))));
  }

  #[test]
  fn truncated_vine_is_a_structural_error() {
    let mut vine = fitted(VineKind::Regular, &[0.8, 0.6, 0.7], 6);
    vine.trees.pop();
    let err = SamplingPlan::from_trees(&vine.trees).unwrap_err();
    assert!(matches!(err, CopulaError::Structural(_)));
  }

  #[test]
  fn sampling_order_visits_every_variable_once() {
    let vine = fitted(VineKind::Regular, &[0.9, 0.5, 0.7, 0.4], 12);
    let plan = vine.plan().unwrap();
    let mut vars: Vec<usize> = plan.steps.iter().map(|s| s.var).collect();
    for (i, step) in plan.steps.iter().enumerate() {
      assert_eq!(step.chain.len(), i);
    }
    vars.sort();
    assert_eq!(vars, vec![0, 1, 2, 3]);
  }

  #[test]
  #[traced_test]
  fn construction_logs_each_level() {
    let _ = fitted(VineKind::Canonical, &[0.8, 0.6, 0.7], 8);
    assert!(logs_contain("built vine level"));
  }

  #[test]
  fn log_likelihood_sums_log_density() {
    let vine = fitted(VineKind::Regular, &[0.8, 0.6, 0.7], 9);
    let ll = vine.log_likelihood().unwrap();
    let lp = vine.log_pdf(vine.pseudo_obs()).unwrap();
    assert_abs_diff_eq!(ll, lp.sum(), epsilon = 1e-8);
    assert!(ll > 0.0);
  }

  #[test]
  fn refinement_never_lowers_the_likelihood() {
    let mut vine = fitted(VineKind::Canonical, &[0.8, 0.6, 0.7], 10);
    let before = vine.log_likelihood().unwrap();
    let changed = vine.refine().unwrap();
    let after = vine.log_likelihood().unwrap();
    assert!(after >= before - 1e-9);
    if !changed {
      assert_abs_diff_eq!(after, before, epsilon = 1e-12);
    }
  }

  #[test]
  fn refined_node_data_follows_the_refined_models() {
    let mut vine = Vine::new(
      &factor_data(&[0.85, 0.7, 0.6, 0.75], N, 12),
      None,
      VineConfig {
        refine_max_iters: 60,
        ..config(VineKind::Regular)
      },
    )
    .unwrap();
    vine.construct().unwrap();
    vine.refine().unwrap();

    let trees = vine.trees();
    for level in 1..trees.len() {
      for node in &trees[level].nodes {
        let e = &trees[level - 1].edges[node.source_edge().unwrap()];
        let x = trees[level - 1].nodes[e.a].data_for(e.conditioned.0).unwrap();
        let y = trees[level - 1].nodes[e.b].data_for(e.conditioned.1).unwrap();
        let first = node.data_for(e.conditioned.0).unwrap();
        let expected = e.model.h_array(x, y);
        for (a, b) in first.iter().zip(expected.iter()) {
          assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
      }
    }

    let mut from_edges = 0.0;
    for tree in trees {
      for e in &tree.edges {
        let x = tree.nodes[e.a].data_for(e.conditioned.0).unwrap();
        let y = tree.nodes[e.b].data_for(e.conditioned.1).unwrap();
        let nll = e.model.nll(x.as_slice().unwrap(), y.as_slice().unwrap(), None);
        assert_abs_diff_eq!(e.pair.fit_result().unwrap().nll, nll, epsilon = 1e-6);
        assert_eq!(e.pair.model().unwrap().theta(), e.model.theta());
        from_edges -= nll;
      }
    }
    let ll = vine.log_likelihood().unwrap();
    assert_abs_diff_eq!(ll, from_edges, epsilon = 1e-6 * ll.abs().max(1.0));
  }

  #[test]
  fn sample_sessions_do_not_leak_between_calls() {
    let vine = fitted(VineKind::Regular, &[0.8, 0.6, 0.7], 11);
    let a = vine.sample_with_rng(50, &mut StdRng::seed_from_u64(3)).unwrap();
    let b = vine.sample_with_rng(50, &mut StdRng::seed_from_u64(3)).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn scaled_sample_follows_the_marginals() {
    let vine = fitted(VineKind::Canonical, &[0.7, 0.7], 13);
    let margins = [
      GaussianUnivariate::new(10.0, 2.0).unwrap(),
      GaussianUnivariate::new(-5.0, 0.5).unwrap(),
    ];
    let s = vine.sample_scaled(4000, &margins).unwrap();
    assert_abs_diff_eq!(s.column(0).mean().unwrap(), 10.0, epsilon = 0.2);
    assert_abs_diff_eq!(s.column(1).mean().unwrap(), -5.0, epsilon = 0.05);
    assert!(matches!(
      vine.sample_scaled(10, &margins[..1]),
      Err(CopulaError::InvalidInput(_))
    ));
  }

  #[test]
  fn malformed_input_is_rejected() {
    let one_column = Array2::<f64>::zeros((10, 1));
    assert!(matches!(
      Vine::new(&one_column, None, VineConfig::default()),
      Err(CopulaError::InvalidInput(_))
    ));

    let data = factor_data(&[0.5, 0.5], 10, 1);
    let weights = Array1::<f64>::ones(9);
    assert!(matches!(
      Vine::new(&data, Some(weights), VineConfig::default()),
      Err(CopulaError::InvalidInput(_))
    ));

    let vine = fitted(VineKind::Canonical, &[0.7, 0.7], 14);
    assert!(matches!(
      vine.log_pdf(&Array2::<f64>::from_elem((3, 3), 0.5)),
      Err(CopulaError::InvalidInput(_))
    ));
  }
}
