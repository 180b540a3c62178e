//! # Tree
//!
//! $$
//! T_k=(N_k,E_k),\quad |N_k|=d-k,\quad |E_k|=d-k-1,\qquad
//! w(a,b)=\bigl|\hat\tau\bigl(F(c_a\mid D),F(c_b\mid D)\bigr)\bigr|
//! $$
//!
//! One vine level: nodes carrying conditional pseudo-observations, the edge-selection rule
//! and the pair copulas fitted on the selected edges.
//!
use std::collections::BTreeSet;

use ndarray::Array1;
use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use super::VineKind;
use crate::copulas::bivariate::CopulaModel;
use crate::copulas::correlation::kendall_tau;
use crate::copulas::pair::BivariateSample;
use crate::copulas::pair::PairCopula;
use crate::copulas::pair::PairCopulaConfig;
use crate::error::CopulaError;
use crate::error::CopulaResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKey {
  /// Original variable, level 0 only.
  Variable(usize),
  /// Node produced by `edge` of the tree at `level`.
  Edge { level: usize, edge: usize },
}

#[derive(Debug, Clone)]
pub enum NodeData {
  Observed(Array1<f64>),
  /// `first = F(c0 | c1, D)` and `second = F(c1 | c0, D)`.
  Conditional {
    first: Array1<f64>,
    second: Array1<f64>,
  },
}

#[derive(Debug, Clone)]
pub struct Node {
  pub id: usize,
  pub key: NodeKey,
  pub conditioned: Vec<usize>,
  pub conditioning: BTreeSet<usize>,
  /// Every original variable the node depends on.
  pub union: BTreeSet<usize>,
  /// Endpoints of the producing edge, indexed in the tree below.
  pub endpoints: Option<(usize, usize)>,
  pub data: NodeData,
}

impl Node {
  fn variable(var: usize, data: Array1<f64>) -> Self {
    Self {
      id: var,
      key: NodeKey::Variable(var),
      conditioned: vec![var],
      conditioning: BTreeSet::new(),
      union: BTreeSet::from([var]),
      endpoints: None,
      data: NodeData::Observed(data),
    }
  }

  pub fn source_edge(&self) -> Option<usize> {
    match self.key {
      NodeKey::Edge { edge, .. } => Some(edge),
      NodeKey::Variable(_) => None,
    }
  }

  /// Pseudo-observations of `var` given everything else the node depends on.
  pub fn data_for(&self, var: usize) -> CopulaResult<&Array1<f64>> {
    match &self.data {
      NodeData::Observed(x) if self.conditioned == [var] => Ok(x),
      NodeData::Conditional { first, .. } if self.conditioned.first() == Some(&var) => Ok(first),
      NodeData::Conditional { second, .. } if self.conditioned.get(1) == Some(&var) => Ok(second),
      _ => Err(CopulaError::Structural(format!(
        "node {:?} holds no data for variable {var}",
        self.key
      ))),
    }
  }
}

/// Nodes of the tree below that route sampling through an edge at level `k >= 1`: the
/// producing edges of `a` and `b` meet at `anchor`, their other endpoints are `sides`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneFoldTriplet {
  pub sides: (usize, usize),
  pub anchor: usize,
}

#[derive(Debug, Clone)]
pub struct Edge {
  pub id: usize,
  pub a: usize,
  pub b: usize,
  /// `(c0, c1)`: the variable of `a` and the variable of `b` not shared with the other.
  pub conditioned: (usize, usize),
  pub conditioning: BTreeSet<usize>,
  pub pair: PairCopula,
  /// Selected copula of `(c0, c1)`; `model.h(x, y) = F(c0 | c1, D)`.
  pub model: CopulaModel,
  /// Copula of `(c1, c0)`.
  pub transposed: CopulaModel,
  pub triplet: Option<OneFoldTriplet>,
}

impl Edge {
  pub fn touches(&self, var: usize) -> bool {
    self.conditioned.0 == var || self.conditioned.1 == var || self.conditioning.contains(&var)
  }
}

#[derive(Debug, Clone)]
struct Candidate {
  a: usize,
  b: usize,
  conditioned: (usize, usize),
  conditioning: BTreeSet<usize>,
  triplet: Option<OneFoldTriplet>,
  weight: f64,
}

impl Candidate {
  fn flipped(&self) -> Self {
    Self {
      a: self.b,
      b: self.a,
      conditioned: (self.conditioned.1, self.conditioned.0),
      conditioning: self.conditioning.clone(),
      triplet: self.triplet.map(|t| OneFoldTriplet {
        sides: (t.sides.1, t.sides.0),
        anchor: t.anchor,
      }),
      weight: self.weight,
    }
  }
}

fn single(set: BTreeSet<usize>) -> Option<usize> {
  let mut it = set.into_iter();
  match (it.next(), it.next()) {
    (Some(x), None) => Some(x),
    _ => None,
  }
}

/// Candidate edge between nodes `i` and `j`, or `None` when the pair violates the
/// proximity condition.
fn candidate(nodes: &[Node], i: usize, j: usize) -> CopulaResult<Option<Candidate>> {
  let (ni, nj) = (&nodes[i], &nodes[j]);

  let triplet = match (ni.endpoints, nj.endpoints) {
    (None, None) => None,
    (Some((p1, q1)), Some((p2, q2))) => {
      let shared: Vec<usize> = [p1, q1]
        .into_iter()
        .filter(|x| *x == p2 || *x == q2)
        .collect();
      let &[anchor] = shared.as_slice() else {
        return Ok(None);
      };
      let side_i = if p1 == anchor { q1 } else { p1 };
      let side_j = if p2 == anchor { q2 } else { p2 };
      Some(OneFoldTriplet {
        sides: (side_i, side_j),
        anchor,
      })
    }
    _ => {
      return Err(CopulaError::Structural(
        "nodes of one tree come from different levels".into(),
      ))
    }
  };

  let ci = single(ni.union.difference(&nj.union).copied().collect());
  let cj = single(nj.union.difference(&ni.union).copied().collect());
  let (Some(ci), Some(cj)) = (ci, cj) else {
    return Ok(None);
  };

  let (tau, _) = kendall_tau(ni.data_for(ci)?, nj.data_for(cj)?)?;
  Ok(Some(Candidate {
    a: i,
    b: j,
    conditioned: (ci, cj),
    conditioning: ni.union.intersection(&nj.union).copied().collect(),
    triplet,
    weight: tau.abs(),
  }))
}

/// Admissible candidates as a dense table, `table[i][j]` oriented from `i` to `j`.
fn candidate_table(nodes: &[Node]) -> CopulaResult<Vec<Vec<Option<Candidate>>>> {
  let m = nodes.len();
  let pairs: Vec<(usize, usize)> = (0..m)
    .flat_map(|i| ((i + 1)..m).map(move |j| (i, j)))
    .collect();
  let found = pairs
    .par_iter()
    .map(|&(i, j)| candidate(nodes, i, j))
    .collect::<CopulaResult<Vec<_>>>()?;

  let mut table = vec![vec![None; m]; m];
  for c in found.into_iter().flatten() {
    table[c.b][c.a] = Some(c.flipped());
    let (i, j) = (c.a, c.b);
    table[i][j] = Some(c);
  }
  Ok(table)
}

/// Star around the node with the largest total |tau| to every other node.
fn canonical_star(table: &[Vec<Option<Candidate>>]) -> CopulaResult<Vec<Candidate>> {
  let m = table.len();
  let mut best_root = None;
  let mut best_sum = f64::NEG_INFINITY;
  for r in 0..m {
    let links: Option<Vec<f64>> = (0..m)
      .filter(|&j| j != r)
      .map(|j| table[j][r].as_ref().map(|c| c.weight))
      .collect();
    // a root must be admissible with every other node
    let Some(links) = links else { continue };
    let s: f64 = links.iter().sum();
    if s > best_sum {
      best_sum = s;
      best_root = Some(r);
    }
  }

  let root = best_root.ok_or_else(|| {
    CopulaError::Structural("no node is admissible as a canonical root".into())
  })?;
  debug!(root, weight = best_sum, "selected canonical root");
  Ok(
    (0..m)
      .filter(|&j| j != root)
      .filter_map(|j| table[j][root].clone())
      .collect(),
  )
}

/// Prim's maximum spanning tree over the admissible pairs.
fn maximum_spanning(table: &[Vec<Option<Candidate>>]) -> CopulaResult<Vec<Candidate>> {
  let m = table.len();
  let weight = |i: usize, j: usize| table[i][j].as_ref().map(|c| c.weight);
  let mut in_tree = vec![false; m];
  let mut best_w = vec![-1.0; m];
  let mut parent: Vec<Option<usize>> = vec![None; m];

  in_tree[0] = true;
  for j in 1..m {
    if let Some(w) = weight(0, j) {
      best_w[j] = w;
      parent[j] = Some(0);
    }
  }

  let mut edges = Vec::with_capacity(m.saturating_sub(1));
  for _ in 1..m {
    // pick max weight outside tree
    let mut best = -1.0;
    let mut next = None;
    for j in 0..m {
      if !in_tree[j] && parent[j].is_some() && best_w[j] > best {
        best = best_w[j];
        next = Some(j);
      }
    }
    let (v, p) = match next.and_then(|v| parent[v].map(|p| (v, p))) {
      Some(found) => found,
      None => {
        return Err(CopulaError::Structural(
          "admissible graph is disconnected".into(),
        ))
      }
    };
    in_tree[v] = true;
    if let Some(c) = table[p][v].clone() {
      edges.push(c);
    }

    for k in 0..m {
      if in_tree[k] {
        continue;
      }
      if let Some(w) = weight(v, k) {
        if w > best_w[k] {
          best_w[k] = w;
          parent[k] = Some(v);
        }
      }
    }
  }
  Ok(edges)
}

/// One level of a vine.
#[derive(Debug, Clone)]
pub struct Tree {
  pub level: usize,
  pub nodes: Vec<Node>,
  pub edges: Vec<Edge>,
}

impl Tree {
  /// Tree 0 over the columns of `u`, one node per variable.
  pub fn first(
    u: &Array2<f64>,
    weights: Option<&Array1<f64>>,
    kind: VineKind,
    config: &PairCopulaConfig,
  ) -> CopulaResult<Self> {
    let nodes = u
      .columns()
      .into_iter()
      .enumerate()
      .map(|(var, col)| Node::variable(var, col.to_owned()))
      .collect();
    Self::build(0, nodes, weights, kind, config)
  }

  /// Next level, whose nodes are the edges of this tree.
  pub fn next(
    &self,
    weights: Option<&Array1<f64>>,
    kind: VineKind,
    config: &PairCopulaConfig,
  ) -> CopulaResult<Self> {
    if self.edges.len() < 2 {
      return Err(CopulaError::InvalidState(format!(
        "tree {} has a single edge; there is no next level",
        self.level
      )));
    }
    let nodes = self
      .edges
      .iter()
      .map(|edge| self.transition(edge))
      .collect::<CopulaResult<Vec<_>>>()?;
    Self::build(self.level + 1, nodes, weights, kind, config)
  }

  /// Node of the next level: both conditional directions of `edge`.
  fn transition(&self, edge: &Edge) -> CopulaResult<Node> {
    let (c0, c1) = edge.conditioned;
    let (na, nb) = (&self.nodes[edge.a], &self.nodes[edge.b]);
    let x = na.data_for(c0)?;
    let y = nb.data_for(c1)?;
    Ok(Node {
      id: edge.id,
      key: NodeKey::Edge {
        level: self.level,
        edge: edge.id,
      },
      conditioned: vec![c0, c1],
      conditioning: edge.conditioning.clone(),
      union: na.union.union(&nb.union).copied().collect(),
      endpoints: Some((edge.a, edge.b)),
      data: NodeData::Conditional {
        first: edge.model.h_array(x, y),
        second: edge.transposed.h_array(y, x),
      },
    })
  }

  /// Recomputes every node from the current models of `below` and hands the new
  /// columns to this tree's pair copulas.
  pub(crate) fn refresh_from(&mut self, below: &Tree) -> CopulaResult<()> {
    for node in &mut self.nodes {
      if let Some(source) = node.source_edge() {
        let edge = below.edges.get(source).ok_or_else(|| {
          CopulaError::Structural(format!("tree {} has no edge {source}", below.level))
        })?;
        node.data = below.transition(edge)?.data;
      }
    }
    for edge in &mut self.edges {
      let x = self.nodes[edge.a].data_for(edge.conditioned.0)?.clone();
      let y = self.nodes[edge.b].data_for(edge.conditioned.1)?.clone();
      let weights = edge.pair.sample().weights().cloned();
      edge.pair.set_sample(BivariateSample::from_pseudo_obs(x, y, weights)?)?;
    }
    Ok(())
  }

  fn build(
    level: usize,
    nodes: Vec<Node>,
    weights: Option<&Array1<f64>>,
    kind: VineKind,
    config: &PairCopulaConfig,
  ) -> CopulaResult<Self> {
    if nodes.len() < 2 {
      return Err(CopulaError::InvalidInput(
        "a tree needs at least 2 nodes".into(),
      ));
    }
    let table = candidate_table(&nodes)?;
    let chosen = match kind {
      VineKind::Canonical => canonical_star(&table)?,
      VineKind::Regular => maximum_spanning(&table)?,
    };
    if chosen.len() + 1 != nodes.len() {
      return Err(CopulaError::Structural(format!(
        "tree {level} selected {} edges for {} nodes",
        chosen.len(),
        nodes.len()
      )));
    }

    let edges = chosen
      .into_par_iter()
      .enumerate()
      .map(|(id, c)| fit_edge(&nodes, id, c, weights, config))
      .collect::<CopulaResult<Vec<_>>>()?;

    Ok(Self {
      level,
      nodes,
      edges,
    })
  }
}

fn fit_edge(
  nodes: &[Node],
  id: usize,
  c: Candidate,
  weights: Option<&Array1<f64>>,
  config: &PairCopulaConfig,
) -> CopulaResult<Edge> {
  let x = nodes[c.a].data_for(c.conditioned.0)?.clone();
  let y = nodes[c.b].data_for(c.conditioned.1)?.clone();
  let sample = BivariateSample::from_pseudo_obs(x, y, weights.cloned())?;
  let mut pair = PairCopula::from_sample(sample, config.clone());
  pair.select()?;
  let model = pair
    .model()
    .cloned()
    .ok_or_else(|| CopulaError::InvalidState("tournament left no model".into()))?;

  debug!(
    edge = id,
    conditioned = ?c.conditioned,
    conditioning = ?c.conditioning,
    family = %model.r#type(),
    rotation = %model.rotation(),
    "fitted vine edge"
  );
  Ok(Edge {
    id,
    a: c.a,
    b: c.b,
    conditioned: c.conditioned,
    conditioning: c.conditioning,
    transposed: model.transposed(),
    model,
    pair,
    triplet: c.triplet,
  })
}
