//! # Empirical
//!
//! $$
//! \hat U_i=\frac{\operatorname{rank}(X_i)}{n+1},\qquad
//! K_n(t)=\frac1n\sum_{i=1}^n\mathbf 1\{Z_i\le t\},\quad
//! Z_i=\frac{\#\{j:U_j<U_i,\,V_j<V_i\}}{n-1}
//! $$
//!
use ndarray::Array1;
use ordered_float::OrderedFloat;

use super::bivariate::clip;

/// One-based ranks with ties replaced by their average rank.
pub fn ranks(x: &Array1<f64>) -> Array1<f64> {
  let n = x.len();
  let mut order: Vec<usize> = (0..n).collect();
  order.sort_by_key(|&i| OrderedFloat(x[i]));

  let mut out = Array1::<f64>::zeros(n);
  let mut start = 0;
  while start < n {
    let mut end = start + 1;
    while end < n && OrderedFloat(x[order[end]]) == OrderedFloat(x[order[start]]) {
      end += 1;
    }
    // positions start..end share the average of ranks start+1..=end
    let avg = 0.5 * ((start + 1) + end) as f64;
    for &i in &order[start..end] {
      out[i] = avg;
    }
    start = end;
  }
  out
}

/// Pseudo-observations `rank / (n + 1)`, kept strictly inside the unit interval.
pub fn rank_transform(x: &Array1<f64>) -> Array1<f64> {
  let denom = x.len() as f64 + 1.0;
  ranks(x).mapv(|r| clip(r / denom))
}

/// Sorted pseudo-observations `Z_i` of the empirical Kendall distribution.
pub fn kendall_pseudo_obs(u: &[f64], v: &[f64]) -> Vec<f64> {
  let n = u.len();
  if n < 2 {
    return vec![0.0; n];
  }
  let mut z: Vec<f64> = (0..n)
    .map(|i| {
      let below = (0..n).filter(|&j| u[j] < u[i] && v[j] < v[i]).count();
      below as f64 / (n - 1) as f64
    })
    .collect();
  z.sort_by_key(|&t| OrderedFloat(t));
  z
}

/// Empirical distribution function of a sorted sample evaluated at `t`.
pub fn ecdf_sorted(sorted: &[f64], t: f64) -> f64 {
  if sorted.is_empty() {
    return 0.0;
  }
  sorted.partition_point(|&z| z <= t) as f64 / sorted.len() as f64
}
