//! # Correlation
//!
//! $$
//! \tau_b=\frac{n_c-n_d}{\sqrt{(n_0-n_1)(n_0-n_2)}},\qquad
//! \rho_S=\operatorname{corr}\bigl(\operatorname{rank}(X),\operatorname{rank}(Y)\bigr)
//! $$
//!
use std::cmp::Ordering;

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;

use super::empirical::ranks;
use super::rectangle::norm_cdf;
use crate::error::CopulaError;
use crate::error::CopulaResult;

fn cmp_f64(a: &f64, b: &f64) -> Ordering {
  a.partial_cmp(b).unwrap_or(Ordering::Greater)
}

fn tau_b(x: ArrayView1<f64>, y: ArrayView1<f64>) -> CopulaResult<(f64, f64)> {
  if x.len() != y.len() {
    return Err(CopulaError::InvalidInput(format!(
      "length mismatch: {} vs {}",
      x.len(),
      y.len()
    )));
  }
  if x.len() < 2 {
    return Err(CopulaError::InvalidInput(
      "Kendall's tau needs at least 2 observations".into(),
    ));
  }

  let (xs, ys) = (x.to_vec(), y.to_vec());
  let (tau, z) = kendalls::tau_b_with_comparator(&xs, &ys, cmp_f64)
    .map_err(|e| CopulaError::Numeric(format!("kendall's tau: {e:?}")))?;

  // constant columns carry no information about dependence
  if !tau.is_finite() {
    return Ok((0.0, 1.0));
  }
  let p_value = if z.is_finite() {
    2.0 * (1.0 - norm_cdf(z.abs()))
  } else {
    0.0
  };
  Ok((tau, p_value.clamp(0.0, 1.0)))
}

/// Kendall's tau-b together with its two-sided p-value under independence.
pub fn kendall_tau(x: &Array1<f64>, y: &Array1<f64>) -> CopulaResult<(f64, f64)> {
  tau_b(x.view(), y.view())
}

/// Kendall's tau between every pair of columns.
pub fn kendall_tau_matrix(data: &Array2<f64>) -> CopulaResult<Array2<f64>> {
  let d = data.ncols();
  let mut out = Array2::<f64>::eye(d);
  for i in 0..d {
    for j in (i + 1)..d {
      let (tau, _) = tau_b(data.column(i), data.column(j))?;
      out[[i, j]] = tau;
      out[[j, i]] = tau;
    }
  }
  Ok(out)
}

/// Pearson correlation between every pair of columns.
pub fn pearson_matrix(data: &Array2<f64>) -> CopulaResult<Array2<f64>> {
  if data.nrows() < 2 {
    return Err(CopulaError::InvalidInput(
      "correlation needs at least 2 observations".into(),
    ));
  }
  let mut corr = data
    .t()
    .pearson_correlation()
    .map_err(|e| CopulaError::InvalidInput(e.to_string()))?;
  // constant columns produce NaN; report them as uncorrelated
  for ((i, j), c) in corr.indexed_iter_mut() {
    if !c.is_finite() {
      *c = if i == j { 1.0 } else { 0.0 };
    }
  }
  Ok(corr)
}

/// Spearman's rho: Pearson correlation of the tie-averaged ranks.
pub fn spearman_rho_matrix(data: &Array2<f64>) -> CopulaResult<Array2<f64>> {
  let mut ranked = Array2::<f64>::zeros(data.raw_dim());
  for (j, col) in data.axis_iter(Axis(1)).enumerate() {
    ranked.column_mut(j).assign(&ranks(&col.to_owned()));
  }
  pearson_matrix(&ranked)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  #[test]
  fn perfect_concordance_and_discordance() {
    let x = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let up = x.mapv(|v| v * v);
    let down = x.mapv(|v| -v);
    assert_abs_diff_eq!(kendall_tau(&x, &up).unwrap().0, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(kendall_tau(&x, &down).unwrap().0, -1.0, epsilon = 1e-12);
    assert!(kendall_tau(&x, &up).unwrap().1 < 0.05);
  }

  #[test]
  fn mismatched_lengths_are_rejected() {
    let err = kendall_tau(&array![1.0, 2.0], &array![1.0]).unwrap_err();
    assert!(matches!(err, CopulaError::InvalidInput(_)));
  }

  #[test]
  fn matrices_are_symmetric_with_unit_diagonal() {
    let data = array![
      [1.0, 3.0, 0.2],
      [2.0, 1.0, 0.1],
      [3.0, 4.0, 0.5],
      [4.0, 2.0, 0.3],
      [5.0, 6.0, 0.9]
    ];
    for m in [
      kendall_tau_matrix(&data).unwrap(),
      spearman_rho_matrix(&data).unwrap(),
      pearson_matrix(&data).unwrap(),
    ] {
      for i in 0..3 {
        assert_abs_diff_eq!(m[[i, i]], 1.0, epsilon = 1e-12);
        for j in 0..3 {
          assert_abs_diff_eq!(m[[i, j]], m[[j, i]], epsilon = 1e-12);
        }
      }
    }
    // 1 - 6 sum(d^2) / (n (n^2 - 1)) with sum(d^2) = 10
    let rho = spearman_rho_matrix(&data).unwrap();
    assert_abs_diff_eq!(rho[[0, 1]], 0.5, epsilon = 1e-12);
  }
}
