//! # Inversion
//!
//! $$
//! \text{find } x\in(\varepsilon,1-\varepsilon):\; h(x\mid v)=p
//! $$
//!
//! Bracketing bisection, Newton refinement through `roots`, and a bisection fallback
//! when Newton leaves the bracket.
//!
use roots::find_root_newton_raphson;
use roots::SimpleConvergency;
use tracing::trace;

use super::EPS;

/// Coarse bisection steps run before Newton takes over.
const BRACKET_STEPS: usize = 12;
const NEWTON_MAX_ITER: usize = 50;
const BISECTION_MAX_ITER: usize = 200;
const TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFindMethod {
  /// Closed-form inverse, no iteration.
  Analytic,
  /// Target lies outside the attainable range; the nearest bound is returned.
  Boundary,
  Newton,
  /// Newton diverged or left the bracket.
  Bisection,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootFindResult {
  pub value: f64,
  pub method: RootFindMethod,
  pub converged: bool,
}

impl RootFindResult {
  pub fn analytic(value: f64) -> Self {
    Self {
      value: value.clamp(EPS, 1.0 - EPS),
      method: RootFindMethod::Analytic,
      converged: value.is_finite(),
    }
  }

  /// Clamped value that is always safe to feed back into a copula.
  pub fn value_or_clamped(&self) -> f64 {
    if self.value.is_finite() {
      self.value.clamp(EPS, 1.0 - EPS)
    } else {
      0.5
    }
  }
}

/// Solves `f(x) = target` for a non-decreasing `f` on `(EPS, 1 - EPS)`; `df` is its
/// derivative. Never fails: a non-converged search reports `converged = false` with the
/// value clamped to the domain.
pub fn invert_h<F, D>(target: f64, f: F, df: D) -> RootFindResult
where
  F: Fn(f64) -> f64,
  D: Fn(f64) -> f64,
{
  let g = |x: f64| f(x) - target;
  let mut lo = EPS;
  let mut hi = 1.0 - EPS;
  let (g_lo, g_hi) = (g(lo), g(hi));

  if !g_lo.is_finite() || !g_hi.is_finite() || !target.is_finite() {
    trace!(target, "non-finite h at the domain bounds");
    return RootFindResult {
      value: 0.5,
      method: RootFindMethod::Bisection,
      converged: false,
    };
  }
  if g_lo >= 0.0 {
    return boundary(lo);
  }
  if g_hi <= 0.0 {
    return boundary(hi);
  }

  for _ in 0..BRACKET_STEPS {
    let mid = 0.5 * (lo + hi);
    if g(mid) > 0.0 {
      hi = mid;
    } else {
      lo = mid;
    }
  }

  let mut convergency = SimpleConvergency {
    eps: TOLERANCE,
    max_iter: NEWTON_MAX_ITER,
  };
  let start = 0.5 * (lo + hi);
  if let Ok(x) = find_root_newton_raphson(start, &g, &df, &mut convergency) {
    if x.is_finite() && x >= lo && x <= hi && g(x).abs() < 1e-9 {
      return RootFindResult {
        value: x,
        method: RootFindMethod::Newton,
        converged: true,
      };
    }
  }

  trace!(target, lo, hi, "newton left the bracket, bisecting");
  for _ in 0..BISECTION_MAX_ITER {
    let mid = 0.5 * (lo + hi);
    let g_mid = g(mid);
    if !g_mid.is_finite() {
      break;
    }
    if g_mid > 0.0 {
      hi = mid;
    } else {
      lo = mid;
    }
    if hi - lo < TOLERANCE {
      break;
    }
  }

  let value = 0.5 * (lo + hi);
  RootFindResult {
    value: value.clamp(EPS, 1.0 - EPS),
    method: RootFindMethod::Bisection,
    converged: hi - lo < 1e-8,
  }
}

fn boundary(value: f64) -> RootFindResult {
  RootFindResult {
    value,
    method: RootFindMethod::Boundary,
    converged: true,
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  #[test]
  fn newton_solves_smooth_cdf() {
    let res = invert_h(0.36, |x| x * x, |x| 2.0 * x);
    assert_eq!(res.method, RootFindMethod::Newton);
    assert!(res.converged);
    assert_abs_diff_eq!(res.value, 0.6, epsilon = 1e-9);
  }

  #[test]
  fn bisection_handles_kinked_function() {
    // derivative lies about the slope, Newton cannot stay inside the bracket
    let f = |x: f64| if x < 0.5 { 0.2 * x } else { 0.1 + 1.8 * (x - 0.5) };
    let res = invert_h(0.55, f, |_| 1e-6);
    assert!(res.converged);
    assert_eq!(res.method, RootFindMethod::Bisection);
    assert_abs_diff_eq!(f(res.value), 0.55, epsilon = 1e-8);
  }

  #[test]
  fn out_of_range_targets_clamp_to_domain() {
    let res = invert_h(2.0, |x| x, |_| 1.0);
    assert_eq!(res.method, RootFindMethod::Boundary);
    assert_abs_diff_eq!(res.value, 1.0 - EPS);

    let res = invert_h(-1.0, |x| x, |_| 1.0);
    assert_abs_diff_eq!(res.value, EPS);
  }

  #[test]
  fn non_finite_function_reports_failure() {
    let res = invert_h(0.5, |_| f64::NAN, |_| 1.0);
    assert!(!res.converged);
    assert_abs_diff_eq!(res.value_or_clamped(), 0.5);
  }
}
