//! # Rectangle probabilities
//!
//! $$
//! \Phi_2(a,b;\rho)=P(X\le a,\,Y\le b),\qquad
//! T_{2,\nu}(a,b;\rho)=\int_0^{T_\nu(b)} T_{\nu+1}\!\left(\frac{a-\rho\,T_\nu^{-1}(s)}
//! {\sqrt{(\nu+T_\nu^{-1}(s)^2)(1-\rho^2)/(\nu+1)}}\right)ds
//! $$
//!
//! Standard normal / Student-t helpers plus the bivariate rectangle probabilities behind
//! the elliptical copula CDFs. The normal case follows Drezner-Wesolowsky as refined by
//! Genz; the Student-t case integrates the closed-form conditional distribution.
//!
use std::f64::consts::PI;
use std::f64::consts::SQRT_2;

use statrs::function::beta::beta_reg;
use statrs::function::beta::inv_beta_reg;
use statrs::function::erf::erfc;
use statrs::function::erf::erfc_inv;

use super::bivariate::legendre_64;

/// Standard normal CDF.
pub fn norm_cdf(x: f64) -> f64 {
  0.5 * erfc(-x / SQRT_2)
}

/// Standard normal quantile.
pub fn norm_ppf(p: f64) -> f64 {
  if p <= 0.0 {
    return f64::NEG_INFINITY;
  }
  if p >= 1.0 {
    return f64::INFINITY;
  }
  -SQRT_2 * erfc_inv(2.0 * p)
}

/// Student-t CDF with `nu` degrees of freedom.
pub fn t_cdf(t: f64, nu: f64) -> f64 {
  if t.is_infinite() {
    return if t > 0.0 { 1.0 } else { 0.0 };
  }
  let tail = 0.5 * beta_reg(0.5 * nu, 0.5, nu / (nu + t * t));
  if t > 0.0 {
    1.0 - tail
  } else {
    tail
  }
}

/// Student-t quantile with `nu` degrees of freedom.
pub fn t_ppf(p: f64, nu: f64) -> f64 {
  if p <= 0.0 {
    return f64::NEG_INFINITY;
  }
  if p >= 1.0 {
    return f64::INFINITY;
  }
  let tail = p.min(1.0 - p);
  let y = inv_beta_reg(0.5 * nu, 0.5, 2.0 * tail);
  let t = (nu * (1.0 - y) / y).sqrt();
  if p >= 0.5 {
    t
  } else {
    -t
  }
}

// Gauss-Legendre half-rules (nodes, weights) for 6, 12 and 20 points.
const GL6: ([f64; 3], [f64; 3]) = (
  [0.9324695142031522, 0.6612093864662647, 0.2386191860831970],
  [0.1713244923791705, 0.3607615730481384, 0.4679139345726904],
);
const GL12: ([f64; 6], [f64; 6]) = (
  [
    0.9815606342467191,
    0.9041172563704750,
    0.7699026741943050,
    0.5873179542866171,
    0.3678314989981802,
    0.1252334085114692,
  ],
  [
    0.04717533638651177,
    0.1069393259953183,
    0.1600783285433464,
    0.2031674267230659,
    0.2334925365383547,
    0.2491470458134029,
  ],
);
const GL20: ([f64; 10], [f64; 10]) = (
  [
    0.9931285991850949,
    0.9639719272779138,
    0.9122344282513259,
    0.8391169718222188,
    0.7463319064601508,
    0.6360536807265150,
    0.5108670019508271,
    0.3737060887154196,
    0.2277858511416451,
    0.07652652113349733,
  ],
  [
    0.01761400713915212,
    0.04060142980038694,
    0.06267204833410906,
    0.08327674157670475,
    0.1019301198172404,
    0.1181945319615184,
    0.1316886384491766,
    0.1420961093183821,
    0.1491729864726037,
    0.1527533871307259,
  ],
);

/// `P(X > h, Y > k)` for a standard bivariate normal with correlation `r`.
fn bvn_upper(h: f64, k: f64, r: f64) -> f64 {
  if h == f64::INFINITY || k == f64::INFINITY {
    return 0.0;
  }
  if h == f64::NEG_INFINITY {
    return if k == f64::NEG_INFINITY {
      1.0
    } else {
      norm_cdf(-k)
    };
  }
  if k == f64::NEG_INFINITY {
    return norm_cdf(-h);
  }

  let (x, w): (&[f64], &[f64]) = if r.abs() < 0.3 {
    (&GL6.0, &GL6.1)
  } else if r.abs() < 0.75 {
    (&GL12.0, &GL12.1)
  } else {
    (&GL20.0, &GL20.1)
  };

  let mut k = k;
  let mut hk = h * k;
  let mut bvn = 0.0;

  if r.abs() < 0.925 {
    let hs = 0.5 * (h * h + k * k);
    let asr = r.asin();
    for (&xi, &wi) in x.iter().zip(w.iter()) {
      for sign in [-1.0, 1.0] {
        let sn = (0.5 * asr * (1.0 + sign * xi)).sin();
        bvn += wi * ((sn * hk - hs) / (1.0 - sn * sn)).exp();
      }
    }
    bvn = bvn * asr / (4.0 * PI) + norm_cdf(-h) * norm_cdf(-k);
  } else {
    if r < 0.0 {
      k = -k;
      hk = -hk;
    }
    if r.abs() < 1.0 {
      let as_ = (1.0 - r) * (1.0 + r);
      let mut a = as_.sqrt();
      let bs = (h - k) * (h - k);
      let c = (4.0 - hk) / 8.0;
      let d = (12.0 - hk) / 16.0;
      bvn = a
        * (-(bs / as_ + hk) / 2.0).exp()
        * (1.0 - c * (bs - as_) * (1.0 - d * bs / 5.0) / 3.0 + c * d * as_ * as_ / 5.0);
      if hk > -160.0 {
        let b = bs.sqrt();
        bvn -= (-hk / 2.0).exp()
          * (2.0 * PI).sqrt()
          * norm_cdf(-b / a)
          * b
          * (1.0 - c * bs * (1.0 - d * bs / 5.0) / 3.0);
      }
      a /= 2.0;
      for (&xi, &wi) in x.iter().zip(w.iter()) {
        for sign in [-1.0, 1.0] {
          let xs = (a * (1.0 + sign * xi)).powi(2);
          let rs = (1.0 - xs).sqrt();
          let asr = -(bs / xs + hk) / 2.0;
          if asr > -100.0 {
            bvn += a
              * wi
              * asr.exp()
              * ((-hk * (1.0 - rs) / (2.0 * (1.0 + rs))).exp() / rs - (1.0 + c * xs * (1.0 + d * xs)));
          }
        }
      }
      bvn = -bvn / (2.0 * PI);
    }
    if r > 0.0 {
      bvn += norm_cdf(-h.max(k));
    } else {
      bvn = -bvn + (norm_cdf(-h) - norm_cdf(-k)).max(0.0);
    }
  }

  bvn.clamp(0.0, 1.0)
}

/// `P(X <= a, Y <= b)` for a standard bivariate normal with correlation `rho`.
pub fn bvn_cdf(a: f64, b: f64, rho: f64) -> f64 {
  bvn_upper(-a, -b, rho)
}

/// Conditional Student-t distribution `P(X <= a | Y = y)`.
pub fn t_conditional(a: f64, y: f64, rho: f64, nu: f64) -> f64 {
  let scale = ((nu + y * y) * (1.0 - rho * rho) / (nu + 1.0)).sqrt();
  t_cdf((a - rho * y) / scale, nu + 1.0)
}

/// `P(X <= a, Y <= b)` for a standard bivariate Student-t with correlation `rho`.
pub fn bvt_cdf(a: f64, b: f64, rho: f64, nu: f64) -> f64 {
  if a == f64::NEG_INFINITY || b == f64::NEG_INFINITY {
    return 0.0;
  }
  if a == f64::INFINITY {
    return t_cdf(b, nu);
  }
  if b == f64::INFINITY {
    return t_cdf(a, nu);
  }

  // s = upper * w^2 smooths the endpoint behaviour at s -> 0
  let upper = t_cdf(b, nu);
  legendre_64()
    .integrate(0.0, 1.0, |w| {
      2.0 * upper * w * t_conditional(a, t_ppf(upper * w * w, nu), rho, nu)
    })
    .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  #[test]
  fn normal_helpers_invert_each_other() {
    for p in [1e-6, 0.025, 0.3, 0.5, 0.9, 0.999] {
      assert_abs_diff_eq!(norm_cdf(norm_ppf(p)), p, epsilon = 1e-10);
    }
    assert_abs_diff_eq!(norm_ppf(0.975), 1.959963984540054, epsilon = 1e-9);
  }

  #[test]
  fn t_helpers_invert_each_other() {
    for nu in [3.0, 7.5, 30.0] {
      for p in [0.01, 0.2, 0.5, 0.77, 0.995] {
        assert_abs_diff_eq!(t_cdf(t_ppf(p, nu), nu), p, epsilon = 1e-8);
      }
    }
    // tabulated 97.5% quantile for 10 degrees of freedom
    assert_abs_diff_eq!(t_ppf(0.975, 10.0), 2.228138851986, epsilon = 1e-6);
  }

  #[test]
  fn bvn_independent_case_factorises() {
    for (a, b) in [(0.3, -1.2), (-0.5, 0.5), (2.0, 1.0)] {
      assert_abs_diff_eq!(bvn_cdf(a, b, 0.0), norm_cdf(a) * norm_cdf(b), epsilon = 1e-12);
    }
  }

  #[test]
  fn bvn_orthant_probabilities_match_closed_form() {
    // P(X <= 0, Y <= 0) = 1/4 + asin(rho) / (2 pi)
    for rho in [-0.95, -0.6, -0.2, 0.1, 0.5, 0.8, 0.95, 0.99] {
      let expected = 0.25 + f64::asin(rho) / (2.0 * PI);
      assert_abs_diff_eq!(bvn_cdf(0.0, 0.0, rho), expected, epsilon = 1e-10);
    }
  }

  #[test]
  fn bvn_limits() {
    assert_abs_diff_eq!(bvn_cdf(f64::INFINITY, 0.4, 0.7), norm_cdf(0.4), epsilon = 1e-14);
    assert_abs_diff_eq!(bvn_cdf(-40.0, 0.4, 0.7), 0.0, epsilon = 1e-14);
    assert_abs_diff_eq!(bvn_cdf(0.3, 0.9, 1.0), norm_cdf(0.3), epsilon = 1e-12);
  }

  #[test]
  fn bvt_reduces_to_product_and_orthant_formula() {
    let nu = 5.0;
    assert_abs_diff_eq!(
      bvt_cdf(0.4, -0.3, 0.0, nu),
      t_cdf(0.4, nu) * t_cdf(-0.3, nu),
      epsilon = 1e-5
    );
    // the orthant probability is the same for every elliptical law
    for rho in [-0.5, 0.3, 0.7] {
      let expected = 0.25 + f64::asin(rho) / (2.0 * PI);
      assert_abs_diff_eq!(bvt_cdf(0.0, 0.0, rho, nu), expected, epsilon = 1e-4);
    }
  }
}
