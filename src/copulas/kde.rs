//! # Kernel density
//!
//! $$
//! \hat F_h(x)=\frac1n\sum_{i=1}^n\Phi\!\left(\frac{x-x_i}{h}\right),\qquad
//! h=0.9\,\min\!\left(\hat\sigma,\frac{\mathrm{IQR}}{1.34}\right)n^{-1/5}
//! $$
//!
//! Gaussian kernel smoother behind the kernel-CDF pseudo-observation transform.
//!
use std::f64::consts::PI;

use ndarray::Array1;
use ordered_float::OrderedFloat;

use super::bivariate::clip;
use super::rectangle::norm_cdf;

#[derive(Debug, Clone)]
pub struct GaussianKDE {
  data: Array1<f64>,
  bandwidth: f64,
}

impl GaussianKDE {
  pub fn new(data: Array1<f64>, bandwidth: f64) -> Self {
    Self { data, bandwidth }
  }

  /// Bandwidth chosen by Silverman's rule of thumb.
  pub fn with_silverman_bandwidth(data: Array1<f64>) -> Self {
    let bandwidth = silverman_bandwidth(&data);
    Self { data, bandwidth }
  }

  pub fn bandwidth(&self) -> f64 {
    self.bandwidth
  }

  pub fn pdf(&self, x: f64) -> f64 {
    let norm = 1.0 / (self.bandwidth * (2.0 * PI).sqrt());
    let sum: f64 = self
      .data
      .iter()
      .map(|&xi| norm * (-0.5 * ((x - xi) / self.bandwidth).powi(2)).exp())
      .sum();
    sum / self.data.len() as f64
  }

  pub fn cdf(&self, x: f64) -> f64 {
    let sum: f64 = self
      .data
      .iter()
      .map(|&xi| norm_cdf((x - xi) / self.bandwidth))
      .sum();
    sum / self.data.len() as f64
  }

  /// Smoothed CDF at every sample point, kept strictly inside the unit interval.
  pub fn transform(&self) -> Array1<f64> {
    self.data.mapv(|x| clip(self.cdf(x)))
  }
}

pub fn silverman_bandwidth(data: &Array1<f64>) -> f64 {
  let n = data.len() as f64;
  if n < 2.0 {
    return 1e-6;
  }

  let mean = data.mean().unwrap_or(0.0);
  let std = (data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();

  let mut sorted = data.to_vec();
  sorted.sort_by_key(|&x| OrderedFloat(x));
  let iqr = percentile(&sorted, 75.0) - percentile(&sorted, 25.0);

  // a degenerate IQR (heavy ties) falls back to the standard deviation
  let scale = if iqr > 0.0 { std.min(iqr / 1.34) } else { std };
  (0.9 * scale * n.powf(-0.2)).max(1e-8)
}

/// Linearly interpolated `p`-th percentile (0..100) of sorted data.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
  if sorted.is_empty() {
    return 0.0;
  }
  let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() as f64 - 1.0);
  let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
  sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  #[test]
  fn silverman_bandwidth_is_positive_and_shrinks_with_n() {
    let small = Array1::linspace(0.0, 1.0, 10);
    let large = Array1::linspace(0.0, 1.0, 1000);
    let (hs, hl) = (silverman_bandwidth(&small), silverman_bandwidth(&large));
    assert!(hs > 0.0 && hl > 0.0);
    assert!(hl < hs);
  }

  #[test]
  fn percentile_interpolates() {
    let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
    assert_abs_diff_eq!(percentile(&sorted, 25.0), 2.0);
    assert_abs_diff_eq!(percentile(&sorted, 90.0), 4.6, epsilon = 1e-12);
  }

  #[test]
  fn kernel_cdf_is_monotone_and_integrates_pdf() {
    let kde = GaussianKDE::new(array![1.0, 1.5, 2.0, 2.5, 3.0], 0.4);
    let u = kde.transform();
    for w in u.windows(2) {
      assert!(w[0] < w[1]);
    }
    let dx = 1e-5;
    let fd = (kde.cdf(2.2 + dx) - kde.cdf(2.2 - dx)) / (2.0 * dx);
    assert_abs_diff_eq!(fd, kde.pdf(2.2), epsilon = 1e-6);
  }
}
