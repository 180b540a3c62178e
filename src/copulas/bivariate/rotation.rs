//! # Rotation
//!
//! $$
//! C_{90}(u,v)=v-C(1-u,v),\quad C_{180}(u,v)=u+v-1+C(1-u,1-v),\quad C_{270}(u,v)=u-C(u,1-v)
//! $$
//!
//! Every rotation is a reflection of one or both margins. Families only implement the
//! unrotated form; [`Rotation::reflect`] maps the inputs and the `correct_*` helpers map
//! the outputs back.
//!
use std::fmt;

use crate::error::CopulaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum Rotation {
  #[default]
  R0,
  /// `(u, v) -> (1 - u, v)`
  R90,
  /// `(u, v) -> (1 - u, 1 - v)`, the survival copula.
  R180,
  /// `(u, v) -> (u, 1 - v)`
  R270,
}

impl Rotation {
  pub const ALL: [Rotation; 4] = [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270];

  pub fn code(self) -> u8 {
    match self {
      Rotation::R0 => 0,
      Rotation::R90 => 1,
      Rotation::R180 => 2,
      Rotation::R270 => 3,
    }
  }

  pub fn degrees(self) -> u16 {
    u16::from(self.code()) * 90
  }

  pub fn flips_u(self) -> bool {
    matches!(self, Rotation::R90 | Rotation::R180)
  }

  pub fn flips_v(self) -> bool {
    matches!(self, Rotation::R180 | Rotation::R270)
  }

  fn from_flips(flip_u: bool, flip_v: bool) -> Self {
    match (flip_u, flip_v) {
      (false, false) => Rotation::R0,
      (true, false) => Rotation::R90,
      (true, true) => Rotation::R180,
      (false, true) => Rotation::R270,
    }
  }

  /// Applies `self` after `other`. Reflections compose by toggling each axis.
  pub fn compose(self, other: Rotation) -> Rotation {
    Rotation::from_flips(
      self.flips_u() ^ other.flips_u(),
      self.flips_v() ^ other.flips_v(),
    )
  }

  /// Rotation seen by the copula of `(V, U)`: the reflected axes swap.
  pub fn transposed(self) -> Rotation {
    Rotation::from_flips(self.flips_v(), self.flips_u())
  }

  /// Rotated families have the sign of their Kendall's tau flipped for 90 and 270.
  pub fn tau_sign(self) -> f64 {
    if self.flips_u() ^ self.flips_v() {
      -1.0
    } else {
      1.0
    }
  }

  pub fn reflect(self, u: f64, v: f64) -> (f64, f64) {
    (
      if self.flips_u() { 1.0 - u } else { u },
      if self.flips_v() { 1.0 - v } else { v },
    )
  }

  /// Maps the base CDF evaluated at the reflected point back to the rotated copula.
  pub fn correct_cdf(self, base: f64, u: f64, v: f64) -> f64 {
    match self {
      Rotation::R0 => base,
      Rotation::R90 => v - base,
      Rotation::R180 => u + v - 1.0 + base,
      Rotation::R270 => u - base,
    }
  }

  /// Maps the base H-function at the reflected point back to `dC_rot/dv`.
  pub fn correct_h(self, base: f64) -> f64 {
    if self.flips_u() {
      1.0 - base
    } else {
      base
    }
  }

  /// Probability handed to the base H-inverse.
  pub fn reflect_probability(self, p: f64) -> f64 {
    if self.flips_u() {
      1.0 - p
    } else {
      p
    }
  }

  /// Maps the base H-inverse solution back to the rotated `u`.
  pub fn correct_hinv(self, base: f64) -> f64 {
    if self.flips_u() {
      1.0 - base
    } else {
      base
    }
  }
}

impl TryFrom<i64> for Rotation {
  type Error = CopulaError;

  fn try_from(code: i64) -> Result<Self, Self::Error> {
    match code {
      0 => Ok(Rotation::R0),
      1 => Ok(Rotation::R90),
      2 => Ok(Rotation::R180),
      3 => Ok(Rotation::R270),
      other => Err(CopulaError::InvalidRotation(other)),
    }
  }
}

impl fmt::Display for Rotation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.degrees())
  }
}
