//! # Multivariate
//!
//! $$
//! F(x_1,\dots,x_d)=C\bigl(F_1(x_1),\dots,F_d(x_d)\bigr)
//! $$
//!
pub mod tree;
pub mod vine;

pub use vine::EdgeSummary;
pub use vine::Vine;
pub use vine::VineConfig;
pub use vine::VineState;

/// Edge-selection rule applied at every level of a vine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VineKind {
  /// One root per level, paired with every other node.
  #[default]
  Canonical,
  /// Maximum spanning tree of |tau| over the admissible pairs.
  Regular,
}
