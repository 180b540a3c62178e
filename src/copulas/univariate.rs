//! # Univariate
//!
//! $$
//! X_j=F_j^{-1}(U_j)
//! $$
//!
pub use crate::traits::MarginalExt;

pub mod gaussian;
