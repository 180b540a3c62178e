//! # Copulas
//!
//! $$
//! H(x,y)=C\bigl(F(x),G(y)\bigr),\qquad
//! h(u\mid v)=\frac{\partial C(u,v)}{\partial v}
//! $$
//!
pub mod bivariate;
pub mod correlation;
pub mod empirical;
pub mod kde;
pub mod multivariate;
pub mod pair;
pub mod rectangle;
pub mod univariate;
