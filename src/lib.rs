//! # copula-vine
//!
//! $$
//! f(x_1,\dots,x_d)=\prod_{i=1}^{d} f_i(x_i)\prod_{k=0}^{d-2}\prod_{e\in E_k}
//! c_{a_e b_e;D_e}\left(F(x_{a_e}\mid x_{D_e}),F(x_{b_e}\mid x_{D_e})\right)
//! $$
//!
//! Bivariate copula families, a pair-copula tournament and canonical / regular
//! vine construction and sampling.
//!
pub mod copulas;
pub mod error;
pub mod traits;

pub use error::CopulaError;
pub use error::CopulaResult;
