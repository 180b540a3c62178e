//! # Errors
//!
//! $$
//! \text{ConfigurationError}\;\cup\;\text{FitConvergence}\;\cup\;\text{Structural}\;\cup\;\dots
//! $$
//!
//! Root-finding failures are not part of this taxonomy: they are reported through
//! [`crate::copulas::bivariate::inversion::RootFindResult`] and clamped locally.

/// Crate-wide result alias.
pub type CopulaResult<T> = Result<T, CopulaError>;

#[derive(Debug, Clone, PartialEq)]
pub enum CopulaError {
  // ---- Configuration ----
  /// Rotation code outside {0, 1, 2, 3}.
  InvalidRotation(i64),
  /// Family name that does not map to a known copula.
  UnknownFamily(String),

  // ---- Parameters / input ----
  /// Parameter vector of the wrong arity or outside the family bounds.
  InvalidParameter(String),
  /// Malformed data (length mismatch, too few observations, negative weights).
  InvalidInput(String),

  // ---- Fitting ----
  /// Every solver in the fallback chain failed.
  FitConvergence(String),

  // ---- Vine ----
  /// Vine is missing structure required for sampling (e.g. a one-fold triplet).
  Structural(String),
  /// Operation requested in the wrong construction state.
  InvalidState(String),

  // ---- Backends ----
  /// Error bubbled up from a numeric backend (argmin, kendalls, statrs).
  Numeric(String),
}

impl std::error::Error for CopulaError {}

impl std::fmt::Display for CopulaError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CopulaError::InvalidRotation(r) => {
        write!(f, "Invalid rotation {r}: expected one of 0, 1, 2, 3")
      }
      CopulaError::UnknownFamily(name) => write!(f, "Unknown copula family '{name}'"),
      CopulaError::InvalidParameter(text) => write!(f, "Invalid parameter: {text}"),
      CopulaError::InvalidInput(text) => write!(f, "Invalid input: {text}"),
      CopulaError::FitConvergence(text) => write!(f, "Fit did not converge: {text}"),
      CopulaError::Structural(text) => write!(f, "Structural error: {text}"),
      CopulaError::InvalidState(text) => write!(f, "Invalid state: {text}"),
      CopulaError::Numeric(text) => write!(f, "Numeric backend error: {text}"),
    }
  }
}

impl From<anyhow::Error> for CopulaError {
  fn from(err: anyhow::Error) -> Self {
    CopulaError::Numeric(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_names_the_offending_value() {
    assert_eq!(
      CopulaError::InvalidRotation(7).to_string(),
      "Invalid rotation 7: expected one of 0, 1, 2, 3"
    );
    assert!(CopulaError::UnknownFamily("joe".into())
      .to_string()
      .contains("'joe'"));
  }

  #[test]
  fn anyhow_errors_become_numeric() {
    let err: CopulaError = anyhow::anyhow!("line search failed").into();
    assert_eq!(err, CopulaError::Numeric("line search failed".into()));
  }
}
