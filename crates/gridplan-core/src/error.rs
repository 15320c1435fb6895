//! Domain error kinds for the planner
//! core.
//!
//! Only `Validation` blocks a user
//! action. The other kinds are either
//! handled locally (`InvalidDate`),
//! reported as a warning
//! (`StorageFailure`), or raised by
//! explicit lookups only (`NotFound`).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlannerError {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("invalid date {input:?}: {reason}")]
  InvalidDate {
    input:  String,
    reason: String
  },

  #[error("no task matches {0:?}")]
  NotFound(String),

  #[error("failed to persist tasks: {0}")]
  StorageFailure(String)
}

impl PlannerError {
  pub fn invalid_date(
    input: &str,
    reason: impl Into<String>
  ) -> Self {
    Self::InvalidDate {
      input:  input.to_string(),
      reason: reason.into()
    }
  }

  pub fn storage(
    err: &anyhow::Error
  ) -> Self {
    Self::StorageFailure(format!(
      "{err:#}"
    ))
  }

  /// True for the kinds that must abort
  /// the triggering action.
  pub fn is_blocking(&self) -> bool {
    matches!(self, Self::Validation(_))
  }
}
