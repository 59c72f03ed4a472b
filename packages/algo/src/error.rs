//! Estimation error types.
//!
//! Every variant is recoverable: the caller skips the affected skill or
//! record and carries on with the rest of the batch.

use thiserror::Error;

/// Errors raised while building observations or fitting a skill
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BktError {
    /// Too few observations or users to identify five free parameters.
    #[error(
        "insufficient data for skill {skill}: {responses} responses from {users} users \
         (need >= {min_responses} from >= {min_users})"
    )]
    InsufficientData {
        skill: String,
        responses: usize,
        users: usize,
        min_responses: usize,
        min_users: usize,
    },

    /// Numerical failure during EM.
    #[error("fit failed for skill {skill}: {reason}")]
    FitFailed { skill: String, reason: String },

    /// Input record missing an identifier or carrying invalid outcomes.
    #[error("malformed record #{index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
}

impl BktError {
    /// Short machine-readable kind, used as a logging field
    pub fn kind(&self) -> &'static str {
        match self {
            BktError::InsufficientData { .. } => "insufficient_data",
            BktError::FitFailed { .. } => "fit_failed",
            BktError::MalformedRecord { .. } => "malformed_record",
        }
    }

    pub fn skill(&self) -> Option<&str> {
        match self {
            BktError::InsufficientData { skill, .. } | BktError::FitFailed { skill, .. } => {
                Some(skill)
            }
            BktError::MalformedRecord { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BktError>;
