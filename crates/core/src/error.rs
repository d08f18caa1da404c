use thiserror::Error;

use crate::model::ParseIdError;

/// Input rejected before any local or remote state change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("unknown confidence level: {0:?}")]
    InvalidConfidence(String),

    #[error("{0} title cannot be empty")]
    EmptyTitle(&'static str),

    #[error(transparent)]
    InvalidId(#[from] ParseIdError),
}
