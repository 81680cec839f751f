//! Error taxonomy for the decomposition core.

use thiserror::Error;

/// Errors raised synchronously by [`crate::decompose`] and the builders it uses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecomposeError {
    /// Caller-supplied data or parameters are out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A required backend capability is not available in this build.
    #[error("missing dependency: {0}")]
    DependencyMissing(String),
    /// The solver did not converge or the problem is ill-posed.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
}

impl DecomposeError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn numerical(msg: impl Into<String>) -> Self {
        Self::NumericalFailure(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DecomposeError>;
