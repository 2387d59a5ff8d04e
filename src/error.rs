use thiserror::Error;

use crate::{BuildError, RegistryError, RunError};

/// Unified error type covering tree construction, policy registration, and
/// evaluation.
///
/// Handy for callers that build and run a tree in the same function and want
/// a single `?`-compatible error.
#[derive(Debug, Error)]
pub enum DTreeError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Run(#[from] RunError),
}
