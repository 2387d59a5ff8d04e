use thiserror::Error;

/// Boxed error produced by caller-supplied predicates and actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while building a [`Node`](crate::Node) or materializing a
/// [`DTree`](crate::DTree).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("unknown policy '{name}'")]
    UnknownPolicy { name: String },

    #[error("a node may declare at most one else branch")]
    DuplicateElse,
}

/// Errors raised while registering traversal policies.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("policy '{name}' is already registered")]
    DuplicatePolicy { name: String },

    #[error("default policy '{name}' is not registered")]
    UnknownDefault { name: String },
}

/// Errors raised while running a tree or a runner against an input object.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no branch matched and no else branch was given")]
    NoMatch,

    #[error("unknown policy '{name}'")]
    UnknownPolicy { name: String },

    #[error("branch index {index} out of range for a level with {len} branches")]
    BranchOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Failed(BoxError),
}

impl RunError {
    /// Wrap an error returned by caller code.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        RunError::Failed(err.into())
    }

    #[must_use]
    pub fn is_no_match(&self) -> bool {
        matches!(self, RunError::NoMatch)
    }
}
