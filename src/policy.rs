use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::debug;

use crate::{RegistryError, RunError};

/// Take the first branch whose condition holds. Never backtracks.
pub const ONCE: &str = "once";

/// Take the first branch whose condition holds and whose child does not
/// itself run out of matches; otherwise keep scanning siblings.
pub const RECURSIVE: &str = "recursive";

/// Policy used by a root tree that names none.
pub const DEFAULT_POLICY: &str = ONCE;

/// What a policy reports back after walking a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A branch was delegated to and completed.
    Matched,
    /// Nothing at this level produced a result.
    NoMatch,
}

/// One tree level bound to one input object, as seen by a [`Policy`].
///
/// Ordinary branches are indexed `0..len()` in declaration order; the else
/// branch, if any, is reached only through [`delegate_else`](Level::delegate_else).
pub trait Level {
    /// Distance from the root tree.
    fn depth(&self) -> usize;

    /// Number of ordinary branches.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Description of the condition guarding branch `index`.
    fn describe(&self, index: usize) -> Option<&str>;

    /// Evaluate the condition guarding branch `index` against the input.
    fn validate(&mut self, index: usize) -> Result<bool, RunError>;

    /// Run the child of branch `index`. On [`Outcome::Matched`] its result
    /// becomes the level's result.
    fn delegate(&mut self, index: usize) -> Result<Outcome, RunError>;

    fn has_else(&self) -> bool;

    /// Run the else branch. Reports [`Outcome::NoMatch`] when there is none.
    fn delegate_else(&mut self) -> Result<Outcome, RunError>;
}

/// A named traversal algorithm.
///
/// Implemented for every `Fn(&mut dyn Level) -> Result<Outcome, RunError>`,
/// so plain functions and closures can be registered directly.
pub trait Policy: Send + Sync {
    fn traverse(&self, level: &mut dyn Level) -> Result<Outcome, RunError>;
}

impl<F> Policy for F
where
    F: Fn(&mut dyn Level) -> Result<Outcome, RunError> + Send + Sync,
{
    fn traverse(&self, level: &mut dyn Level) -> Result<Outcome, RunError> {
        self(level)
    }
}

/// The `once` policy: delegate to the first branch whose condition holds and
/// report whatever it reports.
pub fn traverse_once(level: &mut dyn Level) -> Result<Outcome, RunError> {
    for index in 0..level.len() {
        if level.validate(index)? {
            return level.delegate(index);
        }
    }
    level.delegate_else()
}

/// The `recursive` policy: like `once`, but a matched child that runs out of
/// matches sends the scan on to the next sibling.
pub fn traverse_recursive(level: &mut dyn Level) -> Result<Outcome, RunError> {
    for index in 0..level.len() {
        if !level.validate(index)? {
            continue;
        }
        match level.delegate(index)? {
            Outcome::Matched => return Ok(Outcome::Matched),
            Outcome::NoMatch => debug!(
                depth = level.depth(),
                branch = level.describe(index).unwrap_or_default(),
                "branch found no match; backtracking"
            ),
        }
    }
    level.delegate_else()
}

static GLOBAL: LazyLock<Arc<PolicyRegistry>> = LazyLock::new(|| Arc::new(PolicyRegistry::new()));

/// Maps policy names to traversal algorithms.
///
/// Most programs use the process-wide [`PolicyRegistry::global()`] instance.
/// Separate registries can be built for isolation and handed to
/// [`DTree::build_with()`](crate::DTree::build_with).
pub struct PolicyRegistry {
    policies: RwLock<HashMap<String, Arc<dyn Policy>>>,
    default_policy: RwLock<Arc<str>>,
}

impl PolicyRegistry {
    /// A registry holding the built-in `once` and `recursive` policies, with
    /// `once` as the default.
    #[must_use]
    pub fn new() -> Self {
        let mut policies: HashMap<String, Arc<dyn Policy>> = HashMap::new();
        policies.insert(ONCE.to_owned(), Arc::new(traverse_once));
        policies.insert(RECURSIVE.to_owned(), Arc::new(traverse_recursive));
        Self {
            policies: RwLock::new(policies),
            default_policy: RwLock::new(Arc::from(DEFAULT_POLICY)),
        }
    }

    /// A registry with the built-ins and a different default.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownDefault`] unless `name` is a built-in.
    /// Use [`set_default`](Self::set_default) to default to a custom policy
    /// after registering it.
    pub fn with_default(name: &str) -> Result<Self, RegistryError> {
        let registry = Self::new();
        registry.set_default(name)?;
        Ok(registry)
    }

    /// Make `name` the policy used by root trees that name none.
    ///
    /// Trees whose nodes (or ancestors) name a policy are unaffected. Trees
    /// relying on the default pick up the change on their next run.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownDefault`] unless `name` is registered.
    pub fn set_default(&self, name: &str) -> Result<(), RegistryError> {
        if !self.contains(name) {
            return Err(RegistryError::UnknownDefault {
                name: name.to_owned(),
            });
        }
        debug!(policy = %name, "setting default traversal policy");
        *self.default_policy.write() = Arc::from(name);
        Ok(())
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> &'static Arc<PolicyRegistry> {
        &GLOBAL
    }

    /// Register a policy under a new name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicatePolicy`] if the name is taken; the
    /// existing policy is left in place.
    pub fn register(
        &self,
        name: impl Into<String>,
        policy: impl Policy + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let mut policies = self.policies.write();
        if policies.contains_key(&name) {
            return Err(RegistryError::DuplicatePolicy { name });
        }
        debug!(policy = %name, "registering traversal policy");
        policies.insert(name, Arc::new(policy));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Policy>> {
        self.policies.read().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.policies.read().contains_key(name)
    }

    /// Registered policy names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.read().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn default_policy(&self) -> Arc<str> {
        Arc::clone(&self.default_policy.read())
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.names())
            .field("default_policy", &self.default_policy())
            .finish()
    }
}

/// Register a policy in the process-wide registry.
///
/// # Errors
///
/// Returns [`RegistryError::DuplicatePolicy`] if the name is taken.
pub fn register_policy(
    name: impl Into<String>,
    policy: impl Policy + 'static,
) -> Result<(), RegistryError> {
    PolicyRegistry::global().register(name, policy)
}
