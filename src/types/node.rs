use std::fmt;
use std::sync::Arc;

use super::condition::Condition;
use super::error::BuildError;
use super::runner::{Action, Catch, Runner};
use crate::tree::DTree;

/// Per-node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConfig {
    /// Traversal policy for the tree built from this node. `None` inherits
    /// from the parent tree, or the registry default at the root.
    pub policy: Option<String>,
}

/// Immutable blueprint of a decision-tree level: ordered (condition, child)
/// pairs plus configuration. Materialize it with [`DTree::build()`].
pub struct Node<T, R> {
    branches: Vec<(Condition<T>, Target<T, R>)>,
    config: NodeConfig,
}

/// A resolved child of a [`Node`].
pub(crate) enum Target<T, R> {
    Runner(Runner<T, R>),
    Node(Node<T, R>),
}

/// Anything that can sit on the right-hand side of a branch: a runner, an
/// action, a catch, a node, an unfinished [`NodeBuilder`], or a built tree.
pub struct Child<T, R>(ChildKind<T, R>);

enum ChildKind<T, R> {
    Target(Target<T, R>),
    Builder(NodeBuilder<T, R>),
}

/// Builder for constructing a [`Node`].
///
/// Nested builders may be passed as children directly; they are built, and
/// validated, together with their parent.
///
/// # Example
///
/// ```
/// use dtree::{Condition, DTree, NodeBuilder, Runner};
///
/// let node = NodeBuilder::new()
///     .branch(
///         Condition::new("negative", |x: &i64| *x < 0),
///         Runner::action("flip", |x: &i64| -x),
///     )
///     .otherwise(Runner::action("keep", |x: &i64| *x))
///     .build()
///     .unwrap();
///
/// let tree = DTree::build(node).unwrap();
/// assert_eq!(tree.run(&-4).unwrap(), Some(4));
/// ```
pub struct NodeBuilder<T, R> {
    branches: Vec<(Condition<T>, Child<T, R>)>,
    config: NodeConfig,
}

impl<T, R> NodeBuilder<T, R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
            config: NodeConfig::default(),
        }
    }

    /// Append a branch. Branches are evaluated in the order they are added.
    #[must_use]
    pub fn branch(mut self, condition: Condition<T>, child: impl Into<Child<T, R>>) -> Self {
        self.branches.push((condition, child.into()));
        self
    }

    /// Append the else branch, taken when no other condition matches.
    #[must_use]
    pub fn otherwise(self, child: impl Into<Child<T, R>>) -> Self {
        self.branch(Condition::otherwise(), child)
    }

    /// Select the traversal policy by name.
    #[must_use]
    pub fn policy(mut self, name: impl Into<String>) -> Self {
        self.config.policy = Some(name.into());
        self
    }

    /// Build the node, building nested builders along the way.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::DuplicateElse`] if this node, or any nested
    /// builder, declares more than one else branch.
    pub fn build(self) -> Result<Node<T, R>, BuildError> {
        let else_count = self
            .branches
            .iter()
            .filter(|(condition, _)| condition.is_else())
            .count();
        if else_count > 1 {
            return Err(BuildError::DuplicateElse);
        }

        let branches = self
            .branches
            .into_iter()
            .map(|(condition, Child(kind))| {
                let target = match kind {
                    ChildKind::Target(target) => target,
                    ChildKind::Builder(builder) => Target::Node(builder.build()?),
                };
                Ok((condition, target))
            })
            .collect::<Result<Vec<_>, BuildError>>()?;

        Ok(Node {
            branches,
            config: self.config,
        })
    }
}

impl<T, R> Default for NodeBuilder<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> Node<T, R> {
    #[must_use]
    pub fn builder() -> NodeBuilder<T, R> {
        NodeBuilder::new()
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The explicitly configured policy, if any.
    #[must_use]
    pub fn policy(&self) -> Option<&str> {
        self.config.policy.as_deref()
    }

    /// Number of branches, the else branch included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    #[must_use]
    pub fn has_else(&self) -> bool {
        self.branches.iter().any(|(condition, _)| condition.is_else())
    }

    /// Conditions in declaration order.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition<T>> {
        self.branches.iter().map(|(condition, _)| condition)
    }

    pub(crate) fn branches(&self) -> &[(Condition<T>, Target<T, R>)] {
        &self.branches
    }
}

impl<T, R> Clone for Target<T, R> {
    fn clone(&self) -> Self {
        match self {
            Target::Runner(runner) => Target::Runner(runner.clone()),
            Target::Node(node) => Target::Node(node.clone()),
        }
    }
}

impl<T, R> Clone for Node<T, R> {
    fn clone(&self) -> Self {
        Self {
            branches: self.branches.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T, R> fmt::Debug for Target<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Runner(runner) => runner.fmt(f),
            Target::Node(node) => node.fmt(f),
        }
    }
}

impl<T, R> fmt::Debug for Node<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("branches", &self.branches)
            .field("config", &self.config)
            .finish()
    }
}

impl<T, R> From<Runner<T, R>> for Child<T, R> {
    fn from(runner: Runner<T, R>) -> Self {
        Child(ChildKind::Target(Target::Runner(runner)))
    }
}

impl<T, R> From<Action<T, R>> for Child<T, R> {
    fn from(action: Action<T, R>) -> Self {
        Runner::from(action).into()
    }
}

impl<T, R> From<Catch<T, R>> for Child<T, R> {
    fn from(catch: Catch<T, R>) -> Self {
        Runner::from(catch).into()
    }
}

/// A built tree is re-materialized under its new parent, so it inherits
/// that parent's policy.
impl<T, R> From<Arc<DTree<T, R>>> for Child<T, R> {
    fn from(tree: Arc<DTree<T, R>>) -> Self {
        Runner::Tree(tree).into()
    }
}

impl<T, R> From<Node<T, R>> for Child<T, R> {
    fn from(node: Node<T, R>) -> Self {
        Child(ChildKind::Target(Target::Node(node)))
    }
}

impl<T, R> From<NodeBuilder<T, R>> for Child<T, R> {
    fn from(builder: NodeBuilder<T, R>) -> Self {
        Child(ChildKind::Builder(builder))
    }
}
