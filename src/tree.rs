use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use crate::policy::{Level, Outcome, PolicyRegistry};
use crate::types::node::Target;
use crate::{BuildError, Condition, Flow, Node, RunError, Runner};

const INDENT: &str = "|      ";
const TREE_MARK: &str = "+++";
const ACTION_MARK: &str = "---";

/// A materialized decision tree.
///
/// Built once from a [`Node`] and immutable afterwards, so a tree behind an
/// `Arc` can be run from many threads. Nested nodes become child trees that
/// keep a weak back-reference to their parent. Policy inheritance and depth
/// are resolved while building, so running a nested tree never walks the
/// parent chain.
pub struct DTree<T, R> {
    node: Node<T, R>,
    policy: Option<Arc<str>>,
    inherited: Option<Arc<str>>,
    depth: usize,
    parent: Weak<DTree<T, R>>,
    branches: Vec<(Condition<T>, Runner<T, R>)>,
    otherwise: Option<(Condition<T>, Runner<T, R>)>,
    registry: Arc<PolicyRegistry>,
}

impl<T, R> DTree<T, R> {
    /// Materialize `node` against the process-wide policy registry.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnknownPolicy`] if the node, or any nested node,
    /// names a policy that is not registered.
    pub fn build(node: Node<T, R>) -> Result<Arc<Self>, BuildError> {
        Self::build_with(node, PolicyRegistry::global())
    }

    /// Materialize `node` against an explicit registry.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnknownPolicy`] if the node, or any nested node,
    /// names a policy that is not registered in `registry`.
    pub fn build_with(
        node: Node<T, R>,
        registry: &Arc<PolicyRegistry>,
    ) -> Result<Arc<Self>, BuildError> {
        check_policies(&node, registry)?;
        Ok(Self::materialize(&node, Weak::new(), None, 0, registry))
    }

    fn materialize(
        node: &Node<T, R>,
        parent: Weak<Self>,
        parent_policy: Option<&Arc<str>>,
        depth: usize,
        registry: &Arc<PolicyRegistry>,
    ) -> Arc<Self> {
        let policy: Option<Arc<str>> = node.policy().map(Arc::from);
        let inherited = policy.clone().or_else(|| parent_policy.cloned());

        Arc::new_cyclic(|this| {
            let adopt = |child: &Node<T, R>| {
                Runner::Tree(Self::materialize(
                    child,
                    this.clone(),
                    inherited.as_ref(),
                    depth + 1,
                    registry,
                ))
            };
            let mut branches = Vec::with_capacity(node.len());
            let mut otherwise = None;

            for (condition, target) in node.branches() {
                let runner = match target {
                    Target::Node(child) => adopt(child),
                    Target::Runner(Runner::Tree(tree)) => adopt(tree.node()),
                    Target::Runner(runner) => runner.clone(),
                };
                if condition.is_else() {
                    otherwise = Some((condition.clone(), runner));
                } else {
                    branches.push((condition.clone(), runner));
                }
            }

            DTree {
                node: node.clone(),
                policy,
                inherited,
                depth,
                parent,
                branches,
                otherwise,
                registry: Arc::clone(registry),
            }
        })
    }

    /// Run `obj` through the tree.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::NoMatch`] when traversal finds nothing to run, and
    /// propagates any error from conditions, actions, or the policy itself.
    pub fn run(&self, obj: &T) -> Result<Option<R>, RunError> {
        self.evaluate(obj)?.into_result()
    }

    /// Like [`run`](Self::run), but reports "nothing matched" as [`Flow::NoMatch`].
    ///
    /// # Errors
    ///
    /// As for [`run`](Self::run), minus [`RunError::NoMatch`].
    /// [`RunError::UnknownPolicy`] cannot occur for a tree produced by
    /// [`build`](Self::build): every name is checked there, the default is
    /// always registered, and registries never forget a name.
    pub fn evaluate(&self, obj: &T) -> Result<Flow<R>, RunError> {
        let name = self.policy();
        let policy = self
            .registry
            .get(&name)
            .ok_or_else(|| RunError::UnknownPolicy {
                name: name.to_string(),
            })?;

        let depth = self.depth;
        debug!(
            depth,
            policy = %name,
            branches = self.branches.len(),
            "evaluating tree level"
        );

        let mut level = Cursor {
            tree: self,
            obj,
            depth,
            result: None,
        };
        match policy.traverse(&mut level)? {
            Outcome::Matched => Ok(Flow::Done(level.result.flatten())),
            Outcome::NoMatch => {
                debug!(depth, policy = %name, "no branch matched");
                Ok(Flow::NoMatch)
            }
        }
    }

    /// The effective policy: this tree's own, else the nearest ancestor's,
    /// else the registry default.
    ///
    /// Inheritance is settled when the tree is built. A subtree kept alive
    /// after its root is dropped still reports the policy it inherited, even
    /// though [`parent`](Self::parent) no longer reaches the root.
    #[must_use]
    pub fn policy(&self) -> Arc<str> {
        match &self.inherited {
            Some(policy) => Arc::clone(policy),
            None => self.registry.default_policy(),
        }
    }

    /// The policy set on this tree's node, if any.
    #[must_use]
    pub fn explicit_policy(&self) -> Option<&str> {
        self.policy.as_deref()
    }

    /// The enclosing tree. Parents are held weakly, so this is `None` for a
    /// root and also for a subtree whose root has been dropped; such a
    /// subtree keeps its [`policy`](Self::policy) and [`depth`](Self::depth).
    #[must_use]
    pub fn parent(&self) -> Option<Arc<DTree<T, R>>> {
        self.parent.upgrade()
    }

    /// Number of ancestors at build time. The root has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Ordinary branches in declaration order, then the else branch.
    pub fn children(&self) -> impl Iterator<Item = (&Condition<T>, &Runner<T, R>)> {
        self.branches
            .iter()
            .chain(self.otherwise.iter())
            .map(|(condition, runner)| (condition, runner))
    }

    #[must_use]
    pub fn otherwise(&self) -> Option<&Runner<T, R>> {
        self.otherwise.as_ref().map(|(_, runner)| runner)
    }

    /// The blueprint this tree was built from.
    #[must_use]
    pub fn node(&self) -> &Node<T, R> {
        &self.node
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let default = self.registry.default_policy();
        if depth == 0 {
            writeln!(
                f,
                "{TREE_MARK}root{}:",
                policy_suffix(&self.policy(), &default)
            )?;
        }

        let indent = INDENT.repeat(depth + 1);
        for (condition, runner) in self.children() {
            match runner {
                Runner::Tree(subtree) => {
                    writeln!(
                        f,
                        "{indent}{TREE_MARK}{condition}{}:",
                        policy_suffix(&subtree.policy(), &default)
                    )?;
                    subtree.render(f, depth + 1)?;
                }
                other => writeln!(
                    f,
                    "{indent}{ACTION_MARK}{condition} --> {}",
                    other.description()
                )?,
            }
        }
        Ok(())
    }
}

fn policy_suffix(policy: &str, default: &str) -> String {
    if policy == default {
        String::new()
    } else {
        format!("({policy})")
    }
}

fn check_policies<T, R>(node: &Node<T, R>, registry: &PolicyRegistry) -> Result<(), BuildError> {
    if let Some(name) = node.policy() {
        if !registry.contains(name) {
            return Err(BuildError::UnknownPolicy {
                name: name.to_owned(),
            });
        }
    }
    for (_, target) in node.branches() {
        match target {
            Target::Node(child) => check_policies(child, registry)?,
            Target::Runner(Runner::Tree(tree)) => check_policies(tree.node(), registry)?,
            Target::Runner(_) => {}
        }
    }
    Ok(())
}

/// One level of one tree, bound to one input object.
struct Cursor<'a, T, R> {
    tree: &'a DTree<T, R>,
    obj: &'a T,
    depth: usize,
    result: Option<Option<R>>,
}

impl<'a, T, R> Cursor<'a, T, R> {
    fn branch(&self, index: usize) -> Result<&'a (Condition<T>, Runner<T, R>), RunError> {
        let tree: &'a DTree<T, R> = self.tree;
        tree.branches
            .get(index)
            .ok_or(RunError::BranchOutOfRange {
                index,
                len: tree.branches.len(),
            })
    }

    fn take(&mut self, condition: &Condition<T>, runner: &Runner<T, R>) -> Result<Outcome, RunError> {
        trace!(depth = self.depth, branch = %condition, "taking branch");
        match runner.evaluate(self.obj)? {
            Flow::Done(value) => {
                self.result = Some(value);
                Ok(Outcome::Matched)
            }
            Flow::NoMatch => Ok(Outcome::NoMatch),
        }
    }
}

impl<T, R> Level for Cursor<'_, T, R> {
    fn depth(&self) -> usize {
        self.depth
    }

    fn len(&self) -> usize {
        self.tree.branches.len()
    }

    fn describe(&self, index: usize) -> Option<&str> {
        self.tree
            .branches
            .get(index)
            .map(|(condition, _)| condition.description())
    }

    fn validate(&mut self, index: usize) -> Result<bool, RunError> {
        let (condition, _) = self.branch(index)?;
        condition.validate(self.obj)
    }

    fn delegate(&mut self, index: usize) -> Result<Outcome, RunError> {
        let (condition, runner) = self.branch(index)?;
        self.take(condition, runner)
    }

    fn has_else(&self) -> bool {
        self.tree.otherwise.is_some()
    }

    fn delegate_else(&mut self) -> Result<Outcome, RunError> {
        let tree = self.tree;
        match &tree.otherwise {
            Some((condition, runner)) => self.take(condition, runner),
            None => Ok(Outcome::NoMatch),
        }
    }
}

impl<T, R> fmt::Display for DTree<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, self.depth)
    }
}

impl<T, R> fmt::Debug for DTree<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DTree")
            .field("policy", &self.policy())
            .field("depth", &self.depth)
            .field("branches", &self.branches)
            .field("otherwise", &self.otherwise)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ONCE, RECURSIVE};
    use crate::NodeBuilder;

    fn label(name: &str) -> Runner<i64, String> {
        let name = name.to_owned();
        Runner::action(name.clone(), move |_: &i64| name.clone())
    }

    fn above(n: i64) -> Condition<i64> {
        Condition::new(format!("x > {n}"), move |x: &i64| *x > n)
    }

    fn isolated() -> Arc<PolicyRegistry> {
        Arc::new(PolicyRegistry::new())
    }

    #[test]
    fn runs_first_matching_branch() {
        let node = NodeBuilder::new()
            .branch(above(10), label("big"))
            .branch(above(0), label("small"))
            .otherwise(label("negative"))
            .build()
            .unwrap();
        let tree = DTree::build(node).unwrap();

        assert_eq!(tree.run(&20).unwrap(), Some("big".to_owned()));
        assert_eq!(tree.run(&5).unwrap(), Some("small".to_owned()));
        assert_eq!(tree.run(&-5).unwrap(), Some("negative".to_owned()));
    }

    #[test]
    fn no_match_without_else() {
        let node = NodeBuilder::new()
            .branch(above(10), label("big"))
            .build()
            .unwrap();
        let tree = DTree::build(node).unwrap();
        assert!(tree.run(&1).unwrap_err().is_no_match());
        assert_eq!(tree.evaluate(&1).unwrap(), Flow::NoMatch);
    }

    #[test]
    fn nested_nodes_get_parents_and_depth() {
        let node = NodeBuilder::new()
            .branch(
                above(0),
                NodeBuilder::new().branch(above(10), NodeBuilder::new().otherwise(label("deep"))),
            )
            .build()
            .unwrap();
        let root = DTree::build(node).unwrap();
        assert_eq!(root.depth(), 0);
        assert!(root.parent().is_none());

        let (_, child) = root.children().next().unwrap();
        let Runner::Tree(child) = child else {
            panic!("expected subtree");
        };
        assert_eq!(child.depth(), 1);
        assert!(Arc::ptr_eq(&child.parent().unwrap(), &root));

        let (_, grandchild) = child.children().next().unwrap();
        let Runner::Tree(grandchild) = grandchild else {
            panic!("expected subtree");
        };
        assert_eq!(grandchild.depth(), 2);
        assert_eq!(root.run(&11).unwrap(), Some("deep".to_owned()));
    }

    #[test]
    fn policy_is_inherited_from_parent() {
        let node = NodeBuilder::new()
            .branch(
                above(0),
                NodeBuilder::new()
                    .branch(above(5), NodeBuilder::new().otherwise(label("a")))
                    .policy(ONCE),
            )
            .otherwise(label("b"))
            .policy(RECURSIVE)
            .build()
            .unwrap();
        let root = DTree::build_with(node, &isolated()).unwrap();
        assert_eq!(&*root.policy(), RECURSIVE);
        assert_eq!(root.explicit_policy(), Some(RECURSIVE));

        let Some((_, Runner::Tree(child))) = root.children().next() else {
            panic!("expected subtree");
        };
        assert_eq!(&*child.policy(), ONCE);

        let Some((_, Runner::Tree(grandchild))) = child.children().next() else {
            panic!("expected subtree");
        };
        assert_eq!(grandchild.explicit_policy(), None);
        assert_eq!(&*grandchild.policy(), ONCE);
    }

    #[test]
    fn root_falls_back_to_registry_default() {
        let registry = Arc::new(PolicyRegistry::with_default(RECURSIVE).unwrap());
        let node = NodeBuilder::new().otherwise(label("x")).build().unwrap();
        let tree = DTree::build_with(node, &registry).unwrap();
        assert_eq!(&*tree.policy(), RECURSIVE);
        assert_eq!(tree.to_string(), "+++root:\n|      ---ELSE --> x\n");
    }

    #[test]
    fn detached_subtree_keeps_inherited_policy_and_depth() {
        let node = NodeBuilder::new()
            .branch(
                above(0),
                NodeBuilder::new().branch(above(10), NodeBuilder::new().otherwise(label("deep"))),
            )
            .policy(RECURSIVE)
            .build()
            .unwrap();
        let root = DTree::build_with(node, &isolated()).unwrap();
        let Some((_, Runner::Tree(child))) = root.children().next() else {
            panic!("expected subtree");
        };
        let child = Arc::clone(child);
        drop(root);

        assert!(child.parent().is_none());
        assert_eq!(&*child.policy(), RECURSIVE);
        assert_eq!(child.explicit_policy(), None);
        assert_eq!(child.depth(), 1);
        assert_eq!(child.run(&11).unwrap(), Some("deep".to_owned()));
    }

    #[test]
    fn registered_policy_can_serve_as_default() {
        let registry = isolated();
        registry
            .register("else-first", |level: &mut dyn Level| level.delegate_else())
            .unwrap();
        let node = NodeBuilder::new()
            .branch(above(0), label("positive"))
            .otherwise(label("fallback"))
            .build()
            .unwrap();
        let pinned = NodeBuilder::new()
            .branch(above(0), label("positive"))
            .otherwise(label("fallback"))
            .policy(ONCE)
            .build()
            .unwrap();
        let tree = DTree::build_with(node, &registry).unwrap();
        let pinned = DTree::build_with(pinned, &registry).unwrap();
        assert_eq!(tree.run(&5).unwrap(), Some("positive".to_owned()));

        registry.set_default("else-first").unwrap();
        assert_eq!(&*tree.policy(), "else-first");
        assert_eq!(tree.run(&5).unwrap(), Some("fallback".to_owned()));
        assert_eq!(pinned.run(&5).unwrap(), Some("positive".to_owned()));
        assert_eq!(
            pinned.to_string(),
            "+++root(once):\n|      ---x > 0 --> positive\n|      ---ELSE --> fallback\n"
        );
    }

    #[test]
    fn unknown_policy_fails_at_build_time() {
        let node = NodeBuilder::new()
            .branch(above(0), NodeBuilder::new().otherwise(label("x")).policy("sideways"))
            .build()
            .unwrap();
        let err = DTree::build_with(node, &isolated()).unwrap_err();
        assert!(matches!(err, BuildError::UnknownPolicy { name } if name == "sideways"));
    }

    #[test]
    fn built_tree_is_rematerialized_under_new_parent() {
        let registry = isolated();
        let inner_node = NodeBuilder::new()
            .branch(above(100), label("huge"))
            .build()
            .unwrap();
        let inner = DTree::build_with(inner_node, &registry).unwrap();
        assert_eq!(&*inner.policy(), ONCE);

        let node = NodeBuilder::new()
            .branch(above(0), Arc::clone(&inner))
            .otherwise(label("fallback"))
            .policy(RECURSIVE)
            .build()
            .unwrap();
        let outer = DTree::build_with(node, &registry).unwrap();

        let Some((_, Runner::Tree(adopted))) = outer.children().next() else {
            panic!("expected subtree");
        };
        assert!(!Arc::ptr_eq(adopted, &inner));
        assert_eq!(&*adopted.policy(), RECURSIVE);
        assert_eq!(adopted.depth(), 1);
        assert_eq!(inner.depth(), 0);
        assert_eq!(outer.run(&5).unwrap(), Some("fallback".to_owned()));
    }

    #[test]
    fn children_list_else_last() {
        let node = NodeBuilder::new()
            .otherwise(label("c"))
            .branch(above(10), label("a"))
            .branch(above(0), label("b"))
            .build()
            .unwrap();
        let tree = DTree::build(node).unwrap();
        let described: Vec<String> = tree
            .children()
            .map(|(condition, runner)| format!("{condition} -> {}", runner.description()))
            .collect();
        assert_eq!(described, vec!["x > 10 -> a", "x > 0 -> b", "ELSE -> c"]);
        assert_eq!(tree.otherwise().unwrap().description(), "c");
    }

    #[test]
    fn custom_policy_out_of_range_is_an_error() {
        let registry = isolated();
        registry
            .register("broken", |level: &mut dyn Level| level.delegate(level.len()))
            .unwrap();
        let node = NodeBuilder::new()
            .branch(above(0), label("a"))
            .policy("broken")
            .build()
            .unwrap();
        let tree = DTree::build_with(node, &registry).unwrap();
        let err = tree.run(&1).unwrap_err();
        assert!(matches!(err, RunError::BranchOutOfRange { index: 1, len: 1 }));
    }

    #[test]
    fn renders_non_default_policies() {
        let node = NodeBuilder::new()
            .branch(
                above(0),
                NodeBuilder::new()
                    .branch(above(10), label("big"))
                    .otherwise(label("small")),
            )
            .otherwise(label("negative"))
            .policy(RECURSIVE)
            .build()
            .unwrap();
        let tree = DTree::build_with(node, &isolated()).unwrap();
        let expected = "\
+++root(recursive):
|      +++x > 0(recursive):
|      |      ---x > 10 --> big
|      |      ---ELSE --> small
|      ---ELSE --> negative
";
        assert_eq!(tree.to_string(), expected);
    }

    #[test]
    fn subtree_renders_at_its_own_depth() {
        let node = NodeBuilder::new()
            .branch(above(0), NodeBuilder::new().otherwise(label("inner")))
            .build()
            .unwrap();
        let tree = DTree::build(node).unwrap();
        let Some((_, Runner::Tree(child))) = tree.children().next() else {
            panic!("expected subtree");
        };
        assert_eq!(child.to_string(), "|      |      ---ELSE --> inner\n");
    }
}
