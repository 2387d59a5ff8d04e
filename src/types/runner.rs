use std::fmt;
use std::ops::Shr;
use std::sync::Arc;

use tracing::debug;

use super::condition::short_type_name;
use super::error::{BoxError, RunError};
use crate::tree::DTree;

type ActionFn<T, R> = Arc<dyn Fn(&T) -> Result<R, BoxError> + Send + Sync>;
type ErrorHandler<T> = Arc<dyn Fn(&RunError, &T) + Send + Sync>;

/// Result of evaluating a runner, with "nothing matched" kept apart from
/// failures so traversal policies can branch on it without touching errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<R> {
    /// Execution completed. `None` is the absence value of an empty chain or
    /// a recovered [`Catch`] without fallback.
    Done(Option<R>),
    /// A nested tree exhausted its branches without a match.
    NoMatch,
}

impl<R> Flow<R> {
    /// Convert to a plain result, turning [`Flow::NoMatch`] into [`RunError::NoMatch`].
    pub fn into_result(self) -> Result<Option<R>, RunError> {
        match self {
            Flow::Done(value) => Ok(value),
            Flow::NoMatch => Err(RunError::NoMatch),
        }
    }
}

/// An atomic runner wrapping a caller-supplied function.
pub struct Action<T, R> {
    func: ActionFn<T, R>,
    description: Arc<str>,
}

impl<T: 'static, R: 'static> Action<T, R> {
    pub fn new<F>(description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        Self::try_new(description, move |obj: &T| Ok::<_, BoxError>(func(obj)))
    }

    /// An action whose errors surface as [`RunError::Failed`].
    pub fn try_new<F, E>(description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            func: Arc::new(move |obj: &T| func(obj).map_err(Into::<BoxError>::into)),
            description: description.into().into(),
        }
    }

    /// An action described by the function's own name.
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        Self::new(short_type_name::<F>(), func)
    }
}

impl<T, R> Action<T, R> {
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn run(&self, obj: &T) -> Result<R, RunError> {
        (self.func)(obj).map_err(RunError::Failed)
    }
}

impl<T, R> Clone for Action<T, R> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            description: Arc::clone(&self.description),
        }
    }
}

impl<T, R> fmt::Debug for Action<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Action").field(&self.description).finish()
    }
}

/// Runs a primary runner and recovers from its failure.
///
/// On failure the fallback (if any) runs first. With an error handler the
/// failure is then absorbed and the fallback's result returned; without one
/// the primary's failure propagates and the fallback's result is dropped.
pub struct Catch<T, R> {
    primary: Runner<T, R>,
    fallback: Option<Runner<T, R>>,
    handler: Option<ErrorHandler<T>>,
}

impl<T, R> Catch<T, R> {
    pub fn new(primary: impl Into<Runner<T, R>>) -> Self {
        Self {
            primary: primary.into(),
            fallback: None,
            handler: None,
        }
    }

    #[must_use]
    pub fn fallback(mut self, fallback: impl Into<Runner<T, R>>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Install an error handler. Its presence makes the catch absorb failures.
    #[must_use]
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RunError, &T) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    fn description(&self) -> String {
        match &self.fallback {
            Some(fallback) => format!(
                "CATCH({}, {})",
                self.primary.description(),
                fallback.description()
            ),
            None => format!("CATCH({})", self.primary.description()),
        }
    }

    fn evaluate(&self, obj: &T) -> Result<Flow<R>, RunError> {
        let err = match self.primary.evaluate(obj) {
            Ok(Flow::Done(value)) => return Ok(Flow::Done(value)),
            Ok(Flow::NoMatch) => RunError::NoMatch,
            Err(err) => err,
        };
        debug!(
            error = %err,
            primary = %self.primary.description(),
            "runner failed; recovering"
        );

        let recovered = match &self.fallback {
            Some(fallback) => match fallback.evaluate(obj)? {
                Flow::Done(value) => value,
                Flow::NoMatch => return Ok(Flow::NoMatch),
            },
            None => None,
        };

        match &self.handler {
            Some(handler) => {
                handler(&err, obj);
                Ok(Flow::Done(recovered))
            }
            None if err.is_no_match() => Ok(Flow::NoMatch),
            None => Err(err),
        }
    }
}

impl<T, R> Clone for Catch<T, R> {
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            fallback: self.fallback.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<T, R> fmt::Debug for Catch<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catch")
            .field("primary", &self.primary)
            .field("fallback", &self.fallback)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// The executable side of a tree: what a matched branch runs.
pub enum Runner<T, R> {
    Action(Action<T, R>),
    /// Members run in order; the last result wins and the first failure stops
    /// the chain.
    Chain(Vec<Runner<T, R>>),
    Catch(Box<Catch<T, R>>),
    /// A materialized tree used as a runner.
    Tree(Arc<DTree<T, R>>),
}

impl<T: 'static, R: 'static> Runner<T, R> {
    /// Shorthand for `Runner::from(Action::new(..))`.
    pub fn action<F>(description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        Runner::Action(Action::new(description, func))
    }
}

impl<T, R> Runner<T, R> {
    /// Build a chain, splicing in the members of any nested chains.
    pub fn chain<I>(runners: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Runner<T, R>>,
    {
        let mut members = Vec::new();
        for runner in runners {
            let runner: Runner<T, R> = runner.into();
            match runner {
                Runner::Chain(inner) => members.extend(inner),
                other => members.push(other),
            }
        }
        Runner::Chain(members)
    }

    /// Sequence `next` after `self`. Chains on either side are flattened.
    #[must_use]
    pub fn then(self, next: impl Into<Runner<T, R>>) -> Self {
        Runner::chain([self, next.into()])
    }

    /// Start a [`Catch`] around this runner.
    pub fn catch(self) -> Catch<T, R> {
        Catch::new(self)
    }

    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Runner::Action(action) => action.description().to_owned(),
            Runner::Chain(members) => members
                .iter()
                .map(Runner::description)
                .collect::<Vec<_>>()
                .join(" ==> "),
            Runner::Catch(catch) => catch.description(),
            Runner::Tree(_) => "DTree".to_owned(),
        }
    }

    /// Run against `obj`, reporting a nested tree's exhaustion as [`Flow::NoMatch`].
    pub fn evaluate(&self, obj: &T) -> Result<Flow<R>, RunError> {
        match self {
            Runner::Action(action) => action.run(obj).map(|value| Flow::Done(Some(value))),
            Runner::Chain(members) => {
                let mut last = None;
                for member in members {
                    match member.evaluate(obj)? {
                        Flow::Done(value) => last = value,
                        Flow::NoMatch => return Ok(Flow::NoMatch),
                    }
                }
                Ok(Flow::Done(last))
            }
            Runner::Catch(catch) => catch.evaluate(obj),
            Runner::Tree(tree) => tree.evaluate(obj),
        }
    }

    /// Run against `obj`. A nested tree's exhaustion becomes [`RunError::NoMatch`].
    pub fn run(&self, obj: &T) -> Result<Option<R>, RunError> {
        self.evaluate(obj)?.into_result()
    }
}

impl<T, R> Clone for Runner<T, R> {
    fn clone(&self) -> Self {
        match self {
            Runner::Action(action) => Runner::Action(action.clone()),
            Runner::Chain(members) => Runner::Chain(members.clone()),
            Runner::Catch(catch) => Runner::Catch(catch.clone()),
            Runner::Tree(tree) => Runner::Tree(Arc::clone(tree)),
        }
    }
}

impl<T, R> fmt::Debug for Runner<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runner::Action(action) => action.fmt(f),
            Runner::Chain(members) => f.debug_tuple("Chain").field(members).finish(),
            Runner::Catch(catch) => catch.fmt(f),
            Runner::Tree(_) => f.write_str("Tree"),
        }
    }
}

impl<T, R> From<Action<T, R>> for Runner<T, R> {
    fn from(action: Action<T, R>) -> Self {
        Runner::Action(action)
    }
}

impl<T, R> From<Catch<T, R>> for Runner<T, R> {
    fn from(catch: Catch<T, R>) -> Self {
        Runner::Catch(Box::new(catch))
    }
}

impl<T, R> From<Arc<DTree<T, R>>> for Runner<T, R> {
    fn from(tree: Arc<DTree<T, R>>) -> Self {
        Runner::Tree(tree)
    }
}

impl<T, R, Rhs: Into<Runner<T, R>>> Shr<Rhs> for Runner<T, R> {
    type Output = Runner<T, R>;

    fn shr(self, rhs: Rhs) -> Runner<T, R> {
        self.then(rhs)
    }
}

impl<T, R, Rhs: Into<Runner<T, R>>> Shr<Rhs> for Action<T, R> {
    type Output = Runner<T, R>;

    fn shr(self, rhs: Rhs) -> Runner<T, R> {
        Runner::from(self).then(rhs)
    }
}
