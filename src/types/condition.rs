use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use super::error::{BoxError, RunError};

type PredicateFn<T> = Arc<dyn Fn(&T) -> Result<bool, BoxError> + Send + Sync>;

/// A boolean predicate over an input object of type `T`.
///
/// Conditions are cheap to clone; a clone is the same condition, not a copy.
/// Leaf conditions compare by identity, so two leaves built from identical
/// closures are still distinct keys. [`Condition::otherwise()`] is the
/// exception: every else condition equals every other.
pub struct Condition<T> {
    kind: Arc<ConditionKind<T>>,
    description: Arc<str>,
}

enum ConditionKind<T> {
    Predicate(PredicateFn<T>),
    And(Vec<Condition<T>>),
    Or(Vec<Condition<T>>),
    Not(Condition<T>),
    Else,
}

/// Identity used for equality and hashing.
#[derive(Debug, PartialEq, Eq, Hash)]
enum Identity {
    Leaf(usize),
    And(Vec<Identity>),
    Or(Vec<Identity>),
    Not(Box<Identity>),
    Else,
}

impl<T: 'static> Condition<T> {
    /// A leaf condition from an infallible predicate.
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::try_new(description, move |obj: &T| Ok::<_, BoxError>(predicate(obj)))
    }

    /// A leaf condition from a fallible predicate. Errors surface from
    /// [`validate`](Self::validate) as [`RunError::Failed`].
    pub fn try_new<F, E>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&T) -> Result<bool, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let predicate: PredicateFn<T> =
            Arc::new(move |obj: &T| predicate(obj).map_err(Into::<BoxError>::into));
        Self::from_kind(ConditionKind::Predicate(predicate), description.into())
    }

    /// A leaf condition described by the predicate's own name.
    ///
    /// Named functions describe themselves (`is_adult`), generic ones without
    /// their type arguments; closures are described as `<closure>`.
    pub fn from_fn<F>(predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::new(short_type_name::<F>(), predicate)
    }
}

impl<T> Condition<T> {
    /// True iff every condition is true. Evaluated left to right, stopping at
    /// the first false.
    pub fn all(conditions: impl IntoIterator<Item = Condition<T>>) -> Self {
        let conditions: Vec<_> = conditions.into_iter().collect();
        let description = format!("AND({})", join_descriptions(&conditions));
        Self::from_kind(ConditionKind::And(conditions), description)
    }

    /// True iff any condition is true. Evaluated left to right, stopping at
    /// the first true.
    pub fn any(conditions: impl IntoIterator<Item = Condition<T>>) -> Self {
        let conditions: Vec<_> = conditions.into_iter().collect();
        let description = format!("OR({})", join_descriptions(&conditions));
        Self::from_kind(ConditionKind::Or(conditions), description)
    }

    /// Logical negation. Stacked negations collapse in the description:
    /// an even number of `NOT`s describes as the innermost condition.
    #[must_use]
    pub fn negate(self) -> Self {
        let (parity, innermost) = self.strip_negations();
        let description = if parity % 2 == 0 {
            format!("NOT({})", innermost.description)
        } else {
            innermost.description.to_string()
        };
        Self::from_kind(ConditionKind::Not(self), description)
    }

    /// The catch-all condition. Always true.
    #[must_use]
    pub fn otherwise() -> Self {
        Self::from_kind(ConditionKind::Else, "ELSE".to_owned())
    }

    #[must_use]
    pub fn and(self, other: Condition<T>) -> Self {
        Self::all([self, other])
    }

    #[must_use]
    pub fn or(self, other: Condition<T>) -> Self {
        Self::any([self, other])
    }

    /// Replace the description. Identity is unchanged.
    #[must_use]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            kind: self.kind,
            description: description.into().into(),
        }
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn is_else(&self) -> bool {
        matches!(*self.kind, ConditionKind::Else)
    }

    /// Evaluate against `obj`. Predicate errors propagate unchanged.
    pub fn validate(&self, obj: &T) -> Result<bool, RunError> {
        match &*self.kind {
            ConditionKind::Predicate(predicate) => predicate(obj).map_err(RunError::Failed),
            ConditionKind::And(conditions) => {
                for condition in conditions {
                    if !condition.validate(obj)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ConditionKind::Or(conditions) => {
                for condition in conditions {
                    if condition.validate(obj)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ConditionKind::Not(inner) => Ok(!inner.validate(obj)?),
            ConditionKind::Else => Ok(true),
        }
    }

    fn from_kind(kind: ConditionKind<T>, description: String) -> Self {
        Self {
            kind: Arc::new(kind),
            description: description.into(),
        }
    }

    /// Count the `NOT` layers wrapping the first non-negated condition.
    fn strip_negations(&self) -> (usize, &Condition<T>) {
        let mut parity = 0;
        let mut current = self;
        while let ConditionKind::Not(inner) = &*current.kind {
            parity += 1;
            current = inner;
        }
        (parity, current)
    }

    fn identity(&self) -> Identity {
        match &*self.kind {
            ConditionKind::Predicate(_) => {
                Identity::Leaf(Arc::as_ptr(&self.kind).cast::<()>() as usize)
            }
            ConditionKind::And(conditions) => {
                Identity::And(conditions.iter().map(Condition::identity).collect())
            }
            ConditionKind::Or(conditions) => {
                Identity::Or(conditions.iter().map(Condition::identity).collect())
            }
            ConditionKind::Not(_) => {
                let (parity, innermost) = self.strip_negations();
                if parity % 2 == 0 {
                    innermost.identity()
                } else {
                    Identity::Not(Box::new(innermost.identity()))
                }
            }
            ConditionKind::Else => Identity::Else,
        }
    }
}

fn join_descriptions<T>(conditions: &[Condition<T>]) -> String {
    conditions
        .iter()
        .map(Condition::description)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Last path segment of a type name with generic arguments removed, e.g.
/// `is_adult` for `my_app::rules::is_adult<my_app::User>`. Closures have no
/// name of their own and become `<closure>`.
pub(crate) fn short_type_name<F>() -> String {
    let mut path = String::new();
    let mut generics = 0_usize;
    for ch in std::any::type_name::<F>().chars() {
        match ch {
            '<' => generics += 1,
            '>' if generics > 0 => generics -= 1,
            _ if generics == 0 => path.push(ch),
            _ => {}
        }
    }
    match path.rsplit("::").next() {
        Some("{{closure}}") | None => "<closure>".to_owned(),
        Some(name) => name.to_owned(),
    }
}

impl<T> Clone for Condition<T> {
    fn clone(&self) -> Self {
        Self {
            kind: Arc::clone(&self.kind),
            description: Arc::clone(&self.description),
        }
    }
}

impl<T> PartialEq for Condition<T> {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl<T> Eq for Condition<T> {}

impl<T> Hash for Condition<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl<T> fmt::Debug for Condition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Condition").field(&self.description).finish()
    }
}

impl<T> fmt::Display for Condition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl<T> BitAnd for Condition<T> {
    type Output = Condition<T>;

    fn bitand(self, rhs: Condition<T>) -> Condition<T> {
        self.and(rhs)
    }
}

impl<T> BitOr for Condition<T> {
    type Output = Condition<T>;

    fn bitor(self, rhs: Condition<T>) -> Condition<T> {
        self.or(rhs)
    }
}

impl<T> Not for Condition<T> {
    type Output = Condition<T>;

    fn not(self) -> Condition<T> {
        self.negate()
    }
}
