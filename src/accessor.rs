use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{CompareOp, Condition, Context, Value};

type Getter<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;

/// A named field extractor that builds comparison [`Condition`]s.
///
/// ```
/// use dtree::{Context, field};
///
/// let age = field::<Context>("age");
/// let child = age.lt(12);
/// assert_eq!(child.description(), "age < 12");
/// assert!(child.validate(&Context::new().set("age", 9)).unwrap());
/// ```
pub struct ValueAccessor<T> {
    name: Arc<str>,
    getter: Getter<T>,
}

/// Right-hand side of a comparison: a literal, or another accessor read from
/// the same input object.
pub enum Operand<T> {
    Literal(Value),
    Accessor(ValueAccessor<T>),
}

impl<T: 'static> ValueAccessor<T> {
    pub fn new<F, V>(name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&T) -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        Self {
            name: Arc::from(name.into()),
            getter: Arc::new(move |obj: &T| getter(obj).into()),
        }
    }

    /// Wrap the extractor in a bounded cache keyed by object identity, so
    /// repeated reads of the same object run the extractor once.
    ///
    /// Every accessor built from the result (comparisons included) shares
    /// one cache.
    #[cfg(feature = "memo")]
    #[must_use]
    pub fn memoized(self, capacity: u64) -> Self
    where
        T: Identified,
    {
        let cache: moka::sync::Cache<ObjectId, Value> = moka::sync::Cache::new(capacity);
        let inner = self.getter;
        Self {
            name: self.name,
            getter: Arc::new(move |obj: &T| cache.get_with(obj.object_id(), || inner(obj))),
        }
    }

    fn condition<F>(&self, description: String, test: F) -> Condition<T>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let getter = Arc::clone(&self.getter);
        Condition::new(description, move |obj: &T| test(&getter(obj)))
    }

    /// `self <op> other`, false whenever the two sides cannot be ordered.
    pub fn compare(&self, op: CompareOp, other: impl Into<Operand<T>>) -> Condition<T> {
        let other = other.into();
        let getter = Arc::clone(&self.getter);
        Condition::new(
            format!("{} {op} {other}", self.name),
            move |obj: &T| {
                getter(obj)
                    .compare(op, &other.resolve(obj))
                    .unwrap_or(false)
            },
        )
    }

    pub fn eq(&self, other: impl Into<Operand<T>>) -> Condition<T> {
        self.compare(CompareOp::Eq, other)
    }

    pub fn ne(&self, other: impl Into<Operand<T>>) -> Condition<T> {
        self.compare(CompareOp::Neq, other)
    }

    pub fn lt(&self, other: impl Into<Operand<T>>) -> Condition<T> {
        self.compare(CompareOp::Lt, other)
    }

    pub fn le(&self, other: impl Into<Operand<T>>) -> Condition<T> {
        self.compare(CompareOp::Lte, other)
    }

    pub fn gt(&self, other: impl Into<Operand<T>>) -> Condition<T> {
        self.compare(CompareOp::Gt, other)
    }

    pub fn ge(&self, other: impl Into<Operand<T>>) -> Condition<T> {
        self.compare(CompareOp::Gte, other)
    }

    /// Membership: equal to any of `values`.
    pub fn in_<I, V>(&self, values: I) -> Condition<T>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let listed = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        self.condition(format!("{} in [{listed}]", self.name), move |value| {
            values
                .iter()
                .any(|candidate| value.compare(CompareOp::Eq, candidate) == Some(true))
        })
    }

    /// Strict identity: same type and same payload, no numeric coercion.
    pub fn is_(&self, other: impl Into<Operand<T>>) -> Condition<T> {
        let other = other.into();
        let getter = Arc::clone(&self.getter);
        Condition::new(format!("{} is {other}", self.name), move |obj: &T| {
            getter(obj).is(&other.resolve(obj))
        })
    }

    pub fn none(&self) -> Condition<T> {
        self.condition(format!("{} is null", self.name), Value::is_null)
    }

    pub fn notnone(&self) -> Condition<T> {
        self.condition(format!("{} is not null", self.name), |value| {
            !value.is_null()
        })
    }

    pub fn booltrue(&self) -> Condition<T> {
        self.condition(format!("{} is truthy", self.name), Value::is_truthy)
    }

    pub fn boolfalse(&self) -> Condition<T> {
        self.condition(format!("{} is falsy", self.name), |value| {
            !value.is_truthy()
        })
    }

    /// An arbitrary test on the extracted value, described as
    /// `"<name> <label>"`.
    pub fn test<F>(&self, label: &str, test: F) -> Condition<T>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.condition(format!("{} {label}", self.name), test)
    }
}

impl<T> ValueAccessor<T> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extract the value from `obj`.
    pub fn of(&self, obj: &T) -> Value {
        (self.getter)(obj)
    }
}

/// Accessor reading a dot-separated path from anything that exposes a
/// [`Context`]. Missing paths read as [`Value::Null`].
pub fn field<T>(path: &str) -> ValueAccessor<T>
where
    T: AsRef<Context> + 'static,
{
    let key = path.to_owned();
    ValueAccessor::new(path, move |obj: &T| obj.as_ref().lookup(&key))
}

impl<T> Operand<T> {
    fn resolve(&self, obj: &T) -> Cow<'_, Value> {
        match self {
            Operand::Literal(value) => Cow::Borrowed(value),
            Operand::Accessor(accessor) => Cow::Owned(accessor.of(obj)),
        }
    }
}

impl<T> fmt::Display for Operand<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(value) => value.fmt(f),
            Operand::Accessor(accessor) => f.write_str(accessor.name()),
        }
    }
}

impl<T> Clone for ValueAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            getter: Arc::clone(&self.getter),
        }
    }
}

impl<T> fmt::Debug for ValueAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueAccessor").field(&self.name).finish()
    }
}

impl<T> From<Value> for Operand<T> {
    fn from(value: Value) -> Self {
        Operand::Literal(value)
    }
}

impl<T> From<i64> for Operand<T> {
    fn from(value: i64) -> Self {
        Operand::Literal(value.into())
    }
}

impl<T> From<i32> for Operand<T> {
    fn from(value: i32) -> Self {
        Operand::Literal(value.into())
    }
}

impl<T> From<f64> for Operand<T> {
    fn from(value: f64) -> Self {
        Operand::Literal(value.into())
    }
}

impl<T> From<bool> for Operand<T> {
    fn from(value: bool) -> Self {
        Operand::Literal(value.into())
    }
}

impl<T> From<&str> for Operand<T> {
    fn from(value: &str) -> Self {
        Operand::Literal(value.into())
    }
}

impl<T> From<String> for Operand<T> {
    fn from(value: String) -> Self {
        Operand::Literal(value.into())
    }
}

impl<T> From<ValueAccessor<T>> for Operand<T> {
    fn from(accessor: ValueAccessor<T>) -> Self {
        Operand::Accessor(accessor)
    }
}

impl<T> From<&ValueAccessor<T>> for Operand<T> {
    fn from(accessor: &ValueAccessor<T>) -> Self {
        Operand::Accessor(accessor.clone())
    }
}

/// Process-unique identity of a tracked input object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// A fresh id, never handed out before in this process.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        ObjectId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Input objects with a stable identity, usable with
/// [`ValueAccessor::memoized`].
pub trait Identified {
    fn object_id(&self) -> ObjectId;
}

/// Attaches a fresh [`ObjectId`] to a value.
///
/// A clone is a different object and gets its own id.
#[derive(Debug)]
pub struct Tracked<T> {
    id: ObjectId,
    inner: T,
}

impl<T> Tracked<T> {
    pub fn new(inner: T) -> Self {
        Self {
            id: ObjectId::next(),
            inner,
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> Identified for Tracked<T> {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Clone> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Self::new(self.inner.clone())
    }
}

impl<T: AsRef<Context>> AsRef<Context> for Tracked<T> {
    fn as_ref(&self) -> &Context {
        self.inner.as_ref()
    }
}
