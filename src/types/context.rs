use std::collections::HashMap;

use super::value::Value;

/// A dynamic input object: named fields addressed by dot-separated paths
/// such as `"user.profile.age"`.
///
/// Trees over `Context` pair naturally with [`field()`](crate::field), which
/// reads a path and yields [`Value::Null`] where nothing is stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    fields: HashMap<String, Entry>,
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Value(Value),
    Group(HashMap<String, Entry>),
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Context::insert).
    #[must_use]
    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(path, value);
        self
    }

    /// Store a value at `path`, creating intermediate groups as needed. A
    /// value sitting where a group is required is replaced by the group.
    pub fn insert(&mut self, path: &str, value: impl Into<Value>) {
        let mut segments = path.split('.').peekable();
        let mut fields = &mut self.fields;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                fields.insert(segment.to_owned(), Entry::Value(value.into()));
                return;
            }
            let entry = fields
                .entry(segment.to_owned())
                .or_insert_with(|| Entry::Group(HashMap::new()));
            if let Entry::Value(_) = *entry {
                *entry = Entry::Group(HashMap::new());
            }
            let Entry::Group(group) = entry else {
                return;
            };
            fields = group;
        }
    }

    /// The value stored at `path`. `None` when the path is missing or names
    /// a group rather than a value.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut entry = self.fields.get(segments.next()?)?;
        for segment in segments {
            match entry {
                Entry::Group(group) => entry = group.get(segment)?,
                Entry::Value(_) => return None,
            }
        }
        match entry {
            Entry::Value(value) => Some(value),
            Entry::Group(_) => None,
        }
    }

    /// Like [`get`](Context::get), but a missing value reads as
    /// [`Value::Null`].
    #[must_use]
    pub fn lookup(&self, path: &str) -> Value {
        self.get(path).cloned().unwrap_or(Value::Null)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl AsRef<Context> for Context {
    fn as_ref(&self) -> &Context {
        self
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Context::new();
        for (path, value) in iter {
            context.insert(path.as_ref(), value);
        }
        context
    }
}
