//! Attribute maps and selectors.
//!
//! [`Attributes`] is the raw attribute store of a document: an ordered map
//! from field name to [`Value`]. [`Selector`] is the conjunction of field
//! conditions used both to filter in-memory documents and to scope queries
//! against a [`Store`](crate::Store).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Identity field present on every document.
pub const ID_FIELD: &str = "_id";

/// Ordered map of field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(IndexMap<String, Value>);

impl Attributes {
    /// Create an empty attribute map.
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a field and return its value; the remaining order is kept.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.shift_remove(field)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy every field of `other` over this map.
    pub fn merge(&mut self, other: Attributes) {
        self.0.extend(other.0);
    }

    /// Convert into a nested document value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Map(self.0)
    }

    /// Interpret a nested document value as attributes.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Map(map) => Some(Self(map)),
            _ => None,
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Attributes {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Build an [`Attributes`] map from `field => value` pairs.
///
/// ```
/// use docmodel_core::attrs;
///
/// let attrs = attrs! { "name" => "Syd", "age" => 40 };
/// assert_eq!(attrs.len(), 2);
/// ```
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::Attributes::new()
    };
    ($($field:expr => $value:expr),+ $(,)?) => {
        $crate::Attributes::new()$(.with($field, $value))+
    };
}

/// One field condition inside a [`Selector`].
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value, or the field is an array containing it.
    Eq(Value),
    /// Field matches any of the values.
    In(Vec<Value>),
}

impl Condition {
    /// Evaluate against a field value; a missing field behaves as null.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let actual = actual.unwrap_or(&Value::Null);
        match self {
            Condition::Eq(expected) => actual.contains_or_eq(expected),
            Condition::In(candidates) => candidates.iter().any(|c| actual.contains_or_eq(c)),
        }
    }
}

/// Conjunction of field conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    conditions: IndexMap<String, Condition>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .insert(field.into(), Condition::Eq(value.into()));
        self
    }

    /// Require `field` to match any of `values`.
    #[must_use]
    pub fn any_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.insert(
            field.into(),
            Condition::In(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Merge `other` into this selector; conditions of `other` win on
    /// conflicting fields.
    #[must_use]
    pub fn merge(mut self, other: Selector) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.conditions.get(field)
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when every condition holds for `attributes`.
    pub fn matches(&self, attributes: &Attributes) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(attributes.get(field)))
    }
}

impl From<Attributes> for Selector {
    fn from(attributes: Attributes) -> Self {
        attributes
            .into_iter()
            .fold(Selector::new(), |selector, (field, value)| {
                selector.eq(field, value)
            })
    }
}
