//! Conjunctive metadata filters.
//!
//! A [`FilterPredicate`] is an AND of equality clauses over metadata keys.
//! OR and NOT are not supported.

use serde_json::{Map, Value, json};

use crate::document::Metadata;
use crate::error::{RagError, Result};

/// An AND of zero or more `key == value` clauses.
///
/// An empty predicate matches every document.
///
/// # Example
///
/// ```rust
/// use ordinance_rag::FilterPredicate;
///
/// let filter = FilterPredicate::new().and("state", "ca").and("city", "campbell");
/// assert_eq!(filter.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPredicate {
    clauses: Vec<(String, String)>,
}

impl FilterPredicate {
    /// Create an empty predicate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a predicate with a single clause.
    pub fn field(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new().and(key, value)
    }

    /// Add a clause to the conjunction.
    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push((key.into(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, String)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Check that every clause has a non-empty key.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Store`] describing the malformed clause.
    pub fn validate(&self) -> Result<()> {
        match self.clauses.iter().position(|(key, _)| key.trim().is_empty()) {
            Some(index) => Err(RagError::store(
                "filter",
                format!("malformed filter: clause {index} has an empty key"),
            )),
            None => Ok(()),
        }
    }

    /// Evaluate the predicate against a metadata map. A clause on a missing
    /// key does not match.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.clauses.iter().all(|(key, value)| metadata.get(key) == Some(value))
    }

    /// Render the store-neutral `where` document.
    ///
    /// Zero clauses render as `{}`, one clause as `{"key": "value"}`, and
    /// several as `{"$and": [{..}, {..}]}`.
    pub fn to_where(&self) -> Value {
        let clause = |(key, value): &(String, String)| {
            let mut map = Map::new();
            map.insert(key.clone(), Value::String(value.clone()));
            Value::Object(map)
        };
        match self.clauses.as_slice() {
            [] => json!({}),
            [single] => clause(single),
            many => json!({ "$and": many.iter().map(clause).collect::<Vec<_>>() }),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FilterPredicate {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |filter, (k, v)| filter.and(k, v))
    }
}
