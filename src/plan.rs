//! Filter plan: groups AND-ed together, predicates inside a group OR-ed.

use crate::attribute::DEFAULT_STORAGE_DELIMITER;
use crate::operator::PredicateKind;
use crate::value::PredicateValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One executable comparison against one field.
///
/// Serializes to the wire triple `{ field, conditionType, value }`. Set
/// membership on a field stored with a non-comma delimiter also carries
/// `delimiter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicPredicate {
    field: String,
    #[serde(rename = "conditionType")]
    kind: PredicateKind,
    value: PredicateValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delimiter: Option<String>,
}

impl AtomicPredicate {
    pub fn new(field: impl Into<String>, kind: PredicateKind, value: impl Into<PredicateValue>) -> Self {
        Self {
            field: field.into(),
            kind,
            value: value.into(),
            delimiter: None,
        }
    }

    /// Delimiter the stored set is split on; blank or `,` keeps the default.
    pub fn with_delimiter(mut self, delimiter: &str) -> Self {
        self.delimiter = if delimiter.is_empty() || delimiter == DEFAULT_STORAGE_DELIMITER {
            None
        } else {
            Some(delimiter.to_string())
        };
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn kind(&self) -> PredicateKind {
        self.kind
    }

    pub fn value(&self) -> &PredicateValue {
        &self.value
    }

    pub fn delimiter(&self) -> &str {
        self.delimiter.as_deref().unwrap_or(DEFAULT_STORAGE_DELIMITER)
    }
}

impl fmt::Display for AtomicPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}", self.kind, self.field)?;
        match &self.value {
            PredicateValue::Scalar(s) => write!(f, ", {s})"),
            PredicateValue::List(items) => {
                let joined: Vec<_> = items.iter().map(ToString::to_string).collect();
                write!(f, ", [{}])", joined.join(", "))
            }
        }
    }
}

/// Predicates combined with OR. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterGroup(Vec<AtomicPredicate>);

impl FilterGroup {
    pub fn single(predicate: AtomicPredicate) -> Self {
        Self(vec![predicate])
    }

    /// `None` for an empty list: an empty group would match nothing.
    pub fn from_predicates(predicates: Vec<AtomicPredicate>) -> Option<Self> {
        if predicates.is_empty() {
            None
        } else {
            Some(Self(predicates))
        }
    }

    pub fn predicates(&self) -> &[AtomicPredicate] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AtomicPredicate> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a FilterGroup {
    type Item = &'a AtomicPredicate;
    type IntoIter = std::slice::Iter<'a, AtomicPredicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for FilterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<_> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(" OR "))
    }
}

/// Conjunctive normal form over predicate groups.
///
/// A record matches when it matches every group; an empty plan matches
/// everything.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterPlan {
    groups: Vec<FilterGroup>,
}

impl FilterPlan {
    pub fn new(groups: Vec<FilterGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[FilterGroup] {
        &self.groups
    }

    pub fn push(&mut self, group: FilterGroup) {
        self.groups.push(group);
    }

    /// AND another plan onto this one.
    pub fn extend(&mut self, other: FilterPlan) {
        self.groups.extend(other.groups);
    }

    pub fn matches_everything(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn predicate_count(&self) -> usize {
        self.groups.iter().map(FilterGroup::len).sum()
    }

    /// Wire JSON: a list of groups of `{ field, conditionType, value }`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl fmt::Display for FilterPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.groups.is_empty() {
            return f.write_str("<match all>");
        }
        let parts: Vec<_> = self.groups.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" AND "))
    }
}
