//! In-memory evaluation of a filter plan against a single record.
//!
//! Mirrors what the repository would do in SQL: a missing field only
//! satisfies `null`, text comparison is case-insensitive, and multi-value
//! sets are read as token lists split on the predicate's delimiter.

use crate::operator::PredicateKind;
use crate::plan::{AtomicPredicate, FilterGroup, FilterPlan};
use crate::value::Scalar;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// A record that exposes field values by name.
pub trait Record {
    fn field(&self, name: &str) -> Option<&Scalar>;
}

impl Record for HashMap<String, Scalar> {
    fn field(&self, name: &str) -> Option<&Scalar> {
        self.get(name)
    }
}

impl Record for BTreeMap<String, Scalar> {
    fn field(&self, name: &str) -> Option<&Scalar> {
        self.get(name)
    }
}

impl FilterPlan {
    /// Every group must match; an empty plan matches any record.
    pub fn matches<R: Record + ?Sized>(&self, record: &R) -> bool {
        self.groups().iter().all(|group| group.matches(record))
    }
}

impl FilterGroup {
    /// At least one predicate must match.
    pub fn matches<R: Record + ?Sized>(&self, record: &R) -> bool {
        self.iter().any(|predicate| predicate.matches(record))
    }
}

impl AtomicPredicate {
    pub fn matches<R: Record + ?Sized>(&self, record: &R) -> bool {
        let Some(actual) = record.field(self.field()) else {
            return self.kind() == PredicateKind::IsNull;
        };
        let values = self.value().as_slice();
        let first = values.first();

        match self.kind() {
            PredicateKind::IsNull => false,
            PredicateKind::NotNull => true,
            PredicateKind::Eq => first.is_some_and(|v| loose_eq(actual, v)),
            PredicateKind::Neq => first.is_some_and(|v| !loose_eq(actual, v)),
            PredicateKind::Gt => compare(actual, first) == Some(Ordering::Greater),
            PredicateKind::Gte => matches!(compare(actual, first), Some(Ordering::Greater | Ordering::Equal)),
            PredicateKind::Lt => compare(actual, first) == Some(Ordering::Less),
            PredicateKind::Lte => matches!(compare(actual, first), Some(Ordering::Less | Ordering::Equal)),
            PredicateKind::Like => first.is_some_and(|p| like_match(&actual.as_text(), &p.as_text())),
            PredicateKind::Nlike => first.is_some_and(|p| !like_match(&actual.as_text(), &p.as_text())),
            PredicateKind::In => values.iter().any(|v| loose_eq(actual, v)),
            PredicateKind::Nin => !values.iter().any(|v| loose_eq(actual, v)),
            PredicateKind::MemberOf => first.is_some_and(|v| set_contains(actual, v, self.delimiter())),
            PredicateKind::NotMemberOf => first.is_some_and(|v| !set_contains(actual, v, self.delimiter())),
        }
    }
}

fn loose_eq(left: &Scalar, right: &Scalar) -> bool {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => left.as_text().to_lowercase() == right.as_text().to_lowercase(),
    }
}

fn compare(left: &Scalar, right: Option<&Scalar>) -> Option<Ordering> {
    let right = right?;
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(left.as_text().to_lowercase().cmp(&right.as_text().to_lowercase())),
    }
}

fn set_contains(stored: &Scalar, wanted: &Scalar, delimiter: &str) -> bool {
    stored
        .as_text()
        .split(delimiter)
        .any(|token| loose_eq(&Scalar::from(token.trim()), wanted))
}

/// SQL `LIKE` with `%`, `_` and backslash escapes, case-insensitive.
fn like_match(text: &str, pattern: &str) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Token {
        Any,
        One,
        Char(char),
    }

    // literals are lowercased like the text, so one char may become several tokens
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => tokens.push(Token::Any),
            '_' => tokens.push(Token::One),
            '\\' => tokens.extend(chars.next().unwrap_or('\\').to_lowercase().map(Token::Char)),
            c => tokens.extend(c.to_lowercase().map(Token::Char)),
        }
    }

    let text: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();

    // matched[j]: the first i text chars match the first j tokens
    let mut matched = vec![false; tokens.len() + 1];
    matched[0] = true;
    for (j, token) in tokens.iter().enumerate() {
        matched[j + 1] = matched[j] && *token == Token::Any;
    }

    for c in &text {
        let mut next = vec![false; tokens.len() + 1];
        for (j, token) in tokens.iter().enumerate() {
            next[j + 1] = match token {
                Token::Any => next[j] || matched[j + 1],
                Token::One => matched[j],
                Token::Char(p) => matched[j] && p == c,
            };
        }
        matched = next;
    }

    matched[tokens.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CombineNode, ConditionNode, RuleNode};
    use crate::attribute::{AttributeMeta, ValueType};
    use crate::compiler::Compiler;
    use crate::value::RawValue;

    fn record(fields: &[(&str, Scalar)]) -> HashMap<String, Scalar> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn catalog() -> HashMap<String, AttributeMeta> {
        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), AttributeMeta::new(ValueType::Scalar));
        attributes.insert("tags".to_string(), AttributeMeta::new(ValueType::MultiValueSet));
        attributes
    }

    fn cond(field: &str, op: &str, value: impl Into<RawValue>) -> RuleNode {
        RuleNode::Condition(ConditionNode::new(field, op, value))
    }

    #[test]
    fn test_like_match() {
        assert!(like_match("Red Shoe", "%shoe%"));
        assert!(like_match("50% off", "%50\\%%"));
        assert!(!like_match("500 off", "%50\\%%"));
        assert!(like_match("a_b", "a\\_b"));
        assert!(!like_match("axb", "a\\_b"));
        assert!(like_match("axb", "a_b"));
        assert!(like_match("", "%"));
        assert!(!like_match("abc", "ab"));
        assert!(like_match("İstanbul", "%İST%"));
        assert!(like_match("İstanbul", "i\u{307}stanbul"));
        assert!(like_match("STRASSE", "stra_se"));
    }

    #[test]
    fn test_missing_field_only_matches_null() {
        let empty = record(&[]);
        let null = AtomicPredicate::new("image", PredicateKind::IsNull, Scalar::Bool(true));
        let not_null = AtomicPredicate::new("image", PredicateKind::NotNull, Scalar::Bool(true));
        let neq = AtomicPredicate::new("image", PredicateKind::Neq, Scalar::from("x"));
        assert!(null.matches(&empty));
        assert!(!not_null.matches(&empty));
        assert!(!neq.matches(&empty));
    }

    #[test]
    fn test_set_membership() {
        let rec = record(&[("tags", Scalar::from("3,7,12"))]);
        assert!(AtomicPredicate::new("tags", PredicateKind::MemberOf, Scalar::Int(7)).matches(&rec));
        assert!(!AtomicPredicate::new("tags", PredicateKind::MemberOf, Scalar::Int(1)).matches(&rec));
        assert!(AtomicPredicate::new("tags", PredicateKind::NotMemberOf, Scalar::Int(1)).matches(&rec));
    }

    #[test]
    fn test_set_membership_uses_storage_delimiter() {
        let mut attributes = catalog();
        let mut piped = AttributeMeta::new(ValueType::MultiValueSet);
        piped.storage_delimiter = "|".to_string();
        attributes.insert("sizes".to_string(), piped);

        let tree = CombineNode::any(vec![cond("sizes", "()", "12")]);
        let plan = Compiler::new(&attributes).compile(&tree).plan;
        assert!(plan.matches(&record(&[("sizes", Scalar::from("12|13"))])));
        assert!(!plan.matches(&record(&[("sizes", Scalar::from("13|14"))])));

        let excluded = CombineNode::all(vec![cond("sizes", "!()", "12")]);
        let plan = Compiler::new(&attributes).compile(&excluded).plan;
        assert!(!plan.matches(&record(&[("sizes", Scalar::from("13|12"))])));
        assert!(plan.matches(&record(&[("sizes", Scalar::from("13,12"))])));
    }

    #[test]
    fn test_compiled_exclusion_rejects_any_listed_value() {
        let attributes = catalog();
        let tree = CombineNode::any(vec![cond("tags", "!()", "A,B")]);
        let plan = Compiler::new(&attributes).compile(&tree).plan;

        assert!(plan.matches(&record(&[("tags", Scalar::from("C,D"))])));
        assert!(!plan.matches(&record(&[("tags", Scalar::from("A,C"))])));
        assert!(!plan.matches(&record(&[("tags", Scalar::from("B"))])));
    }

    #[test]
    fn test_compiled_membership_accepts_any_listed_value() {
        let attributes = catalog();
        let tree = CombineNode::any(vec![cond("tags", "()", "A,B")]);
        let plan = Compiler::new(&attributes).compile(&tree).plan;

        assert!(plan.matches(&record(&[("tags", Scalar::from("B,C"))])));
        assert!(!plan.matches(&record(&[("tags", Scalar::from("C"))])));
    }

    #[test]
    fn test_empty_plan_matches_everything() {
        assert!(FilterPlan::default().matches(&record(&[])));
    }

    #[test]
    fn test_numeric_comparison() {
        let rec = record(&[("price", Scalar::from("12.5"))]);
        assert!(AtomicPredicate::new("price", PredicateKind::Gt, Scalar::Int(10)).matches(&rec));
        assert!(AtomicPredicate::new("price", PredicateKind::Lte, Scalar::from("12.5")).matches(&rec));
        assert!(!AtomicPredicate::new("price", PredicateKind::Lt, Scalar::Int(3)).matches(&rec));
    }
}
