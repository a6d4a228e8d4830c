//! Operator taxonomy: maps the rule-builder's comparison symbols onto
//! canonical predicate kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical predicate kinds understood by the filter plan consumer.
///
/// The serialized names are the wire `conditionType` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredicateKind {
    #[serde(rename = "eq")]
    Eq,
    #[serde(rename = "neq")]
    Neq,
    #[serde(rename = "gt")]
    Gt,
    #[serde(rename = "gte")]
    Gte,
    #[serde(rename = "lt")]
    Lt,
    #[serde(rename = "lte")]
    Lte,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "nlike")]
    Nlike,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "nin")]
    Nin,
    #[serde(rename = "null")]
    IsNull,
    #[serde(rename = "notnull")]
    NotNull,
    #[serde(rename = "finset")]
    MemberOf,
    #[serde(rename = "nfinset")]
    NotMemberOf,
}

impl PredicateKind {
    pub const ALL: [PredicateKind; 14] = [
        PredicateKind::Eq,
        PredicateKind::Neq,
        PredicateKind::Gt,
        PredicateKind::Gte,
        PredicateKind::Lt,
        PredicateKind::Lte,
        PredicateKind::Like,
        PredicateKind::Nlike,
        PredicateKind::In,
        PredicateKind::Nin,
        PredicateKind::IsNull,
        PredicateKind::NotNull,
        PredicateKind::MemberOf,
        PredicateKind::NotMemberOf,
    ];

    /// Resolve a rule-builder symbol into a predicate kind.
    ///
    /// Total: unknown symbols fall back to `in` when `array_valued` is set and
    /// to `eq` otherwise.
    pub fn resolve(symbol: &str, array_valued: bool) -> Self {
        match Operator::from_symbol(symbol) {
            Some(op) => op.kind(),
            None if array_valued => PredicateKind::In,
            None => PredicateKind::Eq,
        }
    }

    /// Whether several predicates of this kind may share one OR group.
    ///
    /// "does not contain A OR does not contain B" is true for almost every
    /// record, so set exclusion has to stay AND-ed.
    pub const fn is_or_distributable(self) -> bool {
        !matches!(self, PredicateKind::NotMemberOf)
    }

    /// Kinds whose value is a list rather than a scalar.
    pub const fn is_array_valued(self) -> bool {
        matches!(
            self,
            PredicateKind::In
                | PredicateKind::Nin
                | PredicateKind::MemberOf
                | PredicateKind::NotMemberOf
        )
    }

    pub const fn is_pattern(self) -> bool {
        matches!(self, PredicateKind::Like | PredicateKind::Nlike)
    }

    /// Wire name of the kind.
    pub const fn condition_type(self) -> &'static str {
        match self {
            PredicateKind::Eq => "eq",
            PredicateKind::Neq => "neq",
            PredicateKind::Gt => "gt",
            PredicateKind::Gte => "gte",
            PredicateKind::Lt => "lt",
            PredicateKind::Lte => "lte",
            PredicateKind::Like => "like",
            PredicateKind::Nlike => "nlike",
            PredicateKind::In => "in",
            PredicateKind::Nin => "nin",
            PredicateKind::IsNull => "null",
            PredicateKind::NotNull => "notnull",
            PredicateKind::MemberOf => "finset",
            PredicateKind::NotMemberOf => "nfinset",
        }
    }
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.condition_type())
    }
}

/// Comparison operators offered by the rule builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Is,            // ==
    IsNot,         // !=
    AtLeast,       // >=
    AtMost,        // <=
    GreaterThan,   // >
    LessThan,      // <
    Contains,      // {}
    NotContains,   // !{}
    OneOf,         // ()
    NotOneOf,      // !()
}

impl Operator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol.trim() {
            "==" => Operator::Is,
            "!=" => Operator::IsNot,
            ">=" => Operator::AtLeast,
            "<=" => Operator::AtMost,
            ">" => Operator::GreaterThan,
            "<" => Operator::LessThan,
            "{}" => Operator::Contains,
            "!{}" => Operator::NotContains,
            "()" => Operator::OneOf,
            "!()" => Operator::NotOneOf,
            _ => return None,
        };
        Some(op)
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Operator::Is => "==",
            Operator::IsNot => "!=",
            Operator::AtLeast => ">=",
            Operator::AtMost => "<=",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::Contains => "{}",
            Operator::NotContains => "!{}",
            Operator::OneOf => "()",
            Operator::NotOneOf => "!()",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Operator::Is => "is",
            Operator::IsNot => "is not",
            Operator::AtLeast => "equals or greater than",
            Operator::AtMost => "equals or less than",
            Operator::GreaterThan => "greater than",
            Operator::LessThan => "less than",
            Operator::Contains => "contains",
            Operator::NotContains => "does not contain",
            Operator::OneOf => "is one of",
            Operator::NotOneOf => "is not one of",
        }
    }

    /// "is one of" / "is not one of" always carry a list.
    pub const fn is_array_valued(self) -> bool {
        matches!(self, Operator::OneOf | Operator::NotOneOf)
    }

    pub const fn kind(self) -> PredicateKind {
        match self {
            Operator::Is => PredicateKind::Eq,
            Operator::IsNot => PredicateKind::Neq,
            Operator::AtLeast => PredicateKind::Gte,
            Operator::AtMost => PredicateKind::Lte,
            Operator::GreaterThan => PredicateKind::Gt,
            Operator::LessThan => PredicateKind::Lt,
            Operator::Contains => PredicateKind::Like,
            Operator::NotContains => PredicateKind::Nlike,
            Operator::OneOf => PredicateKind::In,
            Operator::NotOneOf => PredicateKind::Nin,
        }
    }
}

/// Resolve a raw symbol, deriving the array-valued flag from the symbol itself.
pub fn resolve_symbol(symbol: &str) -> PredicateKind {
    let array_valued = Operator::from_symbol(symbol).is_some_and(Operator::is_array_valued);
    PredicateKind::resolve(symbol, array_valued)
}

/// Label for a raw symbol; unknown symbols are echoed back.
pub fn symbol_label(symbol: &str) -> &str {
    Operator::from_symbol(symbol).map_or(symbol, |op| op.label())
}

/// Value input widgets of the rule builder, each with its own operator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputType {
    String,
    Numeric,
    Date,
    Select,
    Boolean,
    Multiselect,
    Grid,
}

impl InputType {
    pub const fn allowed_operators(self) -> &'static [Operator] {
        use Operator::*;
        match self {
            InputType::String => &[Is, IsNot, Contains, NotContains, OneOf, NotOneOf],
            InputType::Numeric => &[Is, IsNot, AtLeast, GreaterThan, AtMost, LessThan],
            InputType::Date => &[Is, AtLeast, GreaterThan, AtMost, LessThan],
            InputType::Select | InputType::Boolean => &[Is, IsNot],
            InputType::Multiselect | InputType::Grid => &[OneOf, NotOneOf],
        }
    }

    /// `(symbol, label)` pairs for the operator dropdown.
    pub fn operator_options(self) -> Vec<(&'static str, &'static str)> {
        self.allowed_operators()
            .iter()
            .map(|op| (op.symbol(), op.label()))
            .collect()
    }
}
