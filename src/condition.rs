//! Leaf expansion: turns one condition into the atomic predicates that
//! implement it, including multi-value set attributes.

use crate::ast::ConditionNode;
use crate::attribute::{AttributeLookup, AttributeMeta, MetadataCache, ValueType};
use crate::operator::{resolve_symbol, symbol_label, PredicateKind};
use crate::plan::AtomicPredicate;
use crate::value::{like_pattern, normalize, split_tokens, PredicateValue, RawValue, Scalar};
use std::fmt;

/// Virtual field: "entity has image".
pub const HAS_IMAGE_FIELD: &str = "has_image";
/// Virtual field: direct entity id selection.
pub const ENTITY_ID_FIELD: &str = "entity_id";
/// Stored field checked by the `has_image` condition.
pub const IMAGE_FIELD: &str = "image";

/// Why a condition contributed nothing to the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The node names no field.
    MissingField,
    /// Metadata lookup said the attribute does not exist, or failed.
    UnknownAttribute,
    /// The value normalized to nothing.
    EmptyValue,
    /// The subtree sits below the configured depth limit.
    DepthLimit,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DropReason::MissingField => "missing field",
            DropReason::UnknownAttribute => "unknown attribute",
            DropReason::EmptyValue => "empty value",
            DropReason::DepthLimit => "nested too deep",
        })
    }
}

/// How a field is expanded.
enum FieldClass<'m> {
    HasImage,
    EntityId,
    Attribute(&'m AttributeMeta),
}

impl ConditionNode {
    /// Expand into atomic predicates.
    ///
    /// `Ok` always holds at least one predicate; conditions that contribute
    /// nothing report why instead.
    pub fn expand<L>(&self, cache: &mut MetadataCache<'_, L>) -> Result<Vec<AtomicPredicate>, DropReason>
    where
        L: AttributeLookup + ?Sized,
    {
        let field = self.field.trim();
        if field.is_empty() {
            return Err(DropReason::MissingField);
        }

        let class = match field {
            HAS_IMAGE_FIELD => FieldClass::HasImage,
            ENTITY_ID_FIELD => FieldClass::EntityId,
            code => FieldClass::Attribute(cache.get(code).ok_or(DropReason::UnknownAttribute)?),
        };

        match class {
            FieldClass::HasImage => self.expand_has_image().map(|p| vec![p]),
            FieldClass::EntityId => self.expand_entity_id().map(|p| vec![p]),
            FieldClass::Attribute(meta) => self.expand_attribute(field, meta),
        }
    }

    /// `selected XOR negated`: "has image != yes" means "has no image".
    fn expand_has_image(&self) -> Result<AtomicPredicate, DropReason> {
        // a blank value is a no-op here like on any other field, not "has no image"
        if self.value.is_absent() {
            return Err(DropReason::EmptyValue);
        }
        let selected = self.value.first().is_some_and(Scalar::is_truthy);
        let negated = self.operator.trim() == "!=";

        let kind = if selected ^ negated {
            PredicateKind::NotNull
        } else {
            PredicateKind::IsNull
        };
        Ok(AtomicPredicate::new(IMAGE_FIELD, kind, Scalar::Bool(true)))
    }

    /// Ids are always a list; `eq`/`neq` mean "is (not) one of {ids}".
    fn expand_entity_id(&self) -> Result<AtomicPredicate, DropReason> {
        let ids: Vec<Scalar> = self
            .value
            .to_list()
            .into_iter()
            .flat_map(|s| match s {
                Scalar::Text(text) => split_tokens(&text),
                other => vec![other],
            })
            .map(Scalar::coerce_code)
            .collect();
        if ids.is_empty() {
            return Err(DropReason::EmptyValue);
        }

        let kind = match resolve_symbol(&self.operator) {
            PredicateKind::Eq => PredicateKind::In,
            PredicateKind::Neq => PredicateKind::Nin,
            other => other,
        };

        let value = match kind {
            PredicateKind::In | PredicateKind::Nin => PredicateValue::List(ids),
            PredicateKind::Like | PredicateKind::Nlike => PredicateValue::Scalar(like_pattern(&ids[0])),
            _ => PredicateValue::Scalar(ids[0].clone()),
        };
        Ok(AtomicPredicate::new(ENTITY_ID_FIELD, kind, value))
    }

    fn expand_attribute(&self, code: &str, meta: &AttributeMeta) -> Result<Vec<AtomicPredicate>, DropReason> {
        let kind = resolve_symbol(&self.operator);
        let value = normalize(&self.value, kind, meta.value_type).ok_or(DropReason::EmptyValue)?;

        if meta.value_type != ValueType::MultiValueSet {
            return Ok(vec![AtomicPredicate::new(code, kind, value)]);
        }

        let member = |kind, value: Scalar| {
            AtomicPredicate::new(code, kind, value).with_delimiter(&meta.storage_delimiter)
        };
        let predicates = match (kind, value) {
            (PredicateKind::In, PredicateValue::List(items)) => items
                .into_iter()
                .map(|item| member(PredicateKind::MemberOf, item))
                .collect(),
            // every exclusion must hold, so each token stands alone
            (PredicateKind::Nin, PredicateValue::List(items)) => items
                .into_iter()
                .map(|item| member(PredicateKind::NotMemberOf, item))
                .collect(),
            (PredicateKind::Eq, PredicateValue::Scalar(value)) => vec![member(PredicateKind::MemberOf, value)],
            (PredicateKind::Neq, PredicateValue::Scalar(value)) => vec![member(PredicateKind::NotMemberOf, value)],
            (kind, value) => vec![AtomicPredicate::new(code, kind, value)],
        };
        Ok(predicates)
    }

    /// Human readable form, e.g. `Color is one of Red, Blue`.
    ///
    /// Option codes are replaced with their labels when `meta` has them.
    pub fn describe(&self, meta: Option<&AttributeMeta>) -> String {
        let field = meta
            .and_then(|m| m.label.as_deref())
            .unwrap_or(self.field.as_str());
        format!(
            "{} {} {}",
            field,
            symbol_label(&self.operator),
            self.value_name(meta)
        )
    }

    fn value_name(&self, meta: Option<&AttributeMeta>) -> String {
        if self.value.is_absent() {
            return "...".to_string();
        }
        let label = |s: &Scalar| {
            meta.and_then(|m| m.option_label(s))
                .map_or_else(|| s.to_string(), str::to_string)
        };
        let tokens: Vec<String> = match &self.value {
            RawValue::Scalar(Scalar::Text(text)) if text.contains(',') => text
                .split(',')
                .map(|t| label(&Scalar::from(t.trim())))
                .collect(),
            RawValue::List(items) => items.iter().map(label).collect(),
            other => other.first().map(label).into_iter().collect(),
        };
        tokens.join(", ")
    }
}
