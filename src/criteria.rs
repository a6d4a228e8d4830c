//! Search request assembled from the parameters of a listing widget.
//!
//! The widget filters by attribute set and active flag, ANDs the compiled
//! condition tree onto that, and sorts and pages the result.

use crate::ast::CombineNode;
use crate::attribute::AttributeLookup;
use crate::compiler::{Compiler, CompilerConfig};
use crate::operator::PredicateKind;
use crate::parser::{decode_widget_conditions, parse_value};
use crate::plan::{AtomicPredicate, FilterGroup, FilterPlan};
use crate::value::Scalar;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{error, warn};

pub const DEFAULT_ITEMS_COUNT: usize = 8;
pub const DEFAULT_ITEMS_PER_PAGE: usize = 4;
pub const ATTRIBUTE_SET_FIELD: &str = "attribute_set_id";
pub const ACTIVE_FIELD: &str = "is_active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    EntityId,
    CreatedAt,
    UpdatedAt,
    #[default]
    Name,
}

impl SortField {
    pub const ALL: [SortField; 4] = [
        SortField::EntityId,
        SortField::CreatedAt,
        SortField::UpdatedAt,
        SortField::Name,
    ];

    /// Unknown fields sort by name.
    pub fn parse(s: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|field| field.column() == s.trim())
            .unwrap_or_default()
    }

    pub const fn column(self) -> &'static str {
        match self {
            SortField::EntityId => "entity_id",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Name => "name",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            SortField::EntityId => "ID",
            SortField::CreatedAt => "Created At",
            SortField::UpdatedAt => "Updated At",
            SortField::Name => "Name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// Case-insensitive `ASC`/`DESC`; anything else is `DESC`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Widget parameters as stored on the widget instance.
///
/// Values arrive loosely typed (numbers as strings, flags as `"0"`/`"1"`),
/// so fields are kept as JSON and read through the accessors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WidgetParameters {
    pub attribute_set_id: Value,
    pub conditions_encoded: Value,
    pub conditions: Value,
    pub sort_by: Value,
    pub sort_direction: Value,
    pub items_count: Value,
    pub items_per_page: Value,
    pub show_pager: Value,
}

impl WidgetParameters {
    pub fn attribute_set_id(&self) -> Option<i64> {
        json_integer(&self.attribute_set_id)
    }

    pub fn sort_order(&self) -> SortOrder {
        SortOrder {
            field: self.sort_by.as_str().map(SortField::parse).unwrap_or_default(),
            direction: self
                .sort_direction
                .as_str()
                .map(SortDirection::parse)
                .unwrap_or_default(),
        }
    }

    pub fn items_count(&self) -> usize {
        json_count(&self.items_count).unwrap_or(DEFAULT_ITEMS_COUNT)
    }

    pub fn items_per_page(&self) -> usize {
        json_count(&self.items_per_page).unwrap_or(DEFAULT_ITEMS_PER_PAGE)
    }

    pub fn show_pager(&self) -> bool {
        is_truthy(&self.show_pager)
    }

    /// Condition tree: `conditions_encoded` wins over `conditions`.
    ///
    /// An undecodable string is logged and yields an empty tree.
    pub fn condition_tree(&self) -> CombineNode {
        let source = if is_truthy(&self.conditions_encoded) {
            &self.conditions_encoded
        } else {
            &self.conditions
        };

        match source {
            Value::String(encoded) => decode_widget_conditions(encoded).unwrap_or_else(|e| {
                error!(error = %e, encoded = %encoded, "failed to decode widget conditions");
                CombineNode::default()
            }),
            Value::Null => CombineNode::default(),
            other => parse_value(other),
        }
    }
}

/// A filtered, sorted and paged request against the entity repository.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriteria {
    pub plan: FilterPlan,
    pub sort: SortOrder,
    pub page_size: usize,
    /// 1-based.
    pub current_page: usize,
    /// Upper bound on rows across all pages, when paging.
    pub total_limit: Option<usize>,
}

impl SearchCriteria {
    /// `(offset, limit)` for the current page.
    pub fn page_window(&self) -> (usize, usize) {
        let offset = self.current_page.saturating_sub(1).saturating_mul(self.page_size);
        let limit = match self.total_limit {
            Some(total) => self.page_size.min(total.saturating_sub(offset)),
            None => self.page_size,
        };
        (offset, limit)
    }
}

/// Builds [`SearchCriteria`] from widget parameters.
pub struct CriteriaBuilder<'a, L: ?Sized> {
    lookup: &'a L,
    compiler_config: CompilerConfig,
    default_attribute_set_id: Option<i64>,
}

impl<'a, L: AttributeLookup + ?Sized> CriteriaBuilder<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self {
            lookup,
            compiler_config: CompilerConfig::default(),
            default_attribute_set_id: None,
        }
    }

    pub fn with_compiler_config(mut self, config: CompilerConfig) -> Self {
        self.compiler_config = config;
        self
    }

    /// Attribute set used when the widget names none.
    pub fn with_default_attribute_set(mut self, id: Option<i64>) -> Self {
        self.default_attribute_set_id = id;
        self
    }

    /// `None` when no attribute set can be determined; the widget then
    /// renders nothing.
    pub fn build(&self, params: &WidgetParameters, requested_page: usize) -> Option<SearchCriteria> {
        let Some(attribute_set_id) = params.attribute_set_id().or(self.default_attribute_set_id) else {
            error!("no attribute set configured, widget will render empty");
            return None;
        };

        let mut plan = FilterPlan::default();
        plan.push(FilterGroup::single(AtomicPredicate::new(
            ATTRIBUTE_SET_FIELD,
            PredicateKind::Eq,
            Scalar::Int(attribute_set_id),
        )));
        plan.push(FilterGroup::single(AtomicPredicate::new(
            ACTIVE_FIELD,
            PredicateKind::Eq,
            Scalar::Bool(true),
        )));

        let compiled = Compiler::with_config(self.lookup, self.compiler_config.clone())
            .compile(&params.condition_tree());
        for dropped in &compiled.dropped {
            warn!(field = %dropped.field, reason = %dropped.reason, "condition dropped from widget filter");
        }
        plan.extend(compiled.plan);

        let (page_size, current_page, total_limit) = if params.show_pager() {
            (params.items_per_page(), requested_page.max(1), Some(params.items_count()))
        } else {
            (params.items_count(), 1, None)
        };

        Some(SearchCriteria {
            plan,
            sort: params.sort_order(),
            page_size,
            current_page,
            total_limit,
        })
    }
}

fn json_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Positive count; anything else falls back to the default.
fn json_count(value: &Value) -> Option<usize> {
    json_integer(value)
        .filter(|n| *n > 0)
        .and_then(|n| usize::try_from(n).ok())
}

/// Loose truthiness of a stored widget flag.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
