//! SQL compiler that lowers a search request into a `SELECT` using sea-query.
//!
//! Groups of the filter plan become parenthesised `OR` conditions joined with
//! `AND`. Set membership on delimited columns uses `FIND_IN_SET` on MySQL
//! and `string_to_array` on PostgreSQL.

use crate::attribute::DEFAULT_STORAGE_DELIMITER;
use crate::criteria::{SearchCriteria, SortDirection};
use crate::operator::PredicateKind;
use crate::plan::{AtomicPredicate, FilterGroup, FilterPlan};
use crate::value::{PredicateValue, Scalar};
use sea_query::{
    Asterisk, Cond, Condition, Expr, Iden, LikeExpr, MysqlQueryBuilder, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr, Value,
};
use serde::{Deserialize, Serialize};

/// Escape character used by `like_pattern`.
const LIKE_ESCAPE: char = '\\';

/// Table identifier wrapper
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Mysql,
    Postgres,
}

/// SQL Compiler that renders search requests against one entity table
#[derive(Debug, Clone)]
pub struct SqlCompiler {
    table: String,
    dialect: SqlDialect,
}

impl SqlCompiler {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            dialect: SqlDialect::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Build the `SELECT` for a search request
    pub fn select_statement(&self, criteria: &SearchCriteria) -> SelectStatement {
        let mut select = self.filtered_select(&criteria.plan);

        let order = match criteria.sort.direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };
        select.order_by(ColumnName(criteria.sort.field.column().to_string()), order);

        let (offset, limit) = criteria.page_window();
        select.limit(limit as u64);
        if offset > 0 {
            select.offset(offset as u64);
        }
        select
    }

    /// Render a search request as an inline SQL string
    pub fn compile(&self, criteria: &SearchCriteria) -> String {
        self.render(&self.select_statement(criteria))
    }

    /// Render only the filtering part, without sorting or paging
    pub fn compile_plan(&self, plan: &FilterPlan) -> String {
        self.render(&self.filtered_select(plan))
    }

    fn filtered_select(&self, plan: &FilterPlan) -> SelectStatement {
        let mut select = Query::select();
        select.column(Asterisk).from(TableName(self.table.clone()));

        // an empty condition would render as `WHERE TRUE`
        if !plan.matches_everything() {
            select.cond_where(self.plan_condition(plan));
        }
        select
    }

    /// `WHERE` condition of a plan
    pub fn plan_condition(&self, plan: &FilterPlan) -> Condition {
        plan.groups()
            .iter()
            .fold(Cond::all(), |cond, group| cond.add(self.group_condition(group)))
    }

    fn render(&self, select: &SelectStatement) -> String {
        match self.dialect {
            SqlDialect::Mysql => select.to_string(MysqlQueryBuilder),
            SqlDialect::Postgres => select.to_string(PostgresQueryBuilder),
        }
    }

    fn group_condition(&self, group: &FilterGroup) -> Condition {
        group
            .iter()
            .fold(Cond::any(), |cond, predicate| cond.add(self.predicate_expr(predicate)))
    }

    /// Compile a single predicate
    fn predicate_expr(&self, predicate: &AtomicPredicate) -> SimpleExpr {
        let col = Expr::col(ColumnName(predicate.field().to_string()));
        let value = predicate.value();
        let first = || value.as_scalar().map(scalar_to_value).unwrap_or(Value::String(None));

        match predicate.kind() {
            PredicateKind::Eq => col.eq(first()),
            PredicateKind::Neq => col.ne(first()),
            PredicateKind::Gt => col.gt(first()),
            PredicateKind::Gte => col.gte(first()),
            PredicateKind::Lt => col.lt(first()),
            PredicateKind::Lte => col.lte(first()),
            PredicateKind::Like => col.like(like_expr(value)),
            PredicateKind::Nlike => col.not_like(like_expr(value)),
            PredicateKind::In => col.is_in(list_values(value)),
            PredicateKind::Nin => col.is_not_in(list_values(value)),
            PredicateKind::IsNull => col.is_null(),
            PredicateKind::NotNull => col.is_not_null(),
            PredicateKind::MemberOf => self.membership_expr(predicate, first(), true),
            PredicateKind::NotMemberOf => self.membership_expr(predicate, first(), false),
        }
    }

    fn membership_expr(&self, predicate: &AtomicPredicate, value: Value, member: bool) -> SimpleExpr {
        let column: SimpleExpr = Expr::col(ColumnName(predicate.field().to_string())).into();
        let delimiter = predicate.delimiter();

        // placeholders follow the builder: `?` on MySQL, `$n` on PostgreSQL
        match self.dialect {
            SqlDialect::Mysql if delimiter == DEFAULT_STORAGE_DELIMITER => {
                let template = if member { "FIND_IN_SET(?, ?) > 0" } else { "FIND_IN_SET(?, ?) = 0" };
                Expr::cust_with_exprs(template, [SimpleExpr::Value(value), column])
            }
            SqlDialect::Mysql => {
                let template = if member {
                    "FIND_IN_SET(?, REPLACE(?, ?, ',')) > 0"
                } else {
                    "FIND_IN_SET(?, REPLACE(?, ?, ',')) = 0"
                };
                Expr::cust_with_exprs(template, [SimpleExpr::Value(value), column, text_value(delimiter)])
            }
            SqlDialect::Postgres => {
                // the stored tokens are text, so the wanted code is compared as text too
                let template = if member {
                    "CAST($1 AS TEXT) = ANY(string_to_array($2, $3))"
                } else {
                    "NOT (CAST($1 AS TEXT) = ANY(string_to_array($2, $3)))"
                };
                Expr::cust_with_exprs(template, [SimpleExpr::Value(value), column, text_value(delimiter)])
            }
        }
    }
}

/// Convert a plan scalar to a sea-query Value
fn scalar_to_value(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Bool(b) => Value::Bool(Some(*b)),
        Scalar::Int(n) => Value::BigInt(Some(*n)),
        Scalar::Float(f) => Value::Double(Some(*f)),
        Scalar::Text(s) => Value::String(Some(Box::new(s.clone()))),
    }
}

fn text_value(text: &str) -> SimpleExpr {
    SimpleExpr::Value(Value::String(Some(Box::new(text.to_string()))))
}

fn list_values(value: &PredicateValue) -> Vec<Value> {
    value.as_slice().iter().map(scalar_to_value).collect()
}

fn like_expr(value: &PredicateValue) -> LikeExpr {
    let pattern = value.as_scalar().map(|s| s.as_text().into_owned()).unwrap_or_default();
    LikeExpr::new(pattern).escape(LIKE_ESCAPE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{SortField, SortOrder};

    fn criteria(groups: Vec<FilterGroup>) -> SearchCriteria {
        SearchCriteria {
            plan: FilterPlan::new(groups),
            sort: SortOrder {
                field: SortField::CreatedAt,
                direction: SortDirection::Asc,
            },
            page_size: 8,
            current_page: 1,
            total_limit: None,
        }
    }

    fn single(field: &str, kind: PredicateKind, value: impl Into<PredicateValue>) -> FilterGroup {
        FilterGroup::single(AtomicPredicate::new(field, kind, value))
    }

    #[test]
    fn test_groups_are_anded_and_predicates_ored() {
        let compiler = SqlCompiler::new("custom_entity");
        let sql = compiler.compile(&criteria(vec![
            single("attribute_set_id", PredicateKind::Eq, Scalar::Int(4)),
            FilterGroup::from_predicates(vec![
                AtomicPredicate::new("name", PredicateKind::Eq, Scalar::from("x")),
                AtomicPredicate::new("sku", PredicateKind::Eq, Scalar::from("y")),
            ])
            .unwrap(),
        ]));

        assert!(sql.starts_with("SELECT * FROM `custom_entity` WHERE"));
        assert!(sql.contains("`attribute_set_id` = 4"));
        assert!(sql.contains("AND (`name` = 'x' OR `sku` = 'y')"));
        assert!(sql.contains("ORDER BY `created_at` ASC"));
        assert!(sql.contains("LIMIT 8"));
        assert!(!sql.contains("OFFSET"));
    }

    #[test]
    fn test_membership_uses_find_in_set() {
        let compiler = SqlCompiler::new("custom_entity");
        let sql = compiler.compile(&criteria(vec![
            single("color", PredicateKind::NotMemberOf, Scalar::Int(12)),
            single("color", PredicateKind::MemberOf, Scalar::from("A")),
        ]));

        assert!(sql.contains("FIND_IN_SET(12, `color`) = 0"));
        assert!(sql.contains("FIND_IN_SET('A', `color`) > 0"));
    }

    #[test]
    fn test_postgres_membership() {
        let compiler = SqlCompiler::new("custom_entity").with_dialect(SqlDialect::Postgres);
        let sql = compiler.compile(&criteria(vec![single("color", PredicateKind::MemberOf, Scalar::Int(3))]));

        assert!(sql.contains(r#"CAST(3 AS TEXT) = ANY(string_to_array("color", ','))"#));
        assert!(sql.contains(r#"FROM "custom_entity""#));

        let sql = compiler.compile_plan(&FilterPlan::new(vec![single("color", PredicateKind::NotMemberOf, Scalar::Int(12))]));
        assert!(sql.contains(r#"NOT (CAST(12 AS TEXT) = ANY(string_to_array("color", ',')))"#));
    }

    #[test]
    fn test_membership_honours_storage_delimiter() {
        let plan = FilterPlan::new(vec![FilterGroup::single(
            AtomicPredicate::new("sizes", PredicateKind::MemberOf, Scalar::Int(12)).with_delimiter("|"),
        )]);

        let mysql = SqlCompiler::new("custom_entity").compile_plan(&plan);
        assert!(mysql.contains("FIND_IN_SET(12, REPLACE(`sizes`, '|', ',')) > 0"));

        let postgres = SqlCompiler::new("custom_entity")
            .with_dialect(SqlDialect::Postgres)
            .compile_plan(&plan);
        assert!(postgres.contains(r#"CAST(12 AS TEXT) = ANY(string_to_array("sizes", '|'))"#));
    }

    #[test]
    fn test_lists_null_and_like() {
        let compiler = SqlCompiler::new("custom_entity");
        let sql = compiler.compile(&criteria(vec![
            single("entity_id", PredicateKind::In, vec![Scalar::Int(5), Scalar::Int(7)]),
            single("status", PredicateKind::Nin, vec![Scalar::Int(1)]),
            single("image", PredicateKind::IsNull, Scalar::Bool(true)),
            single("name", PredicateKind::Like, Scalar::from("%shoe%")),
        ]));

        assert!(sql.contains("`entity_id` IN (5, 7)"));
        assert!(sql.contains("`status` NOT IN (1)"));
        assert!(sql.contains("`image` IS NULL"));
        assert!(sql.contains("`name` LIKE '%shoe%'"));
        assert!(sql.contains("ESCAPE"));
    }

    #[test]
    fn test_empty_plan_has_no_where() {
        let compiler = SqlCompiler::new("custom_entity");
        let sql = compiler.compile(&criteria(vec![]));
        assert!(!sql.contains("WHERE"));
        assert_eq!(compiler.compile_plan(&FilterPlan::default()), "SELECT * FROM `custom_entity`");
    }

    #[test]
    fn test_page_window() {
        let compiler = SqlCompiler::new("custom_entity");
        let mut request = criteria(vec![]);
        request.page_size = 4;
        request.current_page = 3;
        request.total_limit = Some(10);

        let sql = compiler.compile(&request);
        assert!(sql.contains("LIMIT 2"));
        assert!(sql.contains("OFFSET 8"));
    }
}
