//! Compiles rule-builder condition trees into filter plans: a conjunction of
//! OR groups of atomic predicates, lowered to SQL for the entity repository.

pub mod ast;
pub mod attribute;
pub mod compiler;
pub mod condition;
pub mod config;
pub mod criteria;
pub mod eval;
pub mod operator;
pub mod parser;
pub mod plan;
pub mod sql_compiler;
pub mod value;

pub use ast::{Aggregator, CombineNode, ConditionNode, RuleNode};
pub use attribute::{AttributeCatalog, AttributeLookup, AttributeMeta, ValueType};
pub use compiler::{CompileResult, Compiler, CompilerConfig};
pub use plan::{AtomicPredicate, FilterGroup, FilterPlan};
