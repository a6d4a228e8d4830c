//! Compiler that flattens a condition tree into a filter plan.
//!
//! The plan is a conjunction of OR groups, the only shape the repository
//! search API accepts:
//!
//! ```text
//! ALL[c1, ANY[c2, c3]]  =>  [c1] AND [c2 OR c3]
//! ```
//!
//! * `ALL` gives every predicate of its condition children a group of its own.
//! * `ANY` pools the OR-distributable predicates of its condition children
//!   into one shared group, emitted after all children. AND-only predicates
//!   (set exclusion) each get a standalone group instead.
//! * Nested combine nodes are compiled on their own and their groups appended
//!   as they are. An `ALL` under an `ANY` is therefore not distributed into
//!   the parent's OR group; doing that needs a full CNF expansion.

use crate::ast::{Aggregator, CombineNode, ConditionNode, RuleNode};
use crate::attribute::{AttributeLookup, MetadataCache};
use crate::condition::DropReason;
use crate::plan::{AtomicPredicate, FilterGroup, FilterPlan};
use tracing::debug;

/// Default nesting limit; a lone combine node has depth 1.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Configuration for tree compilation
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Combine nodes nested deeper than this are dropped
    pub max_depth: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A condition (or subtree) left out of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedCondition {
    /// Field of the condition, or `"*"` for a dropped subtree.
    pub field: String,
    pub reason: DropReason,
}

/// Result of compilation: the plan plus what was left out of it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompileResult {
    pub plan: FilterPlan,
    pub dropped: Vec<DroppedCondition>,
}

/// What one node hands to its parent.
///
/// Condition nodes offer predicates the parent may OR-merge; combine nodes
/// hand over finished groups.
#[derive(Debug, Default)]
struct Contribution {
    or_candidates: Vec<AtomicPredicate>,
    groups: Vec<FilterGroup>,
}

/// Compiles condition trees against an attribute metadata collaborator.
///
/// Holds no mutable state, so one compiler can serve concurrent callers.
pub struct Compiler<'a, L: ?Sized> {
    lookup: &'a L,
    config: CompilerConfig,
}

impl<'a, L: AttributeLookup + ?Sized> Compiler<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self::with_config(lookup, CompilerConfig::default())
    }

    pub fn with_config(lookup: &'a L, config: CompilerConfig) -> Self {
        Self { lookup, config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile a tree into a filter plan.
    ///
    /// Never fails: malformed or empty conditions are left out and reported
    /// in [`CompileResult::dropped`].
    pub fn compile(&self, root: &CombineNode) -> CompileResult {
        let mut session = Session {
            cache: MetadataCache::new(self.lookup),
            dropped: Vec::new(),
            max_depth: self.config.max_depth,
        };

        let contribution = session.compile_combine(root, 1);
        let plan = FilterPlan::new(contribution.groups);

        debug!(
            target: "condition_compiler::compiler",
            groups = plan.groups().len(),
            predicates = plan.predicate_count(),
            dropped = session.dropped.len(),
            lookups = session.cache.len(),
            "compiled condition tree"
        );

        CompileResult {
            plan,
            dropped: session.dropped,
        }
    }

    /// Compile any node; a bare condition is treated as `ALL[condition]`.
    pub fn compile_node(&self, root: &RuleNode) -> CompileResult {
        match root {
            RuleNode::Combine(node) => self.compile(node),
            RuleNode::Condition(node) => self.compile(&CombineNode::all(vec![RuleNode::Condition(node.clone())])),
        }
    }
}

/// State of one compilation call: the metadata memo and the drop log.
struct Session<'a, L: ?Sized> {
    cache: MetadataCache<'a, L>,
    dropped: Vec<DroppedCondition>,
    max_depth: usize,
}

impl<L: AttributeLookup + ?Sized> Session<'_, L> {
    fn compile_node(&mut self, node: &RuleNode, depth: usize) -> Contribution {
        match node {
            RuleNode::Condition(condition) => Contribution {
                or_candidates: self.expand(condition),
                groups: Vec::new(),
            },
            RuleNode::Combine(combine) => self.compile_combine(combine, depth + 1),
        }
    }

    fn compile_combine(&mut self, node: &CombineNode, depth: usize) -> Contribution {
        if depth > self.max_depth {
            debug!(target: "condition_compiler::compiler", depth, "combine node exceeds depth limit");
            self.dropped.push(DroppedCondition {
                field: "*".to_string(),
                reason: DropReason::DepthLimit,
            });
            return Contribution::default();
        }

        let mut groups = Vec::new();
        let mut or_bucket = Vec::new();

        for child in &node.children {
            let contribution = self.compile_node(child, depth);

            match node.aggregator {
                Aggregator::All => {
                    groups.extend(contribution.or_candidates.into_iter().map(FilterGroup::single));
                }
                Aggregator::Any => {
                    for predicate in contribution.or_candidates {
                        if predicate.kind().is_or_distributable() {
                            or_bucket.push(predicate);
                        } else {
                            groups.push(FilterGroup::single(predicate));
                        }
                    }
                }
            }

            groups.extend(contribution.groups);
        }

        if let Some(group) = FilterGroup::from_predicates(or_bucket) {
            groups.push(group);
        }

        Contribution {
            or_candidates: Vec::new(),
            groups,
        }
    }

    fn expand(&mut self, condition: &ConditionNode) -> Vec<AtomicPredicate> {
        match condition.expand(&mut self.cache) {
            Ok(predicates) => predicates,
            Err(reason) => {
                debug!(
                    target: "condition_compiler::compiler",
                    field = %condition.field,
                    %reason,
                    "condition dropped"
                );
                self.dropped.push(DroppedCondition {
                    field: condition.field.clone(),
                    reason,
                });
                Vec::new()
            }
        }
    }
}
