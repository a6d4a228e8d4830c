//! 规则条件树的节点定义
//!
//! 条件树由规则编辑器产生：叶子是单个属性比较 (`ConditionNode`)，
//! 内部节点是带聚合方式的组合 (`CombineNode`)。树在构建后只读。

use crate::value::RawValue;

/// 组合节点的聚合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Aggregator {
    /// 全部满足 (AND)
    #[default]
    All,
    /// 任一满足 (OR)
    Any,
}

impl Aggregator {
    /// 解析 `"all"` / `"any"`，大小写不敏感
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Aggregator::All),
            "any" => Some(Aggregator::Any),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Aggregator::All => "all",
            Aggregator::Any => "any",
        }
    }
}

/// 条件树中的任意节点
#[derive(Debug, Clone, PartialEq)]
pub enum RuleNode {
    Condition(ConditionNode),
    Combine(CombineNode),
}

impl From<ConditionNode> for RuleNode {
    fn from(node: ConditionNode) -> Self {
        RuleNode::Condition(node)
    }
}

impl From<CombineNode> for RuleNode {
    fn from(node: CombineNode) -> Self {
        RuleNode::Combine(node)
    }
}

/// 单个属性比较，例如 `color () "12,13"`
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionNode {
    /// 属性代码或虚拟属性 (`entity_id`, `has_image`)
    pub field: String,
    /// 规则编辑器中的运算符符号，例如 `==`、`!()`
    pub operator: String,
    /// 用户提交的原始值
    pub value: RawValue,
}

impl ConditionNode {
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<RawValue>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// 组合节点：有序的子节点列表加上聚合方式
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CombineNode {
    pub aggregator: Aggregator,
    pub children: Vec<RuleNode>,
}

impl CombineNode {
    pub fn new(aggregator: Aggregator, children: Vec<RuleNode>) -> Self {
        Self {
            aggregator,
            children,
        }
    }

    /// `ALL[...]`
    pub fn all(children: Vec<RuleNode>) -> Self {
        Self::new(Aggregator::All, children)
    }

    /// `ANY[...]`
    pub fn any(children: Vec<RuleNode>) -> Self {
        Self::new(Aggregator::Any, children)
    }

    /// 追加一个子节点
    pub fn with(mut self, child: impl Into<RuleNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// 树的深度，单独的组合节点深度为 1
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|child| match child {
                RuleNode::Combine(nested) => nested.depth(),
                RuleNode::Condition(_) => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// 叶子条件总数
    pub fn condition_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                RuleNode::Combine(nested) => nested.condition_count(),
                RuleNode::Condition(_) => 1,
            })
            .sum()
    }
}
