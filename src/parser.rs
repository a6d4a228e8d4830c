//! 条件树的JSON解析器
//!
//! ## 支持的输入形式
//!
//! ### 嵌套形式
//! ```text
//! {
//!   "type": "combine", "aggregator": "any",
//!   "children": [
//!     { "type": "condition", "field": "color", "operator": "()", "value": "12,13" }
//!   ]
//! }
//! ```
//! `attribute` 可代替 `field`，`conditions` 可代替 `children`。
//! `type` 以 `Combine` 结尾（例如规则编辑器提交的类名）即视为组合节点。
//!
//! ### 扁平形式（规则编辑器表单提交）
//! ```text
//! {
//!   "1":       { "type": "...\\Combine", "aggregator": "all", "value": "1" },
//!   "1--1":    { "type": "...\\Entity", "attribute": "sku", "operator": "==", "value": "A" },
//!   "1--2":    { "type": "...\\Combine", "aggregator": "any" },
//!   "1--2--1": { "type": "...\\Entity", "attribute": "color", "operator": "()", "value": "12" }
//! }
//! ```
//! 键是以 `--` 分隔的路径，子节点按最后一段的数字排序。
//!
//! ### 组件编码形式
//! 组件指令参数中的条件先做HTML实体转义，再把 `{ } " \ < >`
//! 替换成 `^[ ^] ` | ^( ^)`。[`decode_widget_conditions`] 负责还原。
//!
//! ## 容错
//!
//! 格式错误的节点被跳过，不会使整棵树失败；只有非法的JSON文本才返回错误。
//! 嵌套超过 [`MAX_PARSE_DEPTH`] 层的组合节点同样按格式错误处理。

use crate::ast::{Aggregator, CombineNode, ConditionNode, RuleNode};
use crate::value::RawValue;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

/// 扁平形式中的路径分隔符
pub const PATH_SEPARATOR: &str = "--";

/// 组合节点的最大嵌套层数，与 serde_json 的递归上限一致
///
/// 扁平形式的每个路径都是顶层键，不受 serde_json 限制，因此在这里统一限制。
pub const MAX_PARSE_DEPTH: usize = 128;

/// 组件编码的保留字符，按还原顺序排列
const RESERVED_CHARS: [(&str, &str); 6] = [
    ("^[", "{"),
    ("^]", "}"),
    ("`", "\""),
    ("|", "\\"),
    ("^(", "<"),
    ("^)", ">"),
];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("条件不是合法的JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// 解析JSON文本形式的条件树
pub fn parse_str(input: &str) -> Result<CombineNode, ParseError> {
    let value: Value = serde_json::from_str(input)?;
    Ok(parse_value(&value))
}

/// 从已解析的JSON构建条件树，永不失败
///
/// 根节点是单个条件时被包装为 `ALL[condition]`；根节点是数组时视为
/// `ALL` 的子节点列表。
pub fn parse_value(value: &Value) -> CombineNode {
    match value {
        Value::Array(items) => CombineNode::all(parse_children(items, 2)),
        Value::Object(map) if is_flat(map) => parse_value(&flat_to_nested(map)),
        Value::Object(_) => match parse_node(value, 1) {
            Some(RuleNode::Combine(root)) => root,
            Some(condition) => CombineNode::all(vec![condition]),
            None => {
                debug!(target: "condition_compiler::parser", "root node is malformed, using an empty tree");
                CombineNode::default()
            }
        },
        other => {
            debug!(target: "condition_compiler::parser", kind = json_kind(other), "root is not an object");
            CombineNode::default()
        }
    }
}

/// 还原组件编码的条件并解析
pub fn decode_widget_conditions(encoded: &str) -> Result<CombineNode, ParseError> {
    let json = decode_reserved_chars(&decode_html_entities(encoded));
    parse_str(&json)
}

/// 解析单个节点，格式错误时返回 `None`
///
/// `depth` 是节点所在的层数，根节点为 1。
fn parse_node(value: &Value, depth: usize) -> Option<RuleNode> {
    let Value::Object(map) = value else {
        debug!(target: "condition_compiler::parser", kind = json_kind(value), "skipping non-object node");
        return None;
    };

    let node_type = map.get("type").and_then(Value::as_str).unwrap_or("").trim();

    if is_combine(node_type, map) {
        if depth > MAX_PARSE_DEPTH {
            debug!(target: "condition_compiler::parser", depth, "skipping combine nested too deep");
            return None;
        }
        let aggregator = match map.get("aggregator") {
            None | Some(Value::Null) => Aggregator::All,
            Some(Value::String(s)) => match Aggregator::parse(s) {
                Some(aggregator) => aggregator,
                None => {
                    debug!(target: "condition_compiler::parser", aggregator = %s, "skipping combine with unknown aggregator");
                    return None;
                }
            },
            Some(other) => {
                debug!(target: "condition_compiler::parser", kind = json_kind(other), "skipping combine with non-string aggregator");
                return None;
            }
        };

        let children = match map.get("children").or_else(|| map.get("conditions")) {
            Some(Value::Array(items)) => parse_children(items, depth + 1),
            // 关联数组序列化后是以数字为键的对象
            Some(Value::Object(items)) => items
                .values()
                .filter_map(|item| parse_node(item, depth + 1))
                .collect(),
            _ => Vec::new(),
        };
        return Some(RuleNode::Combine(CombineNode::new(aggregator, children)));
    }

    let field = match map.get("field").or_else(|| map.get("attribute")) {
        Some(Value::String(s)) => s.clone(),
        _ => {
            debug!(target: "condition_compiler::parser", node_type, "skipping condition without field");
            return None;
        }
    };
    let operator = map
        .get("operator")
        .and_then(Value::as_str)
        .filter(|op| !op.trim().is_empty())
        .unwrap_or("==");
    let value = map.get("value").map(RawValue::from).unwrap_or_default();

    Some(RuleNode::Condition(ConditionNode::new(field, operator, value)))
}

fn parse_children(items: &[Value], depth: usize) -> Vec<RuleNode> {
    items.iter().filter_map(|item| parse_node(item, depth)).collect()
}

fn is_combine(node_type: &str, map: &Map<String, Value>) -> bool {
    if node_type.is_empty() {
        // 无类型时按结构判断
        return map.contains_key("aggregator")
            || map.contains_key("children")
            || map.contains_key("conditions");
    }
    node_type.ends_with("Combine") || node_type.eq_ignore_ascii_case("combine")
}

/// 扁平形式：存在键 `"1"`，且每个键都是 `--` 分隔的数字路径
fn is_flat(map: &Map<String, Value>) -> bool {
    map.contains_key("1") && map.keys().all(|key| parse_path(key).is_some())
}

fn parse_path(key: &str) -> Option<Vec<u32>> {
    key.split(PATH_SEPARATOR)
        .map(|segment| segment.parse::<u32>().ok())
        .collect()
}

/// 扁平形式的路径索引：节点内容和每个路径的直接子路径
struct FlatIndex<'a> {
    entries: BTreeMap<Vec<u32>, &'a Value>,
    children: HashMap<Vec<u32>, Vec<Vec<u32>>>,
}

/// 把扁平形式转换为嵌套形式，子节点放入 `conditions`
///
/// 父路径不存在的节点无法挂到树上，会被忽略。
fn flat_to_nested(map: &Map<String, Value>) -> Value {
    let entries: BTreeMap<Vec<u32>, &Value> = map
        .iter()
        .filter_map(|(key, value)| parse_path(key).map(|path| (path, value)))
        .collect();

    // BTreeMap 的顺序保证了子节点按路径排序
    let mut children: HashMap<Vec<u32>, Vec<Vec<u32>>> = HashMap::new();
    for path in entries.keys() {
        if let Some((_, parent)) = path.split_last() {
            if !parent.is_empty() {
                children.entry(parent.to_vec()).or_default().push(path.clone());
            }
        }
    }

    FlatIndex { entries, children }.build(&[1])
}

impl FlatIndex<'_> {
    fn build(&self, path: &[u32]) -> Value {
        let mut node = match self.entries.get(path) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        let Some(child_paths) = self.children.get(path) else {
            return Value::Object(node);
        };
        if path.len() >= MAX_PARSE_DEPTH {
            debug!(
                target: "condition_compiler::parser",
                depth = path.len(),
                skipped = child_paths.len(),
                "skipping flat paths nested too deep"
            );
            return Value::Object(node);
        }

        let children = child_paths.iter().map(|child| self.build(child)).collect();
        node.insert("conditions".to_string(), Value::Array(children));
        Value::Object(node)
    }
}

fn decode_reserved_chars(input: &str) -> String {
    RESERVED_CHARS
        .iter()
        .fold(input.to_string(), |acc, (encoded, plain)| acc.replace(encoded, plain))
}

/// 还原 `htmlspecialchars` 产生的实体，`&amp;` 最后处理
fn decode_html_entities(input: &str) -> String {
    input
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;
    use serde_json::json;

    fn condition(node: &RuleNode) -> &ConditionNode {
        match node {
            RuleNode::Condition(c) => c,
            RuleNode::Combine(_) => panic!("Expected condition node"),
        }
    }

    fn combine(node: &RuleNode) -> &CombineNode {
        match node {
            RuleNode::Combine(c) => c,
            RuleNode::Condition(_) => panic!("Expected combine node"),
        }
    }

    #[test]
    fn test_nested_form() {
        let tree = parse_str(
            r#"{
                "type": "combine", "aggregator": "any",
                "children": [
                    {"type": "condition", "field": "color", "operator": "()", "value": "12,13"},
                    {"type": "combine", "aggregator": "all", "conditions": [
                        {"type": "condition", "attribute": "name", "operator": "{}", "value": "shoe"}
                    ]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(tree.aggregator, Aggregator::Any);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(condition(&tree.children[0]).field, "color");
        let nested = combine(&tree.children[1]);
        assert_eq!(nested.aggregator, Aggregator::All);
        assert_eq!(condition(&nested.children[0]).operator, "{}");
    }

    #[test]
    fn test_malformed_nodes_are_skipped() {
        let tree = parse_value(&json!({
            "type": "combine",
            "children": [
                42,
                {"type": "condition", "operator": "=="},
                {"type": "combine", "aggregator": "most", "children": []},
                {"type": "condition", "field": "name", "value": "x"}
            ]
        }));

        assert_eq!(tree.aggregator, Aggregator::All);
        assert_eq!(tree.children.len(), 1);
        let only = condition(&tree.children[0]);
        assert_eq!(only.field, "name");
        // 缺省运算符为相等
        assert_eq!(only.operator, "==");
    }

    #[test]
    fn test_root_condition_is_wrapped() {
        let tree = parse_value(&json!({"field": "entity_id", "operator": "==", "value": "5"}));
        assert_eq!(tree.aggregator, Aggregator::All);
        assert_eq!(tree.condition_count(), 1);
        assert_eq!(parse_value(&json!("nope")), CombineNode::default());
    }

    #[test]
    fn test_class_name_types() {
        let tree = parse_value(&json!({
            "type": "Vendor\\Module\\Model\\Rule\\Condition\\Combine",
            "aggregator": "ANY",
            "conditions": [
                {"type": "Vendor\\Module\\Model\\Rule\\Condition\\Entity", "attribute": "sku", "value": ["A", "B"]}
            ]
        }));
        assert_eq!(tree.aggregator, Aggregator::Any);
        assert_eq!(
            condition(&tree.children[0]).value,
            RawValue::List(vec![Scalar::from("A"), Scalar::from("B")])
        );
    }

    #[test]
    fn test_flat_form() {
        let tree = parse_value(&json!({
            "1": {"type": "Rule\\Combine", "aggregator": "all", "value": "1", "new_child": ""},
            "1--2": {"type": "Rule\\Combine", "aggregator": "any", "value": "1"},
            "1--1": {"type": "Rule\\Entity", "attribute": "sku", "operator": "==", "value": "A"},
            "1--2--10": {"type": "Rule\\Entity", "attribute": "color", "operator": "()", "value": "13"},
            "1--2--2": {"type": "Rule\\Entity", "attribute": "color", "operator": "()", "value": "12"}
        }));

        assert_eq!(tree.aggregator, Aggregator::All);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(condition(&tree.children[0]).field, "sku");

        let nested = combine(&tree.children[1]);
        assert_eq!(nested.aggregator, Aggregator::Any);
        // 数字顺序而不是字典序
        assert_eq!(condition(&nested.children[0]).value, RawValue::from("12"));
        assert_eq!(condition(&nested.children[1]).value, RawValue::from("13"));
    }

    #[test]
    fn test_widget_encoded_form() {
        let encoded = "^[`1`:^[`type`:`Rule||Combine`,`aggregator`:`any`^],\
                       `1--1`:^[`type`:`Rule||Entity`,`attribute`:`name`,`operator`:`^[^]`,`value`:`a&amp;b`^]^]";
        let tree = decode_widget_conditions(encoded).unwrap();

        assert_eq!(tree.aggregator, Aggregator::Any);
        let only = condition(&tree.children[0]);
        assert_eq!(only.field, "name");
        assert_eq!(only.value, RawValue::from("a&b"));
    }

    #[test]
    fn test_html_escaped_json() {
        let tree = decode_widget_conditions(
            "{&quot;field&quot;:&quot;name&quot;,&quot;value&quot;:&quot;&lt;b&gt;&quot;}",
        )
        .unwrap();
        assert_eq!(condition(&tree.children[0]).value, RawValue::from("<b>"));
    }

    fn deep_flat_payload(levels: usize) -> Map<String, Value> {
        let mut map = Map::new();
        let mut key = "1".to_string();
        for _ in 0..levels {
            map.insert(key.clone(), json!({"type": "combine", "aggregator": "all"}));
            key.push_str("--1");
        }
        map.insert(key, json!({"attribute": "sku", "value": "A"}));
        map
    }

    #[test]
    fn test_deep_flat_form_is_cut_at_depth_limit() {
        let tree = parse_value(&Value::Object(deep_flat_payload(2000)));

        assert_eq!(tree.depth(), MAX_PARSE_DEPTH);
        // 叶子条件在上限以下，被丢弃
        assert_eq!(tree.condition_count(), 0);

        let shallow = parse_value(&Value::Object(deep_flat_payload(10)));
        assert_eq!(shallow.depth(), 10);
        assert_eq!(shallow.condition_count(), 1);
    }

    #[test]
    fn test_deep_encoded_form_is_cut_at_depth_limit() {
        let json = serde_json::to_string(&Value::Object(deep_flat_payload(500))).unwrap();
        let encoded = json.replace('{', "^[").replace('}', "^]").replace('"', "`");

        let tree = decode_widget_conditions(&encoded).unwrap();
        assert_eq!(tree.depth(), MAX_PARSE_DEPTH);
    }

    #[test]
    fn test_deep_nested_json_is_rejected() {
        let mut json = r#"{"field": "sku", "value": "A"}"#.to_string();
        for _ in 0..200 {
            json = format!(r#"{{"aggregator": "all", "children": [{json}]}}"#);
        }
        assert!(matches!(parse_str(&json), Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn test_nested_children_object_respects_depth_limit() {
        let mut node = json!({"field": "sku", "value": "A"});
        for _ in 0..(MAX_PARSE_DEPTH + 5) {
            node = json!({"aggregator": "any", "conditions": {"1": node}});
        }
        let tree = parse_value(&node);
        assert_eq!(tree.depth(), MAX_PARSE_DEPTH);
        assert_eq!(tree.condition_count(), 0);
    }

    #[test]
    fn test_flat_form_orphans_and_order() {
        let tree = parse_value(&json!({
            "1--3--1": {"attribute": "color", "operator": "()", "value": "12"},
            "1--7--1": {"attribute": "ghost", "value": "x"},
            "1--3": {"type": "combine", "aggregator": "any"},
            "1--1": {"attribute": "sku", "value": "A"},
            "1": {"type": "combine", "aggregator": "all"}
        }));

        assert_eq!(tree.children.len(), 2);
        assert_eq!(condition(&tree.children[0]).field, "sku");
        let nested = combine(&tree.children[1]);
        assert_eq!(nested.aggregator, Aggregator::Any);
        assert_eq!(condition(&nested.children[0]).field, "color");
        assert_eq!(tree.condition_count(), 2);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(parse_str("{not json"), Err(ParseError::InvalidJson(_))));
        assert!(decode_widget_conditions("^[`1`:").is_err());
    }
}
