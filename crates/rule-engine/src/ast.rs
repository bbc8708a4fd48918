//! 规则抽象语法树
//!
//! 节点是封闭的三种变体，持久化时统一转换为
//! `{type, operator, value, attribute, left, right}` 的嵌套映射。

use crate::error::{Result, RuleError};
use crate::models::Scalar;
use crate::operators::{CompareOp, LogicalOp, NodeOperator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// AST 节点
///
/// 不变式：`Comparison` 的左子节点是保存字段名的 `Operand`，
/// 右子节点是保存字面量的 `Operand`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "NodeMapping", try_from = "NodeMapping")]
pub enum Node {
    Operand(Scalar),
    Comparison {
        operator: CompareOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Logical {
        operator: LogicalOp,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub fn operand(value: impl Into<Scalar>) -> Self {
        Self::Operand(value.into())
    }

    /// 构建比较节点：`field operator literal`
    pub fn comparison(
        operator: CompareOp,
        field: impl Into<String>,
        literal: impl Into<Scalar>,
    ) -> Self {
        Self::Comparison {
            operator,
            left: Box::new(Self::Operand(Scalar::Str(field.into()))),
            right: Box::new(Self::Operand(literal.into())),
        }
    }

    pub fn logical(operator: LogicalOp, left: Node, right: Node) -> Self {
        Self::Logical {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Node, right: Node) -> Self {
        Self::logical(LogicalOp::And, left, right)
    }

    pub fn or(left: Node, right: Node) -> Self {
        Self::logical(LogicalOp::Or, left, right)
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Operand(_) => NodeType::Operand,
            Self::Comparison { .. } => NodeType::Comparison,
            Self::Logical { .. } => NodeType::Operator,
        }
    }

    /// 比较节点的 (操作符, 字段名, 字面量)，其他节点返回 None
    pub fn as_comparison(&self) -> Option<(CompareOp, &Scalar, &Scalar)> {
        match self {
            Self::Comparison {
                operator,
                left,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (Self::Operand(field), Self::Operand(literal)) => Some((*operator, field, literal)),
                _ => None,
            },
            _ => None,
        }
    }

    /// 规则中引用的所有字段名
    pub fn field_names(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, fields: &mut BTreeSet<String>) {
        match self {
            Self::Operand(_) => {}
            Self::Comparison { .. } => {
                if let Some((_, field, _)) = self.as_comparison() {
                    fields.insert(field.to_string());
                }
            }
            Self::Logical { left, right, .. } => {
                left.collect_fields(fields);
                right.collect_fields(fields);
            }
        }
    }

    /// 树的深度，叶子节点为 1
    pub fn depth(&self) -> usize {
        match self {
            Self::Operand(_) => 1,
            Self::Comparison { left, right, .. } | Self::Logical { left, right, .. } => {
                1 + left.depth().max(right.depth())
            }
        }
    }

    /// 转换为持久化映射
    pub fn to_mapping(&self) -> NodeMapping {
        match self {
            Self::Operand(value) => NodeMapping {
                node_type: NodeType::Operand,
                operator: None,
                value: Some(value.clone()),
                attribute: None,
                left: None,
                right: None,
            },
            Self::Comparison {
                operator,
                left,
                right,
            } => NodeMapping::binary(
                NodeType::Comparison,
                NodeOperator::Compare(*operator),
                left.to_mapping(),
                right.to_mapping(),
            ),
            Self::Logical {
                operator,
                left,
                right,
            } => NodeMapping::binary(
                NodeType::Operator,
                NodeOperator::Logical(*operator),
                left.to_mapping(),
                right.to_mapping(),
            ),
        }
    }

    /// 从持久化映射还原，校验结构
    pub fn from_mapping(mapping: &NodeMapping) -> Result<Self> {
        Self::from_mapping_at(mapping, "root")
    }

    fn from_mapping_at(mapping: &NodeMapping, path: &str) -> Result<Self> {
        match mapping.node_type {
            NodeType::Operand => {
                if mapping.operator.is_some() || mapping.left.is_some() || mapping.right.is_some() {
                    return Err(RuleError::MalformedAst(format!(
                        "'{}' 操作数节点不能包含操作符或子节点",
                        path
                    )));
                }
                let value = mapping.value.clone().ok_or_else(|| {
                    RuleError::MalformedAst(format!("'{}' 操作数节点缺少 value", path))
                })?;
                Ok(Self::Operand(value))
            }
            NodeType::Comparison => {
                let operator = match mapping.operator {
                    Some(NodeOperator::Compare(op)) => op,
                    other => {
                        return Err(RuleError::MalformedAst(format!(
                            "'{}' 比较节点的操作符无效: {:?}",
                            path, other
                        )));
                    }
                };
                let (left, right) = Self::children_of(mapping, path)?;
                if !matches!(left, Self::Operand(Scalar::Str(_))) {
                    return Err(RuleError::MalformedAst(format!(
                        "'{}.left' 必须是保存字段名的操作数节点",
                        path
                    )));
                }
                match &right {
                    Self::Operand(Scalar::Str(literal)) if literal_quote(literal).is_none() => {
                        return Err(RuleError::MalformedAst(format!(
                            "'{}.right' 的字符串字面量无法写成规则文本: {:?}",
                            path, literal
                        )));
                    }
                    Self::Operand(_) => {}
                    _ => {
                        return Err(RuleError::MalformedAst(format!(
                            "'{}.right' 必须是保存字面量的操作数节点",
                            path
                        )));
                    }
                }
                Ok(Self::Comparison {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            NodeType::Operator => {
                let operator = match mapping.operator {
                    Some(NodeOperator::Logical(op)) => op,
                    other => {
                        return Err(RuleError::MalformedAst(format!(
                            "'{}' 逻辑节点的操作符无效: {:?}",
                            path, other
                        )));
                    }
                };
                let (left, right) = Self::children_of(mapping, path)?;
                Ok(Self::logical(operator, left, right))
            }
        }
    }

    fn children_of(mapping: &NodeMapping, path: &str) -> Result<(Self, Self)> {
        let (Some(left), Some(right)) = (&mapping.left, &mapping.right) else {
            return Err(RuleError::MalformedAst(format!(
                "'{}' 二元节点必须同时包含 left 和 right",
                path
            )));
        };
        Ok((
            Self::from_mapping_at(left, &format!("{}.left", path))?,
            Self::from_mapping_at(right, &format!("{}.right", path))?,
        ))
    }
}

/// 字符串字面量在规则文本中使用的引号
///
/// 规则文本没有转义：引号内不能同时出现两种引号，
/// 首尾的引号字符在解析时会被剥掉。这些字面量没有文本形式，返回 None。
fn literal_quote(literal: &str) -> Option<char> {
    if literal.starts_with(['\'', '"']) || literal.ends_with(['\'', '"']) {
        return None;
    }
    match (literal.contains('\''), literal.contains('"')) {
        (true, true) => None,
        (true, false) => Some('"'),
        (false, _) => Some('\''),
    }
}

/// 渲染回规则文本，逻辑节点总是加括号
///
/// 解析器产生的树都能原样解析回来；手工构造的、没有文本形式的字符串字面量
/// 仍以单引号输出，仅用于日志和追踪。
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operand(value) => write!(f, "{}", value),
            Self::Comparison { .. } => match self.as_comparison() {
                Some((operator, field, Scalar::Str(literal))) => {
                    let quote = literal_quote(literal).unwrap_or('\'');
                    write!(f, "{} {} {}{}{}", field, operator, quote, literal, quote)
                }
                Some((operator, field, literal)) => write!(f, "{} {} {}", field, operator, literal),
                None => f.write_str("<invalid comparison>"),
            },
            Self::Logical {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
        }
    }
}

/// 持久化形式中的节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    /// 逻辑节点（AND / OR）
    Operator,
    Comparison,
    Operand,
}

/// 持久化映射
///
/// `attribute` 为保留字段，始终为 null。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMapping {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub operator: Option<NodeOperator>,
    pub value: Option<Scalar>,
    pub attribute: Option<String>,
    pub left: Option<Box<NodeMapping>>,
    pub right: Option<Box<NodeMapping>>,
}

impl NodeMapping {
    fn binary(
        node_type: NodeType,
        operator: NodeOperator,
        left: NodeMapping,
        right: NodeMapping,
    ) -> Self {
        Self {
            node_type,
            operator: Some(operator),
            value: None,
            attribute: None,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }
}

impl From<Node> for NodeMapping {
    fn from(node: Node) -> Self {
        node.to_mapping()
    }
}

impl TryFrom<NodeMapping> for Node {
    type Error = RuleError;

    fn try_from(mapping: NodeMapping) -> Result<Self> {
        Node::from_mapping(&mapping)
    }
}
