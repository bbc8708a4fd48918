//! 规则操作符定义

use crate::error::RuleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 比较操作符
///
/// 规则文本和持久化形式都使用符号表示（`>`、`>=` 等）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "!=")]
    Neq,
}

impl CompareOp {
    pub const ALL: [CompareOp; 6] = [
        Self::Gt,
        Self::Lt,
        Self::Eq,
        Self::Gte,
        Self::Lte,
        Self::Neq,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "=",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Neq => "!=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for CompareOp {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.symbol() == s)
            .ok_or_else(|| RuleError::InvalidOperator(s.to_string()))
    }
}

/// 逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    /// 调度场算法中的优先级，AND 高于 OR
    pub fn precedence(&self) -> u8 {
        match self {
            Self::And => 2,
            Self::Or => 1,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    /// 识别规则文本中的关键字（区分大小写）
    pub fn from_keyword(token: &str) -> Option<Self> {
        match token {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            _ => None,
        }
    }

    pub fn apply(&self, left: bool, right: bool) -> bool {
        match self {
            Self::And => left && right,
            Self::Or => left || right,
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for LogicalOp {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_keyword(s).ok_or_else(|| RuleError::InvalidOperator(s.to_string()))
    }
}

/// 持久化形式中 `operator` 字段的取值：比较或逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeOperator {
    Compare(CompareOp),
    Logical(LogicalOp),
}

impl fmt::Display for NodeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare(op) => op.fmt(f),
            Self::Logical(op) => op.fmt(f),
        }
    }
}
