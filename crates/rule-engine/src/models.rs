//! 规则引擎领域模型

use crate::error::{Result, RuleError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// 标量值：整数、浮点数或字符串
///
/// 既用于规则中的字面量，也用于评估输入中的字段值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// 尝试转换为 f64，字符串会先去除首尾空白再解析
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// 字面量之间的大小比较
    ///
    /// 数值之间按数值比较，字符串之间按字典序比较；
    /// 数值与字符串混合、或包含 NaN 时不可比较。
    pub fn compare_literal(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            _ => None,
        }
    }

    /// 从 JSON 值转换，null/布尔/数组/对象返回 None
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// 规范字符串表示，用于 `=` / `!=` 比较
///
/// 浮点数使用最短往返形式：整数值保留一位小数（`30.0`，与整数 `30` 不相等），
/// 绝对值不小于 1e16 或小于 1e-4 时使用带符号的两位指数（`1e+16`、`1e-07`）。
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) if x.is_nan() => f.write_str("nan"),
            Self::Float(x)
                if x.is_finite() && *x != 0.0 && (x.abs() >= 1e16 || x.abs() < 1e-4) =>
            {
                write_exponent(f, *x)
            }
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// `1.5e-5` -> `1.5e-05`
fn write_exponent(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    let repr = format!("{:e}", x);
    let Some((mantissa, exponent)) = repr.split_once('e') else {
        return f.write_str(&repr);
    };
    match exponent.parse::<i32>() {
        Ok(exp) => {
            let sign = if exp < 0 { '-' } else { '+' };
            write!(f, "{}e{}{:02}", mantissa, sign, exp.abs())
        }
        Err(_) => f.write_str(&repr),
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// 评估输入：扁平的 字段名 -> 标量 映射
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: HashMap<String, Scalar>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 对象构建
    ///
    /// null 字段视为不存在；布尔、数组和嵌套对象不是合法的标量，直接拒绝。
    pub fn from_json(data: &Value) -> Result<Self> {
        let map = data.as_object().ok_or_else(|| RuleError::InvalidRecord {
            field: "<root>".to_string(),
            reason: format!("需要 JSON 对象，实际为 {}", Scalar::type_name(data)),
        })?;

        let mut fields = HashMap::with_capacity(map.len());
        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            let scalar = Scalar::from_json(value).ok_or_else(|| RuleError::InvalidRecord {
                field: key.clone(),
                reason: format!("不支持的类型 {}", Scalar::type_name(value)),
            })?;
            fields.insert(key.clone(), scalar);
        }

        Ok(Self { fields })
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Scalar>) {
        self.fields.insert(field.into(), value.into());
    }

    /// 链式插入，便于构造测试数据
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Scalar> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// 评估结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationResult {
    pub matched: bool,
    pub matched_conditions: Vec<String>,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_ms: i64,
}
