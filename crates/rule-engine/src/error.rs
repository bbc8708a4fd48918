//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则分词失败: {0}")]
    Tokenize(String),

    #[error("规则解析失败: {0}")]
    Parse(String),

    #[error("无效的比较操作符: {0}")]
    InvalidOperator(String),

    #[error("没有提供任何规则")]
    EmptyInput,

    #[error("只有一条规则，无法合并")]
    SingleRule,

    #[error("无法将 '{value}' 转换为数值")]
    EvaluationConversion { value: String },

    #[error("AST 结构无效: {0}")]
    MalformedAst(String),

    #[error("输入数据无效: 字段 '{field}' {reason}")]
    InvalidRecord { field: String, reason: String },

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("请求无效: {0}")]
    InvalidRequest(String),
}

impl RuleError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Tokenize(_) => "TOKENIZE_ERROR",
            Self::Parse(_) => "PARSE_ERROR",
            Self::InvalidOperator(_) => "INVALID_OPERATOR",
            Self::EmptyInput => "EMPTY_INPUT",
            Self::SingleRule => "SINGLE_RULE",
            Self::EvaluationConversion { .. } => "EVALUATION_CONVERSION_ERROR",
            Self::MalformedAst(_) => "MALFORMED_AST",
            Self::InvalidRecord { .. } => "INVALID_RECORD",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
