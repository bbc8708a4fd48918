//! 请求与响应 DTO

use crate::ast::NodeMapping;
use crate::operators::LogicalOp;
use crate::service::RulePage;
use crate::store::StoredRule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// 创建/更新规则请求
#[derive(Debug, Deserialize, Validate)]
pub struct RuleRequest {
    #[validate(length(min = 1, max = 100, message = "规则名称长度必须在1-100个字符之间"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 10000, message = "规则内容长度必须在1-10000个字符之间"))]
    pub rule_string: String,
}

/// 合并规则请求
#[derive(Debug, Deserialize, Validate)]
pub struct CombineRulesRequest {
    #[validate(length(min = 1, max = 100, message = "规则 ID 数量必须在1-100之间"))]
    pub rule_ids: Vec<String>,
    #[validate(length(min = 1, max = 100, message = "规则名称长度必须在1-100个字符之间"))]
    pub name: String,
    pub description: Option<String>,
    pub operator: LogicalOp,
}

/// 评估规则请求
#[derive(Debug, Deserialize, Validate)]
pub struct EvaluateRuleRequest {
    #[validate(length(min = 1, message = "规则 ID 不能为空"))]
    pub rule_id: String,
    /// 扁平的 字段 -> 标量 对象
    pub data: Value,
}

/// 分页参数
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    10
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PaginationParams {
    /// 获取限制条数（最大100）
    pub fn limit(&self) -> usize {
        self.limit.min(100)
    }
}

/// 创建/更新规则的响应
#[derive(Debug, Serialize, Deserialize)]
pub struct RuleAstDto {
    pub id: String,
    pub ast: NodeMapping,
}

impl From<StoredRule> for RuleAstDto {
    fn from(rule: StoredRule) -> Self {
        Self {
            id: rule.id,
            ast: rule.ast,
        }
    }
}

/// 合并规则的响应
#[derive(Debug, Serialize, Deserialize)]
pub struct CombinedRuleDto {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub rule_string: String,
    pub ast: NodeMapping,
}

impl From<StoredRule> for CombinedRuleDto {
    fn from(rule: StoredRule) -> Self {
        Self {
            id: rule.id,
            name: rule.name,
            description: rule.description,
            rule_string: rule.rule_string,
            ast: rule.ast,
        }
    }
}

/// 规则详情（不含 AST）
#[derive(Debug, Serialize, Deserialize)]
pub struct RuleDto {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub rule_string: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub parent_rules: Vec<String>,
}

impl From<StoredRule> for RuleDto {
    fn from(rule: StoredRule) -> Self {
        Self {
            id: rule.id,
            name: rule.name,
            description: rule.description,
            rule_string: rule.rule_string,
            created_at: rule.created_at,
            updated_at: rule.updated_at,
            parent_rules: rule.parent_rules,
        }
    }
}

/// 分页响应
#[derive(Debug, Serialize, Deserialize)]
pub struct RulePageDto {
    pub rules: Vec<RuleDto>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

impl From<RulePage> for RulePageDto {
    fn from(page: RulePage) -> Self {
        Self {
            rules: page.rules.into_iter().map(RuleDto::from).collect(),
            total: page.total,
            page: page.page,
            pages: page.pages,
        }
    }
}

/// API 统一响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    /// 创建成功响应（自定义消息）
    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}
