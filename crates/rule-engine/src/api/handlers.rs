//! 规则 API 处理器
//!
//! 处理器只负责请求校验和 DTO 转换，业务逻辑都在 RuleService 中。

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde_json::{Value, json};
use tracing::info;
use validator::Validate;

use super::AppState;
use super::dto::{
    ApiResponse, CombineRulesRequest, CombinedRuleDto, EvaluateRuleRequest, PaginationParams,
    RuleAstDto, RuleDto, RulePageDto, RuleRequest,
};
use super::error::ApiResult;
use crate::models::Record;
use crate::service::{CombineRules, RuleEvaluation};

/// 创建规则
///
/// POST /api/v1/create
pub async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<RuleRequest>,
) -> ApiResult<Json<ApiResponse<RuleAstDto>>> {
    req.validate()?;

    let rule = state
        .service
        .create_rule(&req.name, req.description, &req.rule_string)?;

    info!(rule_id = %rule.id, "Rule created");
    Ok(Json(ApiResponse::success_with_message(
        rule.into(),
        "规则创建成功",
    )))
}

/// 更新规则
///
/// PUT /api/v1/update/{id}
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RuleRequest>,
) -> ApiResult<Json<ApiResponse<RuleAstDto>>> {
    req.validate()?;

    let rule = state
        .service
        .update_rule(&id, &req.name, req.description, &req.rule_string)?;

    Ok(Json(ApiResponse::success(rule.into())))
}

/// 合并规则
///
/// POST /api/v1/combine
pub async fn combine_rules(
    State(state): State<AppState>,
    Json(req): Json<CombineRulesRequest>,
) -> ApiResult<Json<ApiResponse<CombinedRuleDto>>> {
    req.validate()?;

    let rule = state.service.combine_rules(CombineRules {
        rule_ids: req.rule_ids,
        name: req.name,
        description: req.description,
        operator: req.operator,
    })?;

    Ok(Json(ApiResponse::success(rule.into())))
}

/// 评估规则
///
/// POST /api/v1/evaluate
pub async fn evaluate_rule(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRuleRequest>,
) -> ApiResult<Json<ApiResponse<RuleEvaluation>>> {
    req.validate()?;

    let record = Record::from_json(&req.data)?;
    let evaluation = state.service.evaluate_rule(&req.rule_id, &record)?;

    Ok(Json(ApiResponse::success(evaluation)))
}

/// 获取规则详情
///
/// GET /api/v1/rule/{id}
pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<RuleDto>>> {
    let rule = state.service.get_rule(&id)?;
    Ok(Json(ApiResponse::success(rule.into())))
}

/// 分页查询规则
///
/// GET /api/v1/fetch?page=1&limit=10
pub async fn list_rules(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<ApiResponse<RulePageDto>>> {
    let page = state.service.list_rules(params.page, params.limit())?;
    Ok(Json(ApiResponse::success(page.into())))
}

/// 健康检查
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "rule-engine"
    }))
}
