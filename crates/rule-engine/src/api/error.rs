//! HTTP 层错误类型
//!
//! 把规则引擎错误映射为状态码和统一的响应体。

use crate::error::RuleError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("参数验证失败: {0}")]
    Validation(String),
}

impl ApiError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Rule(RuleError::RuleNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Rule(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Rule(e) => e.code(),
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::warn!(code = self.error_code(), error = %self, "请求处理失败");

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": self.to_string(),
            "data": serde_json::Value::Null
        });

        (status, Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
