//! HTTP API
//!
//! 所有规则接口挂载在 `/api/v1` 下，响应统一使用
//! `{success, code, message, data}` 结构。

pub mod dto;
pub mod error;
pub mod handlers;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::service::RuleService;

pub use error::{ApiError, ApiResult};

/// Axum 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub service: RuleService,
}

impl AppState {
    pub fn new(service: RuleService) -> Self {
        Self { service }
    }
}

/// 规则相关路由
pub fn rule_routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(handlers::create_rule))
        .route("/update/{id}", put(handlers::update_rule))
        .route("/combine", post(handlers::combine_rules))
        .route("/evaluate", post(handlers::evaluate_rule))
        .route("/rule/{id}", get(handlers::get_rule))
        .route("/fetch", get(handlers::list_rules))
}

/// 构建完整的应用路由（不含中间件）
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", rule_routes())
        .with_state(state)
}

/// 根据配置的来源列表构建 CORS 层，包含 "*" 时放行全部来源
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.iter().any(|o| o == "*") {
        info!("CORS allowed_origins: * (all origins)");
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "忽略无效的 CORS 来源");
                None
            }
        })
        .collect();

    info!("CORS allowed_origins: {}", allowed_origins.join(","));
    layer.allow_origin(origins)
}
