//! 规则引擎服务
//!
//! 提供规则创建、合并、评估的 HTTP 接口。

use anyhow::Result;
use axum::middleware;
use rule_engine::api::{self, AppState};
use rule_engine::{ParseOptions, RuleService, RuleStore};
use rule_shared::config::AppConfig;
use rule_shared::observability;
use rule_shared::observability::middleware as obs_middleware;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 统一加载配置：default.toml -> {env}.toml -> rule-engine.toml -> 环境变量
    let config = AppConfig::load("rule-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        environment = %config.environment,
        strict_parsing = config.engine.strict_parsing,
        max_rule_depth = config.engine.max_rule_depth,
        "Starting rule-engine service..."
    );

    if config.is_production() && config.cors.allowed_origins.iter().any(|o| o == "*") {
        warn!("cors.allowed_origins 包含 \"*\"，生产环境中不安全，请设置为具体域名");
    }

    let service = RuleService::new(Arc::new(RuleStore::new()))
        .with_parse_options(ParseOptions {
            strict: config.engine.strict_parsing,
            max_depth: config.engine.max_rule_depth,
        })
        .with_trace(config.engine.trace_evaluation);

    let app = api::build_router(AppState::new(service))
        .layer(api::cors_layer(&config.cors.allowed_origins))
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 收到 Ctrl+C 或 SIGTERM 后返回；信号处理器注册失败时只记录日志，不触发关闭。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("注册 Ctrl+C 处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("注册 SIGTERM 处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
