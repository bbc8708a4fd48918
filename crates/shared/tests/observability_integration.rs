//! 可观测性模块集成测试
//!
//! 测试 metrics、middleware 和配置的核心功能。

// ============================================================================
// 指标记录测试
// ============================================================================

mod metrics_tests {
    use rule_shared::observability::metrics::{
        record_http_request, record_rule_combine, record_rule_evaluation, record_rule_parse,
        set_rules_stored,
    };

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/v1/fetch", 200, 0.05);
        record_http_request("POST", "/api/v1/create", 200, 0.12);
        record_http_request("PUT", "/api/v1/update/abc", 404, 0.08);
        record_http_request("POST", "/api/v1/evaluate", 400, 0.01);
    }

    #[test]
    fn test_record_rule_metrics() {
        record_rule_parse("ok");
        record_rule_parse("INVALID_OPERATOR");
        record_rule_evaluation("matched", 0.001);
        record_rule_evaluation("EVALUATION_CONVERSION_ERROR", 0.0005);
        record_rule_combine("OR", "ok");
        record_rule_combine("AND", "SINGLE_RULE");
        set_rules_stored(0);
        set_rules_stored(42);
    }

    #[test]
    fn test_metrics_with_edge_cases() {
        // 空字符串
        record_http_request("", "", 0, 0.0);

        // 超长路径
        let long_path = "/api/v1/rule/".to_string() + &"x".repeat(1000);
        record_http_request("GET", &long_path, 200, 0.01);

        // 极端持续时间
        record_rule_evaluation("matched", 999.99);
    }
}

// ============================================================================
// HTTP 中间件测试
// ============================================================================

mod middleware_tests {
    use axum::{Extension, Router, body::Body, http::Request, middleware, routing::get};
    use rule_shared::observability::middleware::{
        REQUEST_ID_HEADER, RequestId, http_tracing, request_id,
    };
    use tower::ServiceExt;

    fn create_test_app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|Extension(id): Extension<RequestId>| async move { id.0 }),
            )
            .layer(middleware::from_fn(http_tracing))
            .layer(middleware::from_fn(request_id))
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header(REQUEST_ID_HEADER, "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-123");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"req-123");
    }

    #[tokio::test]
    async fn test_request_id_is_generated() {
        let response = create_test_app()
            .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(uuid::Uuid::parse_str(header).is_ok());
    }

    #[test]
    fn test_request_id_clone() {
        let id1 = RequestId("original".to_string());
        let id2 = id1.clone();
        assert_eq!(id1.as_str(), id2.as_str());
    }
}

// ============================================================================
// 配置测试
// ============================================================================

mod config_tests {
    use rule_shared::config::AppConfig;
    use rule_shared::observability::ObservabilityConfig;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "unknown-service");
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs());
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_observability_from_app_config() {
        let app = AppConfig::default();
        let config = app
            .observability
            .clone()
            .with_service_name(&app.service_name);

        assert_eq!(config.service_name, "rule-engine");
    }

    #[test]
    fn test_production_flag() {
        let config = AppConfig {
            environment: "production".to_string(),
            ..Default::default()
        };
        assert!(config.is_production());
        assert!(!AppConfig::default().is_production());
    }
}

// ============================================================================
// Guard 测试
// ============================================================================

mod guard_tests {
    use rule_shared::observability::{self, ObservabilityConfig, ObservabilityGuard};

    #[test]
    fn test_init_without_metrics() {
        // 全局订阅者只能安装一次，整个测试二进制中只在这里初始化
        let config = ObservabilityConfig {
            metrics_enabled: false,
            ..Default::default()
        }
        .with_service_name("rule-engine-test");

        let guard = tokio_test::block_on(observability::init(&config)).unwrap();
        drop(guard);
    }

    #[test]
    fn test_empty_guard() {
        // 创建和销毁空 guard 不应 panic
        for _ in 0..3 {
            let guard = ObservabilityGuard::empty();
            drop(guard);
        }
    }
}
