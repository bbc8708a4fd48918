//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// 规则引擎行为配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 严格解析：拒绝未闭合的引号和多余的尾部输入
    pub strict_parsing: bool,
    /// 评估接口是否返回逐节点追踪信息
    pub trace_evaluation: bool,
    /// 规则 AST 的最大深度，超过时解析和合并都会失败
    pub max_rule_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_parsing: false,
            trace_evaluation: false,
            max_rule_depth: 100,
        }
    }
}

/// 跨域配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// 允许的来源，"*" 表示全部放行
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub observability: ObservabilityConfig,
    pub engine: EngineConfig,
    pub cors: CorsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "rule-engine".to_string(),
            environment: "development".to_string(),
            server: ServerConfig::default(),
            observability: ObservabilityConfig::default(),
            engine: EngineConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（RULES_ 前缀，层级用双下划线，如 RULES_ENGINE__STRICT_PARSING -> engine.strict_parsing）
    /// 5. 服务特定端口环境变量（如 RULE_ENGINE_PORT）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        // .env 文件可选，不存在时忽略
        let _ = dotenvy::dotenv();

        let env = std::env::var("RULES_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let mut config = Self::load_from(Path::new(&config_dir), &env, service_name)?;

        if let Some(port) = Self::get_service_port_from_env(service_name) {
            config.server.port = port;
        }

        Ok(config)
    }

    /// 从指定目录加载配置（不读取端口覆盖变量）
    pub fn load_from(
        config_dir: &Path,
        environment: &str,
        service_name: &str,
    ) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", environment)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", environment))).required(false),
            )
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix("RULES")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 从环境变量获取服务特定端口
    ///
    /// 将 "rule-engine" 转换为 "RULE_ENGINE_PORT"
    fn get_service_port_from_env(service_name: &str) -> Option<u16> {
        std::env::var(Self::port_env_var(service_name))
            .ok()
            .and_then(|v| v.parse().ok())
    }

    fn port_env_var(service_name: &str) -> String {
        format!("{}_PORT", service_name.to_uppercase().replace('-', "_"))
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
