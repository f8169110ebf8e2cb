//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// 等级门槛配置
///
/// bronze 恒为 0，不可配置；其余三档必须严格递增。
#[derive(Debug, Clone, Deserialize)]
pub struct TierThresholdConfig {
    pub silver: u64,
    pub gold: u64,
    pub platinum: u64,
}

impl Default for TierThresholdConfig {
    fn default() -> Self {
        Self {
            silver: 1_000,
            gold: 5_000,
            platinum: 15_000,
        }
    }
}

/// 引擎配置
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// 用户状态写入冲突的最大重试次数
    pub state_retry_count: u32,
    /// 用户摘要中返回的最近事件条数上限
    pub recent_events_limit: usize,
    pub tier_thresholds: TierThresholdConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_retry_count: 3,
            recent_events_limit: 10,
            tier_thresholds: TierThresholdConfig::default(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. 环境变量（LOYALTY_ 前缀，如 LOYALTY_OBSERVABILITY_LOG_LEVEL）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("LOYALTY_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            // 默认配置
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            // 加载默认配置文件
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            // 加载环境特定配置
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            // 环境变量覆盖
            .add_source(
                Environment::with_prefix("LOYALTY")
                    .separator("_")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
