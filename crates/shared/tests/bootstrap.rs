//! 基础设施集成测试：配置加载与日志初始化

use loyalty_shared::config::AppConfig;
use loyalty_shared::observability;

/// 无配置文件时应回落到默认值并可完成日志初始化
#[test]
fn test_load_defaults_and_init_tracing() {
    let config = AppConfig::load("loyalty-engine").expect("加载默认配置失败");
    assert_eq!(config.service_name, "loyalty-engine");
    assert_eq!(config.engine.tier_thresholds.gold, 5_000);

    observability::init(&config.observability).expect("初始化日志失败");
    tracing::info!(service = %config.service_name, "测试日志初始化完成");

    // 重复初始化应返回错误而不是 panic
    assert!(observability::init(&config.observability).is_err());
}
