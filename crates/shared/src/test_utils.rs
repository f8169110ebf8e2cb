//! 测试工具模块
//!
//! 提供测试所需的辅助函数和测试数据生成器，
//! 用于简化测试代码编写，提高测试的可重复性和可维护性。

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

// ==================== 测试标识生成 ====================

/// 生成唯一的测试用户 ID
pub fn test_user_id() -> String {
    format!("test-user-{}", Uuid::new_v4())
}

/// 生成唯一的测试组织 ID
pub fn test_organization_id() -> String {
    format!("test-org-{}", Uuid::new_v4())
}

/// 生成唯一的测试触发器 ID
pub fn test_trigger_id() -> String {
    format!("test-trigger-{}", Uuid::new_v4())
}

// ==================== 测试时间辅助 ====================

/// 构造固定的 UTC 时间点，便于窗口边界类测试
///
/// # Panics
///
/// 参数非法时 panic（仅用于测试代码）。
pub fn fixed_utc(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .expect("测试时间参数非法")
}

// ==================== 测试日志 ====================

/// 初始化测试日志（幂等，可在多个测试中重复调用）
pub fn init_test_tracing() {
    let config = ObservabilityConfig {
        log_level: "debug".to_string(),
        log_format: "pretty".to_string(),
    };
    // 进程内已有订阅器时忽略错误
    let _ = crate::observability::init(&config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(test_user_id(), test_user_id());
        assert_ne!(test_trigger_id(), test_trigger_id());
    }

    #[test]
    fn test_fixed_utc() {
        let t = fixed_utc(2024, 3, 15, 23, 59, 0);
        assert_eq!(t.to_rfc3339(), "2024-03-15T23:59:00+00:00");
    }
}
