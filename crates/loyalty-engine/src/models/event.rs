//! 忠诚度事件模型
//!
//! 事件是仅追加的流水记录：一次触发器命中产生一条事件，事后修正通过
//! 冲正标记 + 状态补偿完成，绝不原地改写奖励数值。
//! ID 使用 UUID v7，天然按时间有序，便于流水排序与问题排查。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::trigger::ActionType;
use super::user_state::Tier;

// ==================== 枚举 ====================

/// 事件来源业务模块
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceModule {
    Subscription,
    Payment,
    Referral,
    Manual,
    Campaign,
}

impl SourceModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Payment => "payment",
            Self::Referral => "referral",
            Self::Manual => "manual",
            Self::Campaign => "campaign",
        }
    }
}

/// 处理入口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingOrigin {
    Webhook,
    Cron,
    Api,
    Manual,
}

/// 事件校验方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMethod {
    Automatic,
    Manual,
    Webhook,
}

// ==================== 子结构 ====================

/// 事件业务载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub source_module: SourceModule,
    /// 来源业务对象 ID（订单号、订阅 ID 等），参与去重指纹
    pub source_id: Option<String>,
    pub description: String,
    /// 事件携带金额，参与动态加分与最低金额条件
    pub dynamic_value: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// 奖励计算明细，留痕用于审计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardBreakdown {
    pub base_points: u32,
    pub tier_bonus: u32,
    pub multiplier: f64,
    pub dynamic_bonus: u32,
}

/// 本次事件实际发放的奖励
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRewards {
    pub points_awarded: u32,
    pub xp_awarded: u32,
    /// 计算时采用的用户等级
    pub tier_at_award: Tier,
    pub bonus_multiplier: f64,
    pub breakdown: RewardBreakdown,
}

/// 发放前后的用户快照（信息性留痕，状态真相在 UserLoyaltyState）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub tier_before: Tier,
    pub total_points_before: u64,
    pub total_points_after: u64,
    pub subscription_tier: Option<String>,
}

/// 冲正信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalInfo {
    pub is_reversed: bool,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversed_by: Option<String>,
    pub reason: Option<String>,
}

/// 校验与冲正状态
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventValidation {
    pub is_valid: bool,
    pub validated_at: DateTime<Utc>,
    pub method: ValidationMethod,
    #[serde(default)]
    pub reversal: ReversalInfo,
}

/// 去重信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deduplication {
    /// SHA-256 十六进制指纹，见 [`Event::fingerprint`]
    pub fingerprint: String,
    /// 业务时间（上游事件真实发生时刻，区别于处理时刻）
    pub original_event_date: DateTime<Utc>,
}

/// 处理上下文
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingInfo {
    pub processed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub origin: ProcessingOrigin,
    pub request_id: Option<String>,
}

// ==================== 事件 ====================

/// 忠诚度事件（流水记录，创建后不可变）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub organization_id: String,
    pub trigger_id: String,
    pub event_type: ActionType,

    pub event_data: EventData,
    pub rewards: EventRewards,
    pub user_snapshot: UserSnapshot,
    pub validation: EventValidation,
    pub deduplication: Deduplication,
    pub processing: ProcessingInfo,

    pub created_at: DateTime<Utc>,
}

impl Event {
    /// 生成时间有序的事件 ID
    pub fn new_id() -> String {
        Uuid::now_v7().to_string()
    }

    /// 计算去重指纹
    ///
    /// 对 (user_id, trigger_id, event_type, source_id, original_event_date)
    /// 五元组做 SHA-256。source_id 缺省时以空串参与，业务时间取 RFC3339。
    pub fn fingerprint(
        user_id: &str,
        trigger_id: &str,
        event_type: ActionType,
        source_id: Option<&str>,
        original_event_date: DateTime<Utc>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(b"|");
        hasher.update(trigger_id.as_bytes());
        hasher.update(b"|");
        hasher.update(event_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(source_id.unwrap_or("").as_bytes());
        hasher.update(b"|");
        hasher.update(original_event_date.to_rfc3339().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// 是否计入频次与积分（有效且未冲正）
    pub fn is_effective(&self) -> bool {
        self.validation.is_valid && !self.validation.reversal.is_reversed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 相同五元组产生相同指纹
    #[test]
    fn test_fingerprint_deterministic() {
        let t = Utc::now();
        let a = Event::fingerprint("u1", "trig-1", ActionType::PayOnTime, Some("inv-1"), t);
        let b = Event::fingerprint("u1", "trig-1", ActionType::PayOnTime, Some("inv-1"), t);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    /// 任一字段变化都改变指纹
    #[test]
    fn test_fingerprint_sensitivity() {
        let t = Utc::now();
        let base = Event::fingerprint("u1", "trig-1", ActionType::PayOnTime, Some("inv-1"), t);
        assert_ne!(
            base,
            Event::fingerprint("u2", "trig-1", ActionType::PayOnTime, Some("inv-1"), t)
        );
        assert_ne!(
            base,
            Event::fingerprint("u1", "trig-2", ActionType::PayOnTime, Some("inv-1"), t)
        );
        assert_ne!(
            base,
            Event::fingerprint("u1", "trig-1", ActionType::PayOnTime, None, t)
        );
        assert_ne!(
            base,
            Event::fingerprint(
                "u1",
                "trig-1",
                ActionType::PayOnTime,
                Some("inv-1"),
                t + chrono::Duration::seconds(1)
            )
        );
    }

    /// 事件 ID 全局唯一
    #[test]
    fn test_event_ids_unique() {
        assert_ne!(Event::new_id(), Event::new_id());
    }
}
