//! 用户忠诚度状态模型
//!
//! 以 (user_id, organization_id) 为键的累积状态：积分、经验值、等级及其历史。
//! 状态按需惰性创建，首次发放奖励时落库。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==================== 等级 ====================

/// 用户等级
///
/// 变体顺序即等级高低顺序，派生 Ord 用于单调性判断。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== 等级历史与进度 ====================

/// 等级变更历史条目（追加写，不回溯修改）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierHistoryEntry {
    pub tier: Tier,
    pub achieved_at: DateTime<Utc>,
    /// 变更发生时的总积分
    pub points_at_time: u64,
}

/// 等级进度
///
/// 已达最高等级时 next_tier_threshold 报告铂金门槛本身、
/// points_to_next_tier 为 0，与既有消费方约定保持兼容。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierProgress {
    pub current_tier_since: DateTime<Utc>,
    pub next_tier_threshold: u64,
    pub points_to_next_tier: u64,
}

/// 等级附带权益，由等级唯一确定
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialBenefits {
    /// 折扣率（百分比整数，如 10 表示 10%）
    pub discount_rate: u8,
    pub has_priority_support: bool,
    pub has_early_access: bool,
}

// ==================== 用户状态 ====================

/// 用户忠诚度状态
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLoyaltyState {
    pub user_id: String,
    pub organization_id: String,

    pub tier: Tier,
    pub tier_history: Vec<TierHistoryEntry>,

    /// 总积分，只有冲正会使其减少
    pub total_points: u64,
    pub total_xp: u64,
    /// 有效事件携带的业务金额累计值
    pub lifetime_value: f64,

    pub tier_progress: TierProgress,
    pub special_benefits: SpecialBenefits,

    /// 乐观并发版本号，写入时校验
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserLoyaltyState {
    /// 创建零积分的初始状态（青铜档，version = 0 表示尚未落库）
    pub fn new(user_id: &str, organization_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            organization_id: organization_id.to_string(),
            tier: Tier::Bronze,
            tier_history: Vec::new(),
            total_points: 0,
            total_xp: 0,
            lifetime_value: 0.0,
            tier_progress: TierProgress {
                current_tier_since: now,
                next_tier_threshold: 0,
                points_to_next_tier: 0,
            },
            special_benefits: SpecialBenefits::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 等级顺序可用于比较
    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Bronze < Tier::Silver);
        assert!(Tier::Silver < Tier::Gold);
        assert!(Tier::Gold < Tier::Platinum);
    }

    /// 等级序列化为小写字符串
    #[test]
    fn test_tier_serde() {
        assert_eq!(serde_json::to_string(&Tier::Gold).unwrap(), "\"gold\"");
        let t: Tier = serde_json::from_str("\"platinum\"").unwrap();
        assert_eq!(t, Tier::Platinum);
    }

    /// 初始状态为青铜零积分
    #[test]
    fn test_new_state_defaults() {
        let now = Utc::now();
        let state = UserLoyaltyState::new("u1", "org1", now);
        assert_eq!(state.tier, Tier::Bronze);
        assert_eq!(state.total_points, 0);
        assert_eq!(state.version, 0);
        assert!(state.tier_history.is_empty());
        assert_eq!(state.special_benefits, SpecialBenefits::default());
    }
}
