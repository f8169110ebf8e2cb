//! 触发器模型
//!
//! 触发器描述"什么行为、在什么条件下、奖励多少积分"。
//! 条件判定、频次判定和奖励计算分别由 conditions / frequency / reward 模块承担，
//! 本模块只保留纯数据结构与资格判断。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user_state::Tier;

// ==================== 行为类型 ====================

/// 业务行为类型（封闭枚举，未知行为在反序列化边界即被拒绝）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    RenewSubscription,
    PayOnTime,
    UpgradeSubscription,
    ReferUser,
    SpendOverX,
    WelcomeBonus,
    MilestoneAchieved,
    ParticipateInCampaign,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RenewSubscription => "RENEW_SUBSCRIPTION",
            Self::PayOnTime => "PAY_ON_TIME",
            Self::UpgradeSubscription => "UPGRADE_SUBSCRIPTION",
            Self::ReferUser => "REFER_USER",
            Self::SpendOverX => "SPEND_OVER_X",
            Self::WelcomeBonus => "WELCOME_BONUS",
            Self::MilestoneAchieved => "MILESTONE_ACHIEVED",
            Self::ParticipateInCampaign => "PARTICIPATE_IN_CAMPAIGN",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 触发器业务分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerCategory {
    Engagement,
    Revenue,
    Growth,
    Retention,
}

// ==================== 条件与资格 ====================

/// 触发条件
///
/// custom_conditions 的解释随 action_type 而不同，见 conditions 模块。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConditions {
    #[serde(default)]
    pub requires_active_subscription: bool,
    /// 事件携带金额的最低门槛
    pub minimum_amount: Option<f64>,
    /// 时间窗约束（天），目前用于续订宽限期判断
    pub time_window_days: Option<i64>,
    #[serde(default)]
    pub custom_conditions: serde_json::Map<String, serde_json::Value>,
}

/// 用户资格约束，空列表表示不限制
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEligibility {
    #[serde(default)]
    pub user_roles: Vec<String>,
    #[serde(default)]
    pub subscription_tiers: Vec<String>,
    #[serde(default)]
    pub allowed_users: Vec<String>,
    #[serde(default)]
    pub denied_users: Vec<String>,
}

// ==================== 奖励 ====================

fn default_multiplier() -> f64 {
    1.0
}

/// 奖励定义
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRewards {
    pub base_points: u32,
    /// 等级加成（按当前等级查表，缺省为 0）
    #[serde(default)]
    pub tier_bonuses: HashMap<Tier, u32>,
    /// 倍率，合法区间 [1.0, 10.0]，由创建入口校验
    #[serde(default = "default_multiplier")]
    pub bonus_multiplier: f64,
    /// 显式经验值；缺省时按积分的 10% 向下取整
    pub xp_points: Option<u32>,
}

// ==================== 频次 ====================

/// 频次窗口类型
///
/// Unknown 兜底未来新增的窗口类型：按放行处理并记录警告，
/// 避免旧版本节点因无法识别而拒绝发放。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyType {
    Once,
    Daily,
    Weekly,
    Monthly,
    Unlimited,
    #[serde(other)]
    Unknown,
}

fn default_max_activations() -> u32 {
    1
}

/// 频次约束
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerFrequency {
    #[serde(rename = "type")]
    pub kind: FrequencyType,
    /// 窗口内最大发放次数（对 once/unlimited 无意义）
    #[serde(default = "default_max_activations")]
    pub max_activations: u32,
}

// ==================== 有效期与统计 ====================

fn default_priority() -> i32 {
    100
}

/// 有效期与优先级
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerValidity {
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// 数值越大越先评估
    #[serde(default = "default_priority")]
    pub priority: i32,
}

/// 运行统计（派生数据，单调递增）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStats {
    pub total_activations: u64,
    pub total_points_awarded: u64,
    pub unique_users: u64,
    pub last_activated: Option<DateTime<Utc>>,
}

// ==================== 触发器 ====================

/// 触发器定义
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub id: String,
    pub name: String,
    pub category: TriggerCategory,
    pub action_type: ActionType,

    #[serde(default)]
    pub conditions: TriggerConditions,
    #[serde(default)]
    pub eligibility: TriggerEligibility,
    pub rewards: TriggerRewards,
    pub frequency: TriggerFrequency,
    pub validity: TriggerValidity,
    #[serde(default)]
    pub stats: TriggerStats,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trigger {
    /// 是否在有效期内且已启用
    pub fn is_currently_active(&self, now: DateTime<Utc>) -> bool {
        if !self.validity.is_active {
            return false;
        }
        if now < self.validity.start_date {
            return false;
        }
        if let Some(end) = self.validity.end_date
            && now > end
        {
            return false;
        }
        true
    }

    /// 用户资格判断（角色、订阅档位、黑白名单）
    ///
    /// 只做静态资格过滤，不读取事件数据；不通过属于正常跳过，不是错误。
    pub fn can_activate_for(
        &self,
        user_id: &str,
        role: &str,
        subscription_tier: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.is_currently_active(now) {
            return false;
        }
        let e = &self.eligibility;
        if e.denied_users.iter().any(|u| u == user_id) {
            return false;
        }
        if !e.allowed_users.is_empty() && !e.allowed_users.iter().any(|u| u == user_id) {
            return false;
        }
        if !e.user_roles.is_empty() && !e.user_roles.iter().any(|r| r == role) {
            return false;
        }
        if !e.subscription_tiers.is_empty() {
            match subscription_tier {
                Some(tier) => {
                    if !e.subscription_tiers.iter().any(|t| t == tier) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}
