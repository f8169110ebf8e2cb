//! 用户档案提供方
//!
//! 引擎对外部用户/订阅系统的唯一出站依赖：按 (user_id, organization_id)
//! 读取角色与订阅快照。真实部署由上游服务适配实现，测试与本地开发
//! 使用内存实现。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use loyalty_shared::error::Result;

// ==================== 数据结构 ====================

/// 订阅状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    /// 试用与生效均视为持有有效订阅
    pub fn is_entitled(&self) -> bool {
        matches!(self, Self::Trialing | Self::Active)
    }
}

/// 订阅快照
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSnapshot {
    pub status: SubscriptionStatus,
    /// 订阅档位名（用于触发器的档位白名单）
    pub plan_tier: Option<String>,
    /// 当前计费周期截止时间（续订宽限、按时付款判断使用）
    pub current_period_end: Option<DateTime<Utc>>,
}

/// 用户档案
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub role: String,
    pub subscription: Option<SubscriptionSnapshot>,
}

impl UserProfile {
    /// 订阅档位名（无订阅时为 None）
    pub fn subscription_tier(&self) -> Option<&str> {
        self.subscription
            .as_ref()
            .and_then(|s| s.plan_tier.as_deref())
    }
}

// ==================== 提供方接口 ====================

/// 用户档案提供方接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserProfileProvider: Send + Sync {
    /// 读取用户档案，不存在时返回 None
    async fn fetch(&self, user_id: &str, organization_id: &str) -> Result<Option<UserProfile>>;
}

/// 内存档案提供方（测试与本地开发）
#[derive(Debug, Default)]
pub struct MemoryProfileProvider {
    profiles: DashMap<String, UserProfile>,
}

impl MemoryProfileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, organization_id: &str, profile: UserProfile) {
        let key = format!("{}:{}", organization_id, profile.user_id);
        self.profiles.insert(key, profile);
    }
}

#[async_trait]
impl UserProfileProvider for MemoryProfileProvider {
    async fn fetch(&self, user_id: &str, organization_id: &str) -> Result<Option<UserProfile>> {
        let key = format!("{}:{}", organization_id, user_id);
        Ok(self.profiles.get(&key).map(|p| p.clone()))
    }
}
