//! 存储层
//!
//! 定义仓储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试。
//! 参考实现为内存版（memory 模块）；落地到具体数据库时实现同一组 trait 即可。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loyalty_shared::error::Result;

use crate::models::{ActionType, Event, SourceModule, Trigger, TriggerCategory, UserLoyaltyState};

pub mod memory;

pub use memory::{MemoryEventJournal, MemoryTriggerCatalog, MemoryUserStateStore};

// ==================== 统计载荷 ====================

/// 按行为类型 × 来源模块聚合的事件统计
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeStats {
    pub event_type: ActionType,
    pub source_module: SourceModule,
    pub event_count: u64,
    pub total_points: u64,
    pub unique_users: u64,
    pub avg_points: f64,
}

// ==================== 仓储接口 ====================

/// 触发器目录接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TriggerCatalog: Send + Sync {
    async fn insert(&self, trigger: Trigger) -> Result<()>;
    async fn get(&self, trigger_id: &str) -> Result<Option<Trigger>>;

    /// 按行为类型查找当前生效的触发器，按优先级降序返回
    async fn find_active_by_action(
        &self,
        action_type: ActionType,
        now: DateTime<Utc>,
    ) -> Result<Vec<Trigger>>;

    /// 列出当前生效的触发器，可按分类过滤
    async fn list_active(
        &self,
        category: Option<TriggerCategory>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Trigger>>;

    /// 记录一次发放（统计为派生数据，失败不阻断主流程）
    async fn record_activation(
        &self,
        trigger_id: &str,
        user_id: &str,
        points: u32,
        now: DateTime<Utc>,
    ) -> Result<()>;
}

/// 事件流水接口
///
/// 流水仅追加；唯一的事后变更是冲正标记。指纹唯一性由实现保证，
/// 冲正后的事件不再占用指纹。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventJournal: Send + Sync {
    /// 追加事件；指纹已被有效事件占用时返回 DuplicateEvent
    async fn append(&self, event: Event) -> Result<Event>;

    async fn get(&self, event_id: &str) -> Result<Option<Event>>;

    /// 按指纹查找有效事件（冲正后的事件不计）
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Event>>;

    /// 用户是否对该触发器存在有效事件（once 频次判断用）
    async fn has_effective_event(&self, user_id: &str, trigger_id: &str) -> Result<bool>;

    /// 统计窗口起点之后用户对该触发器的有效事件数
    async fn count_effective_since(
        &self,
        user_id: &str,
        trigger_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64>;

    /// 用户最近的有效事件，按创建时间倒序
    async fn recent_user_events(
        &self,
        user_id: &str,
        organization_id: &str,
        limit: usize,
    ) -> Result<Vec<Event>>;

    /// 标记冲正；已冲正的事件返回 AlreadyReversed
    async fn mark_reversed(
        &self,
        event_id: &str,
        reversed_by: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Event>;

    /// 按行为类型 × 来源模块聚合统计，可按组织过滤
    async fn event_stats<'a>(&self, organization_id: Option<&'a str>) -> Result<Vec<EventTypeStats>>;
}

/// 用户状态存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStateStore: Send + Sync {
    async fn get(&self, user_id: &str, organization_id: &str) -> Result<Option<UserLoyaltyState>>;

    /// 读取状态；不存在时返回零积分初始状态（version = 0，不落库）
    async fn get_or_default(
        &self,
        user_id: &str,
        organization_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserLoyaltyState>;

    /// 带版本校验的写入：传入状态的 version 必须与存量一致，
    /// 成功后版本加一返回；不一致返回 StateConflict。
    async fn save(&self, state: UserLoyaltyState) -> Result<UserLoyaltyState>;

    /// 列出组织内所有已落库状态，按首次落库顺序返回
    async fn list_by_organization(&self, organization_id: &str) -> Result<Vec<UserLoyaltyState>>;
}
