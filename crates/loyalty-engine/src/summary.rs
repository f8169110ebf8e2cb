//! 用户摘要查询
//!
//! 只读服务：聚合用户状态、最近流水与组织内排名。
//! 从未发放过奖励的用户返回零积分摘要，且不参与排名。

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use loyalty_shared::error::Result;

use crate::models::{Event, SpecialBenefits, Tier, TierProgress, UserLoyaltyState};
use crate::store::{EventJournal, UserStateStore};
use crate::tier::TierManager;

// ==================== 载荷 ====================

/// 组织内排名
///
/// position 从 1 起；未落库（零积分）用户 position 为 0、percentile 为 0。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub position: u64,
    pub total_users: u64,
    /// 超过百分位：round((total - position) / total × 100)
    pub percentile: u8,
}

/// 用户忠诚度摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltySummary {
    pub user_id: String,
    pub organization_id: String,
    pub current_tier: Tier,
    pub total_points: u64,
    pub total_xp: u64,
    pub lifetime_value: f64,
    pub tier_progress: TierProgress,
    pub tier_benefits: SpecialBenefits,
    pub recent_events: Vec<Event>,
    pub ranking: Ranking,
}

// ==================== 服务 ====================

/// 摘要查询服务
pub struct SummaryService {
    journal: Arc<dyn EventJournal>,
    states: Arc<dyn UserStateStore>,
    tier_manager: TierManager,
    /// 最近事件条数上限
    recent_events_limit: usize,
}

impl SummaryService {
    pub fn new(
        journal: Arc<dyn EventJournal>,
        states: Arc<dyn UserStateStore>,
        tier_manager: TierManager,
        recent_events_limit: usize,
    ) -> Self {
        Self {
            journal,
            states,
            tier_manager,
            recent_events_limit,
        }
    }

    /// 查询用户摘要
    #[instrument(skip(self), fields(user_id = %user_id, organization_id = %organization_id))]
    pub async fn user_summary(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<LoyaltySummary> {
        let now = Utc::now();
        let state = self
            .states
            .get_or_default(user_id, organization_id, now)
            .await?;

        let recent_events = self
            .journal
            .recent_user_events(user_id, organization_id, self.recent_events_limit)
            .await?;

        let ranking = self.ranking_of(&state, organization_id).await?;

        // 惰性默认状态的进度尚未推导过，这里按门槛表补全
        let next = self.tier_manager.schedule().next_threshold(state.total_points);
        let tier_progress = TierProgress {
            current_tier_since: state.tier_progress.current_tier_since,
            next_tier_threshold: next,
            points_to_next_tier: next.saturating_sub(state.total_points),
        };

        Ok(LoyaltySummary {
            user_id: state.user_id.clone(),
            organization_id: state.organization_id.clone(),
            current_tier: state.tier,
            total_points: state.total_points,
            total_xp: state.total_xp,
            lifetime_value: state.lifetime_value,
            tier_progress,
            tier_benefits: self.tier_manager.benefits_for(state.tier),
            recent_events,
            ranking,
        })
    }

    /// 组织内按积分降序排名；并列时先落库者在前（稳定排序）
    async fn ranking_of(
        &self,
        state: &UserLoyaltyState,
        organization_id: &str,
    ) -> Result<Ranking> {
        let mut members = self.states.list_by_organization(organization_id).await?;
        members.sort_by(|a, b| b.total_points.cmp(&a.total_points));

        let total_users = members.len() as u64;
        let position = members
            .iter()
            .position(|m| m.user_id == state.user_id)
            .map(|idx| idx as u64 + 1)
            .unwrap_or(0);

        let percentile = if position == 0 || total_users == 0 {
            0
        } else {
            (((total_users - position) as f64 / total_users as f64) * 100.0).round() as u8
        };

        Ok(Ranking {
            position,
            total_users,
            percentile,
        })
    }
}
