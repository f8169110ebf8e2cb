//! 管理服务
//!
//! 触发器的创建与查询、组织维度的运营统计。
//! 创建请求经 validator 声明式校验，跨字段规则（有效期先后关系）单独判断。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use loyalty_shared::error::{LoyaltyError, Result};

use crate::models::{
    ActionType, FrequencyType, Tier, Trigger, TriggerCategory, TriggerConditions,
    TriggerEligibility, TriggerFrequency, TriggerRewards, TriggerStats, TriggerValidity,
};
use crate::store::{EventJournal, EventTypeStats, TriggerCatalog, UserStateStore};

// ==================== 请求与载荷 ====================

fn default_multiplier() -> f64 {
    1.0
}

fn default_max_activations() -> u32 {
    1
}

fn default_priority() -> i32 {
    100
}

/// 创建触发器请求
#[derive(Debug, Clone, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTriggerRequest {
    #[validate(length(min = 1, max = 100, message = "名称长度须在 1 到 100 之间"))]
    pub name: String,
    pub category: TriggerCategory,
    pub action_type: ActionType,

    #[serde(default)]
    pub conditions: TriggerConditions,
    #[serde(default)]
    pub eligibility: TriggerEligibility,

    pub base_points: u32,
    #[serde(default)]
    pub tier_bonuses: HashMap<Tier, u32>,
    #[validate(range(min = 1.0, max = 10.0, message = "倍率须在 1.0 到 10.0 之间"))]
    #[serde(default = "default_multiplier")]
    pub bonus_multiplier: f64,
    pub xp_points: Option<u32>,

    pub frequency_type: FrequencyType,
    #[validate(range(min = 1, message = "窗口内至少允许发放一次"))]
    #[serde(default = "default_max_activations")]
    pub max_activations: u32,

    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[validate(length(min = 1, message = "创建者不能为空"))]
    pub created_by: String,
}

/// 等级人数分布行
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierDistributionRow {
    pub tier: Tier,
    pub user_count: u64,
    pub avg_points: f64,
    pub total_lifetime_value: f64,
}

/// 组织运营统计
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyStats {
    pub event_stats: Vec<EventTypeStats>,
    pub tier_distribution: Vec<TierDistributionRow>,
    pub generated_at: DateTime<Utc>,
}

// ==================== 服务 ====================

/// 管理服务
pub struct AdminService {
    catalog: Arc<dyn TriggerCatalog>,
    journal: Arc<dyn EventJournal>,
    states: Arc<dyn UserStateStore>,
}

impl AdminService {
    pub fn new(
        catalog: Arc<dyn TriggerCatalog>,
        journal: Arc<dyn EventJournal>,
        states: Arc<dyn UserStateStore>,
    ) -> Self {
        Self {
            catalog,
            journal,
            states,
        }
    }

    /// 创建触发器（统计清零，不接受外部传入的统计值）
    #[instrument(skip(self, request), fields(name = %request.name, action_type = %request.action_type))]
    pub async fn create_trigger(&self, request: CreateTriggerRequest) -> Result<Trigger> {
        request
            .validate()
            .map_err(|e| LoyaltyError::Validation(e.to_string()))?;

        if let Some(end) = request.end_date
            && end <= request.start_date
        {
            return Err(LoyaltyError::InvalidArgument {
                field: "end_date".to_string(),
                message: "结束时间必须晚于开始时间".to_string(),
            });
        }

        let now = Utc::now();
        let trigger = Trigger {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            category: request.category,
            action_type: request.action_type,
            conditions: request.conditions,
            eligibility: request.eligibility,
            rewards: TriggerRewards {
                base_points: request.base_points,
                tier_bonuses: request.tier_bonuses,
                bonus_multiplier: request.bonus_multiplier,
                xp_points: request.xp_points,
            },
            frequency: TriggerFrequency {
                kind: request.frequency_type,
                max_activations: request.max_activations,
            },
            validity: TriggerValidity {
                is_active: true,
                start_date: request.start_date,
                end_date: request.end_date,
                priority: request.priority,
            },
            stats: TriggerStats::default(),
            created_by: request.created_by,
            created_at: now,
            updated_at: now,
        };

        self.catalog.insert(trigger.clone()).await?;
        info!(trigger_id = %trigger.id, "触发器创建成功");
        Ok(trigger)
    }

    /// 列出当前生效的触发器，可按分类过滤
    pub async fn list_active_triggers(
        &self,
        category: Option<TriggerCategory>,
    ) -> Result<Vec<Trigger>> {
        self.catalog.list_active(category, Utc::now()).await
    }

    /// 组织运营统计：事件聚合 + 等级人数分布
    #[instrument(skip(self))]
    pub async fn loyalty_stats(&self, organization_id: Option<&str>) -> Result<LoyaltyStats> {
        let event_stats = self.journal.event_stats(organization_id).await?;

        let tier_distribution = match organization_id {
            Some(org) => {
                let members = self.states.list_by_organization(org).await?;
                let mut groups: HashMap<Tier, (u64, u64, f64)> = HashMap::new();
                for member in &members {
                    let entry = groups.entry(member.tier).or_default();
                    entry.0 += 1;
                    entry.1 += member.total_points;
                    entry.2 += member.lifetime_value;
                }
                let mut rows: Vec<TierDistributionRow> = groups
                    .into_iter()
                    .map(|(tier, (count, points, value))| TierDistributionRow {
                        tier,
                        user_count: count,
                        avg_points: points as f64 / count as f64,
                        total_lifetime_value: value,
                    })
                    .collect();
                rows.sort_by_key(|row| row.tier);
                rows
            }
            None => Vec::new(),
        };

        Ok(LoyaltyStats {
            event_stats,
            tier_distribution,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryEventJournal, MemoryTriggerCatalog, MemoryUserStateStore};
    use chrono::Duration;

    fn service() -> AdminService {
        AdminService::new(
            Arc::new(MemoryTriggerCatalog::new()),
            Arc::new(MemoryEventJournal::new()),
            Arc::new(MemoryUserStateStore::new()),
        )
    }

    fn request(name: &str) -> CreateTriggerRequest {
        CreateTriggerRequest {
            name: name.to_string(),
            category: TriggerCategory::Revenue,
            action_type: ActionType::PayOnTime,
            conditions: TriggerConditions::default(),
            eligibility: TriggerEligibility::default(),
            base_points: 100,
            tier_bonuses: HashMap::new(),
            bonus_multiplier: 1.5,
            xp_points: None,
            frequency_type: FrequencyType::Monthly,
            max_activations: 1,
            start_date: Utc::now() - Duration::days(1),
            end_date: None,
            priority: 100,
            created_by: "admin".to_string(),
        }
    }

    /// 创建成功：统计清零、立即生效
    #[tokio::test]
    async fn test_create_trigger() {
        let service = service();
        let trigger = service.create_trigger(request("按时付款")).await.unwrap();
        assert_eq!(trigger.stats.total_activations, 0);
        assert!(trigger.validity.is_active);

        let listed = service.list_active_triggers(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, trigger.id);

        let filtered = service
            .list_active_triggers(Some(TriggerCategory::Growth))
            .await
            .unwrap();
        assert!(filtered.is_empty());
    }

    /// 倍率越界被拒绝
    #[tokio::test]
    async fn test_multiplier_out_of_range() {
        let service = service();
        let mut req = request("倍率过小");
        req.bonus_multiplier = 0.5;
        let err = service.create_trigger(req).await.unwrap_err();
        assert!(matches!(err, LoyaltyError::Validation(_)));

        let mut req = request("倍率过大");
        req.bonus_multiplier = 11.0;
        assert!(service.create_trigger(req).await.is_err());
    }

    /// 名称为空被拒绝
    #[tokio::test]
    async fn test_empty_name_rejected() {
        let service = service();
        let err = service.create_trigger(request("")).await.unwrap_err();
        assert!(matches!(err, LoyaltyError::Validation(_)));
    }

    /// 结束时间早于开始时间被拒绝
    #[tokio::test]
    async fn test_invalid_validity_window() {
        let service = service();
        let mut req = request("时间窗错误");
        req.end_date = Some(req.start_date - Duration::hours(1));
        let err = service.create_trigger(req).await.unwrap_err();
        assert!(matches!(err, LoyaltyError::InvalidArgument { .. }));
    }

    /// 等级分布按组织聚合
    #[tokio::test]
    async fn test_tier_distribution() {
        let catalog = Arc::new(MemoryTriggerCatalog::new());
        let journal = Arc::new(MemoryEventJournal::new());
        let states = Arc::new(MemoryUserStateStore::new());
        let service = AdminService::new(catalog, journal, states.clone());

        let now = Utc::now();
        for (user, points, tier) in [
            ("u1", 100u64, Tier::Bronze),
            ("u2", 300, Tier::Bronze),
            ("u3", 2_000, Tier::Silver),
        ] {
            let mut state = crate::models::UserLoyaltyState::new(user, "org1", now);
            state.total_points = points;
            state.tier = tier;
            states.save(state).await.unwrap();
        }

        let stats = service.loyalty_stats(Some("org1")).await.unwrap();
        assert_eq!(stats.tier_distribution.len(), 2);
        let bronze = &stats.tier_distribution[0];
        assert_eq!(bronze.tier, Tier::Bronze);
        assert_eq!(bronze.user_count, 2);
        assert_eq!(bronze.avg_points, 200.0);
        let silver = &stats.tier_distribution[1];
        assert_eq!(silver.tier, Tier::Silver);
        assert_eq!(silver.user_count, 1);

        // 不限定组织时只返回事件聚合
        let global = service.loyalty_stats(None).await.unwrap();
        assert!(global.tier_distribution.is_empty());
    }
}
