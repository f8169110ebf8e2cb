//! 事件处理器
//!
//! 处理管线的编排入口：
//! 1. 按行为类型加载生效触发器（优先级降序）
//! 2. 加载用户档案（缺失则整次调用失败）
//! 3. 在用户锁内逐个评估触发器：资格 → 条件 → 频次 → 去重 → 计算 → 落账
//! 4. 单个触发器失败只记录日志，不影响其余触发器
//!
//! 落账顺序约定：先写事件流水，后写用户状态。流水写入失败不得改状态；
//! 状态写入冲突在有限次数内基于已落账的奖励金额重试。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use loyalty_shared::error::{LoyaltyError, Result};

use crate::conditions::{ConditionEvaluator, EvaluationInput};
use crate::frequency::FrequencyLimiter;
use crate::lock::UserLockManager;
use crate::models::{
    ActionType, Deduplication, Event, EventData, EventRewards, EventValidation, ProcessingInfo,
    ProcessingOrigin, Trigger, UserSnapshot, ValidationMethod,
};
use crate::profile::{UserProfile, UserProfileProvider};
use crate::reward::RewardCalculator;
use crate::store::{EventJournal, TriggerCatalog, UserStateStore};
use crate::tier::TierManager;

// ==================== 请求 ====================

/// 处理上下文补充信息
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub origin: ProcessingOrigin,
    pub request_id: Option<String>,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            origin: ProcessingOrigin::Api,
            request_id: None,
        }
    }
}

/// 事件处理请求
#[derive(Debug, Clone)]
pub struct ProcessEventRequest {
    pub user_id: String,
    pub organization_id: String,
    pub event_type: ActionType,
    pub event_data: EventData,
    /// 业务时间，缺省取处理时刻
    pub original_event_date: Option<DateTime<Utc>>,
    pub system_info: Option<SystemInfo>,
}

// ==================== 处理器 ====================

/// 事件处理器
pub struct EventProcessor {
    catalog: Arc<dyn TriggerCatalog>,
    journal: Arc<dyn EventJournal>,
    states: Arc<dyn UserStateStore>,
    profiles: Arc<dyn UserProfileProvider>,
    tier_manager: TierManager,
    reward_calculator: RewardCalculator,
    condition_evaluator: ConditionEvaluator,
    frequency_limiter: FrequencyLimiter,
    locks: UserLockManager,
    /// 状态写入冲突的最大重试次数
    state_retry_count: u32,
}

impl EventProcessor {
    pub fn new(
        catalog: Arc<dyn TriggerCatalog>,
        journal: Arc<dyn EventJournal>,
        states: Arc<dyn UserStateStore>,
        profiles: Arc<dyn UserProfileProvider>,
        tier_manager: TierManager,
        state_retry_count: u32,
    ) -> Self {
        Self {
            catalog,
            journal,
            states,
            profiles,
            tier_manager,
            reward_calculator: RewardCalculator::new(),
            condition_evaluator: ConditionEvaluator::new(),
            frequency_limiter: FrequencyLimiter::new(),
            locks: UserLockManager::new(),
            state_retry_count,
        }
    }

    /// 处理一次业务事件，返回本次命中（含重复命中）的事件列表
    #[instrument(skip(self, request), fields(
        user_id = %request.user_id,
        organization_id = %request.organization_id,
        event_type = %request.event_type,
    ))]
    pub async fn process_event(&self, request: ProcessEventRequest) -> Result<Vec<Event>> {
        let started = Instant::now();
        let now = Utc::now();

        // 1. 查找生效触发器；无命中时不读档案、不加锁
        let triggers = self
            .catalog
            .find_active_by_action(request.event_type, now)
            .await?;
        if triggers.is_empty() {
            debug!("无生效触发器，跳过处理");
            return Ok(Vec::new());
        }

        // 2. 加载用户档案，整次调用只读一次
        let profile = self
            .profiles
            .fetch(&request.user_id, &request.organization_id)
            .await?
            .ok_or_else(|| LoyaltyError::UserProfileNotFound {
                user_id: request.user_id.clone(),
            })?;

        // 3. 用户锁内逐个评估，触发器间互相隔离
        let _guard = self
            .locks
            .acquire(&request.organization_id, &request.user_id)
            .await;

        let mut fired = Vec::new();
        for trigger in &triggers {
            match self
                .apply_trigger(&request, trigger, &profile, started)
                .await
            {
                Ok(Some(event)) => fired.push(event),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        trigger_id = %trigger.id,
                        error = %e,
                        error_code = e.code(),
                        "触发器处理失败，继续处理其余触发器"
                    );
                }
            }
        }

        metrics::counter!("loyalty_events_processed_total").increment(1);
        info!(
            triggers_evaluated = triggers.len(),
            events_fired = fired.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "事件处理完成"
        );
        Ok(fired)
    }

    /// 冲正一笔事件：标记流水、回退积分/经验/生涯价值、释放指纹
    #[instrument(skip(self), fields(event_id = %event_id))]
    pub async fn reverse_event(
        &self,
        event_id: &str,
        reversed_by: &str,
        reason: &str,
    ) -> Result<Event> {
        let now = Utc::now();
        let event = self
            .journal
            .get(event_id)
            .await?
            .ok_or_else(|| LoyaltyError::EventNotFound {
                event_id: event_id.to_string(),
            })?;

        let _guard = self
            .locks
            .acquire(&event.organization_id, &event.user_id)
            .await;

        // 先改流水：已冲正的事件在这里被拒绝，状态不会二次回退
        let reversed = self
            .journal
            .mark_reversed(event_id, reversed_by, reason, now)
            .await?;

        self.update_state_with_retry(&event.user_id, &event.organization_id, now, |state| {
            self.tier_manager.apply_reversal(
                state,
                reversed.rewards.points_awarded,
                reversed.rewards.xp_awarded,
                reversed.event_data.dynamic_value,
                now,
            );
        })
        .await?;

        metrics::counter!("loyalty_events_reversed_total").increment(1);
        info!(
            user_id = %reversed.user_id,
            points_reversed = reversed.rewards.points_awarded,
            reversed_by = %reversed_by,
            "事件冲正完成"
        );
        Ok(reversed)
    }

    /// 评估单个触发器，返回命中产生（或复用）的事件
    async fn apply_trigger(
        &self,
        request: &ProcessEventRequest,
        trigger: &Trigger,
        profile: &UserProfile,
        started: Instant,
    ) -> Result<Option<Event>> {
        let now = Utc::now();
        let business_date = request.original_event_date.unwrap_or(now);

        // 资格
        if !trigger.can_activate_for(
            &request.user_id,
            &profile.role,
            profile.subscription_tier(),
            now,
        ) {
            debug!(trigger_id = %trigger.id, "用户不满足资格约束，跳过");
            return Ok(None);
        }

        // 条件
        let input = EvaluationInput {
            event_data: &request.event_data,
            business_date,
            subscription: profile.subscription.as_ref(),
        };
        if !self.condition_evaluator.evaluate(trigger, &input) {
            debug!(trigger_id = %trigger.id, "触发条件不满足，跳过");
            return Ok(None);
        }

        // 频次
        if !self
            .frequency_limiter
            .may_activate(self.journal.as_ref(), trigger, &request.user_id, now)
            .await?
        {
            debug!(trigger_id = %trigger.id, "超出频次限制，跳过");
            return Ok(None);
        }

        // 去重：相同指纹视为同一业务事件，返回已有流水（成功空操作）
        let fingerprint = Event::fingerprint(
            &request.user_id,
            &trigger.id,
            request.event_type,
            request.event_data.source_id.as_deref(),
            business_date,
        );
        if let Some(existing) = self.journal.find_by_fingerprint(&fingerprint).await? {
            info!(
                trigger_id = %trigger.id,
                event_id = %existing.id,
                "检测到重复事件，返回已有流水"
            );
            metrics::counter!("loyalty_duplicate_events_total").increment(1);
            return Ok(Some(existing));
        }

        // 计算奖励：等级取锁内实时状态，前序触发器的升档立即生效
        let state = self
            .states
            .get_or_default(&request.user_id, &request.organization_id, now)
            .await?;
        let outcome =
            self.reward_calculator
                .calculate(trigger, state.tier, request.event_data.dynamic_value);

        let system_info = request.system_info.clone().unwrap_or_default();
        let event = Event {
            id: Event::new_id(),
            user_id: request.user_id.clone(),
            organization_id: request.organization_id.clone(),
            trigger_id: trigger.id.clone(),
            event_type: request.event_type,
            event_data: request.event_data.clone(),
            rewards: EventRewards {
                points_awarded: outcome.points,
                xp_awarded: outcome.xp,
                tier_at_award: state.tier,
                bonus_multiplier: trigger.rewards.bonus_multiplier,
                breakdown: outcome.breakdown.clone(),
            },
            user_snapshot: UserSnapshot {
                tier_before: state.tier,
                total_points_before: state.total_points,
                total_points_after: state.total_points + u64::from(outcome.points),
                subscription_tier: profile.subscription_tier().map(str::to_string),
            },
            validation: EventValidation {
                is_valid: true,
                validated_at: now,
                method: ValidationMethod::Automatic,
                reversal: Default::default(),
            },
            deduplication: Deduplication {
                fingerprint: fingerprint.clone(),
                original_event_date: business_date,
            },
            processing: ProcessingInfo {
                processed_at: now,
                duration_ms: started.elapsed().as_millis() as i64,
                origin: system_info.origin,
                request_id: system_info.request_id,
            },
            created_at: now,
        };

        // 先落流水。并发竞争输掉唯一索引时同样按重复处理
        let event = match self.journal.append(event).await {
            Ok(event) => event,
            Err(LoyaltyError::DuplicateEvent { event_id, .. }) => {
                let existing = self.journal.get(&event_id).await?.ok_or_else(|| {
                    LoyaltyError::EventNotFound {
                        event_id: event_id.clone(),
                    }
                })?;
                return Ok(Some(existing));
            }
            Err(e) => return Err(e),
        };

        // 再写状态，冲突时基于已落账金额重试
        self.update_state_with_retry(&request.user_id, &request.organization_id, now, |state| {
            self.tier_manager.apply_award(
                state,
                outcome.points,
                outcome.xp,
                request.event_data.dynamic_value,
                now,
            );
        })
        .await?;

        // 触发器统计为派生数据，异步更新，失败只记日志
        let catalog = Arc::clone(&self.catalog);
        let trigger_id = trigger.id.clone();
        let user_id = request.user_id.clone();
        let points = outcome.points;
        tokio::spawn(async move {
            if let Err(e) = catalog
                .record_activation(&trigger_id, &user_id, points, now)
                .await
            {
                warn!(trigger_id = %trigger_id, error = %e, "更新触发器统计失败");
            }
        });

        metrics::counter!("loyalty_points_awarded_total").increment(u64::from(outcome.points));
        info!(
            trigger_id = %trigger.id,
            event_id = %event.id,
            points_awarded = outcome.points,
            xp_awarded = outcome.xp,
            "触发器命中，奖励已发放"
        );
        Ok(Some(event))
    }

    /// 在有限次数内以"读取 → 变换 → 带版本写入"更新用户状态
    async fn update_state_with_retry(
        &self,
        user_id: &str,
        organization_id: &str,
        now: DateTime<Utc>,
        mutate: impl Fn(&mut crate::models::UserLoyaltyState),
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            let mut state = self
                .states
                .get_or_default(user_id, organization_id, now)
                .await?;
            mutate(&mut state);
            match self.states.save(state).await {
                Ok(_) => return Ok(()),
                Err(e @ LoyaltyError::StateConflict { .. }) => {
                    attempt += 1;
                    if attempt > self.state_retry_count {
                        return Err(e);
                    }
                    debug!(
                        user_id = %user_id,
                        attempt,
                        "用户状态写入冲突，重试"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceModule, UserLoyaltyState};
    use crate::profile::MemoryProfileProvider;
    use crate::store::{
        MemoryEventJournal, MemoryTriggerCatalog, MemoryUserStateStore, MockUserStateStore,
    };
    use crate::tier::TierSchedule;

    fn processor_with_states(states: Arc<dyn UserStateStore>) -> EventProcessor {
        EventProcessor::new(
            Arc::new(MemoryTriggerCatalog::new()),
            Arc::new(MemoryEventJournal::new()),
            states,
            Arc::new(MemoryProfileProvider::new()),
            TierManager::new(TierSchedule::default()),
            3,
        )
    }

    fn request() -> ProcessEventRequest {
        ProcessEventRequest {
            user_id: "u1".to_string(),
            organization_id: "org1".to_string(),
            event_type: ActionType::PayOnTime,
            event_data: EventData {
                source_module: SourceModule::Payment,
                source_id: Some("inv-1".to_string()),
                description: "按时付款".to_string(),
                dynamic_value: None,
                metadata: Default::default(),
            },
            original_event_date: None,
            system_info: None,
        }
    }

    /// 无生效触发器时不读档案直接返回空
    #[tokio::test]
    async fn test_no_triggers_short_circuit() {
        let processor = processor_with_states(Arc::new(MemoryUserStateStore::new()));
        // 档案提供方为空，若错误地读档案会返回 UserProfileNotFound
        let fired = processor.process_event(request()).await.unwrap();
        assert!(fired.is_empty());
    }

    /// 写入冲突持续发生时在重试耗尽后报错
    #[tokio::test]
    async fn test_state_conflict_exhausts_retries() {
        let mut states = MockUserStateStore::new();
        states
            .expect_get_or_default()
            .returning(|u, o, now| Ok(UserLoyaltyState::new(u, o, now)));
        states.expect_save().times(4).returning(|state| {
            Err(LoyaltyError::StateConflict {
                user_id: state.user_id,
                organization_id: state.organization_id,
            })
        });

        let processor = processor_with_states(Arc::new(states));
        let err = processor
            .update_state_with_retry("u1", "org1", Utc::now(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::StateConflict { .. }));
    }

    /// 冲突后重读重写可成功
    #[tokio::test]
    async fn test_state_conflict_then_success() {
        let mut states = MockUserStateStore::new();
        states
            .expect_get_or_default()
            .returning(|u, o, now| Ok(UserLoyaltyState::new(u, o, now)));
        let mut attempts = 0;
        states.expect_save().times(2).returning(move |state| {
            attempts += 1;
            if attempts == 1 {
                Err(LoyaltyError::StateConflict {
                    user_id: state.user_id,
                    organization_id: state.organization_id,
                })
            } else {
                Ok(state)
            }
        });

        let processor = processor_with_states(Arc::new(states));
        processor
            .update_state_with_retry("u1", "org1", Utc::now(), |_| {})
            .await
            .unwrap();
    }
}
