//! 内存存储实现
//!
//! 基于 DashMap 的参考实现，用于测试与本地开发。
//! 遍历类查询为 O(n)，数据量以单测/演示为准，不做索引优化。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;

use loyalty_shared::error::{LoyaltyError, Result};

use crate::models::{
    ActionType, Event, ReversalInfo, SourceModule, Trigger, TriggerCategory, UserLoyaltyState,
};

use super::{EventJournal, EventTypeStats, TriggerCatalog, UserStateStore};

// ==================== 触发器目录 ====================

/// 内存触发器目录
#[derive(Debug, Default)]
pub struct MemoryTriggerCatalog {
    triggers: DashMap<String, Trigger>,
    /// 每个触发器已发放过的用户集合，用于精确的 unique_users 统计
    activated_users: DashMap<String, HashSet<String>>,
}

impl MemoryTriggerCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriggerCatalog for MemoryTriggerCatalog {
    async fn insert(&self, trigger: Trigger) -> Result<()> {
        self.triggers.insert(trigger.id.clone(), trigger);
        Ok(())
    }

    async fn get(&self, trigger_id: &str) -> Result<Option<Trigger>> {
        Ok(self.triggers.get(trigger_id).map(|t| t.clone()))
    }

    async fn find_active_by_action(
        &self,
        action_type: ActionType,
        now: DateTime<Utc>,
    ) -> Result<Vec<Trigger>> {
        let mut matched: Vec<Trigger> = self
            .triggers
            .iter()
            .filter(|t| t.action_type == action_type && t.is_currently_active(now))
            .map(|t| t.clone())
            .collect();
        matched.sort_by(|a, b| b.validity.priority.cmp(&a.validity.priority));
        Ok(matched)
    }

    async fn list_active(
        &self,
        category: Option<TriggerCategory>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Trigger>> {
        let mut matched: Vec<Trigger> = self
            .triggers
            .iter()
            .filter(|t| t.is_currently_active(now))
            .filter(|t| category.is_none_or(|c| t.category == c))
            .map(|t| t.clone())
            .collect();
        matched.sort_by(|a, b| b.validity.priority.cmp(&a.validity.priority));
        Ok(matched)
    }

    async fn record_activation(
        &self,
        trigger_id: &str,
        user_id: &str,
        points: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let first_for_user = self
            .activated_users
            .entry(trigger_id.to_string())
            .or_default()
            .insert(user_id.to_string());

        let mut trigger =
            self.triggers
                .get_mut(trigger_id)
                .ok_or_else(|| LoyaltyError::TriggerNotFound {
                    trigger_id: trigger_id.to_string(),
                })?;
        trigger.stats.total_activations += 1;
        trigger.stats.total_points_awarded += u64::from(points);
        if first_for_user {
            trigger.stats.unique_users += 1;
        }
        trigger.stats.last_activated = Some(now);
        trigger.updated_at = now;
        Ok(())
    }
}

// ==================== 事件流水 ====================

/// 内存事件流水
///
/// fingerprints 是指纹到事件 ID 的唯一索引；冲正时从索引中摘除，
/// 使相同业务事件可以重新发放。
#[derive(Debug, Default)]
pub struct MemoryEventJournal {
    events: DashMap<String, Event>,
    fingerprints: DashMap<String, String>,
}

impl MemoryEventJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventJournal for MemoryEventJournal {
    async fn append(&self, event: Event) -> Result<Event> {
        match self
            .fingerprints
            .entry(event.deduplication.fingerprint.clone())
        {
            Entry::Occupied(existing) => Err(LoyaltyError::DuplicateEvent {
                fingerprint: event.deduplication.fingerprint.clone(),
                event_id: existing.get().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(event.id.clone());
                self.events.insert(event.id.clone(), event.clone());
                Ok(event)
            }
        }
    }

    async fn get(&self, event_id: &str) -> Result<Option<Event>> {
        Ok(self.events.get(event_id).map(|e| e.clone()))
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Event>> {
        let Some(event_id) = self.fingerprints.get(fingerprint).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self
            .events
            .get(&event_id)
            .filter(|e| e.is_effective())
            .map(|e| e.clone()))
    }

    async fn has_effective_event(&self, user_id: &str, trigger_id: &str) -> Result<bool> {
        Ok(self.events.iter().any(|e| {
            e.user_id == user_id && e.trigger_id == trigger_id && e.is_effective()
        }))
    }

    async fn count_effective_since(
        &self,
        user_id: &str,
        trigger_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(self
            .events
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.trigger_id == trigger_id
                    && e.is_effective()
                    && e.created_at >= since
            })
            .count() as u64)
    }

    async fn recent_user_events(
        &self,
        user_id: &str,
        organization_id: &str,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.organization_id == organization_id
                    && e.validation.is_valid
                    && !e.validation.reversal.is_reversed
            })
            .map(|e| e.clone())
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit);
        Ok(events)
    }

    async fn mark_reversed(
        &self,
        event_id: &str,
        reversed_by: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Event> {
        let mut event =
            self.events
                .get_mut(event_id)
                .ok_or_else(|| LoyaltyError::EventNotFound {
                    event_id: event_id.to_string(),
                })?;
        if event.validation.reversal.is_reversed {
            return Err(LoyaltyError::AlreadyReversed {
                event_id: event_id.to_string(),
            });
        }
        event.validation.reversal = ReversalInfo {
            is_reversed: true,
            reversed_at: Some(now),
            reversed_by: Some(reversed_by.to_string()),
            reason: Some(reason.to_string()),
        };
        let snapshot = event.clone();
        drop(event);

        // 释放指纹，允许同一业务事件重新发放
        self.fingerprints
            .remove_if(&snapshot.deduplication.fingerprint, |_, id| id == event_id);
        Ok(snapshot)
    }

    async fn event_stats<'a>(&self, organization_id: Option<&'a str>) -> Result<Vec<EventTypeStats>> {
        let mut groups: HashMap<(ActionType, SourceModule), (u64, u64, HashSet<String>)> =
            HashMap::new();
        for event in self.events.iter() {
            if !event.is_effective() {
                continue;
            }
            if let Some(org) = organization_id
                && event.organization_id != org
            {
                continue;
            }
            let entry = groups
                .entry((event.event_type, event.event_data.source_module))
                .or_default();
            entry.0 += 1;
            entry.1 += u64::from(event.rewards.points_awarded);
            entry.2.insert(event.user_id.clone());
        }

        let mut stats: Vec<EventTypeStats> = groups
            .into_iter()
            .map(
                |((event_type, source_module), (count, points, users))| EventTypeStats {
                    event_type,
                    source_module,
                    event_count: count,
                    total_points: points,
                    unique_users: users.len() as u64,
                    avg_points: points as f64 / count as f64,
                },
            )
            .collect();
        stats.sort_by(|a, b| b.event_count.cmp(&a.event_count));
        Ok(stats)
    }
}

// ==================== 用户状态 ====================

/// 内存用户状态存储
///
/// insertion_order 记录首次落库顺序，供组织内排名做稳定的并列裁决。
#[derive(Debug, Default)]
pub struct MemoryUserStateStore {
    states: DashMap<String, UserLoyaltyState>,
    insertion_order: RwLock<Vec<String>>,
}

impl MemoryUserStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(user_id: &str, organization_id: &str) -> String {
        format!("{}:{}", organization_id, user_id)
    }
}

#[async_trait]
impl UserStateStore for MemoryUserStateStore {
    async fn get(&self, user_id: &str, organization_id: &str) -> Result<Option<UserLoyaltyState>> {
        let key = Self::key(user_id, organization_id);
        Ok(self.states.get(&key).map(|s| s.clone()))
    }

    async fn get_or_default(
        &self,
        user_id: &str,
        organization_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserLoyaltyState> {
        Ok(self
            .get(user_id, organization_id)
            .await?
            .unwrap_or_else(|| UserLoyaltyState::new(user_id, organization_id, now)))
    }

    async fn save(&self, state: UserLoyaltyState) -> Result<UserLoyaltyState> {
        let key = Self::key(&state.user_id, &state.organization_id);
        match self.states.entry(key.clone()) {
            Entry::Occupied(mut existing) => {
                if existing.get().version != state.version {
                    return Err(LoyaltyError::StateConflict {
                        user_id: state.user_id,
                        organization_id: state.organization_id,
                    });
                }
                let mut next = state;
                next.version += 1;
                existing.insert(next.clone());
                Ok(next)
            }
            Entry::Vacant(slot) => {
                // version != 0 说明写入方持有的是已被删除/重建前的旧快照
                if state.version != 0 {
                    return Err(LoyaltyError::StateConflict {
                        user_id: state.user_id,
                        organization_id: state.organization_id,
                    });
                }
                let mut next = state;
                next.version = 1;
                slot.insert(next.clone());
                self.insertion_order.write().push(key);
                Ok(next)
            }
        }
    }

    async fn list_by_organization(&self, organization_id: &str) -> Result<Vec<UserLoyaltyState>> {
        let order = self.insertion_order.read().clone();
        Ok(order
            .iter()
            .filter_map(|key| self.states.get(key).map(|s| s.clone()))
            .filter(|s| s.organization_id == organization_id)
            .collect())
    }
}
