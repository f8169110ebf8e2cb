//! 等级管理
//!
//! 等级门槛表在构造时注入、运行期不可变；等级、权益、进度全部由
//! 总积分纯函数推导，便于替换门槛表做测试。

use chrono::{DateTime, Utc};
use tracing::info;

use loyalty_shared::config::TierThresholdConfig;

use crate::models::{SpecialBenefits, Tier, TierHistoryEntry, TierProgress, UserLoyaltyState};

// ==================== 门槛表 ====================

/// 等级门槛表（青铜恒为 0）
#[derive(Debug, Clone, Copy)]
pub struct TierSchedule {
    silver_floor: u64,
    gold_floor: u64,
    platinum_floor: u64,
}

impl Default for TierSchedule {
    fn default() -> Self {
        Self {
            silver_floor: 1_000,
            gold_floor: 5_000,
            platinum_floor: 15_000,
        }
    }
}

impl From<&TierThresholdConfig> for TierSchedule {
    fn from(cfg: &TierThresholdConfig) -> Self {
        Self {
            silver_floor: cfg.silver,
            gold_floor: cfg.gold,
            platinum_floor: cfg.platinum,
        }
    }
}

impl TierSchedule {
    /// 自定义门槛表，要求严格递增
    pub fn new(silver_floor: u64, gold_floor: u64, platinum_floor: u64) -> Self {
        debug_assert!(silver_floor < gold_floor && gold_floor < platinum_floor);
        Self {
            silver_floor,
            gold_floor,
            platinum_floor,
        }
    }

    /// 按总积分判定等级
    pub fn tier_for(&self, points: u64) -> Tier {
        if points >= self.platinum_floor {
            Tier::Platinum
        } else if points >= self.gold_floor {
            Tier::Gold
        } else if points >= self.silver_floor {
            Tier::Silver
        } else {
            Tier::Bronze
        }
    }

    /// 等级对应的积分下限
    pub fn floor_of(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Bronze => 0,
            Tier::Silver => self.silver_floor,
            Tier::Gold => self.gold_floor,
            Tier::Platinum => self.platinum_floor,
        }
    }

    /// 下一等级门槛；已达铂金时报告铂金门槛本身（兼容既有消费方）
    pub fn next_threshold(&self, points: u64) -> u64 {
        match self.tier_for(points) {
            Tier::Bronze => self.silver_floor,
            Tier::Silver => self.gold_floor,
            Tier::Gold => self.platinum_floor,
            Tier::Platinum => self.platinum_floor,
        }
    }
}

// ==================== 等级管理器 ====================

/// 等级管理器：门槛表 + 权益推导 + 状态变更
#[derive(Debug, Clone)]
pub struct TierManager {
    schedule: TierSchedule,
}

impl TierManager {
    pub fn new(schedule: TierSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &TierSchedule {
        &self.schedule
    }

    pub fn tier_for(&self, points: u64) -> Tier {
        self.schedule.tier_for(points)
    }

    /// 等级权益（全函数，任何等级都有确定结果）
    pub fn benefits_for(&self, tier: Tier) -> SpecialBenefits {
        match tier {
            Tier::Bronze => SpecialBenefits {
                discount_rate: 0,
                has_priority_support: false,
                has_early_access: false,
            },
            Tier::Silver => SpecialBenefits {
                discount_rate: 5,
                has_priority_support: false,
                has_early_access: false,
            },
            Tier::Gold => SpecialBenefits {
                discount_rate: 10,
                has_priority_support: true,
                has_early_access: false,
            },
            Tier::Platinum => SpecialBenefits {
                discount_rate: 15,
                has_priority_support: true,
                has_early_access: true,
            },
        }
    }

    /// 发放奖励后更新状态：积分、经验、生涯价值、等级、历史、进度、权益
    ///
    /// 返回变更后的新等级（未变更时为 None）。
    pub fn apply_award(
        &self,
        state: &mut UserLoyaltyState,
        points: u32,
        xp: u32,
        dynamic_value: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<Tier> {
        state.total_points += u64::from(points);
        state.total_xp += u64::from(xp);
        if let Some(value) = dynamic_value {
            state.lifetime_value += value;
        }
        self.refresh_tier(state, now)
    }

    /// 冲正后回退状态（饱和减法，不会下溢）
    pub fn apply_reversal(
        &self,
        state: &mut UserLoyaltyState,
        points: u32,
        xp: u32,
        dynamic_value: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<Tier> {
        state.total_points = state.total_points.saturating_sub(u64::from(points));
        state.total_xp = state.total_xp.saturating_sub(u64::from(xp));
        if let Some(value) = dynamic_value {
            state.lifetime_value = (state.lifetime_value - value).max(0.0);
        }
        self.refresh_tier(state, now)
    }

    /// 按当前总积分重算等级与进度，等级变化时追加历史
    fn refresh_tier(&self, state: &mut UserLoyaltyState, now: DateTime<Utc>) -> Option<Tier> {
        let new_tier = self.schedule.tier_for(state.total_points);
        let changed = new_tier != state.tier;

        if changed {
            info!(
                user_id = %state.user_id,
                organization_id = %state.organization_id,
                old_tier = %state.tier,
                new_tier = %new_tier,
                total_points = state.total_points,
                "用户等级变更"
            );
            metrics::counter!("loyalty_tier_changes_total").increment(1);
            state.tier = new_tier;
            state.tier_history.push(TierHistoryEntry {
                tier: new_tier,
                achieved_at: now,
                points_at_time: state.total_points,
            });
            state.tier_progress.current_tier_since = now;
        }

        let next = self.schedule.next_threshold(state.total_points);
        state.tier_progress = TierProgress {
            current_tier_since: state.tier_progress.current_tier_since,
            next_tier_threshold: next,
            points_to_next_tier: next.saturating_sub(state.total_points),
        };
        state.special_benefits = self.benefits_for(state.tier);
        state.updated_at = now;

        changed.then_some(new_tier)
    }
}
