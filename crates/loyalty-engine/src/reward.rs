//! 奖励计算
//!
//! 纯计算模块，无 I/O：
//!   积分 = round((基础分 + 等级加成) × 倍率) + floor(事件金额 × 0.1)
//!   经验 = 显式配置值，缺省为积分的 10% 向下取整

use crate::models::{RewardBreakdown, Tier, Trigger};

/// 事件金额转换为动态加分的比例
const DYNAMIC_BONUS_RATE: f64 = 0.1;

/// 缺省经验值占积分的比例
const DEFAULT_XP_RATE: f64 = 0.1;

/// 单次计算结果
#[derive(Debug, Clone, PartialEq)]
pub struct RewardOutcome {
    pub points: u32,
    pub xp: u32,
    pub breakdown: RewardBreakdown,
}

/// 奖励计算器
#[derive(Debug, Clone, Copy, Default)]
pub struct RewardCalculator;

impl RewardCalculator {
    pub fn new() -> Self {
        Self
    }

    /// 按触发器奖励定义、用户当前等级和事件金额计算应发奖励
    pub fn calculate(
        &self,
        trigger: &Trigger,
        tier: Tier,
        dynamic_value: Option<f64>,
    ) -> RewardOutcome {
        let rewards = &trigger.rewards;
        let tier_bonus = rewards.tier_bonuses.get(&tier).copied().unwrap_or(0);
        let multiplier = rewards.bonus_multiplier;

        let multiplied =
            (f64::from(rewards.base_points + tier_bonus) * multiplier).round() as u32;

        // 负金额不产生负加分
        let dynamic_bonus = dynamic_value
            .filter(|v| *v > 0.0)
            .map(|v| (v * DYNAMIC_BONUS_RATE).floor() as u32)
            .unwrap_or(0);

        let points = multiplied + dynamic_bonus;
        let xp = rewards
            .xp_points
            .unwrap_or_else(|| (f64::from(points) * DEFAULT_XP_RATE).floor() as u32);

        RewardOutcome {
            points,
            xp,
            breakdown: RewardBreakdown {
                base_points: rewards.base_points,
                tier_bonus,
                multiplier,
                dynamic_bonus,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActionType, FrequencyType, TriggerCategory, TriggerConditions, TriggerEligibility,
        TriggerFrequency, TriggerRewards, TriggerStats, TriggerValidity,
    };
    use chrono::Utc;
    use std::collections::HashMap;

    fn trigger_with_rewards(rewards: TriggerRewards) -> Trigger {
        let now = Utc::now();
        Trigger {
            id: "trig-1".to_string(),
            name: "测试触发器".to_string(),
            category: TriggerCategory::Revenue,
            action_type: ActionType::SpendOverX,
            conditions: TriggerConditions::default(),
            eligibility: TriggerEligibility::default(),
            rewards,
            frequency: TriggerFrequency {
                kind: FrequencyType::Unlimited,
                max_activations: 1,
            },
            validity: TriggerValidity {
                is_active: true,
                start_date: now,
                end_date: None,
                priority: 100,
            },
            stats: TriggerStats::default(),
            created_by: "admin".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 完整公式：(100 + 20) × 1.5 = 180，再加 floor(1000 × 0.1) = 100
    #[test]
    fn test_full_formula() {
        let mut tier_bonuses = HashMap::new();
        tier_bonuses.insert(Tier::Gold, 20);
        let trigger = trigger_with_rewards(TriggerRewards {
            base_points: 100,
            tier_bonuses,
            bonus_multiplier: 1.5,
            xp_points: None,
        });

        let outcome = RewardCalculator::new().calculate(&trigger, Tier::Gold, Some(1_000.0));
        assert_eq!(outcome.points, 280);
        // xp = floor(280 × 0.1)
        assert_eq!(outcome.xp, 28);
        assert_eq!(outcome.breakdown.base_points, 100);
        assert_eq!(outcome.breakdown.tier_bonus, 20);
        assert_eq!(outcome.breakdown.multiplier, 1.5);
        assert_eq!(outcome.breakdown.dynamic_bonus, 100);
    }

    /// 当前等级无加成条目时按 0 处理
    #[test]
    fn test_missing_tier_bonus() {
        let mut tier_bonuses = HashMap::new();
        tier_bonuses.insert(Tier::Platinum, 50);
        let trigger = trigger_with_rewards(TriggerRewards {
            base_points: 100,
            tier_bonuses,
            bonus_multiplier: 1.0,
            xp_points: None,
        });

        let outcome = RewardCalculator::new().calculate(&trigger, Tier::Bronze, None);
        assert_eq!(outcome.points, 100);
        assert_eq!(outcome.breakdown.tier_bonus, 0);
    }

    /// 倍率四舍五入发生在动态加分之前
    #[test]
    fn test_rounding_order() {
        let trigger = trigger_with_rewards(TriggerRewards {
            base_points: 33,
            tier_bonuses: HashMap::new(),
            bonus_multiplier: 1.5,
            xp_points: None,
        });

        // round(33 × 1.5) = round(49.5) = 50，floor(19 × 0.1) = 1
        let outcome = RewardCalculator::new().calculate(&trigger, Tier::Bronze, Some(19.0));
        assert_eq!(outcome.points, 51);
    }

    /// 显式经验值优先于缺省推导
    #[test]
    fn test_explicit_xp() {
        let trigger = trigger_with_rewards(TriggerRewards {
            base_points: 100,
            tier_bonuses: HashMap::new(),
            bonus_multiplier: 1.0,
            xp_points: Some(7),
        });

        let outcome = RewardCalculator::new().calculate(&trigger, Tier::Silver, None);
        assert_eq!(outcome.xp, 7);
    }

    /// 负金额与缺省金额都不产生动态加分
    #[test]
    fn test_dynamic_value_edge_cases() {
        let trigger = trigger_with_rewards(TriggerRewards {
            base_points: 10,
            tier_bonuses: HashMap::new(),
            bonus_multiplier: 1.0,
            xp_points: None,
        });

        let calc = RewardCalculator::new();
        assert_eq!(calc.calculate(&trigger, Tier::Bronze, None).points, 10);
        assert_eq!(
            calc.calculate(&trigger, Tier::Bronze, Some(-500.0)).points,
            10
        );
        assert_eq!(
            calc.calculate(&trigger, Tier::Bronze, Some(9.9)).points,
            10
        );
    }
}
