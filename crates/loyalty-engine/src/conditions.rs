//! 条件判定
//!
//! 纯函数模块：按固定顺序做短路检查，任一不满足即判为不通过。
//! 不通过意味着跳过该触发器，属于正常业务路径，由调用方记录 debug 日志。

use chrono::{DateTime, Duration, Utc};

use crate::models::{ActionType, EventData, Trigger};
use crate::profile::SubscriptionSnapshot;

/// 续订事件允许的宽限期（计费周期截止后仍可计入的天数）
const RENEWAL_GRACE_DAYS: i64 = 3;

/// 条件判定的输入上下文
#[derive(Debug)]
pub struct EvaluationInput<'a> {
    pub event_data: &'a EventData,
    /// 业务时间（上游事件真实发生时刻）
    pub business_date: DateTime<Utc>,
    pub subscription: Option<&'a SubscriptionSnapshot>,
}

/// 条件判定器
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// 判定事件是否满足触发器的全部条件
    ///
    /// 检查顺序：有效订阅 → 最低金额 → 时间窗 → 按行为类型的定制条件。
    pub fn evaluate(&self, trigger: &Trigger, input: &EvaluationInput<'_>) -> bool {
        let conditions = &trigger.conditions;

        // 1. 有效订阅
        if conditions.requires_active_subscription {
            match input.subscription {
                Some(sub) if sub.status.is_entitled() => {}
                _ => return false,
            }
        }

        // 2. 最低金额（仅在事件携带金额时比较）
        if let Some(minimum) = conditions.minimum_amount
            && let Some(value) = input.event_data.dynamic_value
            && value < minimum
        {
            return false;
        }

        // 3. 时间窗：续订事件不得晚于计费周期截止 + 宽限期
        if conditions.time_window_days.is_some()
            && trigger.action_type == ActionType::RenewSubscription
            && let Some(sub) = input.subscription
            && let Some(period_end) = sub.current_period_end
        {
            let grace_end = period_end + Duration::days(RENEWAL_GRACE_DAYS);
            if input.business_date > grace_end {
                return false;
            }
        }

        // 4. 定制条件，按行为类型分派
        if !conditions.custom_conditions.is_empty() {
            match trigger.action_type {
                ActionType::PayOnTime => {
                    // 付款不得晚于计费周期截止日
                    if let Some(sub) = input.subscription
                        && let Some(due_date) = sub.current_period_end
                    {
                        return input.business_date <= due_date;
                    }
                }
                ActionType::ReferUser => {
                    // 被推荐人必须持有有效订阅
                    if let Some(referral) = input.event_data.metadata.get("referralData") {
                        let has_active = referral
                            .get("hasActiveSubscription")
                            .and_then(|v| v.as_bool());
                        if has_active != Some(true) {
                            return false;
                        }
                    }
                }
                // 其余行为类型暂无定制条件
                _ => {}
            }
        }

        true
    }
}
