//! 频次控制
//!
//! 基于事件流水的已有记录判断是否还允许发放。窗口一律取 UTC：
//! daily 从当日零点起，weekly 从本周周日零点起，monthly 从当月一日零点起。
//! 只有有效且未冲正的事件计入次数。

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use tracing::warn;

use loyalty_shared::error::Result;

use crate::models::{FrequencyType, Trigger};
use crate::store::EventJournal;

/// 频次限制器
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencyLimiter;

impl FrequencyLimiter {
    pub fn new() -> Self {
        Self
    }

    /// 计算窗口起点；once/unlimited/unknown 无窗口概念，返回 None
    pub fn period_start(kind: FrequencyType, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        match kind {
            FrequencyType::Daily => Some(midnight),
            FrequencyType::Weekly => {
                let days_since_sunday = i64::from(now.weekday().num_days_from_sunday());
                Some(midnight - Duration::days(days_since_sunday))
            }
            FrequencyType::Monthly => {
                let first = now.date_naive().with_day(1).unwrap_or(now.date_naive());
                Some(first.and_time(NaiveTime::MIN).and_utc())
            }
            FrequencyType::Once | FrequencyType::Unlimited | FrequencyType::Unknown => None,
        }
    }

    /// 判断该触发器对该用户是否还允许发放
    pub async fn may_activate(
        &self,
        journal: &dyn EventJournal,
        trigger: &Trigger,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match trigger.frequency.kind {
            FrequencyType::Unlimited => Ok(true),
            FrequencyType::Unknown => {
                // 未识别的窗口类型按放行处理，避免配置前滚时旧节点拒发
                warn!(
                    trigger_id = %trigger.id,
                    "未识别的频次类型，按不限频处理"
                );
                Ok(true)
            }
            FrequencyType::Once => {
                let activated = journal.has_effective_event(user_id, &trigger.id).await?;
                Ok(!activated)
            }
            kind @ (FrequencyType::Daily | FrequencyType::Weekly | FrequencyType::Monthly) => {
                // period_start 对窗口类频次恒有值
                let Some(since) = Self::period_start(kind, now) else {
                    return Ok(true);
                };
                let count = journal
                    .count_effective_since(user_id, &trigger.id, since)
                    .await?;
                Ok(count < u64::from(trigger.frequency.max_activations))
            }
        }
    }
}
