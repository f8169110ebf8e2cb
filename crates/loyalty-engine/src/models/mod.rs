//! 领域模型
//!
//! 触发器目录、事件流水和用户状态三类核心数据结构。

pub mod event;
pub mod trigger;
pub mod user_state;

pub use event::{
    Deduplication, Event, EventData, EventRewards, EventValidation, ProcessingInfo,
    ProcessingOrigin, ReversalInfo, RewardBreakdown, SourceModule, UserSnapshot, ValidationMethod,
};
pub use trigger::{
    ActionType, FrequencyType, Trigger, TriggerCategory, TriggerConditions, TriggerEligibility,
    TriggerFrequency, TriggerRewards, TriggerStats, TriggerValidity,
};
pub use user_state::{
    SpecialBenefits, Tier, TierHistoryEntry, TierProgress, UserLoyaltyState,
};
