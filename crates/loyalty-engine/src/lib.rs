//! 忠诚度触发器处理引擎
//!
//! 将上游业务事件（续订、付款、推荐等）转化为积分、经验与等级奖励：
//! - 触发器目录定义"什么行为、什么条件、奖励多少"
//! - 事件流水仅追加，指纹去重，修正走冲正
//! - 用户状态按 (user_id, organization_id) 聚合，版本号乐观并发
//!
//! 核心入口为 [`processor::EventProcessor`]，查询与管理入口分别为
//! [`summary::SummaryService`] 与 [`admin::AdminService`]。

pub mod admin;
pub mod conditions;
pub mod frequency;
pub mod lock;
pub mod models;
pub mod processor;
pub mod profile;
pub mod reward;
pub mod store;
pub mod summary;
pub mod tier;

pub use loyalty_shared::error::{LoyaltyError, Result};

pub use admin::{AdminService, CreateTriggerRequest, LoyaltyStats};
pub use processor::{EventProcessor, ProcessEventRequest, SystemInfo};
pub use summary::{LoyaltySummary, SummaryService};
pub use tier::{TierManager, TierSchedule};
