//! 统一错误处理模块
//!
//! 定义系统中所有共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum LoyaltyError {
    // ==================== 查找错误 ====================
    #[error("用户档案未找到: user_id={user_id}")]
    UserProfileNotFound { user_id: String },

    #[error("触发器未找到: trigger_id={trigger_id}")]
    TriggerNotFound { trigger_id: String },

    #[error("事件未找到: event_id={event_id}")]
    EventNotFound { event_id: String },

    // ==================== 业务逻辑错误 ====================
    /// 指纹冲突。处理管线会将其映射为成功空操作（返回已存在的事件），
    /// 不会向调用方传播。
    #[error("重复事件: fingerprint={fingerprint} 已由事件 {event_id} 占用")]
    DuplicateEvent {
        fingerprint: String,
        event_id: String,
    },

    #[error("事件已被冲正: event_id={event_id}")]
    AlreadyReversed { event_id: String },

    /// 乐观并发写入冲突，调用方应在有限次数内重试。
    #[error("用户状态写入冲突: user_id={user_id} organization_id={organization_id}")]
    StateConflict {
        user_id: String,
        organization_id: String,
    },

    // ==================== 验证错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("无效的参数: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    // ==================== 通用错误 ====================
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, LoyaltyError>;

impl LoyaltyError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserProfileNotFound { .. } => "USER_PROFILE_NOT_FOUND",
            Self::TriggerNotFound { .. } => "TRIGGER_NOT_FOUND",
            Self::EventNotFound { .. } => "EVENT_NOT_FOUND",
            Self::DuplicateEvent { .. } => "DUPLICATE_EVENT",
            Self::AlreadyReversed { .. } => "ALREADY_REVERSED",
            Self::StateConflict { .. } => "STATE_CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StateConflict { .. })
    }
}
