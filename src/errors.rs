//! 标准化错误处理
//!
//! 定义项目专用的错误类型

use thiserror::Error;

/// 项目主要错误类型
#[derive(Error, Debug)]
pub enum PlatformError {
    /// 输入验证错误
    #[error("Validation error: {0}")]
    Validation(String),

    /// 凭证不存在
    #[error("Voucher not found")]
    NotFound,

    /// 凭证已被撤销
    #[error("Voucher revoked")]
    Revoked,

    /// 凭证已过期
    #[error("Voucher expired")]
    Expired,

    /// 游玩次数已用完
    #[error("No plays remaining")]
    Exhausted,

    /// 唯一性冲突（token 或邮箱已存在）
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 认证失败
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 存储瞬时错误（锁超时、连接失败），调用方可安全重试
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// 存储相关错误
    #[error("Storage error: {0}")]
    Storage(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PlatformError {
    /// 瞬时错误是唯一允许调用方重试的类别
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::TransientStore(_))
    }
}

impl From<rusqlite::Error> for PlatformError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            // 锁等待超时等并发冲突归类为瞬时错误
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked =>
            {
                PlatformError::TransientStore(err.to_string())
            }
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                PlatformError::Conflict(err.to_string())
            }
            _ => PlatformError::Storage(err.to_string()),
        }
    }
}

impl From<std::io::Error> for PlatformError {
    fn from(err: std::io::Error) -> Self {
        PlatformError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(err: serde_json::Error) -> Self {
        PlatformError::Config(err.to_string())
    }
}

/// 项目结果类型别名
pub type Result<T> = std::result::Result<T, PlatformError>;
