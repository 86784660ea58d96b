use thiserror::Error;

use crate::index::builder::BuildError;
use crate::index::IndexError;

/// 对调用方暴露的错误分类
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn internal(msg: impl std::fmt::Display) -> Self {
        StoreError::Internal(msg.to_string())
    }

    /// 稳定的错误类别名（HTTP 响应体使用）
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::InvalidArgument(_) => "invalid_argument",
            StoreError::Internal(_) => "internal",
        }
    }
}

impl From<IndexError> for StoreError {
    fn from(e: IndexError) -> Self {
        StoreError::Internal(e.to_string())
    }
}

impl From<BuildError> for StoreError {
    fn from(e: BuildError) -> Self {
        StoreError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
