//! 错误定义模块

use thiserror::Error;

/// 系统统一错误类型
///
/// 删除窗口过期属于策略拒绝而非故障，不在此枚举中表达，
/// 见工作流模块的 `DeleteOutcome`。
#[derive(Error, Debug)]
pub enum DicomLiteError {
    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("文件存储错误: {0}")]
    StorageIo(String),

    #[error("数据库错误: {0}")]
    Persistence(String),

    #[error("数据不一致: {0}")]
    Inconsistency(String),

    #[error("上传内容过大: {0}")]
    PayloadTooLarge(String),

    #[error("认证失败: {0}")]
    Unauthorized(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 错误类别，供调用方按类别分支而不必匹配消息文本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    StorageIo,
    Persistence,
    Inconsistency,
    PayloadTooLarge,
    Unauthorized,
    Internal,
}

impl DicomLiteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DicomLiteError::Validation(_) => ErrorKind::Validation,
            DicomLiteError::NotFound(_) => ErrorKind::NotFound,
            DicomLiteError::StorageIo(_) => ErrorKind::StorageIo,
            DicomLiteError::Persistence(_) => ErrorKind::Persistence,
            DicomLiteError::Inconsistency(_) => ErrorKind::Inconsistency,
            DicomLiteError::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            DicomLiteError::Unauthorized(_) => ErrorKind::Unauthorized,
            DicomLiteError::Config(_)
            | DicomLiteError::InvalidStateTransition { .. }
            | DicomLiteError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 是否为需要人工介入的严重故障（行与文件状态分叉）
    pub fn is_critical(&self) -> bool {
        matches!(self, DicomLiteError::Inconsistency(_))
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, DicomLiteError>;
