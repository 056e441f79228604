//! 评分消费者错误类型定义

use sentinel_shared::error::SentinelError;
use thiserror::Error;

/// 评分消费者错误类型
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("交易反序列化失败: {0}")]
    Deserialization(String),

    #[error(transparent)]
    Shared(#[from] SentinelError),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialization_display() {
        let err = WorkerError::Deserialization("missing field `amount`".to_string());
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn test_shared_error_passthrough() {
        let err: WorkerError = SentinelError::Kafka("offline".to_string()).into();
        assert!(err.to_string().contains("offline"));
    }
}
