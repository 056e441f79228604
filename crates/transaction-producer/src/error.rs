//! 生产者错误类型定义

use sentinel_shared::error::SentinelError;
use thiserror::Error;

/// 生产者错误类型
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("无效的目标速率: {0}，必须为正的有限数")]
    InvalidRate(f64),

    #[error("打开回放数据集失败: {path}: {source}")]
    ReplayOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Shared(#[from] SentinelError),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ProducerError>;
