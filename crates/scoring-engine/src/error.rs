//! 评分引擎错误类型定义

use thiserror::Error;

/// 评分引擎错误类型
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("读取模型文件失败: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("解析模型文件失败: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("模型参数无效: {0}")]
    InvalidArtifact(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ScoringError>;
