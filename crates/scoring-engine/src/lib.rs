//! 评分引擎
//!
//! 从持久化的模型工件加载参数，对固定列序的 30 维特征向量同步产出
//! 欺诈概率与异常分数。加载完成后引擎只读，可被任意多个调用方并发使用。

pub mod artifact;
pub mod engine;
pub mod error;

pub use artifact::{AnomalyParams, ClassifierParams, ModelArtifact, ScalerParams};
pub use engine::ScoringEngine;
pub use error::ScoringError;
