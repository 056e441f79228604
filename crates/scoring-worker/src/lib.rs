//! 评分消费者
//!
//! 从 Kafka 拉取交易，调用评分引擎，持久化预测记录并更新指标。
//! 单条消息的失败被隔离在本条之内，循环继续处理下一条。

pub mod consumer;
pub mod error;

pub use consumer::{ScoredObserver, ScoredTransaction, ScoringConsumer};
pub use error::WorkerError;
