//! 限速交易生产者
//!
//! 从回放数据集或合成生成器取交易，按目标速率开环配速后
//! 发布到 Kafka。配速只由目标速率决定，不感知下游消费进度。

pub mod error;
pub mod producer;
pub mod source;

pub use error::ProducerError;
pub use producer::{DeliveryPolicy, Pacer, RateLimitedProducer};
pub use source::{ReplaySource, SyntheticSource, TransactionSource};
