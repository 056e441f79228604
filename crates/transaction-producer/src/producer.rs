//! 限速生产者主循环
//!
//! 配速是开环的：平均发送间隔恒为 1/target_rate 秒，与 broker 确认
//! 延迟和消费者进度无关。慢消费者只会造成 broker 积压，不会反压到
//! 这里。关闭信号只在消息之间被检查。

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Interval, interval};
use tracing::{info, warn};

use sentinel_shared::config::{DeliveryMode, ProducerConfig};
use sentinel_shared::kafka::KafkaProducer;
use sentinel_shared::observability::metrics;
use sentinel_shared::retry::{RetryPolicy, retry_with_policy};
use sentinel_shared::transaction::Transaction;

use crate::error::ProducerError;

// ---------------------------------------------------------------------------
// Pacer — 开环配速器
// ---------------------------------------------------------------------------

/// 开环配速器
///
/// 包装 `tokio::time::interval`，周期为 1/target_rate 秒。
/// interval 的补偿语义保证落后的 tick 会追赶，长期平均速率
/// 收敛到目标值。
pub struct Pacer {
    interval: Interval,
}

impl Pacer {
    /// 创建配速器；速率必须为正的有限数
    pub fn new(target_rate: f64) -> Result<Self, ProducerError> {
        if !target_rate.is_finite() || target_rate <= 0.0 {
            return Err(ProducerError::InvalidRate(target_rate));
        }

        let period = Duration::from_secs_f64(1.0 / target_rate);
        Ok(Self {
            interval: interval(period),
        })
    }

    /// 等待下一个发送窗口；首个窗口立即到期
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

// ---------------------------------------------------------------------------
// DeliveryPolicy — 发布可靠性策略
// ---------------------------------------------------------------------------

/// 发布可靠性策略
///
/// FireAndForget：入队即继续，发布失败只记录日志与错误计数；
/// Acknowledged：等待 broker 确认，按退避策略有限重试后丢弃。
#[derive(Debug, Clone)]
pub enum DeliveryPolicy {
    FireAndForget,
    Acknowledged { retry: RetryPolicy },
}

impl DeliveryPolicy {
    /// 从生产者配置构造策略
    pub fn from_config(config: &ProducerConfig) -> Self {
        match config.delivery_mode {
            DeliveryMode::FireAndForget => Self::FireAndForget,
            DeliveryMode::Acknowledged => Self::Acknowledged {
                retry: RetryPolicy {
                    max_retries: config.max_retries,
                    ..RetryPolicy::default()
                },
            },
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimitedProducer
// ---------------------------------------------------------------------------

/// 限速交易生产者
///
/// 对来源迭代器中的每笔交易单调分配标识符后按策略发布。
/// 达到上限或收到关闭信号时，先刷新在途消息再返回。
pub struct RateLimitedProducer {
    producer: KafkaProducer,
    topic: String,
    policy: DeliveryPolicy,
    flush_timeout: Duration,
}

impl RateLimitedProducer {
    pub fn new(
        producer: KafkaProducer,
        topic: impl Into<String>,
        policy: DeliveryPolicy,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            producer,
            topic: topic.into(),
            policy,
            flush_timeout,
        }
    }

    /// 驱动发送循环，返回实际发出的交易数
    ///
    /// 这是一个单顺序循环：唯一的挂起点是配速等待（以及 acknowledged
    /// 模式下等待 broker 确认）。关闭信号只在消息之间被响应，
    /// 不会截断正在进行的发布。
    pub async fn run(
        &self,
        source: impl Iterator<Item = Transaction>,
        target_rate: f64,
        limit: Option<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<u64, ProducerError> {
        let mut pacer = Pacer::new(target_rate)?;
        let mut sequence: u64 = 0;

        info!(
            topic = %self.topic,
            target_rate,
            ?limit,
            "限速生产者已启动"
        );

        'stream: for mut transaction in source {
            if let Some(limit) = limit
                && sequence >= limit
            {
                info!(limit, "已达发送上限");
                break;
            }

            // 配速等待，同时保持对关闭信号的响应
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("收到关闭信号，停止生产");
                            break 'stream;
                        }
                    }

                    _ = pacer.tick() => break,
                }
            }

            sequence += 1;
            let identifier = format!("tx-{sequence}");
            transaction.transaction_id = Some(identifier.clone());

            self.publish(&identifier, &transaction).await;
        }

        // 返回前刷新缓冲与在途消息，fire-and-forget 模式下
        // 尾部消息可能尚未离开本地队列
        info!(sent = sequence, "刷新发送队列...");
        self.producer.flush(self.flush_timeout)?;
        info!(sent = sequence, "生产者已停止");

        Ok(sequence)
    }

    /// 按策略发布单笔交易
    ///
    /// 两种策略下发布失败都不会中断发送循环：计数、记日志、继续。
    async fn publish(&self, key: &str, transaction: &Transaction) {
        match &self.policy {
            DeliveryPolicy::FireAndForget => {
                match self.producer.enqueue_json(&self.topic, key, transaction) {
                    Ok(()) => metrics::record_message_produced(&self.topic),
                    Err(e) => {
                        warn!(key, error = %e, "消息入队失败，跳过");
                        metrics::record_error("publish");
                    }
                }
            }
            DeliveryPolicy::Acknowledged { retry } => {
                let result = retry_with_policy(
                    retry,
                    "publish_transaction",
                    |e| e.is_retryable(),
                    || async {
                        self.producer
                            .send_json(&self.topic, key, transaction)
                            .await
                            .map(|_| ())
                    },
                )
                .await;

                match result {
                    Ok(()) => metrics::record_message_produced(&self.topic),
                    Err(e) => {
                        warn!(key, error = %e, "重试后仍发布失败，丢弃消息");
                        metrics::record_error("publish");
                    }
                }
            }
        }
    }
}
