//! 交易生产者服务
//!
//! 从回放数据集或合成生成器取交易，限速发布到 Kafka。

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use sentinel_shared::config::AppConfig;
use sentinel_shared::kafka::KafkaProducer;
use sentinel_shared::observability;

use transaction_producer::{DeliveryPolicy, RateLimitedProducer, TransactionSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：从 config/{service_name}.toml 加载，包含可观测性配置
    let config = AppConfig::load("transaction-producer").unwrap_or_default();

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        topic = %config.kafka.topic,
        target_rate = config.producer.target_rate,
        delivery_mode = ?config.producer.delivery_mode,
        "Starting transaction-producer..."
    );

    let kafka_producer = KafkaProducer::new(&config.kafka)?;
    let policy = DeliveryPolicy::from_config(&config.producer);
    let flush_timeout = Duration::from_secs(config.producer.flush_timeout_seconds);

    let source = TransactionSource::from_config(
        config.producer.replay_path.as_deref(),
        config.producer.fraud_ratio,
    )?;

    let producer = RateLimitedProducer::new(
        kafka_producer,
        config.kafka.topic.clone(),
        policy,
        flush_timeout,
    );

    // 关闭信号通过 watch channel 广播，发送循环在消息之间响应
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let sent = producer
        .run(
            source,
            config.producer.target_rate,
            config.producer.limit,
            shutdown_rx,
        )
        .await?;

    info!(sent, "Producer shutdown complete");
    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("注册 Ctrl+C 处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("注册 SIGTERM 处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
