//! 评分消费者服务
//!
//! 消费 Kafka 交易流，调用评分引擎并持久化预测记录。

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use scoring_engine::ScoringEngine;
use sentinel_shared::config::AppConfig;
use sentinel_shared::database::Database;
use sentinel_shared::observability::{self, metrics};
use sentinel_shared::store::PredictionRepository;

use scoring_worker::ScoringConsumer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：从 config/{service_name}.toml 加载，包含可观测性配置
    let config = AppConfig::load("scoring-worker").unwrap_or_default();

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        topic = %config.kafka.topic,
        consumer_group = %config.kafka.consumer_group,
        "Starting scoring-worker..."
    );

    // 加载评分模型：失败直接终止启动，没有模型的消费者不应进入就绪状态
    let mut engine = ScoringEngine::load(&config.scoring.model_path)
        .with_context(|| format!("加载评分模型失败: {}", config.scoring.model_path))?;
    if let Some(threshold) = config.scoring.threshold {
        engine = engine.with_fraud_threshold(threshold)?;
        info!(threshold, "已应用配置层的欺诈判定阈值覆盖");
    }
    metrics::set_model_loaded(true);

    // 初始化数据库并引导表结构
    let db = Database::connect(&config.database).await?;
    db.ensure_schema().await?;
    let repository = PredictionRepository::new(db.pool().clone());

    let consumer = ScoringConsumer::new(&config, Arc::new(engine), repository)?;

    // 关闭信号通过 watch channel 广播，消费循环在消息之间响应
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    consumer.run(shutdown_rx).await?;

    db.close().await;
    info!("Worker shutdown complete");
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
