//! 推理 API 服务
//!
//! 提供单笔/批量评分、健康检查、指标导出和预测回读的 REST API。

use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use inference_api::{AppState, routes};
use scoring_engine::ScoringEngine;
use sentinel_shared::config::AppConfig;
use sentinel_shared::database::Database;
use sentinel_shared::observability::{self, metrics};
use sentinel_shared::store::PredictionRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：从 config/{service_name}.toml 加载，包含可观测性配置
    let config = AppConfig::load("inference-api").unwrap_or_default();

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting inference-api on {}", config.server_addr());

    // 初始化基础设施；API 只回读 predictions 表，但表结构引导是幂等的，
    // 避免在 worker 之前启动时回读查询直接报错
    let db = Database::connect(&config.database).await?;
    db.ensure_schema().await?;
    let repository = PredictionRepository::new(db.pool().clone());

    let state = AppState::new(repository);

    // 加载评分模型：失败直接终止启动，就绪状态保持 false
    info!(path = %config.scoring.model_path, "Loading scoring model...");
    let mut engine = ScoringEngine::load(&config.scoring.model_path)
        .with_context(|| format!("加载评分模型失败: {}", config.scoring.model_path))?;
    if let Some(threshold) = config.scoring.threshold {
        engine = engine.with_fraud_threshold(threshold)?;
        info!(threshold, "已应用配置层的欺诈判定阈值覆盖");
    }
    state.install_engine(Arc::new(engine));
    metrics::set_model_loaded(true);
    info!("Scoring model installed");

    // CORS 配置：通过 SENTINEL_CORS_ORIGINS 环境变量控制允许的来源
    // 默认允许本地仪表盘地址，生产环境应设置为实际域名
    let allowed_origins = std::env::var("SENTINEL_CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:8501".to_string());

    let cors = if allowed_origins == "*" {
        if config.is_production() {
            warn!("SENTINEL_CORS_ORIGINS=\"*\" 在生产环境中不安全，请设置为具体域名");
        }
        info!("CORS allowed_origins: * (all origins)");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        info!("CORS allowed_origins: {}", allowed_origins);
        let origins: Vec<_> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = routes::app(state).layer(cors);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：收到 SIGTERM（K8s 停止 Pod）或 Ctrl+C 时，
    // 停止接收新连接并等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    metrics::set_model_loaded(false);
    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
/// 收到任一信号后返回，触发 axum 的优雅关闭流程。
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
