//! 路由定义
//!
//! 组装所有端点并挂载可观测性中间件。

use axum::{
    Router, middleware,
    routing::{get, post},
};

use sentinel_shared::observability::middleware as obs_middleware;

use crate::handlers;
use crate::state::AppState;

/// 构建完整的应用路由
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/predict", post(handlers::predict))
        .route("/batch_predict", post(handlers::batch_predict))
        .route("/predictions/recent", get(handlers::recent_predictions))
        .route("/stats", get(handlers::stats))
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
