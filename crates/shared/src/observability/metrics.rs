//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 每个进程安装唯一的 recorder；生产者和消费者通过独立端口暴露指标，
//! 推理 API 通过全局 handle 在自身路由上渲染。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: Option<tokio::task::JoinHandle<()>>,
}

/// 初始化 Prometheus 指标导出
///
/// 安装全局 recorder；配置了 metrics_port 时额外启动一个
/// 独立的 HTTP 服务器暴露 `/metrics` 端点，供 Prometheus 抓取。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    // 保存到全局，供推理 API 的 /metrics 路由渲染
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let server_handle = match config.metrics_port {
        Some(port) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            Some(start_metrics_server(addr, handle).await?)
        }
        None => None,
    };

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标（预定义的业务指标）
fn register_common_metrics(service_name: &str) {
    // 指标描述会出现在 /metrics 端点的 HELP 注释中

    metrics::describe_counter!(
        "sentinel_predictions_total",
        "Total number of predictions made"
    );
    metrics::describe_histogram!(
        "sentinel_prediction_latency_seconds",
        "Latency of scoring calls in seconds"
    );

    metrics::describe_counter!("sentinel_errors_total", "Total number of errors");

    metrics::describe_counter!(
        "sentinel_messages_produced_total",
        "Total number of transactions published to the broker"
    );
    metrics::describe_counter!(
        "sentinel_messages_consumed_total",
        "Total number of transactions consumed from the broker"
    );

    metrics::describe_gauge!(
        "sentinel_model_loaded",
        "Whether the scoring model is loaded (1) or not (0)"
    );

    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次评分结果与耗时
#[inline]
pub fn record_prediction(is_fraud: bool, duration_secs: f64) {
    let result = if is_fraud { "fraud" } else { "legitimate" };
    metrics::counter!(
        "sentinel_predictions_total",
        "result" => result
    )
    .increment(1);

    metrics::histogram!("sentinel_prediction_latency_seconds").record(duration_secs);
}

/// 记录一次错误
#[inline]
pub fn record_error(kind: &str) {
    metrics::counter!(
        "sentinel_errors_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// 记录一条发布到 broker 的消息
#[inline]
pub fn record_message_produced(topic: &str) {
    metrics::counter!(
        "sentinel_messages_produced_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// 记录一条从 broker 消费的消息
#[inline]
pub fn record_message_consumed(topic: &str) {
    metrics::counter!(
        "sentinel_messages_consumed_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// 更新模型加载状态
#[inline]
pub fn set_model_loaded(loaded: bool) {
    metrics::gauge!("sentinel_model_loaded").set(if loaded { 1.0 } else { 0.0 });
}

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_prediction(true, 0.002);
        record_prediction(false, 0.001);
        record_error("publish");
        record_message_produced("sentinel.transactions");
        record_message_consumed("sentinel.transactions");
        set_model_loaded(true);
        set_model_loaded(false);
        record_http_request("POST", "/predict", 200, 0.01);
    }
}
