//! 推理 API 请求/响应 DTO 定义
//!
//! 线格式保持与管道一致的扁平字段名；Prediction 的两个子结果
//! 在构造响应时被分别显式读取。

use serde::{Deserialize, Serialize};

use sentinel_shared::transaction::{Prediction, Transaction};

/// 单笔评分响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub fraud_probability: f64,
    pub is_fraud: bool,
    pub anomaly_score: f64,
    pub is_anomaly: bool,
    /// 仅评分调用本身的耗时（毫秒），不含传输开销
    pub latency_ms: f64,
    pub model_version: String,
}

impl PredictionResponse {
    /// 由评分结果构造扁平响应
    ///
    /// 监督与无监督两个子结果分别读取，互不推导。
    pub fn from_prediction(
        transaction_id: Option<String>,
        prediction: Prediction,
        latency_ms: f64,
    ) -> Self {
        Self {
            transaction_id,
            fraud_probability: prediction.supervised.fraud_probability,
            is_fraud: prediction.supervised.is_fraud,
            anomaly_score: prediction.unsupervised.anomaly_score,
            is_anomaly: prediction.unsupervised.is_anomaly,
            latency_ms,
            model_version: prediction.model_version,
        }
    }
}

/// 批量评分请求
#[derive(Debug, Clone, Deserialize)]
pub struct BatchPredictRequest {
    pub transactions: Vec<Transaction>,
}

/// 批量评分响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPredictResponse {
    pub predictions: Vec<PredictionResponse>,
    pub total_processed: usize,
    pub total_fraud: usize,
    pub avg_latency_ms: f64,
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub version: String,
}

/// 最近记录查询参数
#[derive(Debug, Clone, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    pub limit: i64,
}

fn default_recent_limit() -> i64 {
    100
}

/// 回读查询的单次上限，防止一次性拖取全表
pub const MAX_RECENT_LIMIT: i64 = 1000;
