//! 交易与预测的共享数据类型
//!
//! 定义整个管道的统一线格式：Transaction（输入）、Prediction（评分结果）
//! 和 PredictionRecord（持久化行）。不同来源对字段大小写的写法不一致
//! （`time` / `Time`、`V1` / `v1`），统一通过 serde 别名归一化；
//! 缺失的特征字段一律默认为 0.0。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 评分特征向量的固定长度：time + V1..V28 + amount
pub const FEATURE_COUNT: usize = 30;

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// 单笔交易
///
/// `transaction_id` 由生产者单调分配，仅作为分区亲和性提示，
/// 不构成唯一性约束。V1..V28 为脱敏后的派生特征分量。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    #[serde(alias = "Time")]
    pub time: f64,

    #[serde(alias = "Amount")]
    #[validate(range(min = 0.0, message = "金额不能为负数"))]
    pub amount: f64,

    #[serde(rename = "V1", alias = "v1", default)]
    pub v1: f64,
    #[serde(rename = "V2", alias = "v2", default)]
    pub v2: f64,
    #[serde(rename = "V3", alias = "v3", default)]
    pub v3: f64,
    #[serde(rename = "V4", alias = "v4", default)]
    pub v4: f64,
    #[serde(rename = "V5", alias = "v5", default)]
    pub v5: f64,
    #[serde(rename = "V6", alias = "v6", default)]
    pub v6: f64,
    #[serde(rename = "V7", alias = "v7", default)]
    pub v7: f64,
    #[serde(rename = "V8", alias = "v8", default)]
    pub v8: f64,
    #[serde(rename = "V9", alias = "v9", default)]
    pub v9: f64,
    #[serde(rename = "V10", alias = "v10", default)]
    pub v10: f64,
    #[serde(rename = "V11", alias = "v11", default)]
    pub v11: f64,
    #[serde(rename = "V12", alias = "v12", default)]
    pub v12: f64,
    #[serde(rename = "V13", alias = "v13", default)]
    pub v13: f64,
    #[serde(rename = "V14", alias = "v14", default)]
    pub v14: f64,
    #[serde(rename = "V15", alias = "v15", default)]
    pub v15: f64,
    #[serde(rename = "V16", alias = "v16", default)]
    pub v16: f64,
    #[serde(rename = "V17", alias = "v17", default)]
    pub v17: f64,
    #[serde(rename = "V18", alias = "v18", default)]
    pub v18: f64,
    #[serde(rename = "V19", alias = "v19", default)]
    pub v19: f64,
    #[serde(rename = "V20", alias = "v20", default)]
    pub v20: f64,
    #[serde(rename = "V21", alias = "v21", default)]
    pub v21: f64,
    #[serde(rename = "V22", alias = "v22", default)]
    pub v22: f64,
    #[serde(rename = "V23", alias = "v23", default)]
    pub v23: f64,
    #[serde(rename = "V24", alias = "v24", default)]
    pub v24: f64,
    #[serde(rename = "V25", alias = "v25", default)]
    pub v25: f64,
    #[serde(rename = "V26", alias = "v26", default)]
    pub v26: f64,
    #[serde(rename = "V27", alias = "v27", default)]
    pub v27: f64,
    #[serde(rename = "V28", alias = "v28", default)]
    pub v28: f64,
}

impl Transaction {
    /// 构造一个除 time 和 amount 外全零的交易
    pub fn with_time_amount(time: f64, amount: f64) -> Self {
        Self {
            transaction_id: None,
            time,
            amount,
            v1: 0.0,
            v2: 0.0,
            v3: 0.0,
            v4: 0.0,
            v5: 0.0,
            v6: 0.0,
            v7: 0.0,
            v8: 0.0,
            v9: 0.0,
            v10: 0.0,
            v11: 0.0,
            v12: 0.0,
            v13: 0.0,
            v14: 0.0,
            v15: 0.0,
            v16: 0.0,
            v17: 0.0,
            v18: 0.0,
            v19: 0.0,
            v20: 0.0,
            v21: 0.0,
            v22: 0.0,
            v23: 0.0,
            v24: 0.0,
            v25: 0.0,
            v26: 0.0,
            v27: 0.0,
            v28: 0.0,
        }
    }

    /// 按模型训练时的固定列序生成特征向量：[time, V1..V28, amount]
    ///
    /// 列序一旦与训练数据不一致，模型输出将完全失真，
    /// 因此集中在此处维护，禁止调用方自行拼装。
    pub fn feature_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.time, self.v1, self.v2, self.v3, self.v4, self.v5, self.v6, self.v7, self.v8,
            self.v9, self.v10, self.v11, self.v12, self.v13, self.v14, self.v15, self.v16,
            self.v17, self.v18, self.v19, self.v20, self.v21, self.v22, self.v23, self.v24,
            self.v25, self.v26, self.v27, self.v28, self.amount,
        ]
    }
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// 监督模型的判定结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupervisedVerdict {
    /// 欺诈概率，始终落在 [0, 1]
    pub fraud_probability: f64,
    pub is_fraud: bool,
}

/// 无监督异常检测的判定结果
///
/// 分数遵循 decision_function 的符号约定：越低越异常，
/// 低于判定阈值视为离群点。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub anomaly_score: f64,
    pub is_anomaly: bool,
}

/// 一次评分调用的完整输出
///
/// 两个子结果来自两个独立的检测器，系统从不尝试将它们合并成
/// 单一结论——调用方需要分别读取两个字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub supervised: SupervisedVerdict,
    pub unsupervised: AnomalyVerdict,
    pub model_version: String,
}

// ---------------------------------------------------------------------------
// 持久化行
// ---------------------------------------------------------------------------

/// predictions 表的一行
///
/// 仅由评分消费者写入（单写者假设），其余组件只读。
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PredictionRecord {
    pub id: i64,
    pub transaction_id: String,
    pub amount: f64,
    pub fraud_probability: f64,
    pub is_fraud: bool,
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    pub processing_time: DateTime<Utc>,
    pub latency_ms: f64,
}

/// predictions 表的聚合统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionStats {
    pub total: i64,
    pub fraud_count: i64,
    pub avg_latency: f64,
}
