//! 预测结果仓储
//!
//! predictions 表的追加写入与回读查询。写入只追加、从不更新，
//! 因此 Kafka 的重复投递最多产生一条多余的完整记录，不会出现半写状态。

use sqlx::PgPool;
use tracing::instrument;

use crate::error::Result;
use crate::transaction::{Prediction, PredictionRecord, PredictionStats};

/// 预测结果仓储
///
/// 单个消费者进程内假设只有一个写入方；多个消费者实例并发写入
/// 同一张表时 id 顺序与处理顺序不保证一致，这是已知限制。
#[derive(Clone)]
pub struct PredictionRepository {
    pool: PgPool,
}

impl PredictionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 写入操作 ====================

    /// 追加一条预测记录，返回数据库分配的自增 ID
    #[instrument(skip(self, prediction))]
    pub async fn insert(
        &self,
        transaction_id: &str,
        amount: f64,
        prediction: &Prediction,
        latency_ms: f64,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO predictions (
                transaction_id, amount, fraud_probability,
                is_fraud, is_anomaly, anomaly_score, latency_ms
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(transaction_id)
        .bind(amount)
        .bind(prediction.supervised.fraud_probability)
        .bind(prediction.supervised.is_fraud)
        .bind(prediction.unsupervised.is_anomaly)
        .bind(prediction.unsupervised.anomaly_score)
        .bind(latency_ms)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    // ==================== 查询操作 ====================

    /// 最近的 N 条预测记录，按写入顺序倒排
    pub async fn recent(&self, limit: i64) -> Result<Vec<PredictionRecord>> {
        let records = sqlx::query_as::<_, PredictionRecord>(
            r#"
            SELECT id, transaction_id, amount, fraud_probability,
                   is_fraud, is_anomaly, anomaly_score, processing_time, latency_ms
            FROM predictions
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// 聚合统计：总量、欺诈数、平均延迟
    pub async fn stats(&self) -> Result<PredictionStats> {
        let row: (i64, i64, f64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN is_fraud THEN 1 ELSE 0 END), 0),
                COALESCE(AVG(latency_ms), 0.0)
            FROM predictions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PredictionStats {
            total: row.0,
            fraud_count: row.1,
            avg_latency: row.2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::Database;
    use crate::transaction::{AnomalyVerdict, SupervisedVerdict};

    fn make_prediction(is_fraud: bool) -> Prediction {
        Prediction {
            supervised: SupervisedVerdict {
                fraud_probability: if is_fraud { 0.92 } else { 0.03 },
                is_fraud,
            },
            unsupervised: AnomalyVerdict {
                anomaly_score: 0.15,
                is_anomaly: false,
            },
            model_version: "v1-test".to_string(),
        }
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_insert_and_recent() {
        let db = Database::connect(&DatabaseConfig::default()).await.unwrap();
        db.ensure_schema().await.unwrap();
        let repo = PredictionRepository::new(db.pool().clone());

        let prediction = make_prediction(true);
        let id = repo
            .insert("tx-store-test", 99.5, &prediction, 1.25)
            .await
            .unwrap();
        assert!(id > 0);

        let records = repo.recent(10).await.unwrap();
        let inserted = records
            .iter()
            .find(|r| r.id == id)
            .expect("应能查到刚写入的记录");
        assert_eq!(inserted.transaction_id, "tx-store-test");
        assert_eq!(inserted.amount, 99.5);
        assert!(inserted.is_fraud);
        assert_eq!(inserted.latency_ms, 1.25);
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_duplicate_insert_appends_new_row() {
        let db = Database::connect(&DatabaseConfig::default()).await.unwrap();
        db.ensure_schema().await.unwrap();
        let repo = PredictionRepository::new(db.pool().clone());

        // 重复投递的消息写两次：应得到两条独立的完整记录
        let prediction = make_prediction(false);
        let id1 = repo
            .insert("tx-duplicate", 10.0, &prediction, 0.8)
            .await
            .unwrap();
        let id2 = repo
            .insert("tx-duplicate", 10.0, &prediction, 0.8)
            .await
            .unwrap();
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_stats_aggregates() {
        let db = Database::connect(&DatabaseConfig::default()).await.unwrap();
        db.ensure_schema().await.unwrap();
        let repo = PredictionRepository::new(db.pool().clone());

        repo.insert("tx-stats", 50.0, &make_prediction(true), 2.0)
            .await
            .unwrap();

        let stats = repo.stats().await.unwrap();
        assert!(stats.total >= 1);
        assert!(stats.fraud_count >= 1);
        assert!(stats.avg_latency >= 0.0);
    }
}
