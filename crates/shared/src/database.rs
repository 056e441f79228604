//! 数据库连接管理模块
//!
//! 提供 PostgreSQL 连接池管理，支持健康检查和表结构引导。

use crate::config::DatabaseConfig;
use crate::error::{Result, SentinelError};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// 数据库连接池包装
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 创建数据库连接池
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!("Database connection pool created");

        Ok(Self { pool })
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(SentinelError::from)
    }

    /// 引导 predictions 表结构
    ///
    /// DDL 幂等，worker 与 API 启动时都可以安全调用。
    /// id 自增与 processing_time 默认值由数据库侧分配，
    /// 保证重复投递只会追加新行而不会破坏既有记录。
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id BIGSERIAL PRIMARY KEY,
                transaction_id TEXT NOT NULL,
                amount DOUBLE PRECISION NOT NULL,
                fraud_probability DOUBLE PRECISION NOT NULL,
                is_fraud BOOLEAN NOT NULL,
                is_anomaly BOOLEAN NOT NULL,
                anomaly_score DOUBLE PRECISION NOT NULL,
                processing_time TIMESTAMPTZ NOT NULL DEFAULT now(),
                latency_ms DOUBLE PRECISION NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("predictions 表结构已就绪");
        Ok(())
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

impl std::ops::Deref for Database {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
