//! 推理 API 错误类型定义
//!
//! 错误响应体为 `{code, message}`；系统级错误只返回通用提示，
//! 详细信息仅记录日志，防止内部实现细节泄露。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use sentinel_shared::error::SentinelError;
use sentinel_shared::observability::metrics;

/// 推理 API 错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 评分引擎尚未装入，服务不可用
    #[error("模型尚未加载")]
    ModelNotLoaded,

    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ModelNotLoaded => "MODEL_NOT_LOADED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志；
        // 验证错误不计入引擎错误指标
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                metrics::record_error("api_internal");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                metrics::record_error("api_internal");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::ModelNotLoaded => {
                metrics::record_error("model_not_loaded");
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "code": self.error_code(),
            "message": message
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 从共享错误转换
impl From<SentinelError> for ApiError {
    fn from(err: SentinelError) -> Self {
        match err {
            SentinelError::Database(e) => Self::Database(e),
            SentinelError::Validation(msg) => Self::Validation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, ApiError>;
