//! 推理 API 服务
//!
//! 面向低延迟请求/响应场景的 HTTP 评分服务：单笔与批量评分、
//! 健康检查、指标导出，以及预测存储的回读查询。

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;
