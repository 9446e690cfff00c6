// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // 指派台账专用: 同一 (用户, 日期, 模板) 重复指派
    #[error("Already assigned: {0}")]
    AlreadyAssigned(String),

    // 指派台账专用: 取消一个不存在的指派
    #[error("Not assigned: {0}")]
    NotAssigned(String),

    #[error("Internal server error")]
    Internal,

    #[error("Validation error: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

// 核心逻辑：将我们的错误转换为 HTTP 响应
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                // 后台记录详细错误
                tracing::error!("Database Error: {:?}", e);

                // 对外根据具体情况返回信息
                if e.to_string().contains("duplicate key") {
                    (StatusCode::CONFLICT, "Record already exists".to_string())
                } else {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Database operation failed".to_string(),
                    )
                }
            },
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            // 前端把这两类当作可恢复状态处理 (刷新后重取), 不算致命错误
            AppError::AlreadyAssigned(msg) => (StatusCode::CONFLICT, msg),
            AppError::NotAssigned(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            AppError::ValidationError(ref e) => {
                // 将复杂的校验错误对象转为简单易读的字符串
                (StatusCode::BAD_REQUEST, format!("输入参数有误: {}", e))
            },
        };

        let body = Json(json!({
            "status": "error",
            "message": error_message,
        }));

        (status, body).into_response()
    }
}
