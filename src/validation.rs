// src/validation.rs
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use validator::Validate;
use crate::AppError;

// 先解析 JSON 再跑 validator 校验的组合提取器,
// 所有带 Validate 派生的请求体都走这里
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: Validate + serde::de::DeserializeOwned + 'static,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // JSON 本身非法 (缺括号等) 直接 BadRequest
        let Json(value) = Json::<T>::from_request(req, state).await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

        // 字段级校验失败通过 AppError::ValidationError 自动转换
        value.validate()?;

        Ok(ValidatedJson(value))
    }
}
