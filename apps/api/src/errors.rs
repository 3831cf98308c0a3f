use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cv::patch::PatchError;
use crate::cv::store::StoreError;
use crate::llm_client::retry::FriendlyError;
use crate::llm_client::LlmError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Daily AI quota used up. Serialised as `{ error, dailyLimit }`.
    #[error("Daily limit of {daily_limit} AI requests reached")]
    QuotaExceeded { daily_limit: i32 },

    /// Model answered, but not with JSON we could recover.
    #[error("Upstream returned invalid JSON: {0}")]
    UpstreamJson(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("S3 error: {0}")]
    S3(String),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
                "Invalid signature".to_string(),
            ),
            AppError::QuotaExceeded { daily_limit } => {
                let body = Json(json!({
                    "error": "Limite diário de uso da IA atingido",
                    "dailyLimit": daily_limit,
                }));
                return (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            }
            AppError::UpstreamJson(msg) => {
                tracing::warn!("Upstream JSON failure: {msg}");
                let body = Json(json!({
                    "error": "Resposta da IA em formato inválido",
                    "detail": cfg!(debug_assertions).then(|| msg.clone()),
                }));
                return (StatusCode::BAD_GATEWAY, body).into_response();
            }
            AppError::Patch(e) => (StatusCode::UNPROCESSABLE_ENTITY, "PATCH_ERROR", e.to_string()),
            AppError::Store(e) => (StatusCode::UNPROCESSABLE_ENTITY, "STORE_ERROR", e.to_string()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Llm(e) => {
                tracing::error!("LLM error: {e}");
                let friendly = FriendlyError::from_error(e);
                let body = Json(json!({
                    "error": {
                        "code": "LLM_ERROR",
                        "kind": friendly.kind,
                        "message": friendly.message,
                        "detail": friendly.detail,
                    }
                }));
                return (StatusCode::BAD_GATEWAY, body).into_response();
            }
            AppError::S3(msg) => {
                tracing::error!("S3 error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "S3_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_quota_exceeded_shape() {
        let response = AppError::QuotaExceeded { daily_limit: 5 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["dailyLimit"], 5);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_upstream_json_is_bad_gateway() {
        let response = AppError::UpstreamJson("not valid JSON".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_validation_envelope() {
        let response = AppError::Validation("campo ausente".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "campo ausente");
    }

    #[tokio::test]
    async fn test_llm_error_carries_friendly_message() {
        let err = AppError::Llm(LlmError::Api {
            status: 503,
            message: "overloaded".into(),
        });
        let body = body_json(err.into_response()).await;
        assert_eq!(body["error"]["kind"], "API");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("O serviço de IA"));
    }
}
