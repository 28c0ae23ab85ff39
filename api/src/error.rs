//! Error Handling Module
//!
//! Provides type-safe error handling with proper HTTP status code mapping.
//! Uses thiserror for domain errors and integrates with tracing for structured logging.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::contract::ChainError;
use crate::services::ledger::LedgerError;
use crate::types::AmountError;

/// API 에러 타입
///
/// 각 variant는 HTTP 상태 코드 하나에 매핑됨.
/// 5xx 에러의 내부 정보는 로그에만 남기고 응답에는 포함하지 않음
#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 Bad Request ============
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("User {0} does not have a blockchain address")]
    MissingBlockchainAddress(i32),

    // ============ 401 Unauthorized ============
    #[error("Authentication required")]
    Unauthenticated,

    // ============ 403 Forbidden ============
    #[error("Admin privileges required")]
    Unauthorized,

    // ============ 404 Not Found ============
    #[error("Resource not found: {0}")]
    NotFound(String),

    // ============ 409 Conflict ============
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ 502 Bad Gateway ============
    #[error("Blockchain call failed: {0}")]
    ChainCallFailed(String),

    // ============ 500 Internal Server Error ============
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    InternalError,
}

/// API 에러 응답 구조
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_)
            | ApiError::InsufficientFunds
            | ApiError::MissingBlockchainAddress(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ChainCallFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::DatabaseError(_) | ApiError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message, details) = match &self {
            // 4xx 클라이언트 에러
            ApiError::ValidationError(msg) => (
                "VALIDATION_ERROR",
                "Validation failed".to_string(),
                Some(msg.clone()),
            ),
            ApiError::InsufficientFunds => {
                ("INSUFFICIENT_FUNDS", "Insufficient funds".to_string(), None)
            }
            ApiError::MissingBlockchainAddress(_) => (
                "MISSING_BLOCKCHAIN_ADDRESS",
                "User does not have a blockchain address".to_string(),
                None,
            ),
            ApiError::Unauthenticated => (
                "UNAUTHENTICATED",
                "Authentication required".to_string(),
                None,
            ),
            ApiError::Unauthorized => (
                "UNAUTHORIZED",
                "Admin privileges required".to_string(),
                None,
            ),
            ApiError::NotFound(resource) => {
                ("NOT_FOUND", format!("{} not found", resource), None)
            }
            ApiError::Conflict(msg) => ("CONFLICT", msg.clone(), None),

            // 5xx 서버 에러
            ApiError::ChainCallFailed(msg) => {
                // RPC 에러 원문은 로그에만
                tracing::error!("Chain call failed: {}", msg);
                (
                    "CHAIN_CALL_FAILED",
                    "Blockchain call failed".to_string(),
                    None,
                )
            }
            ApiError::DatabaseError(_) => {
                // 내부 에러는 클라이언트에 상세 정보 노출 안 함
                tracing::error!("Database error: {:?}", self);
                (
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                    None,
                )
            }
            ApiError::InternalError => {
                tracing::error!("Internal error: {:?}", self);
                (
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (self.status(), Json(body)).into_response()
    }
}

/// SQLx 에러를 ApiError로 변환
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("SQLx error: {:?}", err);
        ApiError::DatabaseError(err.to_string())
    }
}

/// anyhow 에러를 ApiError로 변환
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {:?}", err);
        ApiError::InternalError
    }
}

/// 잘못된 JSON body는 422 대신 400
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::ValidationError(rejection.body_text())
    }
}

impl From<AmountError> for ApiError {
    fn from(err: AmountError) -> Self {
        ApiError::ValidationError(format!("amount: {err}"))
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UserNotFound(_) => ApiError::NotFound("User".to_string()),
            LedgerError::RecipientNotFound(_) => ApiError::NotFound("Recipient".to_string()),
            LedgerError::InsufficientFunds => ApiError::InsufficientFunds,
            LedgerError::Invalid(msg) => ApiError::ValidationError(msg),
            LedgerError::CorruptBalance { .. } => {
                tracing::error!("{}", err);
                ApiError::InternalError
            }
            LedgerError::Database(e) => e.into(),
        }
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::InvalidAddress(_) | ChainError::InvalidAmount(_) => {
                ApiError::ValidationError(err.to_string())
            }
            other => ApiError::ChainCallFailed(other.to_string()),
        }
    }
}
