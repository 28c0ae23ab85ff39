//! Ledger Endpoints
//!
//! 송금/출금은 오프체인 원장 커밋 직후 응답 (mirrorStatus = pending).
//! 온체인 반영 결과는 트랜잭션 조회의 `mirrorStatus`, `txHash`로 확인

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{Transaction, TransactionView};
use crate::error::ApiError;
use crate::routes::auth::AuthUser;
use crate::types::Amount;
use crate::AppState;

// ============ Request/Response Types ============

/// 송금 요청
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub receiver_id: i32,
    /// 10진수 문자열 ("40.00")
    pub amount: String,
}

/// 출금 요청
#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction: Transaction,
}

// ============ Handlers ============

/// GET /api/transactions
///
/// 본인이 sender 또는 receiver인 거래, 최신순
pub async fn list_own(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<TransactionView>>, ApiError> {
    Ok(Json(state.repo.transactions_for_user(user.id).await?))
}

/// GET /api/transactions/:id
///
/// 거래 당사자 또는 관리자만 조회 가능
pub async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<TransactionView>, ApiError> {
    let transaction = state
        .repo
        .find_transaction(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".to_string()))?;

    let is_party = transaction.sender_id == user.id || transaction.receiver_id == user.id;
    if !is_party && !user.is_admin {
        return Err(ApiError::Unauthorized);
    }
    Ok(Json(transaction))
}

/// GET /api/all-transactions
pub async fn list_all(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> Result<Json<Vec<TransactionView>>, ApiError> {
    Ok(Json(state.repo.all_transactions().await?))
}

/// POST /api/transfer
pub async fn transfer(
    State(state): State<AppState>,
    AuthUser(sender): AuthUser,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let Json(req) = payload?;
    let amount = Amount::parse(&req.amount)?;

    let transaction = state
        .ledger
        .transfer(sender.id, req.receiver_id, &amount)
        .await?;
    Ok(Json(TransactionResponse { transaction }))
}

/// POST /api/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let Json(req) = payload?;
    let amount = Amount::parse(&req.amount)?;

    let transaction = state.ledger.withdraw(user.id, &amount).await?;
    Ok(Json(TransactionResponse { transaction }))
}
