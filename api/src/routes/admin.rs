//! Admin Endpoints
//!
//! 입금/역할 변경은 원장과 같은 outbox를 통해 비동기로 온체인에 반영.
//! 토큰 직접 조작(transfer-tokens, burn-tokens)은 오프체인 상태가 없으므로
//! timeout 안에서 동기 호출 후 확정된 tx hash 반환

use std::future::Future;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{BlockchainAddress, Transaction, TransactionView, User};
use crate::error::ApiError;
use crate::routes::auth::AdminUser;
use crate::services::contract::{parse_address, to_token_units, ChainError};
use crate::types::{Amount, EthAddress};
use crate::AppState;

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterBalanceRequest {
    pub user_id: i32,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdRequest {
    pub user_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct TransferTokensRequest {
    pub from: String,
    pub to: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct BurnTokensRequest {
    pub from: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainAddressRequest {
    pub user_id: i32,
    pub address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub updated_user: User,
    pub transaction: Transaction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub updated_user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHashResponse {
    pub tx_hash: String,
}

#[derive(Debug, Serialize)]
pub struct RetryMirrorResponse {
    pub transaction: TransactionView,
}

// ============ Helpers ============

/// 대상 사용자 존재 + 체인 주소 확인
///
/// 주소 없는 사용자의 job은 반드시 실패하므로 원장 변경 전에 거절
async fn require_user_with_address(state: &AppState, user_id: i32) -> Result<User, ApiError> {
    let user = state
        .repo
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))?;
    if state.repo.blockchain_address(user_id).await?.is_none() {
        return Err(ApiError::MissingBlockchainAddress(user_id));
    }
    Ok(user)
}

fn chain_address(raw: &str) -> Result<ethers::types::Address, ApiError> {
    let address = EthAddress::new(raw).map_err(ApiError::ValidationError)?;
    Ok(parse_address(address.as_str())?)
}

/// 전송 + 확정 대기 전체에 timeout 적용
async fn send_and_confirm<F>(state: &AppState, send: F) -> Result<String, ApiError>
where
    F: Future<Output = Result<String, ChainError>>,
{
    let secs = state.config.mirror.call_timeout_secs;
    let call = async {
        let tx_hash = send.await?;
        state.contract.confirm(&tx_hash).await
    };
    match tokio::time::timeout(Duration::from_secs(secs), call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ChainError::Timeout(secs).into()),
    }
}

// ============ Handlers ============

/// POST /api/admin/master-balance
///
/// 잔액 추가 + deposit 거래 기록, mintTo는 outbox로
pub async fn master_balance(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<MasterBalanceRequest>, JsonRejection>,
) -> Result<Json<DepositResponse>, ApiError> {
    let Json(req) = payload?;
    let amount = Amount::parse(&req.amount)?;
    require_user_with_address(&state, req.user_id).await?;

    let (updated_user, transaction) = state.ledger.deposit(req.user_id, &amount).await?;
    tracing::info!(admin_id = admin.id, user_id = req.user_id, amount = %amount, "funds added");

    Ok(Json(DepositResponse {
        updated_user,
        transaction,
    }))
}

/// POST /api/admin/promote-user
pub async fn promote_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<UserIdRequest>, JsonRejection>,
) -> Result<Json<RoleResponse>, ApiError> {
    let Json(req) = payload?;
    require_user_with_address(&state, req.user_id).await?;

    let updated_user = state.ledger.promote(req.user_id).await?;
    tracing::info!(admin_id = admin.id, user_id = req.user_id, "user promoted");
    Ok(Json(RoleResponse { updated_user }))
}

/// POST /api/admin/demote-user
pub async fn demote_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<UserIdRequest>, JsonRejection>,
) -> Result<Json<RoleResponse>, ApiError> {
    let Json(req) = payload?;
    require_user_with_address(&state, req.user_id).await?;

    let updated_user = state.ledger.demote(req.user_id).await?;
    tracing::info!(admin_id = admin.id, user_id = req.user_id, "user demoted");
    Ok(Json(RoleResponse { updated_user }))
}

/// POST /api/admin/transfer-tokens
pub async fn transfer_tokens(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<TransferTokensRequest>, JsonRejection>,
) -> Result<Json<TxHashResponse>, ApiError> {
    let Json(req) = payload?;
    let from = chain_address(&req.from)?;
    let to = chain_address(&req.to)?;
    let amount = Amount::parse(&req.amount)?;
    let units = to_token_units(&amount.to_string())?;

    let tx_hash = send_and_confirm(
        &state,
        state.contract.transfer_from_user_to_user(from, to, units),
    )
    .await?;
    tracing::info!(admin_id = admin.id, %tx_hash, "admin token transfer confirmed");
    Ok(Json(TxHashResponse { tx_hash }))
}

/// POST /api/admin/burn-tokens
pub async fn burn_tokens(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<BurnTokensRequest>, JsonRejection>,
) -> Result<Json<TxHashResponse>, ApiError> {
    let Json(req) = payload?;
    let from = chain_address(&req.from)?;
    let amount = Amount::parse(&req.amount)?;
    let units = to_token_units(&amount.to_string())?;

    let tx_hash = send_and_confirm(&state, state.contract.admin_burn(from, units)).await?;
    tracing::info!(admin_id = admin.id, %tx_hash, "admin token burn confirmed");
    Ok(Json(TxHashResponse { tx_hash }))
}

/// POST /api/admin/blockchain-address
///
/// 사용자 주소 지정 또는 교체. 다른 사용자의 주소면 409
pub async fn set_blockchain_address(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<BlockchainAddressRequest>, JsonRejection>,
) -> Result<Json<BlockchainAddress>, ApiError> {
    let Json(req) = payload?;
    let address = EthAddress::new(&req.address).map_err(ApiError::ValidationError)?;

    if state.repo.find_user(req.user_id).await?.is_none() {
        return Err(ApiError::NotFound("User".to_string()));
    }
    match state.repo.address_owner(address.as_str()).await? {
        Some(owner) if owner != req.user_id => {
            return Err(ApiError::Conflict(
                "address is assigned to another user".to_string(),
            ));
        }
        _ => {}
    }

    let record = state
        .repo
        .upsert_blockchain_address(req.user_id, address.as_str())
        .await?;
    tracing::info!(admin_id = admin.id, user_id = req.user_id, address = %address, "blockchain address assigned");
    Ok(Json(record))
}

/// POST /api/admin/transactions/:id/retry-mirror
///
/// failed 상태의 미러링 job을 다시 pending으로
pub async fn retry_mirror(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
) -> Result<Json<RetryMirrorResponse>, ApiError> {
    if state.repo.find_transaction(id).await?.is_none() {
        return Err(ApiError::NotFound("Transaction".to_string()));
    }
    if !state.repo.retry_transaction_mirror(id).await? {
        return Err(ApiError::Conflict(
            "transaction mirror has not failed".to_string(),
        ));
    }
    state.mirror.wake();
    tracing::info!(admin_id = admin.id, transaction_id = id, "mirror requeued");

    let transaction = state
        .repo
        .find_transaction(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".to_string()))?;
    Ok(Json(RetryMirrorResponse { transaction }))
}
