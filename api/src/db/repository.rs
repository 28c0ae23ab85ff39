//! Repository Pattern Implementation
//!
//! `Repository` is the storage seam used by the ledger, the mirror worker and
//! the HTTP layer. `Database` (PostgreSQL) implements it in `db/mod.rs`; the
//! in-memory implementation below backs the unit tests.

use async_trait::async_trait;
use anyhow::Result;
use chrono::{DateTime, Utc};

use super::models::{
    BlockchainAddress, ChainJob, NewUser, OnchainTransaction, Transaction, TransactionView, User,
};
use crate::services::ledger::LedgerError;
use crate::types::Amount;

/// 저장소 인터페이스
///
/// 원장 연산(transfer/withdraw/deposit/set_admin)은 잔액 변경, 트랜잭션 기록,
/// outbox job 삽입을 하나의 원자적 단위로 수행해야 함
#[async_trait]
pub trait Repository: Send + Sync {
    async fn health_check(&self) -> Result<()>;

    // ============ Users ============

    async fn find_user(&self, id: i32) -> Result<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn list_users(&self) -> Result<Vec<User>>;

    // ============ Ledger ============

    async fn transfer(
        &self,
        sender_id: i32,
        receiver_id: i32,
        amount: &Amount,
    ) -> Result<Transaction, LedgerError>;

    async fn withdraw(&self, user_id: i32, amount: &Amount) -> Result<Transaction, LedgerError>;

    async fn deposit(&self, user_id: i32, amount: &Amount)
        -> Result<(User, Transaction), LedgerError>;

    /// 관리자 플래그 설정. (갱신된 사용자, 변경 여부) 반환
    async fn set_admin(&self, user_id: i32, is_admin: bool) -> Result<(User, bool), LedgerError>;

    async fn find_transaction(&self, id: i32) -> Result<Option<TransactionView>>;

    /// 사용자가 sender 또는 receiver인 트랜잭션 (최신순)
    async fn transactions_for_user(&self, user_id: i32) -> Result<Vec<TransactionView>>;

    async fn all_transactions(&self) -> Result<Vec<TransactionView>>;

    async fn onchain_transaction(&self, transaction_id: i32) -> Result<Option<OnchainTransaction>>;

    // ============ Blockchain addresses ============

    async fn blockchain_address(&self, user_id: i32) -> Result<Option<BlockchainAddress>>;

    /// 사용자 주소 생성 또는 교체
    async fn upsert_blockchain_address(&self, user_id: i32, address: &str)
        -> Result<BlockchainAddress>;

    /// 다른 사용자가 이미 쓰는 주소인지
    async fn address_owner(&self, address: &str) -> Result<Option<i32>>;

    // ============ Chain outbox ============

    /// 실행 가능한 pending job을 in_flight로 바꾸고 반환 (id 순)
    async fn claim_due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<ChainJob>>;

    /// `older_than` 이전에 마지막으로 갱신된 in_flight job을 pending으로 되돌림
    async fn requeue_in_flight_jobs(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// 처리 결과를 기록하지 못한 in_flight job을 시도 횟수 변경 없이 pending으로
    async fn release_job(&self, job: &ChainJob, next_attempt_at: DateTime<Utc>) -> Result<()>;

    /// 전송된 트랜잭션 해시 기록. `None`이면 다음 시도에서 다시 전송
    async fn set_job_tx_hash(&self, job_id: i64, tx_hash: Option<&str>) -> Result<()>;

    /// 성공: job mirrored, onchain 기록, 트랜잭션 상태 mirrored
    async fn complete_job(&self, job: &ChainJob, tx_hash: &str) -> Result<()>;

    /// 재시도 예약
    async fn reschedule_job(
        &self,
        job: &ChainJob,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()>;

    /// 영구 실패: job failed, 트랜잭션 상태 failed
    async fn fail_job(&self, job: &ChainJob, error: &str) -> Result<()>;

    /// 실패한 트랜잭션 미러링을 다시 pending으로. 해당 job이 없으면 false
    async fn retry_transaction_mirror(&self, transaction_id: i32) -> Result<bool>;

    // ============ Sessions ============

    async fn create_session(
        &self,
        token_hash: &str,
        user_id: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// 만료되지 않은 세션의 사용자
    async fn session_user(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>>;

    async fn delete_session(&self, token_hash: &str) -> Result<()>;

    /// 만료된 세션 삭제, 삭제된 수 반환
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}

// 테스트용 Mock 구현:
