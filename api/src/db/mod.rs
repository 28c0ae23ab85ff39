//! Database Module
//!
//! PostgreSQL implementation of [`Repository`].
//!
//! # Ledger transactions
//!
//! 원장 연산은 하나의 DB 트랜잭션 안에서
//! 1. 관련 user row를 id 오름차순으로 `SELECT ... FOR UPDATE`
//! 2. 잔액 검증 및 갱신
//! 3. transactions row 삽입
//! 4. chain_jobs (outbox) row 삽입
//! 을 수행하고 커밋함. 동일 계정에 대한 동시 요청은 row lock에서 직렬화됨.
//!
//! 모든 쿼리는 파라미터 바인딩 사용

mod models;
mod repository;

pub use models::*;
pub use repository::Repository;

#[cfg(test)]
pub use repository::mock;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool};

use crate::services::ledger::{credit, debit, format_balance, parse_balance, LedgerError};
use crate::types::Amount;

/// 트랜잭션 목록 조회 공통 SELECT (이름, 온체인 해시 조인)
const TRANSACTION_VIEW_SELECT: &str = r#"
    SELECT
        t.id,
        t.sender_id,
        t.receiver_id,
        s.full_name AS sender_name,
        r.full_name AS receiver_name,
        t.amount,
        t.timestamp,
        t.type,
        t.mirror_status,
        o.tx_hash
    FROM transactions t
    LEFT JOIN users s ON t.sender_id = s.id
    LEFT JOIN users r ON t.receiver_id = r.id
    LEFT JOIN onchain_transactions o ON o.transaction_id = t.id
"#;

const TRANSACTION_COLUMNS: &str =
    "id, sender_id, receiver_id, amount, timestamp, type, mirror_status";

const USER_COLUMNS: &str =
    "id, username, password, email, full_name, department, is_admin, balance";

/// 데이터베이스 연결 및 쿼리 담당
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10
    /// - min_connections: 1
    /// - acquire_timeout: 3초
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// ============ Transaction helpers ============

/// 관련 사용자 row 잠금 후 (id → balance) 반환
async fn lock_balances(
    conn: &mut PgConnection,
    ids: &[i32],
) -> Result<HashMap<i32, String>, LedgerError> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let rows: Vec<(i32, String)> = sqlx::query_as(
        "SELECT id, balance FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&sorted)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}

async fn store_balance(
    conn: &mut PgConnection,
    user_id: i32,
    balance: &str,
) -> Result<User, LedgerError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET balance = $1 WHERE id = $2 RETURNING {USER_COLUMNS}"
    ))
    .bind(balance)
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    Ok(user)
}

async fn insert_transaction(
    conn: &mut PgConnection,
    sender_id: i32,
    receiver_id: i32,
    amount: &Amount,
    kind: TransactionKind,
) -> Result<Transaction, LedgerError> {
    let transaction = sqlx::query_as::<_, Transaction>(&format!(
        r#"
        INSERT INTO transactions (sender_id, receiver_id, amount, type, mirror_status)
        VALUES ($1, $2, $3, $4, 'pending')
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(sender_id)
    .bind(receiver_id)
    .bind(amount.to_string())
    .bind(kind.as_str())
    .fetch_one(&mut *conn)
    .await?;

    enqueue_job(conn, &NewChainJob::for_transaction(&transaction)).await?;
    Ok(transaction)
}

async fn enqueue_job(conn: &mut PgConnection, job: &NewChainJob) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO chain_jobs (kind, transaction_id, user_id, counterparty_id, amount)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(job.kind.as_str())
    .bind(job.transaction_id)
    .bind(job.user_id)
    .bind(job.counterparty_id)
    .bind(&job.amount)
    .execute(conn)
    .await?;
    Ok(())
}

async fn set_mirror_status(
    conn: &mut PgConnection,
    transaction_id: Option<i32>,
    status: MirrorStatus,
) -> Result<(), sqlx::Error> {
    if let Some(id) = transaction_id {
        sqlx::query("UPDATE transactions SET mirror_status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl Repository for Database {
    /// Health check
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, id: i32) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, password, email, full_name, department, is_admin, balance)
            VALUES ($1, $2, $3, $4, $5, $6, '0')
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.department)
        .bind(user.is_admin)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn transfer(
        &self,
        sender_id: i32,
        receiver_id: i32,
        amount: &Amount,
    ) -> Result<Transaction, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let balances = lock_balances(&mut tx, &[sender_id, receiver_id]).await?;
        let sender_raw = balances
            .get(&sender_id)
            .ok_or(LedgerError::UserNotFound(sender_id))?;
        let receiver_raw = balances
            .get(&receiver_id)
            .ok_or(LedgerError::RecipientNotFound(receiver_id))?;

        let sender_balance = debit(&parse_balance(sender_id, sender_raw)?, amount)?;
        let receiver_balance = credit(&parse_balance(receiver_id, receiver_raw)?, amount);

        store_balance(&mut tx, sender_id, &format_balance(&sender_balance)).await?;
        store_balance(&mut tx, receiver_id, &format_balance(&receiver_balance)).await?;
        let transaction = insert_transaction(
            &mut tx,
            sender_id,
            receiver_id,
            amount,
            TransactionKind::Transfer,
        )
        .await?;

        tx.commit().await?;
        Ok(transaction)
    }

    async fn withdraw(&self, user_id: i32, amount: &Amount) -> Result<Transaction, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let balances = lock_balances(&mut tx, &[user_id]).await?;
        let raw = balances
            .get(&user_id)
            .ok_or(LedgerError::UserNotFound(user_id))?;
        let balance = debit(&parse_balance(user_id, raw)?, amount)?;

        store_balance(&mut tx, user_id, &format_balance(&balance)).await?;
        let transaction =
            insert_transaction(&mut tx, user_id, user_id, amount, TransactionKind::Withdrawal)
                .await?;

        tx.commit().await?;
        Ok(transaction)
    }

    async fn deposit(
        &self,
        user_id: i32,
        amount: &Amount,
    ) -> Result<(User, Transaction), LedgerError> {
        let mut tx = self.pool.begin().await?;

        let balances = lock_balances(&mut tx, &[user_id]).await?;
        let raw = balances
            .get(&user_id)
            .ok_or(LedgerError::UserNotFound(user_id))?;
        let balance = credit(&parse_balance(user_id, raw)?, amount);

        let user = store_balance(&mut tx, user_id, &format_balance(&balance)).await?;
        let transaction =
            insert_transaction(&mut tx, user_id, user_id, amount, TransactionKind::Deposit)
                .await?;

        tx.commit().await?;
        Ok((user, transaction))
    }

    async fn set_admin(&self, user_id: i32, is_admin: bool) -> Result<(User, bool), LedgerError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(bool,)> =
            sqlx::query_as("SELECT is_admin FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (was_admin,) = current.ok_or(LedgerError::UserNotFound(user_id))?;

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET is_admin = $1 WHERE id = $2 RETURNING {USER_COLUMNS}"
        ))
        .bind(is_admin)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let changed = was_admin != is_admin;
        if changed {
            enqueue_job(&mut tx, &NewChainJob::for_role_change(user_id, is_admin)).await?;
        }

        tx.commit().await?;
        Ok((user, changed))
    }

    async fn find_transaction(&self, id: i32) -> Result<Option<TransactionView>> {
        let view = sqlx::query_as::<_, TransactionView>(&format!(
            "{TRANSACTION_VIEW_SELECT} WHERE t.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(view)
    }

    async fn transactions_for_user(&self, user_id: i32) -> Result<Vec<TransactionView>> {
        let views = sqlx::query_as::<_, TransactionView>(&format!(
            r#"
            {TRANSACTION_VIEW_SELECT}
            WHERE t.sender_id = $1 OR t.receiver_id = $1
            ORDER BY t.timestamp DESC, t.id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(views)
    }

    async fn all_transactions(&self) -> Result<Vec<TransactionView>> {
        let views = sqlx::query_as::<_, TransactionView>(&format!(
            "{TRANSACTION_VIEW_SELECT} ORDER BY t.timestamp DESC, t.id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(views)
    }

    async fn onchain_transaction(&self, transaction_id: i32) -> Result<Option<OnchainTransaction>> {
        let record = sqlx::query_as::<_, OnchainTransaction>(
            r#"
            SELECT id, transaction_id, tx_hash, on_chain, created_at
            FROM onchain_transactions
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn blockchain_address(&self, user_id: i32) -> Result<Option<BlockchainAddress>> {
        let record = sqlx::query_as::<_, BlockchainAddress>(
            r#"
            SELECT id, user_id, block_address, created_at
            FROM blockchain_addresses
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert_blockchain_address(
        &self,
        user_id: i32,
        address: &str,
    ) -> Result<BlockchainAddress> {
        let record = sqlx::query_as::<_, BlockchainAddress>(
            r#"
            INSERT INTO blockchain_addresses (user_id, block_address, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET block_address = EXCLUDED.block_address
            RETURNING id, user_id, block_address, created_at
            "#,
        )
        .bind(user_id)
        .bind(address)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn address_owner(&self, address: &str) -> Result<Option<i32>> {
        let owner: Option<(i32,)> =
            sqlx::query_as("SELECT user_id FROM blockchain_addresses WHERE block_address = $1")
                .bind(address)
                .fetch_optional(&self.pool)
                .await?;
        Ok(owner.map(|(id,)| id))
    }

    async fn claim_due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<ChainJob>> {
        // 여러 인스턴스가 동시에 claim해도 같은 job을 가져가지 않음
        let jobs = sqlx::query_as::<_, ChainJob>(
            r#"
            WITH due AS (
                SELECT id FROM chain_jobs
                WHERE status = 'pending' AND next_attempt_at <= $1
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE chain_jobs j
            SET status = 'in_flight', updated_at = NOW()
            FROM due
            WHERE j.id = due.id
            RETURNING j.id, j.kind, j.transaction_id, j.user_id, j.counterparty_id, j.amount,
                      j.status, j.attempts, j.last_error, j.next_attempt_at, j.tx_hash,
                      j.created_at, j.updated_at
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = jobs;
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn requeue_in_flight_jobs(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE chain_jobs SET status = 'pending', updated_at = NOW()
            WHERE status = 'in_flight' AND updated_at <= $1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn release_job(&self, job: &ChainJob, next_attempt_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE chain_jobs SET status = 'pending', next_attempt_at = $1, updated_at = NOW()
            WHERE id = $2 AND status = 'in_flight'
            "#,
        )
        .bind(next_attempt_at)
        .bind(job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_job_tx_hash(&self, job_id: i64, tx_hash: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE chain_jobs SET tx_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(tx_hash)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete_job(&self, job: &ChainJob, tx_hash: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE chain_jobs
            SET status = 'mirrored', tx_hash = $1, attempts = attempts + 1,
                last_error = NULL, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(tx_hash)
        .bind(job.id)
        .execute(&mut *tx)
        .await?;

        if let Some(transaction_id) = job.transaction_id {
            sqlx::query(
                r#"
                INSERT INTO onchain_transactions (transaction_id, tx_hash, on_chain, created_at)
                VALUES ($1, $2, TRUE, NOW())
                ON CONFLICT (transaction_id) DO UPDATE SET tx_hash = EXCLUDED.tx_hash
                "#,
            )
            .bind(transaction_id)
            .bind(tx_hash)
            .execute(&mut *tx)
            .await?;
        }
        set_mirror_status(&mut tx, job.transaction_id, MirrorStatus::Mirrored).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn reschedule_job(
        &self,
        job: &ChainJob,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE chain_jobs
            SET status = 'pending', attempts = attempts + 1, last_error = $1,
                next_attempt_at = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(error)
        .bind(next_attempt_at)
        .bind(job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_job(&self, job: &ChainJob, error: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE chain_jobs
            SET status = 'failed', attempts = attempts + 1, last_error = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(job.id)
        .execute(&mut *tx)
        .await?;
        set_mirror_status(&mut tx, job.transaction_id, MirrorStatus::Failed).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn retry_transaction_mirror(&self, transaction_id: i32) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE chain_jobs
            SET status = 'pending', attempts = 0, next_attempt_at = NOW(), updated_at = NOW()
            WHERE transaction_id = $1 AND status = 'failed'
            "#,
        )
        .bind(transaction_id)
        .execute(&mut *tx)
        .await?;

        let requeued = result.rows_affected() > 0;
        if requeued {
            set_mirror_status(&mut tx, Some(transaction_id), MirrorStatus::Pending).await?;
        }

        tx.commit().await?;
        Ok(requeued)
    }

    async fn create_session(
        &self,
        token_hash: &str,
        user_id: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn session_user(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.password, u.email, u.full_name, u.department,
                   u.is_admin, u.balance
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = $1 AND s.expires_at > $2
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn delete_session(&self, token_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
