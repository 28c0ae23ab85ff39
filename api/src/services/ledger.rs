//! Ledger Service
//!
//! Applies balance mutations, the append-only transaction row and the chain
//! outbox job as one unit, then wakes the mirror worker.
//!
//! # Locking
//!
//! 잔액 read-modify-write는 저장소 구현이 계정 단위로 직렬화함
//! - PostgreSQL: 관련 user row를 id 오름차순으로 `FOR UPDATE`
//! - 테스트용 메모리 저장소: 단일 mutex

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use thiserror::Error;

use crate::db::{Repository, Transaction, User};
use crate::services::mirror::MirrorHandle;
use crate::types::Amount;

/// 원장 에러
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("user {0} not found")]
    UserNotFound(i32),

    #[error("recipient {0} not found")]
    RecipientNotFound(i32),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("invalid operation: {0}")]
    Invalid(String),

    #[error("stored balance of user {user_id} is not a decimal: {value}")]
    CorruptBalance { user_id: i32, value: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

// ============ Balance arithmetic ============

/// 저장된 잔액 문자열 파싱
pub fn parse_balance(user_id: i32, raw: &str) -> Result<BigDecimal, LedgerError> {
    BigDecimal::from_str(raw).map_err(|_| LedgerError::CorruptBalance {
        user_id,
        value: raw.to_string(),
    })
}

/// 출금 후 잔액. 잔액 < 금액이면 `InsufficientFunds`
pub fn debit(balance: &BigDecimal, amount: &Amount) -> Result<BigDecimal, LedgerError> {
    if balance < amount.as_decimal() {
        return Err(LedgerError::InsufficientFunds);
    }
    let next = balance - amount.as_decimal();
    debug_assert!(next >= BigDecimal::zero());
    Ok(next)
}

pub fn credit(balance: &BigDecimal, amount: &Amount) -> BigDecimal {
    balance + amount.as_decimal()
}

/// 잔액 저장 형식 (소수점 정확히 2자리, 0도 "0.00")
///
/// `BigDecimal`의 Display는 0을 scale과 무관하게 "0"으로 출력하므로 직접 조립
pub fn format_balance(balance: &BigDecimal) -> String {
    let (digits, _) = balance
        .with_scale_round(Amount::SCALE, RoundingMode::HalfEven)
        .as_bigint_and_exponent();
    let raw = digits.to_string();
    let (sign, magnitude) = match raw.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", raw.as_str()),
    };

    let width = Amount::SCALE as usize + 1;
    let padded = format!("{magnitude:0>width$}");
    let (whole, fraction) = padded.split_at(padded.len() - Amount::SCALE as usize);
    format!("{sign}{whole}.{fraction}")
}

// ============ Service ============

/// 원장 서비스
///
/// 모든 성공 경로는 커밋 후 mirror worker를 깨움
pub struct Ledger {
    repo: Arc<dyn Repository>,
    mirror: MirrorHandle,
}

impl Ledger {
    pub fn new(repo: Arc<dyn Repository>, mirror: MirrorHandle) -> Self {
        Self { repo, mirror }
    }

    /// 사용자 간 송금
    pub async fn transfer(
        &self,
        sender_id: i32,
        receiver_id: i32,
        amount: &Amount,
    ) -> Result<Transaction, LedgerError> {
        if sender_id == receiver_id {
            return Err(LedgerError::Invalid("cannot transfer to yourself".to_string()));
        }

        let transaction = self.repo.transfer(sender_id, receiver_id, amount).await?;
        tracing::info!(
            transaction_id = transaction.id,
            sender_id,
            receiver_id,
            amount = %amount,
            "transfer committed"
        );

        self.mirror.wake();
        Ok(transaction)
    }

    /// 출금 (sender == receiver, type = withdrawal)
    pub async fn withdraw(&self, user_id: i32, amount: &Amount) -> Result<Transaction, LedgerError> {
        let transaction = self.repo.withdraw(user_id, amount).await?;
        tracing::info!(
            transaction_id = transaction.id,
            user_id,
            amount = %amount,
            "withdrawal committed"
        );

        self.mirror.wake();
        Ok(transaction)
    }

    /// 관리자 입금 (addFunds)
    pub async fn deposit(
        &self,
        user_id: i32,
        amount: &Amount,
    ) -> Result<(User, Transaction), LedgerError> {
        let (user, transaction) = self.repo.deposit(user_id, amount).await?;
        tracing::info!(
            transaction_id = transaction.id,
            user_id,
            amount = %amount,
            balance = %user.balance,
            "deposit committed"
        );

        self.mirror.wake();
        Ok((user, transaction))
    }

    pub async fn promote(&self, user_id: i32) -> Result<User, LedgerError> {
        self.set_admin(user_id, true).await
    }

    pub async fn demote(&self, user_id: i32) -> Result<User, LedgerError> {
        self.set_admin(user_id, false).await
    }

    /// 관리자 플래그 변경. 실제로 바뀐 경우에만 온체인 job 생성
    async fn set_admin(&self, user_id: i32, is_admin: bool) -> Result<User, LedgerError> {
        let (user, changed) = self.repo.set_admin(user_id, is_admin).await?;
        if changed {
            tracing::info!(user_id, is_admin, "admin flag changed");
            self.mirror.wake();
        } else {
            tracing::debug!(user_id, is_admin, "admin flag already set");
        }
        Ok(user)
    }
}
