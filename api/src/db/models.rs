//! Database Models
//!
//! Row types for the wallet ledger, the chain mirror outbox and sessions.
//! Enum-like text columns are decoded through `TryFrom<String>`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use thiserror::Error;

/// text 컬럼 값이 알 수 없는 enum 값일 때
#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

macro_rules! text_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                match value.as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant { kind: $label, value }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// 사용자 (잔액은 캐시된 집계값)
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub username: String,

    /// scrypt 해시 ("<hash hex>.<salt hex>"), 응답에 포함하지 않음
    #[serde(skip_serializing)]
    pub password: String,

    pub email: String,
    pub full_name: String,
    pub department: String,
    pub is_admin: bool,

    /// 10진수 문자열 (소수점 2자리)
    pub balance: String,
}

/// 회원가입 입력
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub full_name: String,
    pub department: String,
    pub is_admin: bool,
}

/// 원장 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Transfer,
    Withdrawal,
    Deposit,
}

text_enum!(TransactionKind, "transaction type", {
    Transfer => "transfer",
    Withdrawal => "withdrawal",
    Deposit => "deposit",
});

/// 트랜잭션 단위 미러링 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorStatus {
    Pending,
    Mirrored,
    Failed,
}

text_enum!(MirrorStatus, "mirror status", {
    Pending => "pending",
    Mirrored => "mirrored",
    Failed => "failed",
});

/// 원장 트랜잭션 (append-only)
///
/// 출금/입금은 sender_id == receiver_id
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i32,
    pub sender_id: i32,
    pub receiver_id: i32,
    pub amount: String,
    pub timestamp: DateTime<Utc>,

    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub kind: TransactionKind,

    #[sqlx(try_from = "String")]
    pub mirror_status: MirrorStatus,
}

/// 목록 조회용 트랜잭션 (이름, 온체인 해시 포함)
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: i32,
    pub sender_id: i32,
    pub receiver_id: i32,
    pub sender_name: Option<String>,
    pub receiver_name: Option<String>,
    pub amount: String,
    pub timestamp: DateTime<Utc>,

    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub kind: TransactionKind,

    #[sqlx(try_from = "String")]
    pub mirror_status: MirrorStatus,

    pub tx_hash: Option<String>,
}

/// 사용자 ↔ 체인 주소 매핑
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainAddress {
    pub id: i32,
    pub user_id: i32,
    pub block_address: String,
    pub created_at: DateTime<Utc>,
}

/// 온체인 확정 기록 (Transaction 당 0..1)
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnchainTransaction {
    pub id: i32,
    pub transaction_id: i32,
    pub tx_hash: String,
    pub on_chain: bool,
    pub created_at: DateTime<Utc>,
}

/// 컨트랙트 호출 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// transferFromUserToUser(from, to, amount)
    Transfer,
    /// adminBurn(from, amount)
    Burn,
    /// mintTo(to, amount)
    Mint,
    /// addAdmin(account)
    AddAdmin,
    /// removeAdmin(account)
    RemoveAdmin,
}

text_enum!(JobKind, "job kind", {
    Transfer => "transfer",
    Burn => "burn",
    Mint => "mint",
    AddAdmin => "add_admin",
    RemoveAdmin => "remove_admin",
});

impl From<TransactionKind> for JobKind {
    fn from(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Transfer => JobKind::Transfer,
            TransactionKind::Withdrawal => JobKind::Burn,
            TransactionKind::Deposit => JobKind::Mint,
        }
    }
}

/// Outbox job 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InFlight,
    Mirrored,
    Failed,
}

text_enum!(JobStatus, "job status", {
    Pending => "pending",
    InFlight => "in_flight",
    Mirrored => "mirrored",
    Failed => "failed",
});

/// 체인 미러링 outbox 항목
#[derive(Debug, Clone, FromRow)]
pub struct ChainJob {
    pub id: i64,

    #[sqlx(try_from = "String")]
    pub kind: JobKind,

    pub transaction_id: Option<i32>,

    /// transfer/burn의 sender, mint/admin 변경의 대상
    pub user_id: i32,

    /// transfer의 receiver
    pub counterparty_id: Option<i32>,

    pub amount: Option<String>,

    #[sqlx(try_from = "String")]
    pub status: JobStatus,

    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 새 outbox 항목
#[derive(Debug, Clone)]
pub struct NewChainJob {
    pub kind: JobKind,
    pub transaction_id: Option<i32>,
    pub user_id: i32,
    pub counterparty_id: Option<i32>,
    pub amount: Option<String>,
}

impl NewChainJob {
    /// 원장 트랜잭션을 미러링하는 job
    pub fn for_transaction(transaction: &Transaction) -> Self {
        let counterparty_id = match transaction.kind {
            TransactionKind::Transfer => Some(transaction.receiver_id),
            TransactionKind::Withdrawal | TransactionKind::Deposit => None,
        };
        Self {
            kind: transaction.kind.into(),
            transaction_id: Some(transaction.id),
            user_id: transaction.sender_id,
            counterparty_id,
            amount: Some(transaction.amount.clone()),
        }
    }

    /// 관리자 권한 변경 job
    pub fn for_role_change(user_id: i32, is_admin: bool) -> Self {
        Self {
            kind: if is_admin { JobKind::AddAdmin } else { JobKind::RemoveAdmin },
            transaction_id: None,
            user_id,
            counterparty_id: None,
            amount: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_enum_round_trip() {
        assert_eq!(JobKind::try_from("add_admin".to_string()).unwrap(), JobKind::AddAdmin);
        assert_eq!(JobStatus::InFlight.as_str(), "in_flight");
        assert!(MirrorStatus::try_from("lost".to_string()).is_err());
    }

    #[test]
    fn test_job_for_transfer_targets_receiver() {
        let tx = Transaction {
            id: 7,
            sender_id: 1,
            receiver_id: 2,
            amount: "40.00".to_string(),
            timestamp: Utc::now(),
            kind: TransactionKind::Transfer,
            mirror_status: MirrorStatus::Pending,
        };
        let job = NewChainJob::for_transaction(&tx);
        assert_eq!(job.kind, JobKind::Transfer);
        assert_eq!(job.transaction_id, Some(7));
        assert_eq!(job.counterparty_id, Some(2));
        assert_eq!(job.amount.as_deref(), Some("40.00"));
    }

    #[test]
    fn test_job_for_withdrawal_is_burn() {
        let tx = Transaction {
            id: 3,
            sender_id: 5,
            receiver_id: 5,
            amount: "1.00".to_string(),
            timestamp: Utc::now(),
            kind: TransactionKind::Withdrawal,
            mirror_status: MirrorStatus::Pending,
        };
        let job = NewChainJob::for_transaction(&tx);
        assert_eq!(job.kind, JobKind::Burn);
        assert_eq!(job.counterparty_id, None);
    }

    #[test]
    fn test_transaction_serializes_type_field() {
        let tx = Transaction {
            id: 1,
            sender_id: 1,
            receiver_id: 2,
            amount: "40.00".to_string(),
            timestamp: Utc::now(),
            kind: TransactionKind::Transfer,
            mirror_status: MirrorStatus::Pending,
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "transfer");
        assert_eq!(json["senderId"], 1);
        assert_eq!(json["mirrorStatus"], "pending");
    }
}
