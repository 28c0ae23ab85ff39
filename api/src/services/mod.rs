//! Services Module
//!
//! 비즈니스 로직을 담당하는 서비스 레이어
//!
//! # Services
//! - `ledger`: 원장 변경 (잔액 + 트랜잭션 + outbox job)
//! - `mirror`: outbox를 OrgToken 컨트랙트에 반영하는 worker
//! - `contract`: OrgToken 컨트랙트 클라이언트
//! - `auth`: 비밀번호 해시, 세션 토큰
//! - `provisioning`: 기본 admin 계정 생성

pub mod auth;
pub mod contract;
pub mod ledger;
pub mod mirror;
pub mod provisioning;

pub use contract::{ChainError, TokenContract};
pub use ledger::{Ledger, LedgerError};
pub use mirror::{MirrorHandle, MirrorWorker};
