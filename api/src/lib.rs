//! Campus Wallet API Library
//!
//! # Overview
//!
//! 대학 내부 지갑 백엔드. 잔액과 거래 기록은 PostgreSQL 원장이 기준이며,
//! 모든 원장 이벤트는 outbox를 거쳐 OrgToken 컨트랙트에 비동기로 반영됩니다.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                         API                              │
//! │                                                          │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐    │
//! │  │ Routes  │─▶│ Ledger  │─▶│   DB    │◀─│ Mirror  │    │
//! │  └─────────┘  └─────────┘  └─────────┘  └────┬────┘    │
//! │                                              │          │
//! └──────────────────────────────────────────────┼──────────┘
//!                                                │
//!                                                ▼
//!                                       ┌────────────────┐
//!                                       │    OrgToken    │
//!                                       └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 HTTP 매핑
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 비즈니스 로직 (Ledger, Mirror worker, Contract client)
//! - `db`: 데이터베이스 연동, outbox
//! - `types`: 공통 타입 정의 (Amount, EthAddress)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use campus_wallet_api::{config::Config, db::Database};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let db = Database::connect(&config.database_url).await?;
//!     db.run_migrations().await?;
//!
//!     // ... worker, 서버 시작
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use db::{Database, Repository};
pub use error::ApiError;
pub use services::{Ledger, MirrorHandle, MirrorWorker, TokenContract};

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub ledger: Arc<Ledger>,
    pub contract: Arc<dyn TokenContract>,
    pub mirror: MirrorHandle,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn Repository>,
        contract: Arc<dyn TokenContract>,
        mirror: MirrorHandle,
        config: Config,
    ) -> Self {
        let ledger = Arc::new(Ledger::new(repo.clone(), mirror.clone()));
        Self {
            repo,
            ledger,
            contract,
            mirror,
            config: Arc::new(config),
        }
    }
}
