//! Campus Wallet API Server
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Client (Frontend)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum Web Server                         │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                      Routes Layer                        ││
//! │  │  /health  /api/*  /api/admin/*                          ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Services Layer                        ││
//! │  │  Ledger    MirrorWorker    OrgTokenClient               ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Data Layer                            ││
//! │  │  PostgreSQL (users, transactions, chain_jobs outbox)    ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Smart Contract (Ethereum)                 │
//! │  OrgToken                                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// 라이브러리에서 가져오기
use campus_wallet_api::{
    routes,
    services::{contract, provisioning},
    AppState, Config, Database, MirrorHandle, MirrorWorker, Repository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "campus_wallet_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting Campus Wallet API Server");

    // 설정 로드
    let config = Config::from_env()?;
    tracing::info!(environment = ?config.environment, chain = ?config.chain, "📋 Configuration loaded");

    // 데이터베이스 연결
    let db = Database::connect(&config.database_url).await?;
    tracing::info!("🗄️  Database connected");

    // 마이그레이션 실행
    db.run_migrations().await?;
    tracing::info!("📦 Migrations completed");

    let repo: Arc<dyn Repository> = Arc::new(db);
    provisioning::ensure_admin(repo.as_ref(), &config).await?;

    // 컨트랙트 클라이언트
    let token_contract = contract::from_config(&config.chain)?;

    // Mirror worker: 체인 설정이 없으면 job은 pending으로 남음
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (mirror, worker_task) = if config.chain.is_configured() {
        let (worker, handle) =
            MirrorWorker::new(repo.clone(), token_contract.clone(), config.mirror.clone());
        tracing::info!("⛓️  Chain mirror worker started");
        (handle, Some(tokio::spawn(worker.run(shutdown_rx))))
    } else {
        (MirrorHandle::detached(), None)
    };

    // 앱 상태 구성
    let state = AppState::new(repo, token_contract, mirror, config.clone());

    // 라우터 구성
    let app = create_router(state, &config);

    // 서버 시작
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🌐 Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // worker는 현재 job을 마친 뒤 종료
    let _ = shutdown_tx.send(true);
    if let Some(task) = worker_task {
        if let Err(e) = task.await {
            tracing::error!("mirror worker panicked: {e}");
        }
    }

    tracing::info!("👋 Server stopped");
    Ok(())
}

/// 미들웨어 적용
///
/// 프로덕션은 ALLOWED_ORIGINS만, 개발 환경은 localhost 프론트엔드 허용.
/// 세션 쿠키를 쓰므로 credentials 허용
fn create_router(state: AppState, config: &Config) -> Router {
    let origins: Vec<HeaderValue> = if config.is_production() {
        config
            .allowed_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    } else {
        [
            "http://localhost:5173", // Vite dev server
            "http://localhost:3000",
            "http://127.0.0.1:5173",
        ]
        .into_iter()
        .map(HeaderValue::from_static)
        .collect()
    };

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    routes::router(state)
        // 미들웨어
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Ctrl+C 또는 SIGTERM 대기
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
