//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/api/register`, `/api/login`, `/api/logout`, `/api/user` - 세션
//! - `/api/users`, `/api/user/:id` - 사용자 조회
//! - `/api/transactions*`, `/api/transfer`, `/api/withdraw` - 원장
//! - `/api/admin/*` - 관리자 기능

pub mod admin;
pub mod auth;
pub mod health;
pub mod transactions;
pub mod users;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// 라우터 생성 (미들웨어는 호출하는 쪽에서 추가)
///
/// # Route Structure
///
/// ```text
/// GET  /health                                   - 서버 상태 확인
///
/// POST /api/register                             - 회원가입 + 세션
/// POST /api/login                                - 로그인 + 세션
/// POST /api/logout                               - 세션 삭제
/// GET  /api/user                                 - 현재 사용자
/// GET  /api/users                                - 본인 제외 전체 사용자
/// GET  /api/user/:id                             - 사용자 조회
///
/// GET  /api/transactions                         - 본인 거래 목록
/// GET  /api/transactions/:id                     - 거래 단건
/// POST /api/transfer                             - 송금
/// POST /api/withdraw                             - 출금
/// GET  /api/all-transactions                     - 전체 거래
///
/// POST /api/admin/master-balance                 - 입금 (mintTo)
/// POST /api/admin/promote-user                   - 관리자 지정 (addAdmin)
/// POST /api/admin/demote-user                    - 관리자 해제 (removeAdmin)
/// POST /api/admin/transfer-tokens                - 온체인 직접 이체
/// POST /api/admin/burn-tokens                    - 온체인 직접 소각
/// POST /api/admin/blockchain-address             - 사용자 체인 주소 지정
/// POST /api/admin/transactions/:id/retry-mirror  - 실패한 미러링 재시도
/// ```
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))

        // Session
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout))
        .route("/api/user", get(auth::current_user))

        // Users
        .route("/api/users", get(users::list_users))
        .route("/api/user/:id", get(users::get_user))

        // Ledger
        .route("/api/transactions", get(transactions::list_own))
        .route("/api/transactions/:id", get(transactions::get_one))
        .route("/api/transfer", post(transactions::transfer))
        .route("/api/withdraw", post(transactions::withdraw))
        .route("/api/all-transactions", get(transactions::list_all))

        // Admin
        .route("/api/admin/master-balance", post(admin::master_balance))
        .route("/api/admin/promote-user", post(admin::promote_user))
        .route("/api/admin/demote-user", post(admin::demote_user))
        .route("/api/admin/transfer-tokens", post(admin::transfer_tokens))
        .route("/api/admin/burn-tokens", post(admin::burn_tokens))
        .route("/api/admin/blockchain-address", post(admin::set_blockchain_address))
        .route(
            "/api/admin/transactions/:id/retry-mirror",
            post(admin::retry_mirror),
        )

        // 상태 주입
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::db::mock::MemoryRepository;
    use crate::db::{JobKind, JobStatus, Repository};
    use crate::services::auth::hash_token;
    use crate::services::contract::mock::MockContract;
    use crate::services::{MirrorHandle, MirrorWorker};

    const ALICE_ADDR: &str = "0x1111111111111111111111111111111111111111";
    const BOB_ADDR: &str = "0x2222222222222222222222222222222222222222";

    struct TestApp {
        repo: Arc<MemoryRepository>,
        contract: Arc<MockContract>,
        state: AppState,
    }

    impl TestApp {
        fn new(contract: MockContract) -> Self {
            Self::with_config(contract, Config::for_tests())
        }

        fn with_config(contract: MockContract, config: Config) -> Self {
            let repo = Arc::new(MemoryRepository::new());
            let contract = Arc::new(contract);
            let state = AppState::new(
                repo.clone(),
                contract.clone(),
                MirrorHandle::detached(),
                config,
            );
            Self {
                repo,
                contract,
                state,
            }
        }

        /// 세션을 직접 만들고 토큰 반환
        async fn session_for(&self, user_id: i32) -> String {
            let token = format!("token-{user_id}");
            self.repo
                .create_session(&hash_token(&token), user_id, Utc::now() + Duration::hours(1))
                .await
                .unwrap();
            token
        }

        fn worker(&self) -> MirrorWorker {
            let (worker, _handle) = MirrorWorker::new(
                self.repo.clone(),
                self.contract.clone(),
                self.state.config.mirror.clone(),
            );
            worker
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = router(self.state.clone()).oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }

        async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method("GET").uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            self.send(builder.body(Body::empty()).unwrap()).await
        }

        async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            self.post_raw(uri, token, body.to_string()).await
        }

        async fn post_raw(&self, uri: &str, token: Option<&str>, body: String) -> (StatusCode, Value) {
            let mut builder = Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json");
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            self.send(builder.body(Body::from(body)).unwrap()).await
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new(MockContract::succeeding());
        let (status, body) = app.get("/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"]["connected"], true);
        assert_eq!(body["chain"]["mirroring"], false);
    }

    #[tokio::test]
    async fn test_requires_session() {
        let app = TestApp::new(MockContract::succeeding());

        let (status, body) = app.get("/api/transactions", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHENTICATED");

        let (status, _) = app.get("/api/user", Some("not-a-session")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_cookie_accepted() {
        let app = TestApp::new(MockContract::succeeding());
        let alice = app.repo.insert_user("alice", "1.00", false);
        let token = app.session_for(alice).await;

        let request = Request::builder()
            .uri("/api/user")
            .header(header::COOKIE, format!("sid={token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = app.send(request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn test_expired_session_rejected() {
        let app = TestApp::new(MockContract::succeeding());
        let alice = app.repo.insert_user("alice", "1.00", false);
        app.repo
            .create_session(&hash_token("stale"), alice, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        let (status, _) = app.get("/api/user", Some("stale")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_new_session_prunes_expired_ones() {
        let app = TestApp::new(MockContract::succeeding());
        let alice = app.repo.insert_user("alice", "1.00", false);
        app.repo
            .create_session(&hash_token("old"), alice, Utc::now() - Duration::hours(2))
            .await
            .unwrap();
        let live = app.session_for(alice).await;
        assert_eq!(app.repo.session_count(), 2);

        let (status, _) = app
            .post(
                "/api/register",
                None,
                json!({
                    "username": "dave",
                    "password": "pw",
                    "email": "dave@university.edu",
                    "fullName": "Dave Park",
                    "department": "Math"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        // 만료된 세션만 삭제, 기존 유효 세션 + 새 세션
        assert_eq!(app.repo.session_count(), 2);
        let (status, _) = app.get("/api/user", Some(&live)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_login_logout() {
        let app = TestApp::new(MockContract::succeeding());
        let registration = json!({
            "username": "carol",
            "password": "hunter22",
            "email": "carol@university.edu",
            "fullName": "Carol Kim",
            "department": "Physics"
        });

        let (status, body) = app.post("/api/register", None, registration.clone()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["balance"], "0");
        assert_eq!(body["user"]["isAdmin"], false);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, _) = app.post("/api/register", None, registration).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app
            .post("/api/login", None, json!({"username": "carol", "password": "wrong"}))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app
            .post("/api/login", None, json!({"username": "carol", "password": "hunter22"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "carol");

        let (status, _) = app.post("/api/logout", Some(&token), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.get("/api/user", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_rejects_foreign_email() {
        let app = TestApp::new(MockContract::succeeding());
        let (status, body) = app
            .post(
                "/api/register",
                None,
                json!({
                    "username": "dave",
                    "password": "pw",
                    "email": "dave@gmail.com",
                    "fullName": "Dave",
                    "department": "Art"
                }),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_users_excludes_caller() {
        let app = TestApp::new(MockContract::succeeding());
        let alice = app.repo.insert_user("alice", "0.00", false);
        let bob = app.repo.insert_user("bob", "0.00", false);
        let token = app.session_for(alice).await;

        let (status, body) = app.get("/api/users", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let users = body.as_array().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["id"], bob);

        let (status, _) = app.get("/api/user/99", Some(&token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_transfer_between_users() {
        let app = TestApp::new(MockContract::succeeding());
        let alice = app.repo.insert_user("alice", "100.00", false);
        let bob = app.repo.insert_user("bob", "0.00", false);
        let token = app.session_for(alice).await;

        let (status, body) = app
            .post(
                "/api/transfer",
                Some(&token),
                json!({"receiverId": bob, "amount": "40.00"}),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        let tx = &body["transaction"];
        assert_eq!(tx["amount"], "40.00");
        assert_eq!(tx["type"], "transfer");
        assert_eq!(tx["senderId"], alice);
        assert_eq!(tx["receiverId"], bob);
        assert_eq!(tx["mirrorStatus"], "pending");
        assert_eq!(app.repo.balance_of(alice), "60.00");
        assert_eq!(app.repo.balance_of(bob), "40.00");

        let (_, listed) = app.get("/api/transactions", Some(&token)).await;
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["receiverName"], "bob full");
    }

    #[tokio::test]
    async fn test_transfer_insufficient_funds() {
        let app = TestApp::new(MockContract::succeeding());
        let alice = app.repo.insert_user("alice", "10.00", false);
        let bob = app.repo.insert_user("bob", "0.00", false);
        let token = app.session_for(alice).await;

        let (status, body) = app
            .post(
                "/api/transfer",
                Some(&token),
                json!({"receiverId": bob, "amount": "10.01"}),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INSUFFICIENT_FUNDS");
        assert_eq!(app.repo.balance_of(alice), "10.00");
        assert_eq!(app.repo.transaction_count(), 0);
        assert!(app.repo.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_validation() {
        let app = TestApp::new(MockContract::succeeding());
        let alice = app.repo.insert_user("alice", "10.00", false);
        let bob = app.repo.insert_user("bob", "0.00", false);
        let token = app.session_for(alice).await;

        // 깨진 JSON
        let (status, _) = app
            .post_raw("/api/transfer", Some(&token), "{\"receiverId\": ".to_string())
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // 숫자 amount
        let (status, _) = app
            .post("/api/transfer", Some(&token), json!({"receiverId": bob, "amount": 5}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post("/api/transfer", Some(&token), json!({"receiverId": bob, "amount": "-5"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post("/api/transfer", Some(&token), json!({"receiverId": 77, "amount": "1"}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert_eq!(app.repo.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_withdraw() {
        let app = TestApp::new(MockContract::succeeding());
        let alice = app.repo.insert_user("alice", "50.00", false);
        let token = app.session_for(alice).await;

        let (status, body) = app
            .post("/api/withdraw", Some(&token), json!({"amount": "20"}))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transaction"]["type"], "withdrawal");
        assert_eq!(body["transaction"]["senderId"], alice);
        assert_eq!(body["transaction"]["receiverId"], alice);
        assert_eq!(app.repo.balance_of(alice), "30.00");
        assert_eq!(app.repo.jobs()[0].kind, JobKind::Burn);
    }

    #[tokio::test]
    async fn test_failed_mirror_still_listed() {
        let app = TestApp::new(MockContract::succeeding());
        let alice = app.repo.insert_user("alice", "100.00", false);
        let bob = app.repo.insert_user("bob", "0.00", false);
        app.repo.insert_address(alice, ALICE_ADDR);
        let token = app.session_for(alice).await;

        let (status, _) = app
            .post("/api/transfer", Some(&token), json!({"receiverId": bob, "amount": "5"}))
            .await;
        assert_eq!(status, StatusCode::OK);

        // bob 주소 없음 → 영구 실패
        tokio_test::assert_ok!(app.worker().drain().await);

        let (_, listed) = app.get("/api/transactions", Some(&token)).await;
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["mirrorStatus"], "failed");
        assert!(listed[0]["txHash"].is_null());
        assert_eq!(app.repo.onchain_count(), 0);
        assert_eq!(app.repo.balance_of(bob), "5.00");
    }

    #[tokio::test]
    async fn test_transaction_visibility() {
        let app = TestApp::new(MockContract::succeeding());
        let alice = app.repo.insert_user("alice", "100.00", false);
        let bob = app.repo.insert_user("bob", "0.00", false);
        let eve = app.repo.insert_user("eve", "0.00", false);
        let admin = app.repo.insert_user("admin", "0.00", true);
        let alice_token = app.session_for(alice).await;

        let (_, body) = app
            .post("/api/transfer", Some(&alice_token), json!({"receiverId": bob, "amount": "1"}))
            .await;
        let uri = format!("/api/transactions/{}", body["transaction"]["id"]);

        let bob_token = app.session_for(bob).await;
        let eve_token = app.session_for(eve).await;
        let admin_token = app.session_for(admin).await;
        assert_eq!(app.get(&uri, Some(&bob_token)).await.0, StatusCode::OK);
        assert_eq!(app.get(&uri, Some(&eve_token)).await.0, StatusCode::FORBIDDEN);
        assert_eq!(app.get(&uri, Some(&admin_token)).await.0, StatusCode::OK);
        assert_eq!(
            app.get("/api/transactions/999", Some(&admin_token)).await.0,
            StatusCode::NOT_FOUND
        );

        let (status, all) = app.get("/api/all-transactions", Some(&eve_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_routes_forbidden_for_users() {
        let app = TestApp::new(MockContract::succeeding());
        let alice = app.repo.insert_user("alice", "0.00", false);
        let token = app.session_for(alice).await;

        let (status, body) = app
            .post(
                "/api/admin/master-balance",
                Some(&token),
                json!({"userId": alice, "amount": "1000"}),
            )
            .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "UNAUTHORIZED");
        assert_eq!(app.repo.balance_of(alice), "0.00");
    }

    #[tokio::test]
    async fn test_master_balance() {
        let app = TestApp::new(MockContract::succeeding());
        let admin = app.repo.insert_user("admin", "0.00", true);
        let alice = app.repo.insert_user("alice", "5.00", false);
        let token = app.session_for(admin).await;

        let (status, body) = app
            .post(
                "/api/admin/master-balance",
                Some(&token),
                json!({"userId": alice, "amount": "20.5"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_BLOCKCHAIN_ADDRESS");
        assert_eq!(app.repo.transaction_count(), 0);

        app.repo.insert_address(alice, ALICE_ADDR);
        let (status, body) = app
            .post(
                "/api/admin/master-balance",
                Some(&token),
                json!({"userId": alice, "amount": "20.5"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updatedUser"]["balance"], "25.50");
        assert_eq!(body["transaction"]["type"], "deposit");
        assert_eq!(body["transaction"]["amount"], "20.50");
        assert_eq!(app.repo.jobs()[0].kind, JobKind::Mint);

        let (status, _) = app
            .post(
                "/api/admin/master-balance",
                Some(&token),
                json!({"userId": 99, "amount": "1"}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_promote_then_demote() {
        let app = TestApp::new(MockContract::succeeding());
        let admin = app.repo.insert_user("admin", "0.00", true);
        let alice = app.repo.insert_user("alice", "7.00", false);
        app.repo.insert_address(alice, ALICE_ADDR);
        let token = app.session_for(admin).await;

        let (status, body) = app
            .post("/api/admin/promote-user", Some(&token), json!({"userId": alice}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updatedUser"]["isAdmin"], true);

        let (status, body) = app
            .post("/api/admin/demote-user", Some(&token), json!({"userId": alice}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updatedUser"]["isAdmin"], false);

        assert_eq!(app.repo.balance_of(alice), "7.00");
        assert_eq!(app.repo.transaction_count(), 0);
        let kinds: Vec<_> = app.repo.jobs().iter().map(|j| j.kind).collect();
        assert_eq!(kinds, vec![JobKind::AddAdmin, JobKind::RemoveAdmin]);
    }

    #[tokio::test]
    async fn test_direct_token_operations() {
        let app = TestApp::new(MockContract::succeeding());
        let admin = app.repo.insert_user("admin", "0.00", true);
        let token = app.session_for(admin).await;

        let (status, body) = app
            .post(
                "/api/admin/transfer-tokens",
                Some(&token),
                json!({"from": ALICE_ADDR, "to": BOB_ADDR, "amount": "3"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["txHash"].as_str().unwrap().starts_with("0x"));

        let (status, _) = app
            .post(
                "/api/admin/burn-tokens",
                Some(&token),
                json!({"from": ALICE_ADDR, "amount": "1.25"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.contract.calls().len(), 2);

        let (status, _) = app
            .post(
                "/api/admin/burn-tokens",
                Some(&token),
                json!({"from": "0xnope", "amount": "1"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.contract.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_direct_token_operation_failures() {
        let app = TestApp::new(MockContract::failing(1));
        let admin = app.repo.insert_user("admin", "0.00", true);
        let token = app.session_for(admin).await;

        let (status, body) = app
            .post(
                "/api/admin/burn-tokens",
                Some(&token),
                json!({"from": ALICE_ADDR, "amount": "1"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "CHAIN_CALL_FAILED");
        assert!(body["details"].is_null());
    }

    #[tokio::test]
    async fn test_direct_token_operation_reverted() {
        let app = TestApp::new(MockContract::reverting());
        let admin = app.repo.insert_user("admin", "0.00", true);
        let token = app.session_for(admin).await;

        let (status, body) = app
            .post(
                "/api/admin/burn-tokens",
                Some(&token),
                json!({"from": ALICE_ADDR, "amount": "1"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["details"].is_null());
        assert_eq!(app.contract.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_direct_token_operation_times_out() {
        let mut config = Config::for_tests();
        config.mirror.call_timeout_secs = 1;
        let app = TestApp::with_config(MockContract::hanging(), config);
        let admin = app.repo.insert_user("admin", "0.00", true);
        let token = app.session_for(admin).await;

        let (status, _) = app
            .post(
                "/api/admin/burn-tokens",
                Some(&token),
                json!({"from": ALICE_ADDR, "amount": "1"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_blockchain_address_assignment() {
        let app = TestApp::new(MockContract::succeeding());
        let admin = app.repo.insert_user("admin", "0.00", true);
        let alice = app.repo.insert_user("alice", "0.00", false);
        let bob = app.repo.insert_user("bob", "0.00", false);
        let token = app.session_for(admin).await;

        let (status, body) = app
            .post(
                "/api/admin/blockchain-address",
                Some(&token),
                json!({"userId": alice, "address": ALICE_ADDR.to_uppercase().replace("0X", "0x")}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["blockAddress"], ALICE_ADDR);

        // 같은 사용자 재지정은 허용
        let (status, _) = app
            .post(
                "/api/admin/blockchain-address",
                Some(&token),
                json!({"userId": alice, "address": ALICE_ADDR}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .post(
                "/api/admin/blockchain-address",
                Some(&token),
                json!({"userId": bob, "address": ALICE_ADDR}),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app
            .post(
                "/api/admin/blockchain-address",
                Some(&token),
                json!({"userId": bob, "address": "0x1234"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_retry_failed_mirror() {
        let app = TestApp::new(MockContract::succeeding());
        let admin = app.repo.insert_user("admin", "0.00", true);
        let alice = app.repo.insert_user("alice", "10.00", false);
        let bob = app.repo.insert_user("bob", "0.00", false);
        app.repo.insert_address(alice, ALICE_ADDR);
        let alice_token = app.session_for(alice).await;
        let admin_token = app.session_for(admin).await;

        let (_, body) = app
            .post("/api/transfer", Some(&alice_token), json!({"receiverId": bob, "amount": "2"}))
            .await;
        let id = body["transaction"]["id"].as_i64().unwrap();
        let uri = format!("/api/admin/transactions/{id}/retry-mirror");

        // 아직 실패하지 않은 job
        let (status, _) = app.post(&uri, Some(&admin_token), json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let worker = app.worker();
        worker.drain().await.unwrap();
        assert_eq!(app.repo.jobs()[0].status, JobStatus::Failed);

        app.repo.insert_address(bob, BOB_ADDR);
        let (status, body) = app.post(&uri, Some(&admin_token), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transaction"]["mirrorStatus"], "pending");

        worker.drain().await.unwrap();
        let (_, view) = app
            .get(&format!("/api/transactions/{id}"), Some(&alice_token))
            .await;
        assert_eq!(view["mirrorStatus"], "mirrored");
        assert!(view["txHash"].as_str().is_some());
    }
}
