//! Session Authentication Endpoints
//!
//! 세션 토큰은 `Authorization: Bearer <token>` 헤더 또는 `sid` 쿠키로 전달.
//! DB에는 토큰의 SHA3-256 해시만 저장됨

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{NewUser, User};
use crate::error::ApiError;
use crate::services::auth::{
    hash_password_blocking, hash_token, new_session_token, verify_password_blocking,
};
use crate::AppState;

pub const SESSION_COOKIE: &str = "sid";
const EMAIL_DOMAIN: &str = "@university.edu";

// ============ Extractors ============

/// 로그인한 사용자
pub struct AuthUser(pub User);

/// 관리자 권한이 있는 사용자
pub struct AdminUser(pub User);

/// Bearer 헤더 우선, 없으면 `sid` 쿠키
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(ApiError::Unauthenticated)?;
        let user = state
            .repo
            .session_user(&hash_token(&token), Utc::now())
            .await?
            .ok_or(ApiError::Unauthenticated)?;
        Ok(AuthUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(user_id = user.id, "admin endpoint called by non-admin");
            return Err(ApiError::Unauthorized);
        }
        Ok(AdminUser(user))
    }
}

// ============ Request/Response Types ============

/// 회원가입 요청
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub full_name: String,
    pub department: String,
}

/// 로그인 요청
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 세션 발급 응답
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

impl RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let required = [
            ("username", &self.username),
            ("password", &self.password),
            ("fullName", &self.full_name),
            ("department", &self.department),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ApiError::ValidationError(format!("{field} is required")));
        }

        let email = self.email.trim().to_lowercase();
        let local = email.strip_suffix(EMAIL_DOMAIN).unwrap_or_default();
        if local.is_empty() || local.contains('@') || local.contains(char::is_whitespace) {
            return Err(ApiError::ValidationError(format!(
                "email must be a valid {EMAIL_DOMAIN} address"
            )));
        }
        Ok(())
    }
}

// ============ Handlers ============

/// 세션 생성 후 토큰 + 쿠키 응답. 만료된 세션은 이때 정리
async fn start_session(state: &AppState, user: User, status: StatusCode) -> Result<Response, ApiError> {
    let now = Utc::now();
    match state.repo.delete_expired_sessions(now).await {
        Ok(0) => {}
        Ok(n) => tracing::debug!(sessions = n, "expired sessions pruned"),
        Err(e) => tracing::warn!(error = %e, "failed to prune expired sessions"),
    }

    let token = new_session_token();
    let ttl = Duration::hours(state.config.session_ttl_hours);
    state
        .repo
        .create_session(&hash_token(&token), user.id, now + ttl)
        .await?;

    let secure = if state.config.is_production() { "; Secure" } else { "" };
    let cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{secure}",
        ttl.num_seconds()
    );
    let cookie = HeaderValue::from_str(&cookie).map_err(|_| ApiError::InternalError)?;

    Ok((
        status,
        [(SET_COOKIE, cookie)],
        Json(SessionResponse { token, user }),
    )
        .into_response())
}

/// POST /api/register
///
/// 중복 username/email은 409
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if state.repo.find_user_by_username(&username).await?.is_some() {
        return Err(ApiError::Conflict("username already exists".to_string()));
    }
    if state.repo.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("email already registered".to_string()));
    }

    let password_hash = hash_password_blocking(req.password).await?;
    let user = state
        .repo
        .create_user(NewUser {
            username,
            password_hash,
            email,
            full_name: req.full_name.trim().to_string(),
            department: req.department.trim().to_string(),
            is_admin: false,
        })
        .await?;
    tracing::info!(user_id = user.id, username = %user.username, "user registered");

    start_session(&state, user, StatusCode::CREATED).await
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;

    let Some(user) = state.repo.find_user_by_username(req.username.trim()).await? else {
        return Err(ApiError::Unauthenticated);
    };
    if !verify_password_blocking(req.password, user.password.clone()).await? {
        tracing::debug!(user_id = user.id, "login rejected");
        return Err(ApiError::Unauthenticated);
    }

    tracing::info!(user_id = user.id, "user logged in");
    start_session(&state, user, StatusCode::OK).await
}

/// POST /api/logout
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = session_token(&headers) {
        state.repo.delete_session(&hash_token(&token)).await?;
    }
    tracing::info!(user_id = user.id, "user logged out");

    let cleared = HeaderValue::from_static("sid=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    Ok((StatusCode::OK, [(SET_COOKIE, cleared)]).into_response())
}

/// GET /api/user
pub async fn current_user(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
