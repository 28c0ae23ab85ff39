//! User Directory Endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::db::User;
use crate::error::ApiError;
use crate::routes::auth::AuthUser;
use crate::AppState;

/// GET /api/users
///
/// 송금 대상 / 역할 관리용, 본인 제외
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = state
        .repo
        .list_users()
        .await?
        .into_iter()
        .filter(|u| u.id != caller.id)
        .collect();
    Ok(Json(users))
}

/// GET /api/user/:id
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<User>, ApiError> {
    state
        .repo
        .find_user(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User".to_string()))
}
