//! Permission requests and their review by administrators.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use log::info;
use serde::Serialize;

use crate::app::SharedState;
use crate::auth::{AdminUser, CurrentUser};
use crate::catalog;
use crate::data;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{
    PERMISSION_UPLOAD, PackageSummary, PermissionRequest, RequestStatus, SampleData, User,
};
use crate::users;

/// Record that `user_id` wants `permission`.
///
/// A second request for the same pair violates the table's unique constraint
/// and comes back as [`AppError::Conflict`].
pub async fn create(db: &Database, user_id: i64, permission: &str) -> AppResult<PermissionRequest> {
    let request = sqlx::query_as::<_, PermissionRequest>(
        "INSERT INTO permission_requests (permission, status, user_id) VALUES (?, ?, ?)
         RETURNING *",
    )
    .bind(permission)
    .bind(RequestStatus::Requested.as_str())
    .bind(user_id)
    .fetch_one(db.pool())
    .await?;

    info!("User {user_id} requested {permission} permission");
    Ok(request)
}

pub async fn list(db: &Database) -> AppResult<Vec<PermissionRequest>> {
    let rows = sqlx::query_as::<_, PermissionRequest>("SELECT * FROM permission_requests ORDER BY id")
        .fetch_all(db.pool())
        .await?;
    Ok(rows)
}

/// Settle a request, updating the requesting user's upload flag in the same transaction.
pub async fn decide(db: &Database, request_id: i64, status: RequestStatus) -> AppResult<PermissionRequest> {
    let mut tx = db.pool().begin().await?;

    let request = sqlx::query_as::<_, PermissionRequest>(
        "UPDATE permission_requests SET status = ? WHERE id = ? RETURNING *",
    )
    .bind(status.as_str())
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("No permission request {request_id}")))?;

    if request.permission == PERMISSION_UPLOAD {
        sqlx::query("UPDATE users SET can_upload = ? WHERE id = ?")
            .bind(status == RequestStatus::Granted)
            .bind(request.user_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    info!(
        "Permission request {} for user {} is now {}",
        request.id,
        request.user_id,
        status.as_str()
    );
    Ok(request)
}

pub async fn handle_upload_request(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<(StatusCode, Json<PermissionRequest>)> {
    let request = create(&state.db, user.id, PERMISSION_UPLOAD).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[derive(Debug, Serialize)]
pub struct AdminOverview {
    pub user: User,
    pub requests: Vec<PermissionRequest>,
    pub users: Vec<User>,
    pub apps: Vec<PackageSummary>,
    pub sampledata: Vec<SampleData>,
}

pub async fn handle_admin(
    State(state): State<SharedState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<AdminOverview>> {
    Ok(Json(AdminOverview {
        user: admin,
        requests: list(&state.db).await?,
        users: users::list(&state.db).await?,
        apps: catalog::latest_packages(&state.db, None).await?,
        sampledata: data::list_all(&state.db).await?,
    }))
}

pub async fn handle_grant(
    State(state): State<SharedState>,
    AdminUser(admin): AdminUser,
    Path(request_id): Path<i64>,
) -> AppResult<Json<PermissionRequest>> {
    info!("Admin {} grants request {request_id}", admin.id);
    Ok(Json(decide(&state.db, request_id, RequestStatus::Granted).await?))
}

pub async fn handle_deny(
    State(state): State<SharedState>,
    AdminUser(admin): AdminUser,
    Path(request_id): Path<i64>,
) -> AppResult<Json<PermissionRequest>> {
    info!("Admin {} denies request {request_id}", admin.id);
    Ok(Json(decide(&state.db, request_id, RequestStatus::Denied).await?))
}
