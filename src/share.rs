//! Results shared under an opaque reference.

use axum::{
    Form, Json,
    extract::{Path, Query, State, rejection::FormRejection},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use log::info;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::SharedState;
use crate::auth::CurrentUser;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{Package, ShareData};
use crate::packages;

#[derive(Debug, Deserialize)]
pub struct ShareForm {
    #[serde(rename = "output-type")]
    pub output_type: String,
    #[serde(rename = "output-data")]
    pub data: String,
    pub checksum: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Store a result computed with `package`.
///
/// The share belongs to the package's owner, whoever produced the result.
pub async fn create(db: &Database, package: &Package, form: ShareForm) -> AppResult<ShareData> {
    let reference = Uuid::new_v4().to_string();
    let filename = form.filename.filter(|f| !f.trim().is_empty());

    let share = sqlx::query_as::<_, ShareData>(
        "INSERT INTO share_data (
            reference, output, filename, checksum, data, owner_id, package_id, created
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&reference)
    .bind(&form.output_type)
    .bind(&filename)
    .bind(&form.checksum)
    .bind(&form.data)
    .bind(package.owner_id)
    .bind(package.id)
    .bind(Utc::now())
    .fetch_one(db.pool())
    .await?;

    info!("Result of package {} shared as {}", package.id, reference);
    Ok(share)
}

/// Look up a share. References that are not UUIDs never match.
pub async fn find(db: &Database, reference: &str) -> AppResult<ShareData> {
    let reference = Uuid::parse_str(reference)
        .map_err(|_| AppError::NotFound("Unknown share.".to_string()))?;

    sqlx::query_as::<_, ShareData>("SELECT * FROM share_data WHERE reference = ?")
        .bind(reference.to_string())
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::NotFound("Unknown share.".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct ApplicationQuery {
    pub application: String,
}

pub async fn handle_create(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ApplicationQuery>,
    form: Result<Form<ShareForm>, FormRejection>,
) -> AppResult<Response> {
    if !user.can_upload {
        return Ok(Redirect::to("/").into_response());
    }
    let Form(form) = form.map_err(|e| AppError::Validation(e.body_text()))?;

    let package = packages::resolve_str(&state.db, &query.application).await?;
    let share = create(&state.db, &package, form).await?;
    info!("User {} shared {}", user.id, query.application);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "url": format!("/shared/{}", share.reference) })),
    )
        .into_response())
}

pub async fn handle_retrieve(
    State(state): State<SharedState>,
    Path(reference): Path<String>,
) -> AppResult<Json<ShareData>> {
    Ok(Json(find(&state.db, &reference).await?))
}
