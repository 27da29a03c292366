//! Sample datasets users can feed into packages.

use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::SharedState;
use crate::auth::CurrentUser;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{SampleData, User};
use crate::packages::binary_response;
use crate::upload;

pub async fn create(
    db: &Database,
    owner: &User,
    name: &str,
    mime: &str,
    data: &[u8],
) -> AppResult<SampleData> {
    let sample = sqlx::query_as::<_, SampleData>(
        "INSERT INTO sample_data (name, data, mime, owner_id) VALUES (?, ?, ?, ?)
         RETURNING id, name, mime, owner_id",
    )
    .bind(name)
    .bind(data)
    .bind(mime)
    .bind(owner.id)
    .fetch_one(db.pool())
    .await?;

    info!("User {} added sample data {}", owner.id, name);
    Ok(sample)
}

/// Page of dataset metadata, ascending by id from `since`.
pub async fn list(db: &Database, since: i64, limit: i64) -> AppResult<Vec<SampleData>> {
    let rows = sqlx::query_as::<_, SampleData>(
        "SELECT id, name, mime, owner_id FROM sample_data
         WHERE id >= ? ORDER BY id ASC LIMIT ?",
    )
    .bind(since)
    .bind(limit)
    .fetch_all(db.pool())
    .await?;
    Ok(rows)
}

pub async fn list_all(db: &Database) -> AppResult<Vec<SampleData>> {
    list(db, 0, i64::MAX).await
}

/// Payload and media type of the first dataset called `name`.
pub async fn fetch(db: &Database, name: &str) -> AppResult<Option<(Vec<u8>, String)>> {
    let row = sqlx::query_as::<_, (Vec<u8>, String)>(
        "SELECT data, mime FROM sample_data WHERE name = ? ORDER BY id LIMIT 1",
    )
    .bind(name)
    .fetch_optional(db.pool())
    .await?;
    Ok(row)
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    #[serde(default)]
    pub since: i64,
}

#[derive(Debug, Serialize)]
pub struct DataPage {
    pub data: Vec<SampleData>,
    pub since: i64,
}

pub async fn handle_list(
    State(state): State<SharedState>,
    Query(query): Query<SinceQuery>,
) -> AppResult<Json<DataPage>> {
    let data = list(&state.db, query.since, state.config.page_size).await?;
    Ok(Json(DataPage {
        data,
        since: query.since,
    }))
}

pub async fn handle_new(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Response> {
    if !user.can_upload {
        return Ok(Redirect::to("/data").into_response());
    }

    upload::check_content_length(&headers, state.config.max_request_bytes())?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file-data") {
            continue;
        }

        let name = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::Validation("Sample data needs a file name".to_string()))?;
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = upload::read_field(field, state.config.max_upload_bytes).await?;

        let sample = create(&state.db, &user, &name, &mime, &bytes).await?;
        return Ok((StatusCode::CREATED, Json(sample)).into_response());
    }

    warn!("User {} posted sample data without a file", user.id);
    Err(AppError::Validation("Missing field file-data".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

pub async fn handle_file(
    State(state): State<SharedState>,
    Query(query): Query<NameQuery>,
) -> AppResult<Response> {
    match fetch(&state.db, &query.name).await? {
        Some((data, mime)) => Ok(binary_response(data, &mime)),
        None => Ok(Redirect::to("/data").into_response()),
    }
}
