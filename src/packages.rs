use axum::{
    Json,
    body::Body,
    extract::{Multipart, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::types::Json as SqlJson;

use crate::app::SharedState;
use crate::auth::CurrentUser;
use crate::catalog::{self, CatalogPage, CatalogQuery};
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{Interface, Package, Runtime, User};
use crate::package_name::PackageName;
use crate::upload;

lazy_static! {
    static ref NAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap();
}

const DEFAULT_ENTRYPOINT: &str = "main";

/// A validated upload, ready to be stored as the next version.
#[derive(Debug, Clone)]
pub struct NewPackage {
    pub name: String,
    pub data: Vec<u8>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub runtime: Runtime,
    pub interface: Interface,
    pub logo: Option<Vec<u8>>,
    pub logo_mime: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedPackage {
    pub id: i64,
    pub identifier: String,
    pub name: String,
    pub version: i64,
    pub runtime: Runtime,
    pub interface: Interface,
    pub tags: Vec<String>,
}

/// Split a comma separated tag list, dropping blanks and repeats.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

pub fn is_valid_name(name: &str) -> bool {
    NAME_REGEX.is_match(name)
}

/// Look up the package an identifier names.
///
/// Usernames and `(owner, name, version)` are both unique, so at most one
/// row can match.
pub async fn resolve(db: &Database, name: &PackageName) -> AppResult<Package> {
    sqlx::query_as::<_, Package>(
        "SELECT p.* FROM packages p
         JOIN users u ON u.id = p.owner_id
         WHERE u.username = ? AND p.name = ? AND p.version = ?",
    )
    .bind(&name.owner)
    .bind(&name.name)
    .bind(name.version)
    .fetch_optional(db.pool())
    .await?
    .ok_or_else(|| AppError::NotFound(format!("No package {name}")))
}

/// Parse and resolve in one step; malformed identifiers are "not found" too.
pub async fn resolve_str(db: &Database, identifier: &str) -> AppResult<Package> {
    let name = PackageName::parse(identifier)
        .ok_or_else(|| AppError::NotFound(format!("No package {identifier}")))?;
    resolve(db, &name).await
}

pub async fn tags_for(db: &Database, package_id: i64) -> AppResult<Vec<String>> {
    let tags = sqlx::query_scalar::<_, String>(
        "SELECT name FROM tags WHERE package_id = ? ORDER BY name",
    )
    .bind(package_id)
    .fetch_all(db.pool())
    .await?;
    Ok(tags)
}

/// Store `new` as the next version of `owner`'s package of that name.
///
/// The version is allocated inside the insert transaction; the
/// `(owner_id, name, version)` constraint turns a lost race into a conflict.
pub async fn create(db: &Database, owner: &User, new: NewPackage) -> AppResult<CreatedPackage> {
    let mut tx = db.pool().begin().await?;

    let previous: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM packages WHERE owner_id = ? AND name = ?")
            .bind(owner.id)
            .bind(&new.name)
            .fetch_one(&mut *tx)
            .await?;
    let version = previous.map_or(1, |v| v + 1);

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO packages (
            name, owner_id, version, data, published, short_description,
            description, runtime, interface, reviewed, logo, logo_mime
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
         RETURNING id",
    )
    .bind(&new.name)
    .bind(owner.id)
    .bind(version)
    .bind(&new.data)
    .bind(Utc::now())
    .bind(&new.short_description)
    .bind(&new.description)
    .bind(new.runtime.as_str())
    .bind(SqlJson(&new.interface))
    .bind(&new.logo)
    .bind(&new.logo_mime)
    .fetch_one(&mut *tx)
    .await?;

    for tag in &new.tags {
        sqlx::query("INSERT INTO tags (name, package_id) VALUES (?, ?)")
            .bind(tag)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let owner_name = owner.username.clone().unwrap_or_default();
    let identifier = PackageName::new(owner_name, new.name.clone(), version).to_string();
    info!("User {} published {}", owner.id, identifier);

    Ok(CreatedPackage {
        id,
        identifier,
        name: new.name,
        version,
        runtime: new.runtime,
        interface: new.interface,
        tags: new.tags,
    })
}

pub async fn handle_list(
    State(state): State<SharedState>,
    Query(query): Query<CatalogQuery>,
) -> AppResult<Json<CatalogPage>> {
    let page = catalog::list(&state.db, query, state.config.page_size as usize).await?;
    Ok(Json(page))
}

pub async fn handle_new(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> Response {
    if !user.can_upload {
        return Redirect::to("/packages").into_response();
    }

    Json(serde_json::json!({
        "user": user,
        "runtimes": [Runtime::Python, Runtime::R],
        "max_upload_bytes": state.config.max_upload_bytes,
    }))
    .into_response()
}

/// Raw multipart fields of the upload form.
#[derive(Debug, Default)]
struct PackageForm {
    runtime: Option<String>,
    name: Option<String>,
    file: Option<Vec<u8>>,
    parameters: Option<String>,
    output: Option<String>,
    headline: Option<String>,
    description: Option<String>,
    logo: Option<Vec<u8>>,
    logo_mime: Option<String>,
    tags: Option<String>,
    entrypoint: Option<String>,
}

impl PackageForm {
    async fn read(mut multipart: Multipart, limit: usize) -> AppResult<Self> {
        let mut form = PackageForm::default();

        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().unwrap_or_default().to_string();
            match field_name.as_str() {
                "package-file" => form.file = Some(upload::read_field(field, limit).await?),
                "package-logo" => {
                    let mime = field.content_type().map(str::to_string);
                    let has_file = field.file_name().is_some_and(|f| !f.is_empty());
                    let bytes = upload::read_field(field, limit).await?;
                    if has_file && !bytes.is_empty() {
                        form.logo = Some(bytes);
                        form.logo_mime = mime;
                    }
                }
                "runtime" => form.runtime = upload::read_text(field).await?,
                "package-name" => form.name = upload::read_text(field).await?,
                "parameters" => form.parameters = upload::read_text(field).await?,
                "output" => form.output = upload::read_text(field).await?,
                "package-headline" => form.headline = upload::read_text(field).await?,
                "package-description" => form.description = upload::read_text(field).await?,
                "package-tags" => form.tags = upload::read_text(field).await?,
                "entrypoint" => form.entrypoint = upload::read_text(field).await?,
                other => warn!("Ignoring unexpected form field {other:?}"),
            }
        }

        Ok(form)
    }

    fn validate(self) -> AppResult<NewPackage> {
        let runtime = required(self.runtime, "runtime")?
            .parse::<Runtime>()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let name = required(self.name, "package-name")?.trim().to_string();
        if !is_valid_name(&name) {
            return Err(AppError::Validation(format!(
                "Invalid package name {name:?}: use letters, digits, '.', '_' and '-'"
            )));
        }

        let parameters: serde_json::Value =
            serde_json::from_str(&required(self.parameters, "parameters")?)
                .map_err(|e| AppError::Validation(format!("Invalid parameters: {e}")))?;

        let interface = Interface {
            entrypoint: self
                .entrypoint
                .map(|e| e.trim().to_string())
                .unwrap_or_else(|| DEFAULT_ENTRYPOINT.to_string()),
            parameters,
            output: required(self.output, "output")?,
        };

        Ok(NewPackage {
            name,
            data: required(self.file, "package-file")?,
            short_description: self.headline,
            description: self.description,
            runtime,
            interface,
            logo: self.logo,
            logo_mime: self.logo_mime,
            tags: self.tags.as_deref().map(parse_tags).unwrap_or_default(),
        })
    }
}

fn required<T>(value: Option<T>, field: &str) -> AppResult<T> {
    value.ok_or_else(|| AppError::Validation(format!("Missing field {field}")))
}

pub async fn handle_validate(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<Response> {
    if !user.can_upload {
        warn!("User {} tried to upload without permission", user.id);
        return Ok(Redirect::to("/packages").into_response());
    }

    upload::check_content_length(&headers, state.config.max_request_bytes())?;

    let form = PackageForm::read(multipart, state.config.max_upload_bytes).await?;
    let created = create(&state.db, &user, form.validate()?).await?;

    Ok((StatusCode::CREATED, Json(created)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct PackageQuery {
    pub package: String,
}

/// What the browser needs to start a package in its runtime.
#[derive(Debug, Serialize)]
pub struct RunDescriptor {
    pub application: String,
    pub runtime: Runtime,
    pub template: &'static str,
    pub file_url: String,
    pub logo_url: Option<String>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub interface: Interface,
    pub tags: Vec<String>,
}

pub async fn handle_run(
    State(state): State<SharedState>,
    Query(query): Query<PackageQuery>,
) -> AppResult<Response> {
    let package = match resolve_str(&state.db, &query.package).await {
        Ok(package) => package,
        Err(AppError::NotFound(_)) => return Ok(Redirect::to("/packages").into_response()),
        Err(e) => return Err(e),
    };

    let runtime = match package.runtime.parse::<Runtime>() {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!("Package {} has an unusable runtime: {e}", package.id);
            return Ok(Redirect::to("/packages").into_response());
        }
    };

    let tags = tags_for(&state.db, package.id).await?;
    let encoded = urlencoding::encode(&query.package);
    let descriptor = RunDescriptor {
        application: query.package.clone(),
        runtime,
        template: runtime.template(),
        file_url: format!("/packages/file?package={encoded}"),
        logo_url: package
            .logo
            .as_ref()
            .map(|_| format!("/packages/logo?package={encoded}")),
        short_description: package.short_description,
        description: package.description,
        interface: package.interface.0,
        tags,
    };

    Ok(Json(descriptor).into_response())
}

pub async fn handle_file(
    State(state): State<SharedState>,
    Query(query): Query<PackageQuery>,
) -> AppResult<Response> {
    let package = resolve_str(&state.db, &query.package).await?;
    let media_type = package
        .runtime
        .parse::<Runtime>()
        .map(|r| r.media_type())
        .unwrap_or("application/octet-stream");

    Ok(binary_response(package.data, media_type))
}

pub async fn handle_logo(
    State(state): State<SharedState>,
    Query(query): Query<PackageQuery>,
) -> AppResult<Response> {
    let package = resolve_str(&state.db, &query.package).await?;
    let logo = package
        .logo
        .ok_or_else(|| AppError::NotFound("No logo for this package".to_string()))?;
    let mime = package
        .logo_mime
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok(binary_response(logo, &mime))
}

pub(crate) fn binary_response(data: Vec<u8>, media_type: &str) -> Response {
    (
        [(header::CONTENT_TYPE, media_type.to_string())],
        Body::from(data),
    )
        .into_response()
}
