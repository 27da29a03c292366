use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use log::error;
use thiserror::Error;

use crate::auth;

/// Errors surfaced by repository functions and request handlers.
///
/// Every variant maps onto exactly one HTTP response, so handlers can
/// propagate with `?` and let [`IntoResponse`] pick the status.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    /// Carries the path that needed the login, to return to afterwards.
    #[error("Login required")]
    LoginRequired(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("File too large")]
    PayloadTooLarge,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(db.message().to_string())
            }
            _ => AppError::Database(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::LoginRequired(ref from) => {
                let jar = CookieJar::new().add(auth::return_to_cookie(from.clone()));
                return (jar, Redirect::to("/login")).into_response();
            }
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Validation(ref message) => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(serde_json::json!({ "error": message })),
                )
                    .into_response();
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Multipart(ref e) => e.status(),
            AppError::Database(ref e) => {
                error!("Database failure: {e}");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
            }
            AppError::Config(_) | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
