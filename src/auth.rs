use async_trait::async_trait;
use axum::{
    Json,
    extract::{FromRequestParts, Query, State},
    http::{Method, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use log::info;
use rand::Rng;
use serde::Deserialize;

use crate::app::SharedState;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{User, UserToken};
use crate::users;

/// Name of the cookie carrying the login token
pub const SESSION_COOKIE: &str = "session";

/// Page to go back to once a login completes
pub const RETURN_TO_COOKIE: &str = "return_to";

const TOKEN_LENGTH: usize = 43;

/// Claims returned by the identity provider after a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    pub sub: String,
    pub nickname: String,
    #[serde(default)]
    pub picture: String,
}

/// The external login service (an OpenID Connect provider in production).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to start a login.
    fn authorize_url(&self, redirect_uri: &str) -> String;

    /// Trade the callback `code` for the user's claims.
    async fn exchange(&self, code: &str) -> AppResult<Identity>;
}

/// URL-safe random token, roughly 256 bits.
pub fn generate_token() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    let mut rng = rand::thread_rng();

    (0..TOKEN_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

const SIGN_UP_ATTEMPTS: usize = 3;

/// The user behind `identity`, registering them on first sight.
///
/// A nickname already taken by another account gets a numeric suffix, so
/// `owner/name@version` identifiers stay unambiguous.
async fn find_or_register(db: &Database, identity: &Identity) -> AppResult<User> {
    for _ in 0..SIGN_UP_ATTEMPTS {
        if let Some(user) = users::find_by_sub(db, &identity.sub).await? {
            return Ok(user);
        }

        let username = users::available_username(db, &identity.nickname).await?;
        match users::create(db, &username, &identity.picture, &identity.sub).await {
            Ok(user) => return Ok(user),
            // Lost a race for the name or the subject; look again.
            Err(AppError::Conflict(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(AppError::Conflict(format!(
        "Could not register {}",
        identity.nickname
    )))
}

/// Find or create the user behind `identity` and open a new session for them.
pub async fn sign_in(db: &Database, identity: &Identity) -> AppResult<(User, UserToken)> {
    let user = find_or_register(db, identity).await?;

    let token = sqlx::query_as::<_, UserToken>(
        "INSERT INTO user_tokens (token, user_id, created) VALUES (?, ?, ?) RETURNING *",
    )
    .bind(generate_token())
    .bind(user.id)
    .bind(Utc::now())
    .fetch_one(db.pool())
    .await?;

    info!("User {} signed in", user.id);
    Ok((user, token))
}

pub async fn sign_out(db: &Database, token: &str) -> AppResult<()> {
    sqlx::query("DELETE FROM user_tokens WHERE token = ?")
        .bind(token)
        .execute(db.pool())
        .await?;
    Ok(())
}

pub async fn user_for_token(db: &Database, token: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT users.* FROM users
         JOIN user_tokens ON user_tokens.user_id = users.id
         WHERE user_tokens.token = ?",
    )
    .bind(token)
    .fetch_optional(db.pool())
    .await?;
    Ok(user)
}

async fn session_user(parts: &Parts, state: &SharedState) -> AppResult<Option<User>> {
    let jar = CookieJar::from_headers(&parts.headers);
    match jar.get(SESSION_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => user_for_token(&state.db, cookie.value()).await,
        _ => Ok(None),
    }
}

/// Only pages can be revisited after login; form posts go back to `/`.
fn return_path(parts: &Parts) -> String {
    if parts.method == Method::GET {
        parts.uri.path().to_string()
    } else {
        "/".to_string()
    }
}

/// The logged-in user. Redirects to the login page when there is none.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> AppResult<Self> {
        session_user(parts, state)
            .await?
            .map(CurrentUser)
            .ok_or_else(|| AppError::LoginRequired(return_path(parts)))
    }
}

/// The logged-in user, if any.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<SharedState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> AppResult<Self> {
        Ok(MaybeUser(session_user(parts, state).await?))
    }
}

/// A logged-in user holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<SharedState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> AppResult<Self> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.is_admin() {
            Ok(AdminUser(user))
        } else {
            Err(AppError::Unauthorized)
        }
    }
}

fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

pub(crate) fn return_to_cookie(path: String) -> Cookie<'static> {
    Cookie::build((RETURN_TO_COOKIE, path))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Local path to land on after login; anything that could leave the site is `/`.
pub fn safe_return_path(path: Option<&str>) -> &str {
    match path {
        Some("/login" | "/logout" | "/callback") => "/",
        Some(p) if p.starts_with('/') && !p.starts_with("//") && !p.contains('\\') => p,
        _ => "/",
    }
}

pub async fn handle_login(State(state): State<SharedState>) -> AppResult<Redirect> {
    let provider = state
        .identity
        .as_ref()
        .ok_or_else(|| AppError::NotFound("No identity provider configured".to_string()))?;

    let redirect_uri = format!("{}/callback", state.config.public_url.trim_end_matches('/'));
    Ok(Redirect::to(&provider.authorize_url(&redirect_uri)))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
}

pub async fn handle_callback(
    State(state): State<SharedState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Response> {
    let provider = state
        .identity
        .as_ref()
        .ok_or_else(|| AppError::NotFound("No identity provider configured".to_string()))?;

    let identity = provider.exchange(&query.code).await?;
    let (_, token) = sign_in(&state.db, &identity).await?;

    let target = safe_return_path(jar.get(RETURN_TO_COOKIE).map(|c| c.value())).to_string();
    let jar = jar
        .remove(Cookie::build(RETURN_TO_COOKIE).path("/").build())
        .add(session_cookie(token.token, state.config.secure_cookies));

    Ok((jar, Redirect::to(&target)).into_response())
}

pub async fn handle_logout(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        sign_out(&state.db, cookie.value()).await?;
    }
    info!("User {} signed out", user.id);

    let removal = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    Ok((jar.remove(removal), Redirect::to("/")))
}

pub async fn handle_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_url_safe_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(a, b);
    }

    #[test]
    fn return_path_stays_on_site() {
        assert_eq!(safe_return_path(Some("/packages/new")), "/packages/new");
        assert_eq!(safe_return_path(None), "/");
        assert_eq!(safe_return_path(Some("/logout")), "/");
        assert_eq!(safe_return_path(Some("//evil.example/")), "/");
        assert_eq!(safe_return_path(Some("https://evil.example/")), "/");
        assert_eq!(safe_return_path(Some("/\\evil.example")), "/");
    }
}
