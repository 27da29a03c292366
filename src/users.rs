use chrono::Utc;
use log::info;

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{ROLE_USER, User};

pub async fn find_by_id(db: &Database, id: i64) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db.pool())
        .await?;
    Ok(user)
}

pub async fn find_by_sub(db: &Database, sub: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE sub = ?")
        .bind(sub)
        .fetch_optional(db.pool())
        .await?;
    Ok(user)
}

pub async fn find_by_username(db: &Database, username: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(db.pool())
        .await?;
    Ok(user)
}

/// First free username for `nickname`: the nickname itself, then
/// `nickname-2`, `nickname-3`, ...
pub async fn available_username(db: &Database, nickname: &str) -> AppResult<String> {
    if find_by_username(db, nickname).await?.is_none() {
        return Ok(nickname.to_string());
    }

    let mut suffix = 2;
    loop {
        let candidate = format!("{nickname}-{suffix}");
        if find_by_username(db, &candidate).await?.is_none() {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

/// Insert a new user with the default role and no upload permission.
///
/// Usernames are unique; a taken `username` is a [`AppError::Conflict`].
pub async fn create(db: &Database, username: &str, picture: &str, sub: &str) -> AppResult<User> {
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (created, username, role, picture, sub, can_upload)
         VALUES (?, ?, ?, ?, ?, 0)
         RETURNING *",
    )
    .bind(Utc::now())
    .bind(username)
    .bind(ROLE_USER)
    .bind(picture)
    .bind(sub)
    .fetch_one(db.pool())
    .await?;

    info!("Created user {} ({})", username, user.id);
    Ok(user)
}

pub async fn list(db: &Database) -> AppResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
        .fetch_all(db.pool())
        .await?;
    Ok(users)
}

pub async fn set_can_upload(db: &Database, user_id: i64, can_upload: bool) -> AppResult<()> {
    let result = sqlx::query("UPDATE users SET can_upload = ? WHERE id = ?")
        .bind(can_upload)
        .bind(user_id)
        .execute(db.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User {user_id} not found")));
    }
    Ok(())
}

pub async fn set_role(db: &Database, username: &str, role: &str) -> AppResult<()> {
    let result = sqlx::query("UPDATE users SET role = ? WHERE username = ?")
        .bind(role)
        .bind(username)
        .execute(db.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User {username} not found")));
    }
    info!("Set role of {username} to {role}");
    Ok(())
}
