//! SQLite storage.
//!
//! One pool per process, created at start-up and carried in the application
//! state. The schema is applied idempotently on connect.

use std::str::FromStr;
use std::time::Duration;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::AppResult;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    created     TEXT    NOT NULL,
    username    TEXT,
    role        TEXT    NOT NULL DEFAULT 'user',
    picture     TEXT    NOT NULL DEFAULT '',
    sub         TEXT    NOT NULL UNIQUE,
    can_upload  INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username ON users (username);

CREATE TABLE IF NOT EXISTS user_tokens (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    token    TEXT    NOT NULL UNIQUE,
    user_id  INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    created  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS packages (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    name               TEXT    NOT NULL,
    owner_id           INTEGER NOT NULL REFERENCES users (id),
    version            INTEGER NOT NULL CHECK (version >= 1),
    data               BLOB    NOT NULL,
    published          TEXT    NOT NULL,
    short_description  TEXT,
    description        TEXT,
    runtime            TEXT    NOT NULL,
    interface          TEXT    NOT NULL,
    reviewed           INTEGER NOT NULL DEFAULT 0,
    logo               BLOB,
    logo_mime          TEXT,
    UNIQUE (owner_id, name, version)
);

CREATE TABLE IF NOT EXISTS tags (
    name        TEXT    NOT NULL,
    package_id  INTEGER NOT NULL REFERENCES packages (id) ON DELETE CASCADE,
    PRIMARY KEY (name, package_id)
);

CREATE TABLE IF NOT EXISTS sample_data (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT    NOT NULL,
    data      BLOB    NOT NULL,
    mime      TEXT    NOT NULL,
    owner_id  INTEGER NOT NULL REFERENCES users (id)
);

CREATE TABLE IF NOT EXISTS permission_requests (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    permission  TEXT    NOT NULL,
    status      TEXT    NOT NULL DEFAULT 'requested',
    user_id     INTEGER NOT NULL REFERENCES users (id),
    UNIQUE (permission, user_id)
);

CREATE TABLE IF NOT EXISTS share_data (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    reference   TEXT    NOT NULL UNIQUE,
    output      TEXT    NOT NULL,
    filename    TEXT,
    checksum    TEXT    NOT NULL,
    data        TEXT    NOT NULL,
    owner_id    INTEGER NOT NULL REFERENCES users (id),
    package_id  INTEGER NOT NULL REFERENCES packages (id),
    created     TEXT    NOT NULL
);
"#;

/// Handle to the relational store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        info!("Database ready at {url}");

        Ok(db)
    }

    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
