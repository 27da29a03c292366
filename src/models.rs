use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use thiserror::Error;

/// A registered portal user, created on first sign-in.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub username: Option<String>,
    pub role: String,
    pub picture: String,
    /// Subject claim from the identity provider
    pub sub: String,
    pub can_upload: bool,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

/// An opaque login token handed to a client in the session cookie.
#[derive(Debug, Clone, FromRow)]
pub struct UserToken {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    pub created: DateTime<Utc>,
}

/// The declared calling convention of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub entrypoint: String,
    pub parameters: serde_json::Value,
    pub output: String,
}

/// A full package row, payload included.
#[derive(Debug, Clone, FromRow)]
pub struct Package {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub version: i64,
    pub data: Vec<u8>,
    pub published: DateTime<Utc>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub runtime: String,
    pub interface: Json<Interface>,
    pub reviewed: bool,
    pub logo: Option<Vec<u8>>,
    pub logo_mime: Option<String>,
}

/// Catalog view of a package: metadata only, plus the owner's username.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PackageSummary {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub owner: Option<String>,
    pub version: i64,
    pub published: DateTime<Utc>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub runtime: String,
    pub reviewed: bool,
    pub has_logo: bool,
}

impl PackageSummary {
    /// `owner/name@version`, when the owner has a username.
    pub fn identifier(&self) -> Option<String> {
        self.owner
            .as_ref()
            .map(|owner| format!("{}/{}@{}", owner, self.name, self.version))
    }
}

/// Client-side execution environment of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runtime {
    #[serde(rename = "python-runtime")]
    Python,
    #[serde(rename = "R-runtime")]
    R,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Python => "python-runtime",
            Runtime::R => "R-runtime",
        }
    }

    /// Page template that hosts this runtime in the browser.
    pub fn template(&self) -> &'static str {
        match self {
            Runtime::Python => "package-run-python.html",
            Runtime::R => "package-run-R.html",
        }
    }

    /// Media type used when serving the package payload.
    pub fn media_type(&self) -> &'static str {
        match self {
            Runtime::Python => "text/x-python",
            Runtime::R => "text/x-r",
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown runtime: {0}")]
pub struct UnknownRuntime(pub String);

impl FromStr for Runtime {
    type Err = UnknownRuntime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python-runtime" => Ok(Runtime::Python),
            "R-runtime" => Ok(Runtime::R),
            other => Err(UnknownRuntime(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SampleData {
    pub id: i64,
    pub name: String,
    pub mime: String,
    pub owner_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Requested,
    Granted,
    Denied,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Requested => "requested",
            RequestStatus::Granted => "granted",
            RequestStatus::Denied => "denied",
        }
    }
}

pub const PERMISSION_UPLOAD: &str = "upload";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PermissionRequest {
    pub id: i64,
    pub permission: String,
    pub status: String,
    pub user_id: i64,
}

/// A published result, retrievable by its reference.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ShareData {
    pub id: i64,
    pub reference: String,
    pub output: String,
    pub filename: Option<String>,
    pub checksum: String,
    pub data: String,
    pub owner_id: i64,
    pub package_id: i64,
    pub created: DateTime<Utc>,
}
