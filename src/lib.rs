/*!
# JINet

A portal for small executable packages: Python or R scripts with a declared
parameter/output interface that run in the visitor's browser on WASM
runtimes.

## Overview

Users sign in through an external identity provider, ask for upload
permission, and publish packages. Every upload of an existing package becomes
its next version. Visitors browse and search the catalog, fetch a package for
their in-browser runtime, and can share computed results behind an opaque link.

## Architecture

### HTTP Layer
- **Technologies**: Rust, axum, tower-http
- Handlers answer with JSON documents, redirects or raw payloads
- Cross-origin isolation headers on every response (needed by the WASM runtimes)

### Domain
- **Package identifiers** - `owner/name@version` strings
- **Catalog** - latest-version-only listing with tag and free-text filters
- **Trigram search** - fuzzy name matching in the style of `pg_trgm`
- **Uploads** - byte-capped multipart reading

### Persistence
- SQLite through sqlx, schema applied on start-up
- Login sessions are rows keyed by an opaque token kept in a cookie

## Modules

- **app**: Router, shared state and server start-up
- **auth**: Sessions, identity-provider seam and request extractors
- **catalog**: Package listing and pagination
- **config**: Environment configuration
- **data**: Sample datasets
- **db**: Connection pool and schema
- **error**: Error type and its HTTP mapping
- **models**: Database rows and value types
- **package_name**: Identifier parsing
- **packages**: Package storage, upload and retrieval
- **requests**: Permission requests and admin review
- **search**: Trigram similarity
- **share**: Shared results
- **upload**: Upload size limits
- **users**: User storage

## REST API Endpoints

- `/packages/list?since=&tag=&term=` - Catalog page
- `/packages/validate` - Publish a package (multipart)
- `/packages/run?package=`, `/packages/file?package=`, `/packages/logo?package=` - Package access
- `/data`, `/data/new`, `/data/file?name=` - Sample datasets
- `/requests/upload` - Ask for upload permission
- `/admin`, `/admin/requests/{id}/grant`, `/admin/requests/{id}/deny` - Review requests
- `/share?application=`, `/shared/{reference}` - Shared results
*/

pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod data;
pub mod db;
pub mod error;
pub mod models;
pub mod package_name;
pub mod packages;
pub mod requests;
pub mod search;
pub mod share;
pub mod upload;
pub mod users;

pub use error::{AppError, AppResult};
pub use package_name::PackageName;
