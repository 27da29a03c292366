use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue},
    routing::{get, post},
};
use log::{info, warn};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer};

use crate::auth::{self, IdentityProvider, MaybeUser};
use crate::config::Config;
use crate::data;
use crate::db::Database;
use crate::packages;
use crate::requests;
use crate::share;

/// Everything a handler can reach, built once in `run`.
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

pub type SharedState = Arc<AppState>;

const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; \
    script-src 'self' 'unsafe-eval' 'unsafe-inline' https://cdn.jsdelivr.net https://unpkg.com https://webr.r-wasm.org; \
    style-src 'self' 'unsafe-inline' https://cdn.jsdelivr.net; \
    img-src 'self' data: https://*.googleusercontent.com; \
    connect-src 'self' https://*.r-wasm.org https://cdn.jsdelivr.net https://pypi.org https://files.pythonhosted.org https://raw.githubusercontent.com; \
    child-src 'self'; \
    worker-src 'self' blob:";

/// Headers that keep pages cross-origin isolated, which the WASM runtimes need.
const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("content-security-policy", CONTENT_SECURITY_POLICY),
    ("cross-origin-embedder-policy", "require-corp"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
];

pub fn router(state: SharedState) -> Router {
    let body_limit = state.config.max_request_bytes();
    let static_dir = state.config.static_dir.clone();

    let mut app = Router::new()
        .route("/", get(serve_index))
        .route("/login", get(auth::handle_login))
        .route("/callback", get(auth::handle_callback))
        .route("/logout", get(auth::handle_logout))
        .route("/me", get(auth::handle_me))
        .route("/packages", get(packages::handle_list))
        .route("/packages/list", get(packages::handle_list))
        .route("/packages/new", get(packages::handle_new))
        .route("/packages/validate", post(packages::handle_validate))
        .route("/packages/run", get(packages::handle_run))
        .route("/packages/file", get(packages::handle_file))
        .route("/packages/logo", get(packages::handle_logo))
        .route("/data", get(data::handle_list))
        .route("/data/new", post(data::handle_new))
        .route("/data/file", get(data::handle_file))
        .route("/requests/upload", post(requests::handle_upload_request))
        .route("/admin", get(requests::handle_admin))
        .route("/admin/requests/:id/grant", post(requests::handle_grant))
        .route("/admin/requests/:id/deny", post(requests::handle_deny))
        .route("/share", post(share::handle_create))
        .route("/shared/:reference", get(share::handle_retrieve))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    for (name, value) in SECURITY_HEADERS {
        app = app.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    app
}

async fn serve_index(MaybeUser(user): MaybeUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "JINet",
        "user": user,
        "links": {
            "packages": "/packages/list",
            "data": "/data",
            "login": "/login",
        },
    }))
}

pub async fn run(
    config: Config,
    identity: Option<Arc<dyn IdentityProvider>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::connect(&config.database_url).await?;
    if identity.is_none() {
        warn!("No identity provider configured; /login is disabled");
    }

    let address = config.address.clone();
    let state = Arc::new(AppState {
        db,
        config,
        identity,
    });
    let app = router(state);

    let listener = TcpListener::bind(&address).await?;
    info!("Listening on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
