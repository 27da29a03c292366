#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use jinet::{
    app::{self, AppState},
    auth::{self, Identity, IdentityProvider},
    config::Config,
    db::Database,
    models::User,
    packages::{self, NewPackage},
    users,
};
use jinet::models::{Interface, Runtime};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "jinet-test-boundary";

pub struct TestApp {
    // Keeps the database file alive for the test's duration.
    _dir: TempDir,
    pub db: Database,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::default(), None).await
    }

    pub async fn with_config(mut config: Config, identity: Option<Arc<dyn IdentityProvider>>) -> Self {
        let dir = TempDir::new().unwrap();
        config.database_url = format!("sqlite://{}", dir.path().join("jinet.db").display());

        let db = Database::connect(&config.database_url).await.unwrap();
        let state = Arc::new(AppState {
            db: db.clone(),
            config,
            identity,
        });

        Self {
            _dir: dir,
            db,
            router: app::router(state),
        }
    }

    /// Sign a user in and return them with their session token.
    pub async fn user(&self, name: &str, can_upload: bool) -> (User, String) {
        let identity = Identity {
            sub: format!("auth0|{name}"),
            nickname: name.to_string(),
            picture: String::new(),
        };
        let (user, token) = auth::sign_in(&self.db, &identity).await.unwrap();
        if can_upload {
            users::set_can_upload(&self.db, user.id, true).await.unwrap();
        }
        let user = users::find_by_id(&self.db, user.id).await.unwrap().unwrap();
        (user, token.token)
    }

    pub async fn publish(&self, owner: &User, name: &str, tags: &[&str]) -> i64 {
        let new = NewPackage {
            name: name.to_string(),
            data: format!("print('{name}')").into_bytes(),
            short_description: Some(format!("{name} headline")),
            description: None,
            runtime: Runtime::Python,
            interface: Interface {
                entrypoint: "main".to_string(),
                parameters: serde_json::json!({}),
                output: "text".to_string(),
            },
            logo: None,
            logo_mime: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        packages::create(&self.db, owner, new).await.unwrap().id
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("session={token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, token: Option<&str>, form: &str) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("session={token}"));
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap()).await
    }

    pub async fn post_multipart(&self, uri: &str, token: &str, body: Vec<u8>) -> Response<Body> {
        let length = body.len();
        self.post_multipart_declaring(uri, token, body, length).await
    }

    /// Like `post_multipart`, but with a caller-chosen `Content-Length`.
    pub async fn post_multipart_declaring(
        &self,
        uri: &str,
        token: &str,
        body: Vec<u8>,
        content_length: usize,
    ) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::COOKIE, format!("session={token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::CONTENT_LENGTH, content_length)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }
}

/// Hand-rolled multipart/form-data body.
#[derive(Default)]
pub struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, mime: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.bytes
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.bytes
    }
}

/// The mandatory fields of the package upload form.
pub fn package_form(name: &str, parameters: &str, file: &[u8]) -> MultipartBody {
    MultipartBody::default()
        .text("runtime", "python-runtime")
        .text("package-name", name)
        .text("parameters", parameters)
        .text("output", "text")
        .file("package-file", "main.py", "text/x-python", file)
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn location(response: &Response<Body>) -> &str {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap()
}
