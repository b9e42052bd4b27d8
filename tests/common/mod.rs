#![allow(dead_code)]

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use flatfile_api::config::AppConfig;
use flatfile_api::{app, AppState};

pub const TEST_SECRET: &str = "integration-test-secret";
pub const PASSWORD: &str = "secret123";

/// Router over a fresh data directory; the TempDir must outlive the router
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;

        let mut config = AppConfig::development();
        config.storage.data_dir = dir.path().to_path_buf();
        config.security.jwt_secret = TEST_SECRET.to_string();
        config.api.enable_request_logging = false;

        let state = AppState::from_config(config).await?;
        let router = app(state.clone());
        Ok(Self { router, state, dir })
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, body))
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Register a user and return its id
    pub async fn register(&self, username: &str) -> Result<u64> {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": PASSWORD
                }),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body["data"]["user"]["id"]
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("missing user id: {}", body))
    }

    /// Log in by email and return the token
    pub async fn login(&self, username: &str) -> Result<String> {
        let (status, body) = self
            .post(
                "/api/auth/login",
                None,
                json!({ "email": format!("{}@example.com", username), "password": PASSWORD }),
            )
            .await?;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["data"]["token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("missing token: {}", body))
    }

    /// Register then log in
    pub async fn user(&self, username: &str) -> Result<(u64, String)> {
        let id = self.register(username).await?;
        let token = self.login(username).await?;
        Ok((id, token))
    }
}

pub fn assert_error(body: &Value, code: &str) {
    assert_eq!(body["success"], false, "expected error envelope: {}", body);
    assert_eq!(body["code"], code, "unexpected error code: {}", body);
    assert!(body["error"].is_string(), "missing error message: {}", body);
}
