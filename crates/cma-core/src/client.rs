use crate::error::{AgentError, Result};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Authenticated client for the control-plane API.
///
/// Clones share the connection pool and the current access token, so a
/// token refreshed through one clone is seen by all of them.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Arc<RwLock<String>>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cma/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(token.into())),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn token(&self) -> String {
        let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    pub fn set_token(&self, token: &str) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = token.to_string();
    }

    pub async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Vec<u8>> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Vec<u8>> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    /// POST authenticated with `token` instead of the current access token.
    pub async fn post_json_as<T: Serialize + ?Sized>(
        &self,
        path: &str,
        token: &str,
        body: &T,
    ) -> Result<Vec<u8>> {
        let req = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .json(body);
        self.send(req).await
    }

    /// Probe the unauthenticated `health` endpoint, returning its latency.
    pub async fn health(&self) -> Result<Duration> {
        let started = Instant::now();
        let req = self
            .http
            .get(self.url("health"))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONNECTION, "close");
        self.send(req).await?;
        Ok(started.elapsed())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(self.token())
    }

    async fn send(&self, req: RequestBuilder) -> Result<Vec<u8>> {
        let resp = req.send().await?;
        let status = resp.status();
        let url = resp.url().to_string();
        let body = resp.bytes().await?.to_vec();
        debug!(%url, status = status.as_u16(), bytes = body.len(), "api response");

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AgentError::Unauthorized);
        }
        if !status.is_success() {
            return Err(AgentError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }
}
