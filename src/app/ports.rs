use crate::common::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A single outbound request, independent of the HTTP library
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub json: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            bearer: None,
            json: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            query: Vec::new(),
            bearer: None,
            json: Some(body),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }
}

/// Sends one request. Transport failures come back as `Err(message)`;
/// any HTTP status, including errors, is an `Ok` response.
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, String>;
}

/// Blocking delay used for rate-limit backoff
#[async_trait]
pub trait SleepPort: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Randomized pause between independent lookups
#[async_trait]
pub trait PacingPort: Send + Sync {
    /// Pause for a duration drawn from `[min_ms, max_ms]`
    async fn pause(&self, window_ms: (u64, u64));
}
