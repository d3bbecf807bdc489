pub mod dto;
pub mod endpoints;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, COOKIE, HeaderMap, HeaderValue};

use crate::error::AppError;

pub use endpoints::{Endpoints, resolve_base_url};

/// Status and raw body of a portal response. Interpretation is left to the caller.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait XkClient: Send + Sync {
    /// Issues an authenticated AJAX-style GET. `Err` only for transport failures.
    async fn get(&self, url: &str) -> Result<HttpReply, AppError>;
}

pub struct XkHttpClient {
    client: Client,
}

impl XkHttpClient {
    pub fn new(cookie: Option<&str>, timeout: Duration) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        if let Some(cookie) = cookie.filter(|c| !c.trim().is_empty()) {
            let mut value = HeaderValue::from_str(cookie.trim())
                .map_err(|e| AppError::Config(format!("XK_COOKIE is not a valid header: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl XkClient for XkHttpClient {
    async fn get(&self, url: &str) -> Result<HttpReply, AppError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }
}

/// Answers every request with an empty 404. Useful when no portal is configured.
pub struct NoopXkClient;

#[async_trait]
impl XkClient for NoopXkClient {
    async fn get(&self, _url: &str) -> Result<HttpReply, AppError> {
        Ok(HttpReply::new(404, ""))
    }
}
