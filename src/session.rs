//! HTTP transport used by the client.
//!
//! [`Session`] is the client's only dependency on an HTTP stack: production
//! code goes through [`HttpSession`] over `reqwest`, tests substitute their
//! own implementation.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Method};
use serde_json::Value;

use crate::Error;

/// Outcome of a completed HTTP exchange.
///
/// A `Response` exists for any status the server answered with; turning bad
/// statuses into errors is the caller's decision, not the transport's.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    /// JSON-decoded body of a successful response, when there was one.
    pub payload: Option<Value>,
    /// Raw body text. For error statuses this is the error body.
    pub text: String,
}

impl Response {
    /// The decoded payload, or an empty mapping when the body was empty.
    pub fn json(&self) -> Value {
        self.payload
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

/// An HTTP session able to carry requests to amoCRM.
#[async_trait]
pub trait Session: Send + Sync {
    /// Perform a single HTTP exchange.
    ///
    /// `params`, if any, are appended to the URL as raw `key=value` pairs
    /// joined with `&` - no percent-encoding is applied, callers must supply
    /// URL-safe values. A connection-level failure (DNS, refused connection,
    /// timeout before a status line) is an [`Error::Network`]; a readable
    /// response with an error status is a plain [`Response`].
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: Option<HashMap<String, String>>,
        json: Option<&Value>,
        params: Option<&[(String, String)]>,
        timeout: Duration,
    ) -> Result<Response, Error>;

    /// POST `json` to `url` with the JSON content type set.
    async fn post(&self, url: &str, json: &Value, timeout: Duration) -> Result<Response, Error> {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        self.request(Method::POST, url, Some(headers), Some(json), None, timeout)
            .await
    }
}

/// [`Session`] implementation over a shared [`reqwest::Client`].
pub struct HttpSession {
    client: reqwest::Client,
}

impl HttpSession {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::ClientBuilder::new()
                .connect_timeout(Duration::from_secs(5))
                .default_headers({
                    let mut headers = header::HeaderMap::new();
                    headers.insert(
                        header::USER_AGENT,
                        header::HeaderValue::from_static("reqwest (amocrm-api-rs)"),
                    );
                    headers
                })
                .build()?,
        })
    }
}

fn with_query(url: &str, params: &[(String, String)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", url, query)
}

#[async_trait]
impl Session for HttpSession {
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: Option<HashMap<String, String>>,
        json: Option<&Value>,
        params: Option<&[(String, String)]>,
        timeout: Duration,
    ) -> Result<Response, Error> {
        let url = match params {
            Some(params) if !params.is_empty() => with_query(url, params),
            _ => url.to_string(),
        };

        let mut request = self.client.request(method, &url).timeout(timeout);
        if let Some(headers) = headers {
            for (name, value) in &headers {
                request = request.header(name, value);
            }
        }
        if let Some(json) = json {
            request = request.json(json);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.into()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.into()))?;

        if !status.is_success() {
            // Error bodies are kept as raw text, no decoding attempted.
            return Ok(Response {
                status: status.as_u16(),
                payload: None,
                text,
            });
        }

        let payload = if text.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid JSON in the response of {}", url))?,
            )
        };
        Ok(Response {
            status: status.as_u16(),
            payload,
            text,
        })
    }
}
