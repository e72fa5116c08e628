//! Transport seam for outbound metadata calls.
//!
//! The engine never talks to the network directly; platform crates provide
//! an [`HttpTransport`] (the CLI ships a `reqwest` one) and tests script
//! responses in memory.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// HTTP verbs used by the metadata API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully described outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Parameters that identify the logical request, independent of transport details.
    #[must_use]
    pub fn identity_params(&self) -> Value {
        let mut query: Vec<&(String, String)> = self.query.iter().collect();
        query.sort();
        serde_json::json!({
            "query": query,
            "body": self.body,
        })
    }
}

/// Response returned by a transport, before any caching.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Transport-only metadata; never persisted by the cache.
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl HttpResponse {
    #[must_use]
    pub const fn ok(body: Value) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Failure raised before any response status was available.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{method} {url} failed: {message}")]
pub struct TransportError {
    pub method: Method,
    pub url: String,
    pub message: String,
}

/// Executes HTTP requests on behalf of the engine.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform the request.
    ///
    /// # Errors
    ///
    /// Returns an error if no response could be obtained.
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait::async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for std::sync::Arc<T> {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_params_ignore_query_order() {
        let a = HttpRequest::get("https://x/v0/indices/1/subjects")
            .with_query("limit", 10)
            .with_query("offset", 20);
        let b = HttpRequest::get("https://x/v0/indices/1/subjects")
            .with_query("offset", 20)
            .with_query("limit", 10);
        assert_eq!(a.identity_params(), b.identity_params());
    }

    #[test]
    fn success_range() {
        assert!(HttpResponse::ok(json!({})).is_success());
        let missing = HttpResponse {
            status: 404,
            headers: Vec::new(),
            body: Value::Null,
        };
        assert!(!missing.is_success());
        assert_eq!(Method::Post.to_string(), "POST");
    }
}
