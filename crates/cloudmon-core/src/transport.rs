//! HTTP transport collaborator.
//!
//! Everything that touches the wire (connections, TLS, timeouts, pooling) is
//! delegated to an implementation of [`Transport`]. The rest of cloudmon only
//! builds [`HttpRequest`] values and interprets [`HttpResponse`] values.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use reqwest::{Method, StatusCode};

use crate::error::{CloudmonError, Result};

/// A fully-addressed outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,

    /// Absolute URL, without query string
    pub url: String,

    /// Request headers
    pub headers: HeaderMap,

    /// Query parameters, in order
    pub query: Vec<(String, String)>,

    /// Serialized request body
    pub body: Option<String>,
}

impl HttpRequest {
    /// Create a request with no headers, query or body
    pub fn new<S: Into<String>>(method: Method, url: S) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Set a header, replacing any previous value.
    ///
    /// Fails if the name or value is not a valid header token.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            CloudmonError::Transport(format!("invalid header name '{}': {}", name, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            CloudmonError::Transport(format!("invalid value for header '{}': {}", name, e))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Append a query parameter
    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the body
    pub fn with_body<S: Into<String>>(mut self, body: S) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of a query parameter, if present
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A raw response as returned by the transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: StatusCode,

    /// Response headers (case-insensitive lookup)
    pub headers: HeaderMap,

    /// Body text
    pub body: String,
}

impl HttpResponse {
    /// Create a response with the given status and no headers or body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }

    /// Response with a JSON body and matching content type
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut resp = Self::new(status);
        resp.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        resp.body = value.to_string();
        resp
    }

    /// Set a header (builder style). Invalid values are ignored.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set the raw body (builder style)
    pub fn with_body<S: Into<String>>(mut self, body: S) -> Self {
        self.body = body.into();
        self
    }

    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type without parameters, lowercased (e.g. "application/json")
    pub fn media_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
    }

    /// `Location` header, if present
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }
}

/// The HTTP collaborator every connection sends through.
///
/// Implementations own retries, pooling, TLS and timeouts; cloudmon itself
/// never retries a request.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send a request and return the raw response.
    ///
    /// Non-2xx statuses are not errors at this layer.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_strips_parameters() {
        let resp = HttpResponse::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, "Application/JSON; charset=UTF-8");
        assert_eq!(resp.media_type().as_deref(), Some("application/json"));
    }

    #[test]
    fn test_missing_content_type() {
        let resp = HttpResponse::new(StatusCode::OK).with_body("hello");
        assert!(resp.media_type().is_none());
    }

    #[test]
    fn test_request_builders() {
        let req = HttpRequest::new(Method::GET, "https://api.example.com/v1/entities")
            .with_header("X-Auth-Token", "tok")
            .unwrap()
            .with_query("marker", "enB");

        assert_eq!(req.header("x-auth-token"), Some("tok"));
        assert_eq!(req.query_param("marker"), Some("enB"));
        assert_eq!(req.query_param("limit"), None);
    }

    #[test]
    fn test_invalid_header_value_is_rejected() {
        let res = HttpRequest::new(Method::GET, "https://x").with_header("X-Auth-Key", "a\nb");
        assert!(res.is_err());
    }
}
