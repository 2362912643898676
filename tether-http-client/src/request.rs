//! Request descriptors and the request builder.

use crate::{HttpClient, HttpClientError, Response, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Request body, encoded only when the request is sent.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document, sent as `application/json`.
    Json(serde_json::Value),
    /// Already URL-encoded form fields, sent as `application/x-www-form-urlencoded`.
    Form(String),
    /// Plain text, sent as `text/plain; charset=utf-8`.
    Text(String),
    /// Pre-serialized payload, sent untouched.
    Raw(Bytes),
}

impl RequestBody {
    /// Content type implied by the body, if any.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Json(_) => Some("application/json"),
            Self::Form(_) => Some("application/x-www-form-urlencoded"),
            Self::Text(_) => Some("text/plain; charset=utf-8"),
            Self::Raw(_) => None,
        }
    }

    /// Encode the body to wire bytes.
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Self::Json(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| HttpClientError::RequestBuild(e.to_string())),
            Self::Form(encoded) => Ok(Bytes::from(encoded.clone())),
            Self::Text(text) => Ok(Bytes::from(text.clone())),
            Self::Raw(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Everything needed to execute one logical call, before URL resolution.
///
/// Request interceptors receive and return this value, so they may rewrite
/// headers, query parameters or the body.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the base URL, or an absolute URL.
    pub path: String,
    /// Request headers, applied after the client's default headers.
    pub headers: HeaderMap,
    /// Query parameters appended to the URL, in order.
    pub query: Vec<(String, String)>,
    /// Optional body.
    pub body: Option<RequestBody>,
    /// Per-attempt timeout override.
    pub timeout: Option<Duration>,
    /// Retry budget override.
    pub retries: Option<u32>,
    /// Rate limit category override.
    pub rate_category: Option<String>,
    /// Tokens this call consumes.
    pub rate_cost: f64,
    /// External cancellation signal.
    pub cancel_token: Option<CancellationToken>,
}

impl RequestDescriptor {
    /// Create a descriptor with no headers, body or overrides.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
            retries: None,
            rate_category: None,
            rate_cost: 1.0,
            cancel_token: None,
        }
    }

    /// Key used for client-side rate limiting: the path without query string
    /// or fragment. Absolute URLs are reduced to their path.
    pub fn rate_limit_key(&self) -> String {
        if let Ok(url) = url::Url::parse(&self.path) {
            return url.path().to_string();
        }
        let end = self
            .path
            .find(['?', '#'])
            .unwrap_or(self.path.len());
        let path = &self.path[..end];
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        }
    }
}

/// HTTP request builder.
pub struct RequestBuilder<'a> {
    client: &'a HttpClient,
    descriptor: RequestDescriptor,
    error: Option<HttpClientError>,
}

impl<'a> RequestBuilder<'a> {
    /// Create a new request builder.
    pub(crate) fn new(client: &'a HttpClient, method: Method, path: String) -> Self {
        Self {
            client,
            descriptor: RequestDescriptor::new(method, path),
            error: None,
        }
    }

    fn fail(mut self, error: HttpClientError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    /// Add a header to the request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                self.descriptor.headers.insert(name, value);
                self
            }
            _ => self.fail(HttpClientError::RequestBuild(format!(
                "invalid header '{}'",
                name
            ))),
        }
    }

    /// Add multiple headers to the request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.descriptor.headers.extend(headers);
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.query.push((key.into(), value.into()));
        self
    }

    /// Add multiple query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.descriptor.query.push((k.into(), v.into()));
        }
        self
    }

    /// Set the request body as raw bytes.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.descriptor.body = Some(RequestBody::Raw(body.into()));
        self
    }

    /// Set the request body as text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.descriptor.body = Some(RequestBody::Text(text.into()));
        self
    }

    /// Set the request body as JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, json: &T) -> Self {
        match serde_json::to_value(json) {
            Ok(value) => {
                self.descriptor.body = Some(RequestBody::Json(value));
                self
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize JSON body");
                self.fail(HttpClientError::RequestBuild(e.to_string()))
            }
        }
    }

    /// Set the request body as form data.
    pub fn form<T: Serialize + ?Sized>(mut self, form: &T) -> Self {
        match serde_urlencoded::to_string(form) {
            Ok(encoded) => {
                self.descriptor.body = Some(RequestBody::Form(encoded));
                self
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode form data");
                self.fail(HttpClientError::RequestBuild(e.to_string()))
            }
        }
    }

    /// Set a custom timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.timeout = Some(timeout);
        self
    }

    /// Override the retry budget for this request.
    pub fn retries(mut self, retries: u32) -> Self {
        self.descriptor.retries = Some(retries);
        self
    }

    /// Charge this request to a rate limit category.
    pub fn rate_category(mut self, category: impl Into<String>) -> Self {
        self.descriptor.rate_category = Some(category.into());
        self
    }

    /// Set how many tokens this request consumes.
    pub fn rate_cost(mut self, cost: f64) -> Self {
        self.descriptor.rate_cost = cost;
        self
    }

    /// Abort the request when `token` is cancelled.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.descriptor.cancel_token = Some(token);
        self
    }

    /// Set bearer authentication.
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Set basic authentication.
    pub fn basic_auth(
        self,
        username: impl Into<String>,
        password: Option<impl Into<String>>,
    ) -> Self {
        use base64::Engine;
        let credentials = match password {
            Some(p) => format!("{}:{}", username.into(), p.into()),
            None => format!("{}:", username.into()),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.header("Authorization", format!("Basic {}", encoded))
    }

    /// Get the descriptor built so far.
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// Finish building without sending.
    pub fn build(self) -> Result<RequestDescriptor> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.descriptor),
        }
    }

    /// Send the request.
    pub async fn send(self) -> Result<Response> {
        let client = self.client;
        let descriptor = self.build()?;
        client.execute(descriptor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key() {
        let descriptor = RequestDescriptor::new(Method::GET, "/api/users?page=2");
        assert_eq!(descriptor.rate_limit_key(), "/api/users");

        let descriptor = RequestDescriptor::new(Method::GET, "api/users#top");
        assert_eq!(descriptor.rate_limit_key(), "/api/users");

        let descriptor = RequestDescriptor::new(Method::GET, "https://example.com/v1/chat?x=1");
        assert_eq!(descriptor.rate_limit_key(), "/v1/chat");
    }

    #[test]
    fn test_body_content_types() {
        assert_eq!(
            RequestBody::Json(serde_json::json!({})).content_type(),
            Some("application/json")
        );
        assert_eq!(
            RequestBody::Text("hi".into()).content_type(),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(RequestBody::Raw(Bytes::from_static(b"x")).content_type(), None);
    }

    #[test]
    fn test_json_body_encoding() {
        let body = RequestBody::Json(serde_json::json!({"item": "widget"}));
        assert_eq!(body.encode().unwrap(), Bytes::from_static(br#"{"item":"widget"}"#));
    }

    #[test]
    fn test_raw_body_passes_through() {
        let raw = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(RequestBody::Raw(raw.clone()).encode().unwrap(), raw);
    }

    #[tokio::test]
    async fn test_builder_collects_overrides() {
        let client = HttpClient::new(
            crate::HttpClientConfig::builder()
                .base_url("https://api.example.com")
                .build(),
        )
        .unwrap();

        let descriptor = client
            .post("/orders")
            .query("dry_run", "true")
            .json(&serde_json::json!({"quantity": 5}))
            .timeout(Duration::from_secs(2))
            .retries(0)
            .rate_category("upload")
            .rate_cost(2.0)
            .build()
            .unwrap();

        assert_eq!(descriptor.method, Method::POST);
        assert_eq!(descriptor.query, vec![("dry_run".to_string(), "true".to_string())]);
        assert_eq!(descriptor.timeout, Some(Duration::from_secs(2)));
        assert_eq!(descriptor.retries, Some(0));
        assert_eq!(descriptor.rate_category.as_deref(), Some("upload"));
        assert_eq!(descriptor.rate_cost, 2.0);
    }

    #[tokio::test]
    async fn test_invalid_header_fails_at_build() {
        let client = HttpClient::new(crate::HttpClientConfig::default()).unwrap();
        let result = client.get("/x").header("bad header", "v").build();
        assert!(matches!(result, Err(HttpClientError::RequestBuild(_))));
    }

    #[test]
    fn test_form_encoding() {
        let encoded = serde_urlencoded::to_string([("name", "a b"), ("x", "1")]).unwrap();
        let body = RequestBody::Form(encoded);
        assert_eq!(body.encode().unwrap(), Bytes::from_static(b"name=a+b&x=1"));
    }
}
