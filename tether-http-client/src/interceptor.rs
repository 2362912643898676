//! Request and response interceptors.
//!
//! Request interceptors run once per call, after admission and before the
//! first attempt. Response interceptors run on the final successful response.
//! Both run in registration order; an error from any of them fails the call.

use crate::{HttpClientError, RequestDescriptor, Response, Result};
use async_trait::async_trait;
use http::{HeaderName, HeaderValue};

/// Request interceptor.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Intercept and optionally modify the request.
    async fn intercept(&self, request: RequestDescriptor) -> Result<RequestDescriptor>;
}

/// Response interceptor.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    /// Intercept and optionally modify the response.
    async fn intercept(&self, response: Response) -> Result<Response>;
}

#[async_trait]
impl<F> RequestInterceptor for F
where
    F: Fn(RequestDescriptor) -> Result<RequestDescriptor> + Send + Sync,
{
    async fn intercept(&self, request: RequestDescriptor) -> Result<RequestDescriptor> {
        self(request)
    }
}

#[async_trait]
impl<F> ResponseInterceptor for F
where
    F: Fn(Response) -> Result<Response> + Send + Sync,
{
    async fn intercept(&self, response: Response) -> Result<Response> {
        self(response)
    }
}

/// Logging interceptor that logs requests and responses.
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor {
    log_headers: bool,
}

impl LoggingInterceptor {
    /// Create a new logging interceptor.
    pub fn new() -> Self {
        Self { log_headers: false }
    }

    /// Enable logging of headers.
    pub fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

#[async_trait]
impl RequestInterceptor for LoggingInterceptor {
    async fn intercept(&self, request: RequestDescriptor) -> Result<RequestDescriptor> {
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            "Sending HTTP request"
        );

        if self.log_headers {
            for (name, value) in &request.headers {
                tracing::trace!(
                    header = %name,
                    value = ?value,
                    "Request header"
                );
            }
        }

        Ok(request)
    }
}

#[async_trait]
impl ResponseInterceptor for LoggingInterceptor {
    async fn intercept(&self, response: Response) -> Result<Response> {
        tracing::debug!(
            status = %response.status(),
            url = %response.url(),
            "Received HTTP response"
        );

        if self.log_headers {
            for (name, value) in response.headers() {
                tracing::trace!(
                    header = %name,
                    value = ?value,
                    "Response header"
                );
            }
        }

        Ok(response)
    }
}

/// Authentication interceptor that adds auth headers.
#[derive(Clone)]
pub struct AuthInterceptor {
    auth_type: AuthType,
}

#[derive(Clone)]
enum AuthType {
    Bearer(String),
    Basic { username: String, password: String },
    ApiKey { header: String, key: String },
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.auth_type {
            AuthType::Bearer(_) => "bearer",
            AuthType::Basic { .. } => "basic",
            AuthType::ApiKey { .. } => "api_key",
        };
        f.debug_struct("AuthInterceptor")
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

impl AuthInterceptor {
    /// Create a bearer token interceptor.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::Bearer(token.into()),
        }
    }

    /// Create a basic auth interceptor.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::Basic {
                username: username.into(),
                password: password.into(),
            },
        }
    }

    /// Create an API key interceptor.
    pub fn api_key(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::ApiKey {
                header: header.into(),
                key: key.into(),
            },
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::try_from(value).map_err(|e| HttpClientError::Interceptor(e.to_string()))
}

#[async_trait]
impl RequestInterceptor for AuthInterceptor {
    async fn intercept(&self, mut request: RequestDescriptor) -> Result<RequestDescriptor> {
        let headers = &mut request.headers;

        match &self.auth_type {
            AuthType::Bearer(token) => {
                headers.insert(
                    http::header::AUTHORIZATION,
                    header_value(&format!("Bearer {}", token))?,
                );
            }
            AuthType::Basic { username, password } => {
                use base64::Engine;
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                headers.insert(
                    http::header::AUTHORIZATION,
                    header_value(&format!("Basic {}", credentials))?,
                );
            }
            AuthType::ApiKey { header, key } => {
                let name = HeaderName::from_bytes(header.as_bytes())
                    .map_err(|e| HttpClientError::Interceptor(e.to_string()))?;
                headers.insert(name, header_value(key)?);
            }
        }

        Ok(request)
    }
}
