//! HTTP client implementation.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use parking_lot::RwLock;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tether_ratelimit::{RateLimiter, RateLimiterStats};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::circuit_breaker::CircuitBreakerStats;
use crate::transport::{ReqwestTransport, Transport, TransportRequest};
use crate::{
    CircuitBreaker, CircuitState, HttpClientConfig, HttpClientError, RequestBuilder,
    RequestDescriptor, RequestInterceptor, Response, ResponseInterceptor, Result, RetryConfig,
    RetryStrategy,
};

/// HTTP client with rate limiting, circuit breaker, retry and timeout support.
///
/// Cloning is cheap; clones share the breaker, the rate limiter and the
/// interceptor lists.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: HttpClientConfig,
    base_url: Option<Url>,
    default_headers: HeaderMap,
    transport: Arc<dyn Transport>,
    circuit_breaker: Option<CircuitBreaker>,
    rate_limiter: Option<RateLimiter>,
    request_interceptors: RwLock<Vec<Arc<dyn RequestInterceptor>>>,
    response_interceptors: RwLock<Vec<Arc<dyn ResponseInterceptor>>>,
}

/// Admission held by an in-flight call. Dropping it without reporting an
/// outcome hands the slot back to the breaker.
struct Admission<'a> {
    breaker: Option<&'a CircuitBreaker>,
}

impl Admission<'_> {
    fn success(mut self) {
        if let Some(cb) = self.breaker.take() {
            cb.on_success();
        }
    }

    fn failure(mut self) {
        if let Some(cb) = self.breaker.take() {
            cb.on_failure();
        }
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if let Some(cb) = self.breaker.take() {
            cb.release();
        }
    }
}

impl HttpClient {
    /// Create a new HTTP client backed by `reqwest`.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client that sends through `transport`.
    pub fn with_transport(config: HttpClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let base_url = config.base_url.as_deref().map(Url::parse).transpose()?;

        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| HttpClientError::Config(e.to_string()))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| HttpClientError::Config(e.to_string()))?;
            default_headers.append(name, value);
        }

        let circuit_breaker = config.circuit_breaker.clone().map(CircuitBreaker::new);
        let rate_limiter = config
            .rate_limit
            .clone()
            .map(RateLimiter::new)
            .transpose()?;

        debug!(
            base_url = ?config.base_url,
            timeout = ?config.timeout,
            max_retries = config.retry.max_retries,
            circuit_breaker = circuit_breaker.is_some(),
            rate_limit = rate_limiter.is_some(),
            "Creating HTTP client"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                base_url,
                default_headers,
                transport,
                circuit_breaker,
                rate_limiter,
                request_interceptors: RwLock::new(Vec::new()),
                response_interceptors: RwLock::new(Vec::new()),
            }),
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.inner.config
    }

    /// Register a request interceptor. Interceptors run in registration order.
    pub fn add_request_interceptor(&self, interceptor: impl RequestInterceptor + 'static) {
        self.inner
            .request_interceptors
            .write()
            .push(Arc::new(interceptor));
    }

    /// Register a response interceptor. Interceptors run in registration order.
    pub fn add_response_interceptor(&self, interceptor: impl ResponseInterceptor + 'static) {
        self.inner
            .response_interceptors
            .write()
            .push(Arc::new(interceptor));
    }

    /// Register an interceptor on both the request and the response side.
    pub fn add_interceptor<I>(&self, interceptor: I)
    where
        I: RequestInterceptor + ResponseInterceptor + 'static,
    {
        let interceptor = Arc::new(interceptor);
        self.inner
            .request_interceptors
            .write()
            .push(interceptor.clone());
        self.inner.response_interceptors.write().push(interceptor);
    }

    /// Create a GET request builder.
    pub fn get(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, path.into())
    }

    /// Create a POST request builder.
    pub fn post(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, path.into())
    }

    /// Create a PUT request builder.
    pub fn put(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PUT, path.into())
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PATCH, path.into())
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::DELETE, path.into())
    }

    /// Create a HEAD request builder.
    pub fn head(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::HEAD, path.into())
    }

    /// Create a request builder with a custom method.
    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, path.into())
    }

    /// State of the circuit breaker. A client without a breaker reports
    /// [`CircuitState::Closed`].
    pub fn circuit_breaker_state(&self) -> CircuitState {
        self.inner
            .circuit_breaker
            .as_ref()
            .map(CircuitBreaker::state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Breaker counters, if the breaker is enabled.
    pub fn circuit_breaker_stats(&self) -> Option<CircuitBreakerStats> {
        self.inner.circuit_breaker.as_ref().map(CircuitBreaker::stats)
    }

    /// Rate limiter counters. Empty when rate limiting is disabled.
    pub fn rate_limiter_stats(&self) -> RateLimiterStats {
        self.inner
            .rate_limiter
            .as_ref()
            .map(RateLimiter::stats)
            .unwrap_or_default()
    }

    /// Force the breaker back to closed.
    pub fn reset_circuit_breaker(&self) {
        if let Some(cb) = &self.inner.circuit_breaker {
            cb.reset();
        }
    }

    /// Drop all token buckets and counters.
    pub fn reset_rate_limiter(&self) {
        if let Some(limiter) = &self.inner.rate_limiter {
            limiter.reset();
        }
    }

    /// Execute a request through the full pipeline: rate limit, breaker
    /// admission, request interceptors, attempts with retry, breaker report,
    /// response interceptors.
    pub async fn execute(&self, descriptor: RequestDescriptor) -> Result<Response> {
        let inner = &self.inner;

        if let Some(limiter) = &inner.rate_limiter {
            let key = descriptor.rate_limit_key();
            let category = descriptor
                .rate_category
                .as_deref()
                .unwrap_or(&inner.config.default_rate_category);
            limiter.check(&key, category, descriptor.rate_cost)?;
        }

        if let Some(cb) = &inner.circuit_breaker
            && !cb.can_proceed()
        {
            warn!(path = %descriptor.path, "Circuit breaker open, rejecting request");
            return Err(HttpClientError::CircuitOpen);
        }
        let admission = Admission {
            breaker: inner.circuit_breaker.as_ref(),
        };

        let descriptor = self.run_request_interceptors(descriptor).await?;
        let cancel = descriptor.cancel_token.clone().unwrap_or_default();
        let request = self.build_transport_request(&descriptor)?;

        match self.execute_with_retry(request, &descriptor, &cancel).await {
            Ok(response) => {
                admission.success();
                self.run_response_interceptors(response).await
            }
            Err(HttpClientError::Cancelled) => {
                debug!(path = %descriptor.path, "Request cancelled");
                Err(HttpClientError::Cancelled)
            }
            Err(e) => {
                admission.failure();
                Err(e)
            }
        }
    }

    async fn execute_with_retry(
        &self,
        request: TransportRequest,
        descriptor: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let config = &self.inner.config;
        let timeout = descriptor.timeout.unwrap_or(config.timeout);
        let retry: Cow<'_, RetryConfig> = match descriptor.retries {
            Some(max_retries) => Cow::Owned(RetryConfig {
                max_retries,
                ..config.retry.clone()
            }),
            None => Cow::Borrowed(&config.retry),
        };

        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(HttpClientError::Cancelled),
                result = self.execute_once(request.clone(), timeout) => result,
            };

            let error = match result {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if matches!(error, HttpClientError::Cancelled) || !retry.should_retry(attempt, &error)
            {
                return Err(error);
            }

            let delay = retry.retry_delay(attempt);
            attempt += 1;
            debug!(
                attempt,
                delay = ?delay,
                error = %error,
                "Retrying request"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HttpClientError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One attempt under the timeout. Non-2xx responses become
    /// [`HttpClientError::Status`].
    async fn execute_once(&self, request: TransportRequest, timeout: Duration) -> Result<Response> {
        let response = match tokio::time::timeout(timeout, self.inner.transport.send(request)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(HttpClientError::Timeout(timeout)),
        };

        if response.status.is_success() {
            Ok(Response::from_transport(response))
        } else {
            Err(HttpClientError::Status {
                status: response.status.as_u16(),
                body: String::from_utf8_lossy(&response.body).into_owned(),
            })
        }
    }

    async fn run_request_interceptors(
        &self,
        mut descriptor: RequestDescriptor,
    ) -> Result<RequestDescriptor> {
        let interceptors = self.inner.request_interceptors.read().clone();
        for interceptor in interceptors {
            descriptor = RequestInterceptor::intercept(&*interceptor, descriptor).await?;
        }
        Ok(descriptor)
    }

    async fn run_response_interceptors(&self, mut response: Response) -> Result<Response> {
        let interceptors = self.inner.response_interceptors.read().clone();
        for interceptor in interceptors {
            response = ResponseInterceptor::intercept(&*interceptor, response).await?;
        }
        Ok(response)
    }

    fn build_transport_request(&self, descriptor: &RequestDescriptor) -> Result<TransportRequest> {
        let url = resolve_url(
            self.inner.base_url.as_ref(),
            &descriptor.path,
            &descriptor.query,
        )?;

        let mut headers = self.inner.default_headers.clone();
        for (name, value) in &descriptor.headers {
            headers.insert(name.clone(), value.clone());
        }

        let body = match &descriptor.body {
            Some(body) => {
                if let Some(content_type) = body.content_type()
                    && !headers.contains_key(http::header::CONTENT_TYPE)
                {
                    headers.insert(
                        http::header::CONTENT_TYPE,
                        HeaderValue::from_static(content_type),
                    );
                }
                Some(body.encode()?)
            }
            None => None,
        };

        Ok(TransportRequest {
            method: descriptor.method.clone(),
            url,
            headers,
            body,
        })
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.inner.config.base_url)
            .field("circuit_state", &self.circuit_breaker_state())
            .finish_non_exhaustive()
    }
}

/// Resolve `path` against `base` and append `query`.
///
/// Absolute URLs are used as-is. Otherwise the path is appended to the base
/// with exactly one `/` between them, so a base with a path prefix keeps it.
pub fn resolve_url(base: Option<&Url>, path: &str, query: &[(String, String)]) -> Result<Url> {
    let mut url = match Url::parse(path) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => {
                let joined = format!(
                    "{}/{}",
                    base.as_str().trim_end_matches('/'),
                    path.trim_start_matches('/')
                );
                Url::parse(&joined)?
            }
            None => {
                return Err(HttpClientError::InvalidUrl(format!(
                    "relative path '{}' without a base URL",
                    path
                )));
            }
        },
        Err(e) => return Err(e.into()),
    };

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    Ok(url)
}
