//! HTTP response wrapper and body decoding.

use crate::transport::TransportResponse;
use crate::{HttpClientError, Result};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

/// Response body decoded according to the declared content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Parsed JSON document.
    Json(serde_json::Value),
    /// Text, including JSON that failed to parse.
    Text(String),
    /// Anything else.
    Bytes(Bytes),
    /// No body.
    Empty,
}

impl ResponseBody {
    /// Decode `raw` using the `content_type` header value.
    ///
    /// A body declared as JSON that does not parse is returned as text
    /// instead of failing.
    pub fn decode(content_type: Option<&str>, raw: &Bytes) -> Self {
        if raw.is_empty() {
            return Self::Empty;
        }
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());

        match mime.as_deref() {
            Some(m) if m == "application/json" || m.ends_with("+json") => {
                match serde_json::from_slice(raw) {
                    Ok(value) => Self::Json(value),
                    Err(e) => {
                        tracing::debug!(error = %e, "Declared JSON body failed to parse, returning text");
                        Self::Text(String::from_utf8_lossy(raw).into_owned())
                    }
                }
            }
            Some(m) if m.starts_with("text/") => {
                Self::Text(String::from_utf8_lossy(raw).into_owned())
            }
            _ => Self::Bytes(raw.clone()),
        }
    }

    /// Get the JSON value, if the body is JSON.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Get the text, if the body is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Check if there is no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// HTTP response wrapper.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: url::Url,
    raw: Bytes,
    body: ResponseBody,
}

impl Response {
    pub(crate) fn from_transport(response: TransportResponse) -> Self {
        let content_type = response
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let body = ResponseBody::decode(content_type, &response.body);

        Self {
            status: response.status,
            headers: response.headers,
            url: response.url,
            raw: response.body,
            body,
        }
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the response URL.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Get the decoded body.
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Get the decoded body for modification by response interceptors.
    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    /// Consume the response and return the decoded body.
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Get the body bytes as received.
    pub fn bytes(&self) -> &Bytes {
        &self.raw
    }

    /// Get the body as text, lossily decoding bytes.
    pub fn text(&self) -> String {
        match &self.body {
            ResponseBody::Text(text) => text.clone(),
            ResponseBody::Json(value) => value.to_string(),
            _ => String::from_utf8_lossy(&self.raw).into_owned(),
        }
    }

    /// Deserialize the body into `T`.
    ///
    /// Uses the decoded body, so changes made by response interceptors are
    /// visible.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let result = match &self.body {
            ResponseBody::Json(value) => serde_json::from_value(value.clone()),
            ResponseBody::Text(text) => serde_json::from_str(text),
            _ => serde_json::from_slice(&self.raw),
        };
        result.map_err(|e| HttpClientError::Decode(e.to_string()))
    }

    /// Get the content type if available.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json() {
        let body = ResponseBody::decode(
            Some("application/json; charset=utf-8"),
            &Bytes::from_static(br#"{"ok":true}"#),
        );
        assert_eq!(body, ResponseBody::Json(serde_json::json!({"ok": true})));
    }

    #[test]
    fn test_decode_vendor_json() {
        let body = ResponseBody::decode(
            Some("application/problem+json"),
            &Bytes::from_static(br#"{"title":"x"}"#),
        );
        assert!(body.as_json().is_some());
    }

    #[test]
    fn test_malformed_json_falls_back_to_text() {
        let body = ResponseBody::decode(
            Some("application/json"),
            &Bytes::from_static(b"<html>oops</html>"),
        );
        assert_eq!(body.as_text(), Some("<html>oops</html>"));
    }

    #[test]
    fn test_decode_text_and_bytes() {
        let text = ResponseBody::decode(Some("text/plain"), &Bytes::from_static(b"hello"));
        assert_eq!(text.as_text(), Some("hello"));

        let bin = ResponseBody::decode(
            Some("application/octet-stream"),
            &Bytes::from_static(&[1, 2, 3]),
        );
        assert_eq!(bin, ResponseBody::Bytes(Bytes::from_static(&[1, 2, 3])));

        assert!(ResponseBody::decode(Some("application/json"), &Bytes::new()).is_empty());
    }
}
