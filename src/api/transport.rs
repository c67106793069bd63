//! HTTP transport
//!
//! `ApiRequest` is the explicit request wrapper that travels through the
//! session manager: it carries the credential mode, the bearer actually
//! attached, and whether the request has already been replayed once.
//! The `Transport` trait is the seam between the client logic and the
//! wire, so the session and upload code can be driven by fakes.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{ApiConfig, ChunkEncoding};

/// Path of the token refresh endpoint; never goes through 401 recovery
pub const REFRESH_PATH: &str = "/auth/refresh";

// ============================================================================
// Request / Response
// ============================================================================

/// Which credential a request carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// Stored access token, with refresh-and-replay on 401
    Session,
    /// Explicitly unauthenticated
    None,
    /// Caller-supplied token (e.g. the temporary registration token)
    Bearer(String),
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// One upload chunk
    Chunk { file_name: String, data: Bytes },
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Correlation id for logs; stays the same across a replay
    pub id: Uuid,
    pub method: Method,
    /// Path relative to the API base, e.g. `/auth/send-code`
    pub path: String,
    pub body: RequestBody,
    pub auth: Auth,
    /// Bearer credential attached for the next send
    pub bearer: Option<String>,
    /// Set once the request has been through refresh-and-replay
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            body: RequestBody::Empty,
            auth: Auth::Session,
            bearer: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn chunk(mut self, file_name: impl Into<String>, data: Bytes) -> Self {
        self.body = RequestBody::Chunk {
            file_name: file_name.into(),
            data,
        };
        self
    }

    pub fn unauthenticated(mut self) -> Self {
        self.auth = Auth::None;
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.auth = Auth::Bearer(token.into());
        self
    }

    pub fn is_refresh(&self) -> bool {
        self.path == REFRESH_PATH
    }
}

/// Completed HTTP exchange; any status, success or not
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn from_json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::new(status, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Human-readable error text, from the backend's `{"detail": ...}` when present
    pub fn detail(&self) -> String {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&self.body) {
            match value.get("detail") {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(other) => return other.to_string(),
                None => {}
            }
        }

        let text = String::from_utf8_lossy(&self.body).trim().to_string();
        if text.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            text
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Network failure; HTTP error statuses are not transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    chunk_encoding: ChunkEncoding,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig, chunk_encoding: ChunkEncoding) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("onec24-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            chunk_encoding,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), &url);

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Chunk { file_name, data } => match self.chunk_encoding {
                ChunkEncoding::Multipart => {
                    let part = Part::stream_with_length(data.clone(), data.len() as u64)
                        .file_name(file_name.clone())
                        .mime_str("application/octet-stream")?;
                    builder.multipart(Form::new().part("file", part))
                }
                ChunkEncoding::Raw => builder
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(data.clone()),
            },
        };

        tracing::debug!(
            request_id = %request.id,
            method = %request.method,
            path = %request.path,
            retried = request.retried,
            "Sending request"
        );

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        tracing::debug!(request_id = %request.id, status = status, "Received response");

        Ok(ApiResponse { status, body })
    }
}

// ============================================================================
// Mock transport for tests
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_prefers_backend_field() {
        let response = ApiResponse::new(404, r#"{"detail":"Организация не найдена"}"#);
        assert_eq!(response.detail(), "Организация не найдена");

        let plain = ApiResponse::new(502, "Bad Gateway");
        assert_eq!(plain.detail(), "Bad Gateway");

        let empty = ApiResponse::new(500, Bytes::new());
        assert_eq!(empty.detail(), "HTTP 500");
    }

    #[test]
    fn test_request_builders() {
        let request = ApiRequest::post("/auth/send-code")
            .json(&serde_json::json!({ "phone": "+79991234567" }))
            .unwrap()
            .unauthenticated();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.auth, Auth::None);
        assert!(!request.retried);
        assert!(matches!(request.body, RequestBody::Json(_)));
        assert!(!request.is_refresh());
        assert!(ApiRequest::post(REFRESH_PATH).is_refresh());
    }
}
