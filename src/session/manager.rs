//! Session Manager
//!
//! Owns the access/refresh token pair and recovers from token expiry:
//! - Attaches the stored access token to session-authenticated requests
//! - On 401, rotates the tokens once and asks the caller to replay
//! - Coalesces concurrent refreshes into a single network call
//!
//! The refresh token is single-use on the backend, so two concurrent
//! refresh calls would log the user out. All refreshes run under one
//! async lock. A caller that queued behind a refresh in flight takes its
//! result; a caller arriving after it finished starts a new one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use super::store::{StoreError, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::api::transport::{ApiRequest, ApiResponse, Auth, Transport, TransportError, REFRESH_PATH};
use crate::api::types::RefreshTokenRequest;

// ============================================================================
// Types
// ============================================================================

/// Access/refresh token pair issued by login, registration or refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Session lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    LoggedOut,
    /// Session is gone; the user has to go through the login flow again
    ReauthRequired,
}

/// What the caller should do with a completed exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    /// Hand the response to the caller as is
    PassThrough,
    /// Send the request again; its bearer has been replaced
    Replay,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("No refresh token stored")]
    NoRefreshToken,

    /// A concurrent refresh this caller joined ended the session
    #[error("Session ended by a concurrent refresh")]
    Expired,

    #[error("Refresh rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Refresh request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid refresh response: {0}")]
    Decode(String),

    #[error("Failed to persist tokens: {0}")]
    Storage(#[from] StoreError),
}

const EVENT_CAPACITY: usize = 16;

// ============================================================================
// Session Manager
// ============================================================================

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionManagerInner>,
}

struct SessionManagerInner {
    store: Arc<dyn TokenStore>,

    /// Used for the refresh call only
    transport: Arc<dyn Transport>,

    /// Held for the whole duration of a refresh
    refresh_lock: Mutex<()>,

    in_refresh_flight: AtomicBool,

    /// Bumped under `refresh_lock` each time a refresh call returns
    refreshes_done: AtomicU64,

    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn TokenStore>, transport: Arc<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SessionManagerInner {
                store,
                transport,
                refresh_lock: Mutex::new(()),
                in_refresh_flight: AtomicBool::new(false),
                refreshes_done: AtomicU64::new(0),
                events,
            }),
        }
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn access_token(&self) -> Option<String> {
        self.inner.store.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.store.get(REFRESH_TOKEN_KEY)
    }

    /// Both tokens, if a full session is stored
    pub fn tokens(&self) -> Option<Tokens> {
        Some(Tokens {
            access_token: self.access_token()?,
            refresh_token: self.refresh_token()?,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Whether a refresh call is on the wire right now
    pub fn is_refreshing(&self) -> bool {
        self.inner.in_refresh_flight.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    // ========================================================================
    // Login / Logout
    // ========================================================================

    /// Persist a freshly issued token pair
    pub fn login(&self, tokens: &Tokens) -> Result<(), StoreError> {
        self.store_tokens(tokens)?;
        tracing::info!("Session started");
        self.emit(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Drop both tokens locally
    pub fn logout(&self) -> Result<(), StoreError> {
        self.clear()?;
        tracing::info!("Session ended");
        self.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    fn store_tokens(&self, tokens: &Tokens) -> Result<(), StoreError> {
        self.inner.store.set_many(&[
            (ACCESS_TOKEN_KEY, tokens.access_token.as_str()),
            (REFRESH_TOKEN_KEY, tokens.refresh_token.as_str()),
        ])
    }

    fn clear(&self) -> Result<(), StoreError> {
        let access = self.inner.store.remove(ACCESS_TOKEN_KEY);
        let refresh = self.inner.store.remove(REFRESH_TOKEN_KEY);
        access.and(refresh)
    }

    /// Fatal end of the session: clear tokens and ask for a new login
    fn expire(&self) {
        if let Err(e) = self.clear() {
            tracing::error!("Failed to clear tokens after session expiry: {}", e);
        }
        self.emit(SessionEvent::ReauthRequired);
    }

    // ========================================================================
    // Request hooks
    // ========================================================================

    /// Put the credential matching `request.auth` on the request
    pub fn attach_auth(&self, request: &mut ApiRequest) {
        request.bearer = match &request.auth {
            Auth::Session => self.access_token(),
            Auth::None => None,
            Auth::Bearer(token) => Some(token.clone()),
        };
    }

    /// Inspect a completed exchange and decide whether to replay it.
    ///
    /// Replay happens at most once per request: the request is marked
    /// `retried` before the refresh is attempted.
    pub async fn handle_response(
        &self,
        request: &mut ApiRequest,
        response: &ApiResponse,
    ) -> ResponseAction {
        if !response.is_unauthorized() {
            return ResponseAction::PassThrough;
        }

        if request.is_refresh() || request.retried || request.auth != Auth::Session {
            tracing::debug!(
                request_id = %request.id,
                path = %request.path,
                retried = request.retried,
                "Unauthorized response passed through"
            );
            return ResponseAction::PassThrough;
        }

        request.retried = true;

        match self.refresh().await {
            Ok(access_token) => {
                tracing::debug!(request_id = %request.id, path = %request.path, "Replaying with rotated token");
                request.bearer = Some(access_token);
                ResponseAction::Replay
            }
            Err(e) => {
                tracing::warn!(request_id = %request.id, path = %request.path, "Token refresh failed: {}", e);
                ResponseAction::PassThrough
            }
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Rotate the token pair and return the new access token.
    ///
    /// Concurrent callers queue on the refresh lock. If a refresh call
    /// returned while a caller was queued, the caller takes that result
    /// without another network call.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let seen = self.inner.refreshes_done.load(Ordering::SeqCst);
        let _guard = self.inner.refresh_lock.lock().await;

        if self.inner.refreshes_done.load(Ordering::SeqCst) != seen {
            tracing::debug!("Joined a concurrent refresh");
            return self.access_token().ok_or(RefreshError::Expired);
        }

        let Some(refresh_token) = self.refresh_token() else {
            tracing::info!("No refresh token stored, login required");
            self.emit(SessionEvent::ReauthRequired);
            return Err(RefreshError::NoRefreshToken);
        };

        self.inner.in_refresh_flight.store(true, Ordering::SeqCst);
        let result = self.request_refresh(&refresh_token).await;
        self.inner.in_refresh_flight.store(false, Ordering::SeqCst);

        let persisted = result.and_then(|tokens| {
            self.store_tokens(&tokens)?;
            Ok(tokens)
        });
        self.inner.refreshes_done.fetch_add(1, Ordering::SeqCst);

        match persisted {
            Ok(tokens) => {
                tracing::info!("Access token refreshed");
                self.emit(SessionEvent::Refreshed);
                Ok(tokens.access_token)
            }
            Err(e) => {
                tracing::warn!("Session expired: {}", e);
                self.expire();
                Err(e)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<Tokens, RefreshError> {
        let mut request = ApiRequest::post(REFRESH_PATH)
            .json(&RefreshTokenRequest {
                refresh_token: refresh_token.to_string(),
            })
            .map_err(|e| RefreshError::Decode(e.to_string()))?
            .unauthenticated();
        self.attach_auth(&mut request);

        let response = self.inner.transport.send(&request).await?;
        if !response.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status,
                detail: response.detail(),
            });
        }

        response
            .json::<Tokens>()
            .map_err(|e| RefreshError::Decode(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::mock::MockTransport;
    use crate::session::store::MemoryTokenStore;
    use std::time::Duration;

    fn tokens(n: u32) -> Tokens {
        Tokens {
            access_token: format!("access-{}", n),
            refresh_token: format!("refresh-{}", n),
        }
    }

    /// Refresh endpoint that accepts `refresh-1` once and issues pair 2
    fn rotating_backend() -> MockTransport {
        let consumed = AtomicBool::new(false);
        MockTransport::new(move |request| {
            if request.path != REFRESH_PATH {
                return Ok(ApiResponse::new(200, "{}"));
            }
            let body = match &request.body {
                crate::api::transport::RequestBody::Json(v) => v.clone(),
                _ => serde_json::Value::Null,
            };
            if body["refresh_token"] == "refresh-1" && !consumed.swap(true, Ordering::SeqCst) {
                Ok(ApiResponse::from_json(200, &tokens(2)))
            } else {
                Ok(ApiResponse::from_json(401, &serde_json::json!({ "detail": "Invalid refresh token" })))
            }
        })
    }

    fn manager_with(transport: Arc<MockTransport>) -> SessionManager {
        SessionManager::new(Arc::new(MemoryTokenStore::new()), transport)
    }

    #[test]
    fn test_attach_auth() {
        let manager = manager_with(Arc::new(rotating_backend()));

        let mut request = ApiRequest::get("/me");
        manager.attach_auth(&mut request);
        assert!(request.bearer.is_none());

        manager.login(&tokens(1)).unwrap();

        let mut request = ApiRequest::get("/me");
        manager.attach_auth(&mut request);
        assert_eq!(request.bearer.as_deref(), Some("access-1"));

        let mut request = ApiRequest::post("/auth/send-code").unauthenticated();
        manager.attach_auth(&mut request);
        assert!(request.bearer.is_none());

        let mut request = ApiRequest::post("/auth/complete-registration").with_bearer("temp");
        manager.attach_auth(&mut request);
        assert_eq!(request.bearer.as_deref(), Some("temp"));
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let transport = Arc::new(rotating_backend());
        let manager = manager_with(transport.clone());
        manager.login(&tokens(1)).unwrap();

        let mut request = ApiRequest::get("/me");
        manager.attach_auth(&mut request);
        let action = manager
            .handle_response(&mut request, &ApiResponse::new(200, "{}"))
            .await;

        assert_eq!(action, ResponseAction::PassThrough);
        assert!(!request.retried);
        assert_eq!(transport.count(REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_and_replays() {
        let transport = Arc::new(rotating_backend());
        let manager = manager_with(transport.clone());
        manager.login(&tokens(1)).unwrap();
        let mut events = manager.subscribe();

        let mut request = ApiRequest::get("/me/databases");
        manager.attach_auth(&mut request);
        let action = manager
            .handle_response(&mut request, &ApiResponse::new(401, "{}"))
            .await;

        assert_eq!(action, ResponseAction::Replay);
        assert!(request.retried);
        assert_eq!(request.bearer.as_deref(), Some("access-2"));
        assert_eq!(manager.tokens(), Some(tokens(2)));
        assert_eq!(transport.count(REFRESH_PATH), 1);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Refreshed);
        assert!(!manager.is_refreshing());
    }

    #[tokio::test]
    async fn test_retried_request_is_not_refreshed_again() {
        let transport = Arc::new(rotating_backend());
        let manager = manager_with(transport.clone());
        manager.login(&tokens(1)).unwrap();

        let mut request = ApiRequest::get("/me");
        request.retried = true;
        manager.attach_auth(&mut request);
        let action = manager
            .handle_response(&mut request, &ApiResponse::new(401, "{}"))
            .await;

        assert_eq!(action, ResponseAction::PassThrough);
        assert_eq!(transport.count(REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_refresh_endpoint_401_passes_through() {
        let transport = Arc::new(rotating_backend());
        let manager = manager_with(transport.clone());
        manager.login(&tokens(1)).unwrap();

        let mut request = ApiRequest::post(REFRESH_PATH);
        let action = manager
            .handle_response(&mut request, &ApiResponse::new(401, "{}"))
            .await;

        assert_eq!(action, ResponseAction::PassThrough);
        assert_eq!(transport.count(REFRESH_PATH), 0);
        assert_eq!(manager.tokens(), Some(tokens(1)));
    }

    #[tokio::test]
    async fn test_explicit_bearer_401_passes_through() {
        let transport = Arc::new(rotating_backend());
        let manager = manager_with(transport.clone());
        manager.login(&tokens(1)).unwrap();

        let mut request = ApiRequest::post("/auth/complete-registration").with_bearer("temp");
        manager.attach_auth(&mut request);
        let action = manager
            .handle_response(&mut request, &ApiResponse::new(401, "{}"))
            .await;

        assert_eq!(action, ResponseAction::PassThrough);
        assert_eq!(transport.count(REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_session() {
        let transport = Arc::new(rotating_backend());
        let manager = manager_with(transport.clone());
        manager
            .login(&Tokens {
                access_token: "access-1".into(),
                refresh_token: "revoked".into(),
            })
            .unwrap();
        let mut events = manager.subscribe();

        let mut request = ApiRequest::get("/me");
        manager.attach_auth(&mut request);
        let action = manager
            .handle_response(&mut request, &ApiResponse::new(401, "{}"))
            .await;

        assert_eq!(action, ResponseAction::PassThrough);
        assert!(manager.access_token().is_none());
        assert!(manager.refresh_token().is_none());
        assert_eq!(transport.count(REFRESH_PATH), 1);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::ReauthRequired);
    }

    #[tokio::test]
    async fn test_refresh_transport_error_clears_session() {
        let transport = Arc::new(MockTransport::new(|_| {
            Err(TransportError::Connect("connection refused".into()))
        }));
        let manager = manager_with(transport.clone());
        manager.login(&tokens(1)).unwrap();

        let result = manager.refresh().await;

        assert!(matches!(result, Err(RefreshError::Transport(_))));
        assert!(manager.tokens().is_none());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_skips_network() {
        let transport = Arc::new(rotating_backend());
        let manager = manager_with(transport.clone());
        let mut events = manager.subscribe();

        let mut request = ApiRequest::get("/me");
        manager.attach_auth(&mut request);
        let action = manager
            .handle_response(&mut request, &ApiResponse::new(401, "{}"))
            .await;

        assert_eq!(action, ResponseAction::PassThrough);
        assert!(transport.requests().is_empty());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::ReauthRequired);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_coalesce() {
        let transport = Arc::new(rotating_backend().with_latency(Duration::from_millis(20)));
        let manager = manager_with(transport.clone());
        manager.login(&tokens(1)).unwrap();

        let calls = (0..8).map(|_| {
            let manager = manager.clone();
            async move { manager.refresh().await }
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(transport.count(REFRESH_PATH), 1);
        for result in results {
            assert_eq!(result.unwrap(), "access-2");
        }
        assert_eq!(manager.tokens(), Some(tokens(2)));
    }

    /// Refresh endpoint that turns any `refresh-N` into pair N+1
    fn chained_backend() -> MockTransport {
        MockTransport::new(|request| {
            let body = match &request.body {
                crate::api::transport::RequestBody::Json(v) => v.clone(),
                _ => serde_json::Value::Null,
            };
            let next = body["refresh_token"]
                .as_str()
                .and_then(|t| t.strip_prefix("refresh-"))
                .and_then(|n| n.parse::<u32>().ok());
            match next {
                Some(n) => Ok(ApiResponse::from_json(200, &tokens(n + 1))),
                None => Ok(ApiResponse::from_json(401, &serde_json::json!({ "detail": "Invalid refresh token" }))),
            }
        })
    }

    #[tokio::test]
    async fn test_late_unauthorized_still_refreshes() {
        let transport = Arc::new(chained_backend());
        let manager = manager_with(transport.clone());
        manager.login(&tokens(2)).unwrap();

        // Sent with pair 1, rejected after pair 2 had already expired too
        let mut request = ApiRequest::get("/me");
        request.bearer = Some("access-1".into());
        let action = manager
            .handle_response(&mut request, &ApiResponse::new(401, "{}"))
            .await;

        assert_eq!(action, ResponseAction::Replay);
        assert_eq!(transport.count(REFRESH_PATH), 1);
        assert_eq!(request.bearer.as_deref(), Some("access-3"));
        assert_eq!(manager.tokens(), Some(tokens(3)));
    }

    #[tokio::test]
    async fn test_sequential_refreshes_each_hit_network() {
        let transport = Arc::new(chained_backend());
        let manager = manager_with(transport.clone());
        manager.login(&tokens(1)).unwrap();

        assert_eq!(manager.refresh().await.unwrap(), "access-2");
        assert_eq!(manager.refresh().await.unwrap(), "access-3");
        assert_eq!(transport.count(REFRESH_PATH), 2);
    }

    #[tokio::test]
    async fn test_joined_failed_refresh_reports_expiry() {
        let transport = Arc::new(rotating_backend().with_latency(Duration::from_millis(20)));
        let manager = manager_with(transport.clone());
        manager
            .login(&Tokens {
                access_token: "access-1".into(),
                refresh_token: "revoked".into(),
            })
            .unwrap();

        let (first, second) = tokio::join!(manager.refresh(), manager.refresh());

        assert!(matches!(first, Err(RefreshError::Rejected { status: 401, .. })));
        assert!(matches!(second, Err(RefreshError::Expired)));
        assert_eq!(transport.count(REFRESH_PATH), 1);
    }
}
