//! API Client
//!
//! Every backend call goes through `ApiClient::execute`, which runs the
//! session manager's hooks around the transport.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::session::{FileTokenStore, ResponseAction, SessionManager, TokenStore};

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    transport: Arc<dyn Transport>,
    session: SessionManager,
}

impl ApiClient {
    /// Build a client over an arbitrary transport and token store
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn TokenStore>) -> Self {
        let session = SessionManager::new(store, transport.clone());
        Self {
            inner: Arc::new(ApiClientInner { transport, session }),
        }
    }

    /// HTTP transport plus the on-disk token store named in the config
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.api, config.upload.chunk_encoding)?;
        let store = FileTokenStore::open(&config.session.token_file)?;

        tracing::debug!(
            base_url = %transport.base_url(),
            token_file = %config.session.token_file.display(),
            "API client configured"
        );

        Ok(Self::new(Arc::new(transport), Arc::new(store)))
    }

    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    /// Send a request with session handling; any status comes back as a response.
    ///
    /// A 401 on a session-authenticated request is answered by one token
    /// refresh and one replay; a 401 on the replay is returned as is.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let session = &self.inner.session;
        session.attach_auth(&mut request);

        loop {
            let response = self.inner.transport.send(&request).await?;
            match session.handle_response(&mut request, &response).await {
                ResponseAction::PassThrough => return Ok(response),
                ResponseAction::Replay => continue,
            }
        }
    }

    /// Like `send`, but non-2xx statuses become errors
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let id = request.id;
        let path = request.path.clone();
        let response = self.send(request).await?;

        if response.is_success() {
            return Ok(response);
        }

        let detail = response.detail();
        tracing::debug!(request_id = %id, path = %path, status = response.status, "Request failed: {}", detail);
        Err(ClientError::from_status(response.status, detail))
    }

    /// Execute and decode the JSON body
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.execute(request).await?;
        Ok(response.json()?)
    }
}
