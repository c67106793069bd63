//! Chunked Upload Coordinator
//!
//! Drives one upload through `Idle -> Initiated -> Transmitting ->
//! Finalizing -> Completed`. Chunks go out strictly one at a time in
//! ascending index order; index n+1 is read only after index n has been
//! acknowledged. Any failure moves to `Errored` and ends the run; the
//! caller restarts from scratch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::source::ChunkSource;
use super::types::{
    UploadCompleteResponse, UploadError, UploadEvent, UploadInitRequest, UploadInitResponse,
    UploadOutcome, UploadRecord, UploadSession, UploadState,
};
use crate::api::{ApiClient, ApiRequest};
use crate::catalog::ConfigCode;
use crate::error::{ClientError, Result};

/// Receives upload events synchronously, in order
pub trait UploadObserver: Send + Sync {
    fn on_event(&self, event: &UploadEvent);
}

impl UploadObserver for mpsc::UnboundedSender<UploadEvent> {
    fn on_event(&self, event: &UploadEvent) {
        // Receiver gone means nobody is watching
        let _ = self.send(event.clone());
    }
}

pub struct UploadCoordinator {
    client: ApiClient,
    state: Mutex<UploadState>,
    session: Mutex<Option<UploadSession>>,
    running: AtomicBool,
    observers: Mutex<Vec<Arc<dyn UploadObserver>>>,
}

/// Clears the running flag when a run ends or its future is dropped
struct RunGuard<'a> {
    coordinator: &'a UploadCoordinator,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let abandoned = self.coordinator.state().is_active();
        if abandoned {
            self.coordinator.fail(UploadError::Cancelled);
        }
        self.coordinator.running.store(false, Ordering::Release);
    }
}

impl UploadCoordinator {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            state: Mutex::new(UploadState::Idle),
            session: Mutex::new(None),
            running: AtomicBool::new(false),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn UploadObserver>) {
        self.observers.lock().push(observer);
    }

    /// Channel-backed observer
    pub fn events(&self) -> mpsc::UnboundedReceiver<UploadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(Arc::new(tx));
        rx
    }

    pub fn state(&self) -> UploadState {
        *self.state.lock()
    }

    /// Snapshot of the current or last session
    pub fn session(&self) -> Option<UploadSession> {
        self.session.lock().clone()
    }

    /// Upload `source` as a backup of the given configuration.
    ///
    /// Size and extension limits are the caller's to check beforehand.
    pub async fn upload(
        &self,
        source: &dyn ChunkSource,
        config_code: ConfigCode,
    ) -> std::result::Result<UploadOutcome, UploadError> {
        let _run = self.begin()?;

        *self.session.lock() = None;
        *self.state.lock() = UploadState::Idle;

        let total_bytes = source.size();
        if total_bytes == 0 {
            return Err(UploadError::EmptyFile);
        }

        // Idle -> Initiated
        let request = UploadInitRequest {
            filename: source.file_name().to_string(),
            size_bytes: total_bytes,
            config_code,
        };
        let init: UploadInitResponse = match self.init(&request).await {
            Ok(init) => init,
            Err(e) => return Err(self.fail(UploadError::Init(e))),
        };

        tracing::info!(
            upload_id = %init.upload_id,
            file = %request.filename,
            size_bytes = total_bytes,
            chunk_size = init.chunk_size,
            chunks_expected = init.chunks_expected,
            "Upload initiated"
        );
        self.set_state(UploadState::Initiated);

        let mut session = match UploadSession::from_init(&request.filename, total_bytes, init) {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e)),
        };
        *self.session.lock() = Some(session.clone());

        // Initiated -> Transmitting
        self.set_state(UploadState::Transmitting);
        let encoded_id = urlencoding::encode(&session.upload_id).into_owned();

        while let Some(range) = session.next_chunk() {
            let data = match source.read_chunk(range.offset, range.len).await {
                Ok(data) => data,
                Err(e) => {
                    return Err(self.fail(UploadError::Read {
                        index: range.index,
                        source: e,
                    }))
                }
            };

            let request = ApiRequest::put(format!("/uploads/{}/chunk/{}", encoded_id, range.index))
                .chunk(session.filename.clone(), data);
            if let Err(e) = self.client.execute(request).await {
                return Err(self.fail(UploadError::Chunk {
                    index: range.index,
                    source: e,
                }));
            }

            if let Err(e) = session.record_chunk_sent() {
                return Err(self.fail(e));
            }
            *self.session.lock() = Some(session.clone());

            let progress = session.progress();
            tracing::debug!(
                upload_id = %session.upload_id,
                chunk_index = range.index,
                percent = progress.percent(),
                "Chunk acknowledged"
            );
            self.notify(UploadEvent::Progress(progress));
        }

        // Transmitting -> Finalizing
        self.set_state(UploadState::Finalizing);
        let done: UploadCompleteResponse = match self
            .client
            .call(ApiRequest::post(format!("/uploads/{}/complete", encoded_id)))
            .await
        {
            Ok(done) => done,
            Err(e) => return Err(self.fail(UploadError::Finalize(e))),
        };

        // Finalizing -> Completed
        let db_name = done.db_name.unwrap_or_else(|| session.db_name.clone());
        tracing::info!(upload_id = %session.upload_id, db_name = %db_name, "Upload completed");
        self.set_state(UploadState::Completed);
        self.notify(UploadEvent::Completed {
            upload_id: session.upload_id.clone(),
            db_name: db_name.clone(),
        });

        let chunks_sent = session.chunks_sent();
        Ok(UploadOutcome {
            upload_id: session.upload_id,
            db_name,
            chunks_sent,
            message: done.message,
        })
    }

    /// Server-side view of an upload; observation only
    pub async fn upload_status(&self, upload_id: &str) -> Result<UploadRecord> {
        let path = format!("/uploads/{}/status", urlencoding::encode(upload_id));
        self.client.call(ApiRequest::get(path)).await
    }

    fn begin(&self) -> std::result::Result<RunGuard<'_>, UploadError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(UploadError::AlreadyActive(self.state()));
        }
        Ok(RunGuard { coordinator: self })
    }

    async fn init(&self, request: &UploadInitRequest) -> Result<UploadInitResponse> {
        let request = ApiRequest::post("/uploads/init")
            .json(request)
            .map_err(ClientError::from)?;
        self.client.call(request).await
    }

    fn set_state(&self, state: UploadState) {
        *self.state.lock() = state;
        self.notify(UploadEvent::StateChanged(state));
    }

    fn fail(&self, error: UploadError) -> UploadError {
        let upload_id = self.session.lock().as_ref().map(|s| s.upload_id.clone());
        tracing::warn!(upload_id = ?upload_id, "Upload failed: {}", error);

        self.set_state(UploadState::Errored);
        self.notify(UploadEvent::Failed {
            message: error.to_string(),
        });
        error
    }

    fn notify(&self, event: UploadEvent) {
        let observers = self.observers.lock().clone();
        for observer in observers {
            observer.on_event(&event);
        }
    }
}
