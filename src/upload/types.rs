//! Upload types for the chunked backup upload

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::ConfigCode;
use crate::error::ClientError;

// ============================================================================
// Constants
// ============================================================================

/// Chunk size the backend assigns unless it says otherwise: 5MB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Number of chunks a file of `total_bytes` splits into
pub fn chunks_for(total_bytes: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total_bytes.div_ceil(chunk_size)
}

// ============================================================================
// Wire Types
// ============================================================================

/// Body of `POST /uploads/init`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadInitRequest {
    pub filename: String,
    pub size_bytes: u64,
    pub config_code: ConfigCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadInitResponse {
    pub upload_id: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    pub chunks_expected: u64,
    pub db_name: String,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadCompleteResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Server-side upload status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Uploaded,
    Processing,
    Error,
    #[serde(other)]
    Unknown,
}

/// Upload as the server sees it; from `GET /uploads/{id}/status` and `GET /me/uploads`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    #[serde(alias = "id")]
    pub upload_id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub config_code: String,
    pub status: UploadStatus,
    pub chunks_expected: u64,
    pub chunks_received: u64,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadRecord {
    pub fn is_fully_received(&self) -> bool {
        self.chunks_expected > 0 && self.chunks_received >= self.chunks_expected
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Byte range of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: u64,
    pub offset: u64,
    pub len: u64,
}

/// Client-side state of one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Server-issued opaque identifier
    pub upload_id: String,
    pub filename: String,
    pub db_name: String,
    pub total_bytes: u64,
    pub chunk_size: u64,
    pub chunks_expected: u64,
    chunks_sent: u64,
}

impl UploadSession {
    /// Build a session from the init response, checking the server's chunk arithmetic
    pub fn from_init(
        filename: impl Into<String>,
        total_bytes: u64,
        init: UploadInitResponse,
    ) -> Result<Self, UploadError> {
        if init.chunk_size == 0 {
            return Err(UploadError::InvalidChunkSize(init.chunk_size));
        }

        let computed = chunks_for(total_bytes, init.chunk_size);
        if init.chunks_expected != computed {
            return Err(UploadError::ChunkCountMismatch {
                announced: init.chunks_expected,
                computed,
            });
        }

        Ok(Self {
            upload_id: init.upload_id,
            filename: filename.into(),
            db_name: init.db_name,
            total_bytes,
            chunk_size: init.chunk_size,
            chunks_expected: computed,
            chunks_sent: 0,
        })
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }

    pub fn is_fully_sent(&self) -> bool {
        self.chunks_sent == self.chunks_expected
    }

    /// Range of the next chunk to transmit; the last one may be shorter
    pub fn next_chunk(&self) -> Option<ChunkRange> {
        if self.is_fully_sent() {
            return None;
        }
        let offset = self.chunks_sent * self.chunk_size;
        Some(ChunkRange {
            index: self.chunks_sent,
            offset,
            len: self.chunk_size.min(self.total_bytes - offset),
        })
    }

    /// Count one acknowledged chunk
    pub fn record_chunk_sent(&mut self) -> Result<u64, UploadError> {
        if self.chunks_sent >= self.chunks_expected {
            return Err(UploadError::ChunkOverflow {
                expected: self.chunks_expected,
            });
        }
        self.chunks_sent += 1;
        Ok(self.chunks_sent)
    }

    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            chunks_sent: self.chunks_sent,
            chunks_expected: self.chunks_expected,
            bytes_sent: (self.chunks_sent * self.chunk_size).min(self.total_bytes),
            total_bytes: self.total_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub chunks_sent: u64,
    pub chunks_expected: u64,
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    pub fn fraction(&self) -> f64 {
        if self.chunks_expected == 0 {
            return 0.0;
        }
        self.chunks_sent as f64 / self.chunks_expected as f64
    }

    /// Whole percent, rounded down
    pub fn percent(&self) -> u8 {
        if self.chunks_expected == 0 {
            return 0;
        }
        (self.chunks_sent * 100 / self.chunks_expected) as u8
    }
}

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Initiated,
    Transmitting,
    Finalizing,
    Completed,
    Errored,
}

impl UploadState {
    /// A run is underway; a new one may not start
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Initiated | Self::Transmitting | Self::Finalizing)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Initiated => "initiated",
            Self::Transmitting => "transmitting",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Notification delivered to upload observers
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    StateChanged(UploadState),
    /// After every acknowledged chunk
    Progress(UploadProgress),
    Completed {
        upload_id: String,
        db_name: String,
    },
    Failed {
        message: String,
    },
}

/// Result of a finished upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub upload_id: String,
    pub db_name: String,
    pub chunks_sent: u64,
    pub message: String,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload already in progress ({0})")]
    AlreadyActive(UploadState),

    #[error("File is empty")]
    EmptyFile,

    #[error("Upload init failed: {0}")]
    Init(#[source] ClientError),

    #[error("Server assigned invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("Server expects {announced} chunks, file splits into {computed}")]
    ChunkCountMismatch { announced: u64, computed: u64 },

    #[error("Failed to read chunk {index}: {source}")]
    Read {
        index: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Chunk {index} failed: {source}")]
    Chunk {
        index: u64,
        #[source]
        source: ClientError,
    },

    #[error("All {expected} chunks already sent")]
    ChunkOverflow { expected: u64 },

    #[error("Finalize failed: {0}")]
    Finalize(#[source] ClientError),

    /// The upload future was dropped mid-run
    #[error("Upload cancelled")]
    Cancelled,
}

impl UploadError {
    /// Whether the failure came from an expired session
    pub fn requires_login(&self) -> bool {
        match self {
            Self::Init(e) | Self::Finalize(e) | Self::Chunk { source: e, .. } => e.requires_login(),
            _ => false,
        }
    }
}
