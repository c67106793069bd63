//! Configuration management for the 1C24 client

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Path prefix every API route lives under
pub const API_PREFIX: &str = "/api/v1";

/// Default request timeout applied to every HTTP call
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Maximum upload size: 50 GiB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Backend origin, without the `/api/v1` prefix
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub token_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_bytes: u64,
    pub chunk_encoding: ChunkEncoding,
}

/// How chunk bytes are put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkEncoding {
    /// `multipart/form-data` with a single `file` part
    Multipart,
    /// Bare `application/octet-stream` body
    Raw,
}

impl ApiConfig {
    /// Full base URL including the API prefix
    pub fn base_url(&self) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), API_PREFIX)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api: ApiConfig {
                url: "http://localhost:8000".to_string(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            },
            session: SessionConfig {
                token_file: default_token_file(),
            },
            upload: UploadConfig {
                max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                chunk_encoding: ChunkEncoding::Multipart,
            },
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = ClientConfig::default();

        ClientConfig {
            api: ApiConfig {
                url: env::var("ONEC24_API_URL").unwrap_or(defaults.api.url),
                timeout_secs: parse_var("ONEC24_TIMEOUT_SECS", defaults.api.timeout_secs),
            },
            session: SessionConfig {
                token_file: env::var("ONEC24_TOKEN_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.session.token_file),
            },
            upload: UploadConfig {
                max_bytes: parse_var("ONEC24_MAX_UPLOAD_BYTES", defaults.upload.max_bytes),
                chunk_encoding: match env::var("ONEC24_CHUNK_ENCODING")
                    .unwrap_or_default()
                    .to_lowercase()
                    .as_str()
                {
                    "raw" => ChunkEncoding::Raw,
                    _ => ChunkEncoding::Multipart,
                },
            },
        }
    }
}

fn parse_var(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "Invalid numeric value, using default {}", default);
            default
        }),
        Err(_) => default,
    }
}

fn default_token_file() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".config")
            .join("onec24")
            .join("tokens.json"),
        None => PathBuf::from("onec24-tokens.json"),
    }
}
