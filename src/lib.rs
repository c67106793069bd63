//! 1C24 Client Library
//!
//! Client for the 1C24 hosted-database service: phone + SMS login,
//! organization lookup by INN, and chunked upload of `.dt` / `.bak`
//! backups. The command-line front end is in main.rs.
//!
//! # Modules
//!
//! - `api`: HTTP transport, `ApiClient` and typed endpoint wrappers
//! - `session`: token storage, attachment and single-flight refresh
//! - `upload`: sequential chunked upload coordinator
//! - `validate`, `format`: form rules and display helpers
//! - `catalog`, `pricing`: configuration codes and the tariff calculator

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod format;
pub mod pricing;
pub mod session;
pub mod upload;
pub mod validate;

pub use api::{ApiClient, VerifyOutcome};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use session::{SessionEvent, SessionManager, Tokens};
pub use upload::{UploadCoordinator, UploadError, UploadEvent, UploadState};
