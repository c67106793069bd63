//! API Module
//!
//! Typed access to the 1C24 REST API (`/api/v1`).

pub mod auth;
pub mod client;
pub mod dashboard;
pub mod inn;
pub mod transport;
pub mod types;

pub use auth::VerifyOutcome;
pub use client::ApiClient;
pub use transport::{
    ApiRequest, ApiResponse, Auth, HttpTransport, RequestBody, Transport, TransportError,
    REFRESH_PATH,
};
pub use types::*;
