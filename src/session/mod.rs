//! Session Module
//!
//! Bearer-token session state shared by every API call:
//! - Durable token storage under fixed keys
//! - Access token attachment and 401 refresh-and-replay
//! - Single-flight token rotation

pub mod manager;
pub mod store;

pub use manager::{RefreshError, ResponseAction, SessionEvent, SessionManager, Tokens};
pub use store::{
    FileTokenStore, MemoryTokenStore, StoreError, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
