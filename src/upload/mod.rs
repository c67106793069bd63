//! Chunked Upload Module
//!
//! Sends a database backup (`.dt` / `.bak`) to the backend in
//! server-sized chunks:
//! 1. `POST /uploads/init` announces file name, size and configuration
//! 2. `PUT /uploads/{id}/chunk/{n}` for n = 0, 1, ... one at a time
//! 3. `POST /uploads/{id}/complete` finalizes
//!
//! There is no resume: a failed upload starts over from chunk 0.

pub mod coordinator;
pub mod source;
pub mod types;

pub use coordinator::{UploadCoordinator, UploadObserver};
pub use source::{ChunkSource, FileSource, MemorySource};
pub use types::*;
