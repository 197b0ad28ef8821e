//! Filesystem primitives, error taxonomy, and logging shared across specforge.
//!
//! This crate carries no domain knowledge of specifications or operations;
//! it is the layer every other `specforge-*` crate builds on.

pub mod atomic_write;
pub mod cache;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod paths;
pub mod streaming;

pub use atomic_write::{read_json, write_file_atomic, write_json, AtomicWriteResult};
pub use cache::{CacheStats, LruCache};
pub use error::{ErrorCategory, Result, SpecforgeError};
pub use exit_codes::ExitCode;
pub use paths::{resolve_project_root, SandboxError, SandboxRoot};
pub use streaming::{load_queue_streaming, should_stream, StreamedQueue};
