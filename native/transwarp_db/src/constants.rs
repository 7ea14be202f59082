/// Global constants and process-wide statics for transwarp_db
///
/// This module holds the shared Tokio runtime that drives the async LibSQL driver
/// from the blocking API, the engine slot, and the default timeouts.
use once_cell::sync::{Lazy, OnceCell};
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::engine::Engine;

/// Global Tokio runtime for driver I/O
///
/// IMPORTANT: This panics if Tokio runtime creation fails, which can only happen in
/// extremely rare circumstances (e.g., system has no available threads). In normal
/// operation, runtime creation succeeds on the first statement.
///
/// Calls into the blocking API must not be made from inside another Tokio runtime;
/// use `spawn_blocking` there.
pub static TOKIO_RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    Runtime::new()
        .expect("Failed to initialize Tokio runtime - check system resources and thread limits")
});

/// The process-wide engine, set exactly once by `create_engine`/`install_engine`.
pub(crate) static ENGINE: OnceCell<Arc<Engine>> = OnceCell::new();

/// Default timeout for establishing a physical connection (in seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default SQLite busy timeout applied to every new connection (in milliseconds)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Statements slower than this are logged at warn level (in milliseconds)
pub const DEFAULT_SLOW_QUERY_MS: u64 = 100;

/// Minimum length of an encryption key
pub const MIN_ENCRYPTION_KEY_LEN: usize = 32;
