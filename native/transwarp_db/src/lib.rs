//! `transwarp_db`: thread-local, nestable `LibSQL` connection contexts
//!
//! Model-layer code issues statements through a small executor
//! ([`update`], [`select`], [`select_one`], [`select_scalar`], [`insert`])
//! without ever handling connections. Each thread keeps one execution context;
//! connection scopes and transaction scopes nest on it, the physical connection
//! is opened lazily on the first statement and closed when the outermost scope
//! ends, and writes auto-commit only outside a transaction scope.
//!
//! ```ignore
//! use transwarp_db::{create_engine, params, select_int, update, with_transaction, EngineConfig};
//!
//! create_engine(EngineConfig::local("app.db"))?;
//!
//! with_transaction(|| {
//!     update("update account set balance=balance-? where id=?", params![10, 1])?;
//!     update("update account set balance=balance+? where id=?", params![10, 2])
//! })?;
//!
//! let n = select_int("select count(*) from account", params![])?;
//! ```
pub mod config;
pub mod connection;
pub mod constants;
pub mod context;
pub mod cursor;
pub mod decode;
pub mod engine;
pub mod error;
pub mod models;
pub mod query;
pub mod scope;
pub mod transaction;
pub mod utils;

// Re-export the public surface
pub use config::{EngineConfig, Mode};
pub use context::{connection_id, is_initialized, transaction_depth, ExecutionContext, LazyConnection};
pub use cursor::Cursor;
pub use engine::{create_engine, engine, has_engine, install_engine, Engine, RawConnection};
pub use error::{BoxError, Error, Result};
pub use models::{FromValue, ResultSet, Row, Value};
pub use query::{insert, ping, select, select_int, select_one, select_scalar, update, Statement};
pub use scope::{with_connection, ConnectionScope};
pub use transaction::{with_transaction, TransactionScope};
pub use utils::{
    detect_query_type, rewrite_placeholders, should_use_query, statement_writes, QueryType,
};

#[cfg(test)]
mod tests;
