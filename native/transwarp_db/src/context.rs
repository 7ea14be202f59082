/// Per-thread execution context and the lazy connection it owns.
///
/// Every thread gets its own [`ExecutionContext`] through `thread_local!`. The
/// context holds at most one [`LazyConnection`] and the transaction depth; it is
/// never reachable from another thread, so none of this state needs locking.
///
/// A lazy connection asks the engine for a physical connection only when the
/// first cursor is requested, and keeps reusing it until `cleanup`.
use crate::cursor::Cursor;
use crate::engine::{self, Engine, RawConnection};
use crate::error::{Error, Result};
use std::cell::RefCell;
use std::sync::Arc;
use uuid::Uuid;

thread_local! {
    static CONTEXT: RefCell<ExecutionContext> = RefCell::new(ExecutionContext::new());
}

/// Run `f` against the calling thread's execution context.
///
/// `f` must not re-enter this function; scopes and the executor only hold the
/// borrow for the duration of a single context operation.
pub fn with_context<R>(f: impl FnOnce(&mut ExecutionContext) -> R) -> R {
    CONTEXT.with(|cell| f(&mut cell.borrow_mut()))
}

/// Like [`with_context`], but returns `None` instead of panicking when the
/// thread-local is already destroyed or borrowed. Used from `Drop`.
pub(crate) fn try_with_context<R>(f: impl FnOnce(&mut ExecutionContext) -> R) -> Option<R> {
    CONTEXT
        .try_with(|cell| cell.try_borrow_mut().ok().map(|mut ctx| f(&mut ctx)))
        .ok()
        .flatten()
}

/// True when the calling thread's context holds a lazy connection.
pub fn is_initialized() -> bool {
    with_context(|ctx| ctx.is_initialized())
}

/// Current transaction depth of the calling thread.
pub fn transaction_depth() -> usize {
    with_context(|ctx| ctx.transaction_depth())
}

/// Id of the physical connection held by the calling thread, if one is open.
pub fn connection_id() -> Option<Uuid> {
    with_context(|ctx| ctx.connection_id())
}

/// A connection that is opened on first use.
pub struct LazyConnection {
    engine: Option<Arc<Engine>>,
    connection: Option<(Uuid, Box<dyn RawConnection>)>,
}

impl LazyConnection {
    /// Lazy connection backed by the process-wide engine.
    pub fn new() -> Self {
        LazyConnection {
            engine: None,
            connection: None,
        }
    }

    /// Lazy connection backed by an explicit engine.
    pub fn with_engine(engine: Arc<Engine>) -> Self {
        LazyConnection {
            engine: Some(engine),
            connection: None,
        }
    }

    /// True once a physical connection has been acquired.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connection_id(&self) -> Option<Uuid> {
        self.connection.as_ref().map(|(id, _)| *id)
    }

    /// Cursor on the held connection, acquiring it from the engine on first use.
    pub fn cursor(&mut self) -> Result<Cursor<'_>> {
        if self.connection.is_none() {
            let engine = match &self.engine {
                Some(engine) => Arc::clone(engine),
                None => engine::engine()?,
            };
            let conn = engine.connect()?;
            let id = Uuid::new_v4();
            tracing::info!(conn_id = %id, "open connection");
            self.connection = Some((id, conn));
        }

        let (id, conn) = self.connection.as_mut().ok_or(Error::NotConnected)?;
        Ok(Cursor::new(&mut **conn, *id))
    }

    pub fn commit(&mut self) -> Result<()> {
        let (_, conn) = self.connection.as_mut().ok_or(Error::NotConnected)?;
        conn.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        let (_, conn) = self.connection.as_mut().ok_or(Error::NotConnected)?;
        conn.rollback()
    }

    /// Close the held connection, if any. Safe to call repeatedly.
    pub fn cleanup(&mut self) -> Result<()> {
        match self.connection.take() {
            Some((id, conn)) => {
                tracing::info!(conn_id = %id, "close connection");
                conn.close()
            }
            None => Ok(()),
        }
    }
}

impl Default for LazyConnection {
    fn default() -> Self {
        LazyConnection::new()
    }
}

impl Drop for LazyConnection {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::error!(error = %e, "failed to close connection on drop");
        }
    }
}

/// Connection and transaction state of one thread.
#[derive(Default)]
pub struct ExecutionContext {
    connection: Option<LazyConnection>,
    transaction_depth: usize,
    rollback_only: bool,
}

impl ExecutionContext {
    /// An empty context. Performs no driver calls.
    pub fn new() -> Self {
        ExecutionContext::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.connection.is_some()
    }

    /// Attach a fresh lazy connection backed by the process-wide engine.
    ///
    /// Calling this on an initialized context is a programmer error and returns
    /// [`Error::Configuration`].
    pub fn init(&mut self) -> Result<()> {
        self.init_with(LazyConnection::new())
    }

    /// Attach the given lazy connection.
    pub fn init_with(&mut self, connection: LazyConnection) -> Result<()> {
        if self.is_initialized() {
            return Err(Error::Configuration(
                "execution context is already initialized".to_string(),
            ));
        }
        tracing::debug!("open lazy connection");
        self.connection = Some(connection);
        self.transaction_depth = 0;
        self.rollback_only = false;
        Ok(())
    }

    /// Close the connection and detach it.
    ///
    /// A transaction still open at this point is a scope ordering bug: it is
    /// rolled back, logged, and reported as [`Error::TransactionOpen`] after the
    /// context has been emptied anyway.
    pub fn cleanup(&mut self) -> Result<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        let open = self.transaction_depth;
        if open > 0 {
            tracing::error!(depth = open, "cleanup with open transaction, rolling back");
            if connection.is_connected() {
                if let Err(e) = connection.rollback() {
                    tracing::error!(error = %e, "rollback during cleanup failed");
                }
            }
            self.transaction_depth = 0;
        }
        self.rollback_only = false;

        tracing::debug!("close lazy connection");
        connection.cleanup()?;

        if open > 0 {
            return Err(Error::TransactionOpen(open));
        }
        Ok(())
    }

    /// Cursor on the context's connection.
    pub fn cursor(&mut self) -> Result<Cursor<'_>> {
        self.connection
            .as_mut()
            .ok_or(Error::NotConnected)?
            .cursor()
    }

    pub fn transaction_depth(&self) -> usize {
        self.transaction_depth
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_depth > 0
    }

    /// True once a physical connection has been acquired.
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(LazyConnection::is_connected)
    }

    pub fn connection_id(&self) -> Option<Uuid> {
        self.connection
            .as_ref()
            .and_then(LazyConnection::connection_id)
    }

    pub fn commit(&mut self) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(Error::NotConnected)?
            .commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(Error::NotConnected)?
            .rollback()
    }

    /// Enter a transaction scope; returns the new depth.
    pub(crate) fn begin_transaction(&mut self) -> Result<usize> {
        if !self.is_initialized() {
            return Err(Error::NotConnected);
        }
        self.transaction_depth += 1;
        Ok(self.transaction_depth)
    }

    /// Leave a transaction scope; returns the remaining depth.
    pub(crate) fn end_transaction(&mut self) -> usize {
        self.transaction_depth = self.transaction_depth.saturating_sub(1);
        self.transaction_depth
    }

    pub(crate) fn mark_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    /// Take the rollback-only mark, clearing it.
    pub(crate) fn take_rollback_only(&mut self) -> bool {
        std::mem::take(&mut self.rollback_only)
    }
}
