/// Scoped connection acquisition.
///
/// A [`ConnectionScope`] makes sure the calling thread's context has a lazy
/// connection for its lifetime. Only the scope that actually initialized the
/// context cleans it up, so scopes nest freely: statement helpers open their
/// own scope and simply join an outer one when it exists.
///
/// ```ignore
/// with_connection(|| {
///     update("update user set name=? where id=?", params!["Ada", 1])?;
///     select_one("select * from user where id=?", params![1])
/// })?;
/// // one physical connection was used for both statements
/// ```
use crate::context::{try_with_context, with_context, LazyConnection};
use crate::error::Result;
use std::marker::PhantomData;

/// RAII guard for a connection scope.
///
/// Cleanup runs on `exit()` or, failing that, on drop (including unwinding).
/// The guard is tied to the thread whose context it entered.
#[must_use = "the scope ends when the guard is dropped"]
pub struct ConnectionScope {
    owns_initialization: bool,
    finished: bool,
    _not_send: PhantomData<*const ()>,
}

impl ConnectionScope {
    /// Enter a scope on the calling thread's context.
    pub fn enter() -> Self {
        Self::enter_with(LazyConnection::new)
    }

    /// Enter a scope, initializing the context with `make` if it is empty.
    pub fn enter_with(make: impl FnOnce() -> LazyConnection) -> Self {
        let owns_initialization = with_context(|ctx| {
            if ctx.is_initialized() {
                false
            } else {
                // Cannot fail: the context was just checked to be empty.
                ctx.init_with(make()).is_ok()
            }
        });

        ConnectionScope {
            owns_initialization,
            finished: false,
            _not_send: PhantomData,
        }
    }

    /// True if this scope initialized the context and will clean it up.
    pub fn owns_initialization(&self) -> bool {
        self.owns_initialization
    }

    /// End the scope, reporting cleanup failures.
    pub fn exit(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.finished, true) || !self.owns_initialization {
            return Ok(());
        }
        with_context(|ctx| ctx.cleanup())
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if !self.owns_initialization {
            return;
        }
        match try_with_context(|ctx| ctx.cleanup()) {
            Some(Err(e)) => tracing::error!(error = %e, "connection scope cleanup failed"),
            Some(Ok(())) => {}
            None => tracing::error!("connection scope cleanup skipped: context unavailable"),
        }
    }
}

/// Run `f` inside a connection scope.
///
/// Every statement `f` executes shares one physical connection, opened on the
/// first statement and closed when the outermost scope ends. An error from `f`
/// takes precedence over a cleanup error.
pub fn with_connection<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    let scope = ConnectionScope::enter();
    let result = f();
    finish_scope(scope, result)
}

/// End `scope`, merging its cleanup outcome into `result`.
pub(crate) fn finish_scope<T>(scope: ConnectionScope, result: Result<T>) -> Result<T> {
    match (result, scope.exit()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup)) => Err(cleanup),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup)) => {
            tracing::warn!(error = %cleanup, "cleanup failed while propagating an error");
            Err(e)
        }
    }
}
