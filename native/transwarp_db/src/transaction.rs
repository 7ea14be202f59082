/// Transaction scopes.
///
/// A [`TransactionScope`] is a connection scope that also bumps the calling
/// thread's transaction depth. While the depth is above zero the executor does
/// not auto-commit; the outermost transaction scope commits or rolls back when
/// the depth returns to zero. Inner scopes only adjust the depth.
///
/// An inner scope that rolls back marks the whole transaction rollback-only: the
/// outermost commit then rolls back and reports [`Error::RolledBack`].
///
/// # Usage
///
/// ```ignore
/// // Closure form: commit on Ok, roll back on Err
/// with_transaction(|| {
///     update("update account set balance=balance-? where id=?", params![10, 1])?;
///     update("update account set balance=balance+? where id=?", params![10, 2])
/// })?;
/// ```
///
/// ```ignore
/// // Guard form: dropping without commit() rolls back
/// let tx = TransactionScope::begin()?;
/// insert("audit", [("action", Value::from("login"))])?;
/// tx.commit()?;
/// ```
use crate::context::{try_with_context, with_context, ExecutionContext};
use crate::error::{Error, Result};
use crate::scope::{finish_scope, ConnectionScope};
use std::marker::PhantomData;

/// RAII guard for a transaction scope.
#[must_use = "dropping the guard without commit() rolls the transaction back"]
pub struct TransactionScope {
    connection: Option<ConnectionScope>,
    finished: bool,
    _not_send: PhantomData<*const ()>,
}

impl TransactionScope {
    /// Enter a transaction scope on the calling thread's context.
    pub fn begin() -> Result<Self> {
        let connection = ConnectionScope::enter();
        let depth = with_context(ExecutionContext::begin_transaction)?;
        if depth == 1 {
            tracing::debug!("begin transaction");
        }

        Ok(TransactionScope {
            connection: Some(connection),
            finished: false,
            _not_send: PhantomData,
        })
    }

    /// Commit, or only leave the scope when an outer transaction is open.
    pub fn commit(mut self) -> Result<()> {
        self.finish(true)
    }

    /// Roll back, or mark the enclosing transaction rollback-only.
    pub fn rollback(mut self) -> Result<()> {
        self.finish(false)
    }

    fn finish(&mut self, commit: bool) -> Result<()> {
        if std::mem::replace(&mut self.finished, true) {
            return Ok(());
        }

        let outcome = try_with_context(|ctx| end_transaction(ctx, commit)).unwrap_or_else(|| {
            tracing::error!("transaction scope ended without an execution context");
            Ok(())
        });

        match self.connection.take() {
            Some(connection) => finish_scope(connection, outcome),
            None => outcome,
        }
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.finish(false) {
            tracing::error!(error = %e, "rollback on drop failed");
        }
    }
}

/// Leave one transaction level, committing or rolling back at the outermost one.
fn end_transaction(ctx: &mut ExecutionContext, commit: bool) -> Result<()> {
    if !ctx.is_initialized() {
        tracing::warn!("transaction scope ended after its context was cleaned up");
        return Ok(());
    }

    if ctx.end_transaction() > 0 {
        if !commit {
            ctx.mark_rollback_only();
        }
        return Ok(());
    }

    let rollback_only = ctx.take_rollback_only();
    let refused = commit && rollback_only;

    if !ctx.is_connected() {
        // Nothing was executed, so there is nothing to commit or roll back.
        return if refused { Err(Error::RolledBack) } else { Ok(()) };
    }

    if commit && !rollback_only {
        tracing::debug!("commit");
        if let Err(e) = ctx.commit() {
            tracing::warn!(error = %e, "commit failed, rolling back");
            if let Err(rb) = ctx.rollback() {
                tracing::warn!(error = %rb, "rollback after failed commit failed");
            }
            return Err(e);
        }
        return Ok(());
    }

    tracing::debug!("rollback");
    ctx.rollback()?;
    if refused {
        Err(Error::RolledBack)
    } else {
        Ok(())
    }
}

/// Run `f` inside a transaction scope.
///
/// Commits when `f` returns `Ok` and this is the outermost transaction; rolls
/// back (or marks the outer transaction rollback-only) when it returns `Err`.
/// The error from `f` is returned unchanged.
pub fn with_transaction<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    let tx = TransactionScope::begin()?;
    match f() {
        Ok(value) => tx.commit().map(|()| value),
        Err(e) => {
            if let Err(rb) = tx.rollback() {
                tracing::warn!(error = %rb, "rollback failed while propagating an error");
            }
            Err(e)
        }
    }
}
