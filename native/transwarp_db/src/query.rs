/// Statement execution
///
/// The executor is the seam the model layer talks to: SQL text with portable `?`
/// placeholders plus an ordered parameter list in, a row count, an optional row
/// or a row list out.
///
/// Every call runs inside its own connection scope, so it joins an enclosing
/// scope when there is one and otherwise opens and closes a connection around
/// the single statement. Writes auto-commit only when no transaction scope is
/// open on the calling thread.
use crate::constants::DEFAULT_SLOW_QUERY_MS;
use crate::context::with_context;
use crate::engine;
use crate::error::{Error, Result};
use crate::models::{Row, Value};
use crate::scope::with_connection;
use crate::utils::{build_insert_sql, record_statement, rewrite_placeholders};
use std::borrow::Cow;
use std::time::{Duration, Instant};

/// A statement with its parameters and an optional timeout.
///
/// ```ignore
/// let rows = Statement::new("select * from user where email=?")
///     .bind("ada@example.com")
///     .timeout(Duration::from_secs(2))
///     .select()?;
/// ```
#[derive(Debug, Clone)]
pub struct Statement<'a> {
    sql: Cow<'a, str>,
    params: Vec<Value>,
    timeout: Option<Duration>,
}

impl<'a> Statement<'a> {
    pub fn new(sql: impl Into<Cow<'a, str>>) -> Self {
        Statement {
            sql: sql.into(),
            params: Vec::new(),
            timeout: None,
        }
    }

    /// Append one positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Append positional parameters in order.
    pub fn bind_all(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.params.extend(values);
        self
    }

    /// Bound the driver call. Overrides the engine's default statement timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Execute a write and return the affected row count.
    ///
    /// Auto-commits when no transaction scope is open. A failed auto-commit
    /// statement or commit is rolled back before the error is returned.
    pub fn update(self) -> Result<u64> {
        with_connection(|| {
            let (sql, timeout, slow) = self.prepare()?;
            let started = Instant::now();

            let result: Result<u64> = with_context(|ctx| {
                let autocommit = !ctx.in_transaction();

                let outcome = ctx.cursor().and_then(|mut cursor| {
                    cursor.set_timeout(timeout);
                    cursor.execute(&sql, &self.params)?;
                    Ok(cursor.rowcount())
                });

                match outcome {
                    Ok(affected) if autocommit => {
                        tracing::debug!("auto commit");
                        if let Err(e) = ctx.commit() {
                            tracing::warn!(error = %e, "auto commit failed, rolling back");
                            if let Err(rb) = ctx.rollback() {
                                tracing::warn!(error = %rb, "rollback after failed commit failed");
                            }
                            return Err(e);
                        }
                        Ok(affected)
                    }
                    Ok(affected) => Ok(affected),
                    Err(e) => {
                        if autocommit && ctx.is_connected() {
                            if let Err(rb) = ctx.rollback() {
                                tracing::warn!(error = %rb, "rollback after failed statement failed");
                            }
                        }
                        Err(e)
                    }
                }
            });

            record_statement(&sql, self.params.len(), started, slow, result.is_ok());
            result
        })
    }

    /// Run a query and return every row.
    pub fn select(self) -> Result<Vec<Row>> {
        self.fetch(false)
    }

    /// Run a query and return the first row, `None` when nothing matched.
    pub fn select_one(self) -> Result<Option<Row>> {
        Ok(self.fetch(true)?.into_iter().next())
    }

    /// Run a query that yields a single value.
    ///
    /// Fails with [`Error::MultiColumns`] when the row does not have exactly one
    /// column and with [`Error::EmptyResult`] when no row matched.
    pub fn select_scalar(self) -> Result<Value> {
        let row = self.select_one()?.ok_or(Error::EmptyResult)?;
        if row.len() != 1 {
            return Err(Error::MultiColumns(row.len()));
        }
        Ok(row.into_values().remove(0))
    }

    /// Run a query that yields a single integer, such as `select count(*) ...`.
    pub fn select_int(self) -> Result<i64> {
        let row = self.select_one()?.ok_or(Error::EmptyResult)?;
        if row.len() != 1 {
            return Err(Error::MultiColumns(row.len()));
        }
        match row.value_at(0) {
            Some(Value::Integer(i)) => Ok(*i),
            Some(other) => Err(Error::TypeMismatch {
                column: row.columns().first().cloned().unwrap_or_default(),
                expected: "integer",
                found: other.type_name(),
            }),
            None => Err(Error::EmptyResult),
        }
    }

    /// Run a query, keeping only the first row when `first_only` is set.
    pub fn fetch(self, first_only: bool) -> Result<Vec<Row>> {
        with_connection(|| {
            let (sql, timeout, slow) = self.prepare()?;
            let started = Instant::now();

            let result: Result<Vec<Row>> = with_context(|ctx| {
                let mut cursor = ctx.cursor()?;
                cursor.set_timeout(timeout);
                cursor.query(&sql, &self.params)?;
                Ok(if first_only {
                    cursor.fetch_many(1)
                } else {
                    cursor.fetch_all()
                })
            });

            record_statement(&sql, self.params.len(), started, slow, result.is_ok());
            result
        })
    }

    /// Rewrite placeholders, check the parameter count and resolve timeouts.
    fn prepare(&self) -> Result<(String, Option<Duration>, Duration)> {
        let (sql, expected) = rewrite_placeholders(&self.sql);
        if expected != self.params.len() {
            return Err(Error::ParameterCount {
                expected,
                actual: self.params.len(),
            });
        }
        tracing::debug!(sql = %sql, params = self.params.len(), "SQL");

        let (timeout, slow) = match engine::engine() {
            Ok(engine) => (
                self.timeout.or(engine.statement_timeout()),
                engine.slow_query_threshold(),
            ),
            Err(_) => (self.timeout, Duration::from_millis(DEFAULT_SLOW_QUERY_MS)),
        };
        Ok((sql, timeout, slow))
    }
}

/// Execute a write statement. See [`Statement::update`].
pub fn update(sql: &str, params: Vec<Value>) -> Result<u64> {
    Statement::new(sql).bind_all(params).update()
}

/// Return every row of a query. See [`Statement::select`].
pub fn select(sql: &str, params: Vec<Value>) -> Result<Vec<Row>> {
    Statement::new(sql).bind_all(params).select()
}

/// Return the first row of a query. See [`Statement::select_one`].
pub fn select_one(sql: &str, params: Vec<Value>) -> Result<Option<Row>> {
    Statement::new(sql).bind_all(params).select_one()
}

/// Return the single value of a query. See [`Statement::select_scalar`].
pub fn select_scalar(sql: &str, params: Vec<Value>) -> Result<Value> {
    Statement::new(sql).bind_all(params).select_scalar()
}

/// Return the single integer of a query. See [`Statement::select_int`].
pub fn select_int(sql: &str, params: Vec<Value>) -> Result<i64> {
    Statement::new(sql).bind_all(params).select_int()
}

/// Insert one row, naming exactly the given columns in the given order.
///
/// ```ignore
/// insert("user", [("id", Value::from(1)), ("name", Value::from("Ada"))])?;
/// ```
pub fn insert<K, V>(table: &str, columns: impl IntoIterator<Item = (K, V)>) -> Result<u64>
where
    K: AsRef<str>,
    V: Into<Value>,
{
    let (names, values): (Vec<K>, Vec<Value>) = columns
        .into_iter()
        .map(|(name, value)| (name, value.into()))
        .unzip();

    let sql = build_insert_sql(table, names.iter().map(AsRef::as_ref));
    Statement::new(sql).bind_all(values).update()
}

/// Check that a connection can be opened and answers `SELECT 1`.
pub fn ping() -> Result<()> {
    Statement::new("SELECT 1").select_scalar().map(|_| ())
}
