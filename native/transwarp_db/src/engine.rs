/// The process-wide connection factory
///
/// An [`Engine`] captures everything needed to open a physical connection and
/// nothing else: it never connects on its own. The first connection is opened
/// when a thread's lazy connection hands out its first cursor.
///
/// Exactly one engine is installed per process. A second `create_engine` or
/// `install_engine` fails with [`Error::Configuration`].
use crate::config::EngineConfig;
use crate::connection::LibsqlConnector;
use crate::constants::ENGINE;
use crate::error::{BoxError, Error, Result};
use crate::models::{ResultSet, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One physical database connection as seen by the execution context.
///
/// Implementations buffer row-returning statements completely and honour the
/// optional timeout by failing with [`Error::Timeout`]. Statement failures are
/// reported as [`Error::Database`] with the driver's original error attached.
pub trait RawConnection {
    /// Run a statement that returns no rows; returns the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value], timeout: Option<Duration>) -> Result<u64>;

    /// Run a row-returning statement and buffer every row.
    fn query(&mut self, sql: &str, params: &[Value], timeout: Option<Duration>)
        -> Result<ResultSet>;

    /// Commit the open transaction, if any.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction, if any.
    fn rollback(&mut self) -> Result<()>;

    /// Close the connection, rolling back anything uncommitted.
    fn close(self: Box<Self>) -> Result<()>;
}

type ConnectFn = dyn Fn() -> std::result::Result<Box<dyn RawConnection>, BoxError> + Send + Sync;

/// Connection factory shared by every thread.
pub struct Engine {
    id: Uuid,
    connect: Box<ConnectFn>,
    statement_timeout: Option<Duration>,
    slow_query_threshold: Duration,
}

impl Engine {
    /// Wrap a zero-argument connection factory.
    pub fn new<F>(connect: F) -> Self
    where
        F: Fn() -> std::result::Result<Box<dyn RawConnection>, BoxError> + Send + Sync + 'static,
    {
        Engine {
            id: Uuid::new_v4(),
            connect: Box::new(connect),
            statement_timeout: None,
            slow_query_threshold: Duration::from_millis(crate::constants::DEFAULT_SLOW_QUERY_MS),
        }
    }

    /// Build a LibSQL engine from validated options. Does not connect.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let statement_timeout = config.statement_timeout();
        let slow_query_threshold = config.slow_query_threshold();
        let connector = LibsqlConnector::new(config);

        Ok(Engine::new(move || connector.connect())
            .with_statement_timeout(statement_timeout)
            .with_slow_query_threshold(slow_query_threshold))
    }

    /// Default timeout applied to statements that do not set their own.
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout
    }

    pub fn slow_query_threshold(&self) -> Duration {
        self.slow_query_threshold
    }

    /// Open a new physical connection through the factory.
    pub fn connect(&self) -> Result<Box<dyn RawConnection>> {
        (self.connect)().map_err(Error::Connection)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("statement_timeout", &self.statement_timeout)
            .field("slow_query_threshold", &self.slow_query_threshold)
            .finish_non_exhaustive()
    }
}

/// Create the process-wide LibSQL engine.
///
/// Fails with [`Error::Configuration`] when the options are invalid or an engine
/// already exists.
pub fn create_engine(config: EngineConfig) -> Result<Arc<Engine>> {
    install_engine(Engine::from_config(config)?)
}

/// Install a custom engine as the process-wide engine.
pub fn install_engine(engine: Engine) -> Result<Arc<Engine>> {
    let engine = Arc::new(engine);
    ENGINE
        .set(Arc::clone(&engine))
        .map_err(|_| Error::Configuration("engine is already initialized".to_string()))?;

    tracing::info!(engine_id = %engine.id, "engine initialized");
    Ok(engine)
}

/// The process-wide engine.
pub fn engine() -> Result<Arc<Engine>> {
    ENGINE.get().cloned().ok_or_else(|| {
        Error::Configuration("engine is not initialized; call create_engine first".to_string())
    })
}

/// True once an engine has been installed.
pub fn has_engine() -> bool {
    ENGINE.get().is_some()
}
