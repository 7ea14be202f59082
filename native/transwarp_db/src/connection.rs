/// LibSQL binding for physical connections
///
/// This module turns an [`EngineConfig`] into LibSQL connections: it builds the
/// database handle once (local, remote, or remote replica, optionally encrypted),
/// opens one connection per request, and drives the async driver from the
/// blocking API through the shared runtime.
///
/// Autocommit is off from the executor's point of view: the first write statement
/// on a connection opens a transaction, and it stays open until `commit`,
/// `rollback` or `close`.
use crate::config::{EngineConfig, Mode};
use crate::constants::TOKIO_RUNTIME;
use crate::decode::{from_driver_value, to_driver_value};
use crate::engine::RawConnection;
use crate::error::{BoxError, Error, Result};
use crate::models::{ResultSet, Value};
use crate::utils::statement_writes;
use bytes::Bytes;
use libsql::{Builder, Cipher, Database, EncryptionConfig};
use once_cell::sync::OnceCell;
use std::future::Future;
use std::time::Duration;

/// Connection factory captured by a LibSQL engine.
///
/// The database handle is built on the first connection request, so creating the
/// engine performs no I/O.
pub struct LibsqlConnector {
    config: EngineConfig,
    db: OnceCell<Database>,
}

impl LibsqlConnector {
    pub fn new(config: EngineConfig) -> Self {
        LibsqlConnector {
            config,
            db: OnceCell::new(),
        }
    }

    /// Open a new connection, building the database handle if needed.
    ///
    /// Remote connections are pinged so an unreachable server fails here rather
    /// than on the first statement. Local connections get the configured busy
    /// timeout.
    pub fn connect(&self) -> std::result::Result<Box<dyn RawConnection>, BoxError> {
        let db = self.db.get_or_try_init(|| self.build_database())?;
        let conn = db
            .connect()
            .map_err(|e| format!("Failed to connect: {e}"))?;

        if self.config.mode == Mode::Remote {
            let timeout = self.config.connect_timeout();
            block_on_with_timeout(Some(timeout), conn.query("SELECT 1", ()))
                .map_err(|e| format!("Failed ping: {e}"))?;
        } else {
            conn.busy_timeout(self.config.busy_timeout())
                .map_err(|e| format!("busy_timeout failed: {e}"))?;
        }

        Ok(Box::new(LibsqlConnection::new(conn)))
    }

    fn build_database(&self) -> std::result::Result<Database, BoxError> {
        let config = &self.config;
        let timeout = config.connect_timeout();

        TOKIO_RUNTIME.block_on(async {
            tokio::time::timeout(timeout, async {
                let db = match config.mode {
                    Mode::RemoteReplica => {
                        let mut builder = Builder::new_remote_replica(
                            required(&config.database, "database")?,
                            required(&config.url, "url")?,
                            required(&config.auth_token, "auth_token")?,
                        );

                        if let Some(key) = &config.encryption_key {
                            builder = builder.encryption_config(encryption_config(key));
                        }

                        builder.build().await
                    }
                    Mode::Remote => {
                        Builder::new_remote(
                            required(&config.url, "url")?,
                            required(&config.auth_token, "auth_token")?,
                        )
                        .build()
                        .await
                    }
                    Mode::Local => {
                        let mut builder = Builder::new_local(required(&config.database, "database")?);

                        if let Some(key) = &config.encryption_key {
                            builder = builder.encryption_config(encryption_config(key));
                        }

                        builder.build().await
                    }
                }
                .map_err(|e| format!("Failed to build DB: {e}"))?;

                Ok::<_, BoxError>(db)
            })
            .await
            .map_err(|_| -> BoxError {
                format!("Connection timeout after {} seconds", timeout.as_secs()).into()
            })?
        })
    }
}

fn required(value: &Option<String>, name: &str) -> std::result::Result<String, BoxError> {
    value
        .clone()
        .ok_or_else(|| format!("missing `{name}` option").into())
}

fn encryption_config(key: &str) -> EncryptionConfig {
    EncryptionConfig {
        cipher: Cipher::Aes256Cbc,
        encryption_key: Bytes::from(key.to_owned()),
    }
}

/// Run a driver future to completion on the shared runtime, bounded by `timeout`.
fn block_on_with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, libsql::Error>>,
{
    TOKIO_RUNTIME.block_on(async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Timeout(limit))?
                .map_err(Error::from),
            None => fut.await.map_err(Error::from),
        }
    })
}

/// One LibSQL connection.
pub struct LibsqlConnection {
    conn: libsql::Connection,
}

impl LibsqlConnection {
    pub fn new(conn: libsql::Connection) -> Self {
        LibsqlConnection { conn }
    }

    /// True while a driver transaction is open on this connection.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn run<T, F>(&self, timeout: Option<Duration>, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, libsql::Error>>,
    {
        let result = block_on_with_timeout(timeout, fut);
        if let Err(Error::Timeout(limit)) = &result {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "statement timed out, interrupting");
            if let Err(e) = self.conn.interrupt() {
                tracing::warn!(error = %e, "interrupt failed");
            }
        }
        result
    }

    /// Open a transaction before a write when none is open yet.
    fn begin_if_needed(&self, sql: &str) -> Result<()> {
        if statement_writes(sql) && !self.in_transaction() {
            tracing::debug!("begin");
            self.run(None, self.conn.execute("BEGIN", ()))?;
        }
        Ok(())
    }
}

impl RawConnection for LibsqlConnection {
    fn execute(&mut self, sql: &str, params: &[Value], timeout: Option<Duration>) -> Result<u64> {
        self.begin_if_needed(sql)?;

        let params: Vec<libsql::Value> = params.iter().map(to_driver_value).collect();
        self.run(timeout, self.conn.execute(sql, params))
    }

    fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<ResultSet> {
        self.begin_if_needed(sql)?;

        let params: Vec<libsql::Value> = params.iter().map(to_driver_value).collect();
        let conn = &self.conn;

        self.run(timeout, async move {
            let mut rows = conn.query(sql, params).await?;

            let count = rows.column_count();
            let columns: Vec<String> = (0..count)
                .map(|i| {
                    rows.column_name(i)
                        .map_or_else(|| format!("col{i}"), str::to_string)
                })
                .collect();

            let mut collected = Vec::new();
            while let Some(row) = rows.next().await? {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..count {
                    values.push(from_driver_value(row.get_value(i)?));
                }
                collected.push(values);
            }

            Ok(ResultSet::new(columns, collected))
        })
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction() {
            self.run(None, self.conn.execute("COMMIT", ()))?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction() {
            self.run(None, self.conn.execute("ROLLBACK", ()))?;
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        // Dropping the handle closes it; anything uncommitted is discarded first.
        self.rollback()
    }
}
