/// Buffered cursors over a thread's physical connection.
///
/// A [`Cursor`] borrows the connection held by the thread's lazy connection for
/// as long as it lives, so it is released on every exit path simply by going out
/// of scope. Results are read completely at `execute` time; fetching only walks
/// the buffer.
use crate::engine::RawConnection;
use crate::error::Result;
use crate::models::{ResultSet, Row, Value};
use crate::utils::should_use_query;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Cursor bound to one physical connection.
pub struct Cursor<'c> {
    conn: &'c mut dyn RawConnection,
    conn_id: Uuid,
    timeout: Option<Duration>,
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
    position: usize,
    rowcount: u64,
}

impl<'c> Cursor<'c> {
    pub(crate) fn new(conn: &'c mut dyn RawConnection, conn_id: Uuid) -> Self {
        Cursor {
            conn,
            conn_id,
            timeout: None,
            columns: Arc::from(Vec::new()),
            rows: Vec::new(),
            position: 0,
            rowcount: 0,
        }
    }

    /// Bound the driver calls made by this cursor.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Id of the physical connection this cursor runs on.
    pub fn connection_id(&self) -> Uuid {
        self.conn_id
    }

    /// Execute a statement with driver-native placeholders.
    ///
    /// Row-returning statements (SELECT, or anything with RETURNING) are buffered
    /// and `rowcount` becomes the number of rows; other statements report the
    /// affected row count. Any previous result is discarded.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        self.reset();

        if should_use_query(sql) {
            let ResultSet { columns, rows } = self.conn.query(sql, params, self.timeout)?;
            self.rowcount = rows.len() as u64;
            self.columns = Arc::from(columns);
            self.rows = rows;
        } else {
            self.rowcount = self.conn.execute(sql, params, self.timeout)?;
        }
        Ok(())
    }

    /// Run a row-returning statement regardless of its leading keyword.
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        self.reset();

        let ResultSet { columns, rows } = self.conn.query(sql, params, self.timeout)?;
        self.rowcount = rows.len() as u64;
        self.columns = Arc::from(columns);
        self.rows = rows;
        Ok(())
    }

    /// Affected rows of the last write, or the number of buffered rows.
    pub fn rowcount(&self) -> u64 {
        self.rowcount
    }

    /// Column names of the last row-returning statement.
    pub fn description(&self) -> &[String] {
        &self.columns
    }

    pub fn fetch_one(&mut self) -> Option<Row> {
        self.fetch_many(1).pop()
    }

    /// Fetch up to `max_rows` rows from the current position.
    pub fn fetch_many(&mut self, max_rows: usize) -> Vec<Row> {
        let remaining = self.rows.len().saturating_sub(self.position);
        let end = self.position + remaining.min(max_rows);

        let fetched = self.rows[self.position..end]
            .iter_mut()
            .map(|values| Row::new(Arc::clone(&self.columns), std::mem::take(values)))
            .collect();
        self.position = end;
        fetched
    }

    pub fn fetch_all(&mut self) -> Vec<Row> {
        self.fetch_many(usize::MAX)
    }

    /// Release the cursor explicitly.
    pub fn close(self) {}

    fn reset(&mut self) {
        self.columns = Arc::from(Vec::new());
        self.rows.clear();
        self.position = 0;
        self.rowcount = 0;
    }
}
