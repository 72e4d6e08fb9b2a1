//! COPY FROM STDIN bulk loads.
//!
//! A [`BulkSession`] is a token tied to the [`Conn`] that started it; the
//! connection is passed to every call, like a transaction handle:
//!
//! ```ignore
//! let mut bulk = conn.begin_bulk("items", &["id", "name"], FormatCode::Text)?;
//! bulk.push_row(&mut conn, &[Some(b"1".as_slice()), Some(b"apple".as_slice())])?;
//! bulk.push_row(&mut conn, &[Some(b"2".as_slice()), None])?;
//! let rows = bulk.finish(&mut conn)?;
//! ```
//!
//! Rows are buffered and sent as CopyData messages once a batch is due; a
//! batch larger than [`MAX_COPY_DATA`] is split across messages. Any failure
//! after the COPY started ends the load: the copy is failed, the stream is
//! drained back to ReadyForQuery, and an open transaction is rolled back.

use crate::copy::CopyEncoder;
use crate::error::{Error, Result};
use crate::protocol::frontend::{
    MAX_COPY_DATA, write_copy_data_header, write_copy_done, write_copy_fail, write_query,
};
use crate::protocol::types::FormatCode;

use super::conn::{Conn, ConnStatus};

/// Default row threshold for sending a batch.
pub const DEFAULT_BATCH_ROWS: usize = 1000;

/// Default byte threshold for sending a batch.
pub const DEFAULT_BATCH_BYTES: usize = 1 << 20;

/// Options for a bulk load.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// Payload encoding.
    ///
    /// Default: `FormatCode::Text`
    pub format: FormatCode,

    /// Send a batch once this many rows are buffered.
    ///
    /// Default: `1000`
    pub batch_rows: usize,

    /// Send a batch once this many bytes are buffered.
    ///
    /// Default: `1 MiB`
    pub batch_bytes: usize,

    /// Wrap the load in its own transaction when none is open.
    ///
    /// Default: `true`
    pub transaction: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            format: FormatCode::Text,
            batch_rows: DEFAULT_BATCH_ROWS,
            batch_bytes: DEFAULT_BATCH_BYTES,
            transaction: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkState {
    NotStarted,
    Copying,
    Ended,
}

/// One COPY FROM STDIN load.
#[derive(Debug)]
pub struct BulkSession {
    session: u64,
    table: String,
    columns: Vec<String>,
    encoder: CopyEncoder,
    options: BulkOptions,
    state: BulkState,
    owns_transaction: bool,
    rows_sent: u64,
    bytes_sent: u64,
    max_message: usize,
}

impl BulkSession {
    /// A load into `table`. Table and column names are sent verbatim, so
    /// quote them if needed. An empty column list targets every column.
    pub fn new(table: &str, columns: &[&str], options: BulkOptions) -> Self {
        Self {
            session: 0,
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            encoder: CopyEncoder::new(options.format, columns.len()),
            options,
            state: BulkState::NotStarted,
            owns_transaction: false,
            rows_sent: 0,
            bytes_sent: 0,
            max_message: MAX_COPY_DATA,
        }
    }

    fn copy_sql(&self) -> String {
        let format = match self.options.format {
            FormatCode::Text => "text",
            FormatCode::Binary => "binary",
        };
        if self.columns.is_empty() {
            format!("COPY {} FROM STDIN WITH (FORMAT {})", self.table, format)
        } else {
            format!(
                "COPY {} ({}) FROM STDIN WITH (FORMAT {})",
                self.table,
                self.columns.join(", "),
                format
            )
        }
    }

    /// Open the transaction if needed and put the server in COPY FROM STDIN.
    pub fn start(&mut self, conn: &mut Conn) -> Result<()> {
        let result = self.start_inner(conn);
        conn.record(result)
    }

    fn start_inner(&mut self, conn: &mut Conn) -> Result<()> {
        if self.state != BulkState::NotStarted {
            return Err(Error::Protocol("bulk session already started".into()));
        }
        conn.ensure_idle()?;
        if self.options.transaction && !conn.in_transaction() {
            conn.execute("BEGIN")?;
            self.owns_transaction = true;
        }

        let sql = self.copy_sql();
        tracing::debug!(sql = %sql, "starting COPY");
        conn.buffer_set.write_buffer.clear();
        write_query(&mut conn.buffer_set.write_buffer, &sql);
        let response = match conn.send().and_then(|()| conn.await_copy_in()) {
            Ok(response) => response,
            Err(e) => return Err(self.after_failure(conn, e)),
        };

        self.session = conn.session_id();
        self.state = BulkState::Copying;
        conn.begin_copy(self.session);

        if response.format != self.options.format {
            let error = Error::Protocol(format!(
                "server chose {:?} COPY format, {:?} was requested",
                response.format, self.options.format
            ));
            return Err(self.fail(conn, error));
        }
        if self.columns.is_empty() {
            self.encoder = CopyEncoder::new(self.options.format, response.num_columns());
        }
        Ok(())
    }

    /// Queue one row. `None` is SQL NULL. A batch is sent once a threshold is reached.
    ///
    /// A row of the wrong width is rejected without ending the load.
    pub fn push_row(&mut self, conn: &mut Conn, fields: &[Option<&[u8]>]) -> Result<()> {
        let result = self.push_row_inner(conn, fields);
        conn.record(result)
    }

    fn push_row_inner(&mut self, conn: &mut Conn, fields: &[Option<&[u8]>]) -> Result<()> {
        self.check_session(conn)?;
        self.encoder.push_row(fields)?;
        if self
            .encoder
            .should_flush(self.options.batch_rows, self.options.batch_bytes)
        {
            self.send_batch(conn)?;
        }
        Ok(())
    }

    /// Queue many rows, stopping at the first failure.
    pub fn push_rows<'a, I>(&mut self, conn: &mut Conn, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a [Option<&'a [u8]>]>,
    {
        for row in rows {
            self.push_row(conn, row)?;
        }
        Ok(())
    }

    /// Send whatever is buffered now.
    pub fn flush(&mut self, conn: &mut Conn) -> Result<()> {
        let result = self
            .check_session(conn)
            .and_then(|()| self.send_batch(conn));
        conn.record(result)
    }

    /// Send the rest, end the COPY and commit an owned transaction.
    ///
    /// Returns the row count the server reported.
    pub fn finish(&mut self, conn: &mut Conn) -> Result<u64> {
        let result = self.finish_inner(conn);
        conn.record(result)
    }

    fn finish_inner(&mut self, conn: &mut Conn) -> Result<u64> {
        self.check_session(conn)?;
        self.encoder.finish();
        self.send_batch(conn)?;

        conn.buffer_set.write_buffer.clear();
        write_copy_done(&mut conn.buffer_set.write_buffer);
        if let Err(e) = conn.send() {
            return Err(self.fail(conn, e));
        }
        conn.end_copy();
        let completed = match conn.collect(false) {
            Ok(completed) => completed,
            Err(e) => return Err(self.after_failure(conn, e)),
        };
        let rows = completed.rows_affected().unwrap_or(self.rows_sent);

        self.state = BulkState::Ended;
        if self.owns_transaction {
            self.owns_transaction = false;
            conn.execute("COMMIT")?;
        }
        tracing::debug!(table = %self.table, rows, bytes = self.bytes_sent, "COPY finished");
        Ok(rows)
    }

    /// Give up on the load: CopyFail with `reason`, then roll back.
    pub fn abort(&mut self, conn: &mut Conn, reason: &str) -> Result<()> {
        let result = self.abort_inner(conn, reason);
        conn.record(result)
    }

    fn abort_inner(&mut self, conn: &mut Conn, reason: &str) -> Result<()> {
        self.check_session(conn)?;
        let aborted = Error::Protocol(format!("bulk load aborted: {}", reason));
        let error = self.fail_with(conn, aborted, reason);
        if matches!(error, Error::Fatal(_)) || conn.status() == ConnStatus::Bad {
            return Err(error);
        }
        Ok(())
    }

    pub fn state(&self) -> BulkState {
        self.state
    }

    /// Rows already sent to the server.
    pub fn rows_sent(&self) -> u64 {
        self.rows_sent
    }

    /// Rows buffered but not yet sent.
    pub fn rows_queued(&self) -> usize {
        self.encoder.rows()
    }

    /// Bytes buffered but not yet sent.
    pub fn bytes_queued(&self) -> usize {
        self.encoder.len()
    }

    fn check_session(&self, conn: &Conn) -> Result<()> {
        match self.state {
            BulkState::NotStarted => Err(Error::Protocol("bulk session not started".into())),
            BulkState::Ended => Err(Error::Protocol("bulk session already ended".into())),
            BulkState::Copying => {
                if self.session != conn.session_id() || !conn.is_copying(self.session) {
                    return Err(Error::Protocol(
                        "bulk session does not belong to this connection".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Push the buffer as CopyData, then check the server is still copying.
    fn send_batch(&mut self, conn: &mut Conn) -> Result<()> {
        if !self.encoder.is_empty() {
            if let Err(e) = self.send_chunks(conn) {
                return Err(self.fail(conn, e));
            }
            tracing::trace!(
                rows = self.encoder.rows(),
                bytes = self.encoder.len(),
                "COPY batch sent"
            );
            self.rows_sent += self.encoder.rows() as u64;
            self.bytes_sent += self.encoder.len() as u64;
            self.encoder.reset();
        }
        if let Err(e) = conn.check_copy_state() {
            return Err(self.fail(conn, e));
        }
        Ok(())
    }

    /// COPY data need not be row aligned, so the buffer is cut at any byte.
    fn send_chunks(&self, conn: &mut Conn) -> Result<()> {
        for chunk in self.encoder.buffer().chunks(self.max_message) {
            conn.buffer_set.write_buffer.clear();
            write_copy_data_header(&mut conn.buffer_set.write_buffer, chunk.len())?;
            conn.send()?;
            conn.send_bytes(chunk)?;
        }
        Ok(())
    }

    /// Leave copy mode after `error`, then clean up. Returns the error to report.
    fn fail(&mut self, conn: &mut Conn, error: Error) -> Error {
        let reason = error.to_string();
        self.fail_with(conn, error, &reason)
    }

    fn fail_with(&mut self, conn: &mut Conn, error: Error, reason: &str) -> Error {
        if conn.status() != ConnStatus::Bad {
            // The server already left copy mode if it sent the error
            let server_left = matches!(error, Error::Query(_));
            if let Err(e) = self.leave_copy(conn, reason, server_left) {
                tracing::warn!(error = %e, "could not leave COPY mode");
            }
        }
        self.after_failure(conn, error)
    }

    fn leave_copy(&self, conn: &mut Conn, reason: &str, server_left: bool) -> Result<()> {
        if !server_left {
            conn.buffer_set.write_buffer.clear();
            write_copy_fail(&mut conn.buffer_set.write_buffer, reason);
            conn.send()?;
        }
        conn.end_copy();
        match conn.collect(false) {
            Err(e) if conn.status() == ConnStatus::Bad => Err(e),
            _ => Ok(()),
        }
    }

    /// Roll back after a failed load. A failed rollback leaves the connection Bad.
    fn after_failure(&mut self, conn: &mut Conn, error: Error) -> Error {
        self.state = BulkState::Ended;
        self.owns_transaction = false;
        conn.end_copy();
        tracing::warn!(table = %self.table, error = %error, "COPY failed");
        if conn.status() == ConnStatus::Bad || !conn.in_transaction() {
            return error;
        }
        match conn.execute("ROLLBACK") {
            Ok(_) => error,
            Err(rollback) => {
                conn.mark_bad();
                Error::Fatal(format!(
                    "rollback after failed COPY failed: {}; original error: {}",
                    rollback, error
                ))
            }
        }
    }
}

impl Conn {
    /// Start a bulk load with default options and the given format.
    pub fn begin_bulk(
        &mut self,
        table: &str,
        columns: &[&str],
        format: FormatCode,
    ) -> Result<BulkSession> {
        let options = BulkOptions {
            format,
            ..BulkOptions::default()
        };
        self.begin_bulk_with(table, columns, options)
    }

    pub fn begin_bulk_with(
        &mut self,
        table: &str,
        columns: &[&str],
        options: BulkOptions,
    ) -> Result<BulkSession> {
        let mut session = BulkSession::new(table, columns, options);
        session.start(self)?;
        Ok(session)
    }
}
