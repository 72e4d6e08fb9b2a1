//! Completed query results.

use std::ops::Range;

use crate::error::{Error, Result, ServerError};
use crate::protocol::backend::query::rows_from_tag;
use crate::protocol::backend::{DataRow, RowDescription};
use crate::protocol::types::{FormatCode, Oid};

/// Classification of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    /// Rows were described (SELECT, RETURNING, SHOW ...)
    OkWithData,
    /// Command completed without rows (DDL, INSERT ...)
    OkNoData,
    /// Completed, but the server sent notices or the query string was empty
    OkWithWarning,
    /// The server rejected the command
    Failed,
}

impl ResultStatus {
    /// Classify the outcome of any query call.
    ///
    /// Successful results carry their own status; only server rejections count
    /// as `Failed`. Local and transport errors are not command outcomes and
    /// yield `None`.
    pub fn of(outcome: &Result<QueryResult>) -> Option<Self> {
        match outcome {
            Ok(result) => Some(result.status()),
            Err(Error::Query(_)) => Some(ResultStatus::Failed),
            Err(_) => None,
        }
    }
}

/// Column descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// Zero-based column position
    pub index: usize,
    pub type_oid: Oid,
    pub format: FormatCode,
}

/// Result of one command, owned by the caller.
///
/// Cells are stored in one flat buffer. [`clear`](Self::clear) releases it;
/// afterwards every accessor fails with [`Error::InvalidUsage`].
#[derive(Debug, Clone)]
pub struct QueryResult {
    status: ResultStatus,
    fields: Vec<Field>,
    described: bool,
    data: Vec<u8>,
    cells: Vec<Option<Range<usize>>>,
    rows: usize,
    command_tag: Option<String>,
    notices: Vec<ServerError>,
    param_types: Vec<Oid>,
    empty_query: bool,
    cleared: bool,
}

impl QueryResult {
    pub(crate) fn new() -> Self {
        Self {
            status: ResultStatus::OkNoData,
            fields: Vec::new(),
            described: false,
            data: Vec::new(),
            cells: Vec::new(),
            rows: 0,
            command_tag: None,
            notices: Vec::new(),
            param_types: Vec::new(),
            empty_query: false,
            cleared: false,
        }
    }

    /// Drop the row data of a finished statement when the next one in the
    /// same query string starts. Notices and parameter types survive.
    pub(crate) fn start_next_statement(&mut self) {
        self.fields.clear();
        self.described = false;
        self.data.clear();
        self.cells.clear();
        self.rows = 0;
        self.command_tag = None;
        self.empty_query = false;
    }

    pub(crate) fn describe(&mut self, desc: &RowDescription<'_>) {
        self.described = true;
        self.fields = desc
            .fields()
            .iter()
            .enumerate()
            .map(|(index, f)| Field {
                name: f.name.to_string(),
                index,
                type_oid: f.type_oid(),
                format: f.format(),
            })
            .collect();
    }

    pub(crate) fn push_row(&mut self, row: &DataRow<'_>) -> Result<()> {
        if row.len() != self.fields.len() {
            return Err(Error::Protocol(format!(
                "DataRow has {} columns, RowDescription has {}",
                row.len(),
                self.fields.len()
            )));
        }
        let data = &mut self.data;
        let cells = &mut self.cells;
        row.for_each_value(|value| {
            cells.push(value.map(|bytes| {
                let start = data.len();
                data.extend_from_slice(bytes);
                start..data.len()
            }));
        })?;
        self.rows += 1;
        Ok(())
    }

    pub(crate) fn complete(&mut self, tag: &str) {
        self.command_tag = Some(tag.to_string());
    }

    pub(crate) fn mark_empty_query(&mut self) {
        self.empty_query = true;
    }

    pub(crate) fn add_notice(&mut self, notice: ServerError) {
        self.notices.push(notice);
    }

    pub(crate) fn set_param_types(&mut self, oids: Vec<Oid>) {
        self.param_types = oids;
    }

    /// Fix the status once the command cycle has ended.
    pub(crate) fn finish(mut self) -> Self {
        self.status = if self.empty_query || !self.notices.is_empty() {
            ResultStatus::OkWithWarning
        } else if self.described {
            ResultStatus::OkWithData
        } else {
            ResultStatus::OkNoData
        };
        self
    }

    fn ensure_live(&self) -> Result<()> {
        if self.cleared {
            return Err(Error::InvalidUsage("result has been cleared".into()));
        }
        Ok(())
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    /// Number of rows received. Zero after `clear`.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Number of columns. Zero after `clear`.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Column names in order.
    pub fn get_fields(&self) -> Result<Vec<&str>> {
        self.ensure_live()?;
        Ok(self.fields.iter().map(|f| f.name.as_str()).collect())
    }

    /// Full column descriptors.
    pub fn fields(&self) -> Result<&[Field]> {
        self.ensure_live()?;
        Ok(&self.fields)
    }

    /// Cell bytes in the requested result format; `Ok(None)` is SQL NULL.
    pub fn get_value(&self, row: usize, col: usize) -> Result<Option<&[u8]>> {
        self.ensure_live()?;
        if row >= self.rows || col >= self.fields.len() {
            return Err(Error::InvalidUsage(format!(
                "cell ({}, {}) out of range for {} rows x {} columns",
                row,
                col,
                self.rows,
                self.fields.len()
            )));
        }
        let cell = self
            .cells
            .get(row * self.fields.len() + col)
            .ok_or_else(|| Error::InvalidUsage(format!("cell ({}, {}) missing", row, col)))?;
        Ok(cell.clone().and_then(|range| self.data.get(range)))
    }

    /// Cell as UTF-8 text.
    pub fn get_str(&self, row: usize, col: usize) -> Result<Option<&str>> {
        match self.get_value(row, col)? {
            Some(bytes) => simdutf8::basic::from_utf8(bytes).map(Some).map_err(|_e| {
                Error::InvalidUsage(format!("cell ({}, {}) is not valid UTF-8", row, col))
            }),
            None => Ok(None),
        }
    }

    /// Command tag of the last completed statement, e.g. `INSERT 0 3`.
    pub fn command_tag(&self) -> Option<&str> {
        self.command_tag.as_deref()
    }

    /// Count carried by the command tag.
    pub fn rows_affected(&self) -> Option<u64> {
        self.command_tag.as_deref().and_then(rows_from_tag)
    }

    /// Notices the server sent while running the command.
    pub fn notices(&self) -> &[ServerError] {
        &self.notices
    }

    /// Parameter types reported for a prepared statement.
    pub fn param_types(&self) -> &[Oid] {
        &self.param_types
    }

    /// Release the backing storage. Calling it again does nothing.
    pub fn clear(&mut self) {
        if self.cleared {
            return;
        }
        self.cleared = true;
        self.fields = Vec::new();
        self.data = Vec::new();
        self.cells = Vec::new();
        self.rows = 0;
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared
    }
}
