//! Pipelined queries: send without waiting, read results in send order.
//!
//! Every `send_*` call writes one complete request (ending in Sync for the
//! extended protocol) and flushes it. [`Conn::get_result`] then reads the
//! outcomes back strictly first-in first-out.
//!
//! # Example
//!
//! ```ignore
//! conn.send_prepare("ins", "INSERT INTO t VALUES ($1)", 1, &[])?;
//! conn.send_query_prepared("ins", [Param::text("1")])?;
//! conn.send_query("SELECT count(*) FROM t")?;
//!
//! while let Some(result) = conn.get_result().transpose() {
//!     match result {
//!         Ok(result) => println!("{:?}", result.command_tag()),
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```
//!
//! A failed command is consumed like any other; the ones sent after it are
//! still delivered. Once the connection breaks, every outstanding command
//! yields an error before `get_result` returns `Ok(None)`.
//!
//! A COPY FROM STDIN with commands queued behind it cannot be refused
//! cleanly: the server has already read them as copy data. The connection is
//! marked bad instead.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::params::Params;
use crate::protocol::frontend::{write_close_statement, write_query, write_sync};
use crate::protocol::types::Oid;
use crate::result::QueryResult;
use crate::statement::PreparedStatement;

use super::conn::{Activity, Conn, write_named_exec, write_prepare, write_unnamed_exec};

/// A request whose response has not been read yet.
pub(crate) enum Pending {
    /// Simple (`extended == false`) or extended query
    Query { extended: bool },
    /// Statement to register once the server has described it
    Prepare(PreparedStatement),
    /// Close for a statement whose parameter count was wrong; not reported
    Cleanup,
}

impl Conn {
    fn ensure_can_send(&self) -> Result<()> {
        self.ensure_ready()?;
        if let Activity::Copying { .. } = self.activity {
            return Err(Error::Protocol(
                "cannot pipeline while a COPY is in progress".into(),
            ));
        }
        Ok(())
    }

    fn enqueue(&mut self, pending: Pending) {
        if let Activity::Pipelined(queue) = &mut self.activity {
            queue.push_back(pending);
            return;
        }
        self.activity = Activity::Pipelined(VecDeque::from([pending]));
    }

    /// A statement still waiting in the queue to be prepared.
    fn queued_prepare(&self, name: &str) -> Option<&PreparedStatement> {
        let Activity::Pipelined(queue) = &self.activity else {
            return None;
        };
        queue.iter().rev().find_map(|pending| match pending {
            Pending::Prepare(statement) if statement.name == name => Some(statement),
            _ => None,
        })
    }

    /// Send a simple query without waiting for its result.
    pub fn send_query(&mut self, sql: &str) -> Result<()> {
        let result = self.send_query_inner(sql);
        self.record(result)
    }

    fn send_query_inner(&mut self, sql: &str) -> Result<()> {
        self.ensure_can_send()?;
        self.buffer_set.write_buffer.clear();
        write_query(&mut self.buffer_set.write_buffer, sql);
        self.send()?;
        self.enqueue(Pending::Query { extended: false });
        Ok(())
    }

    /// Send a parameterized statement without waiting for its result.
    pub fn send_query_params<P: Into<Params>>(&mut self, sql: &str, params: P) -> Result<()> {
        let params = params.into();
        let result = self.send_query_params_inner(sql, &params);
        self.record(result)
    }

    fn send_query_params_inner(&mut self, sql: &str, params: &Params) -> Result<()> {
        self.ensure_can_send()?;
        self.buffer_set.write_buffer.clear();
        write_unnamed_exec(&mut self.buffer_set.write_buffer, sql, params)?;
        self.send()?;
        self.enqueue(Pending::Query { extended: true });
        Ok(())
    }

    /// Send a prepare without waiting. The statement is registered when its
    /// result is read with [`get_result`](Self::get_result).
    pub fn send_prepare(
        &mut self,
        name: &str,
        sql: &str,
        arity: usize,
        type_hints: &[Oid],
    ) -> Result<()> {
        let result = self.send_prepare_inner(name, sql, arity, type_hints);
        self.record(result)
    }

    fn send_prepare_inner(
        &mut self,
        name: &str,
        sql: &str,
        arity: usize,
        type_hints: &[Oid],
    ) -> Result<()> {
        let statement = PreparedStatement::new(name, sql, arity, type_hints)?;
        self.ensure_can_send()?;
        self.buffer_set.write_buffer.clear();
        write_prepare(&mut self.buffer_set.write_buffer, &statement)?;
        self.send()?;
        self.statements.remove(name);
        self.enqueue(Pending::Prepare(statement));
        Ok(())
    }

    /// Send an execute of a prepared statement without waiting.
    ///
    /// The statement may still be queued by [`send_prepare`](Self::send_prepare).
    pub fn send_query_prepared<P: Into<Params>>(&mut self, name: &str, params: P) -> Result<()> {
        let params = params.into();
        let result = self.send_query_prepared_inner(name, &params);
        self.record(result)
    }

    fn send_query_prepared_inner(&mut self, name: &str, params: &Params) -> Result<()> {
        let statement = match self.queued_prepare(name) {
            Some(statement) => statement,
            None => self.statements.require(name)?,
        };
        statement.check_arity(params.len())?;
        self.ensure_can_send()?;
        self.buffer_set.write_buffer.clear();
        write_named_exec(&mut self.buffer_set.write_buffer, name, params)?;
        self.send()?;
        self.enqueue(Pending::Query { extended: true });
        Ok(())
    }

    /// Read the result of the oldest outstanding command.
    ///
    /// `Ok(None)` means nothing is outstanding. An `Err` consumes its command
    /// like a result does.
    pub fn get_result(&mut self) -> Result<Option<QueryResult>> {
        let result = self.get_result_inner();
        self.record(result)
    }

    fn get_result_inner(&mut self) -> Result<Option<QueryResult>> {
        self.drain_cleanup()?;
        let Activity::Pipelined(queue) = &mut self.activity else {
            return Ok(None);
        };
        let Some(pending) = queue.pop_front() else {
            self.activity = Activity::Idle;
            return Ok(None);
        };
        self.ensure_ready()?;

        let outcome = match pending {
            Pending::Query { extended } => self.collect(extended),
            Pending::Prepare(statement) => self.harvest_prepare(statement),
            Pending::Cleanup => self.collect(true),
        };
        if self.is_ready() {
            self.drain_cleanup()?;
        }
        outcome.map(Some)
    }

    fn harvest_prepare(&mut self, mut statement: PreparedStatement) -> Result<QueryResult> {
        let described = self.collect(true)?;
        if let Err(e) = statement.resolve(described.param_types()) {
            // A queued prepare of the same name closes the plan itself
            if self.queued_prepare(&statement.name).is_some() {
                tracing::debug!(statement = %statement.name, "parameter count mismatch, replaced later");
                return Err(e);
            }
            tracing::debug!(statement = %statement.name, "parameter count mismatch, closing");
            self.buffer_set.write_buffer.clear();
            write_close_statement(&mut self.buffer_set.write_buffer, &statement.name);
            write_sync(&mut self.buffer_set.write_buffer);
            self.send()?;
            self.enqueue(Pending::Cleanup);
            return Err(e);
        }
        self.statements.insert(statement);
        Ok(described)
    }

    /// Read the replies of leading cleanup closes; go idle once the queue is empty.
    fn drain_cleanup(&mut self) -> Result<()> {
        loop {
            let Activity::Pipelined(queue) = &mut self.activity else {
                return Ok(());
            };
            if queue.is_empty() {
                self.activity = Activity::Idle;
                return Ok(());
            }
            if !matches!(queue.front(), Some(Pending::Cleanup)) {
                return Ok(());
            }
            queue.pop_front();
            if !self.is_ready() {
                continue;
            }
            if let Err(e) = self.collect(true) {
                if !self.is_ready() {
                    return Err(e);
                }
                tracing::debug!(error = %e, "closing mismatched statement failed");
            }
        }
    }

    /// Commands sent whose results have not been read.
    pub fn pending_results(&self) -> usize {
        match &self.activity {
            Activity::Pipelined(queue) => queue
                .iter()
                .filter(|pending| !matches!(pending, Pending::Cleanup))
                .count(),
            Activity::Idle | Activity::Copying { .. } => 0,
        }
    }
}
