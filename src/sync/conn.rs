//! Synchronous PostgreSQL session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::params::Params;
use crate::protocol::backend::{
    CopyInResponse, ParameterStatus, msg_type, parse_error_fields, parse_notice,
};
use crate::protocol::frontend::{
    write_bind, write_close_statement, write_copy_fail, write_describe_portal,
    write_describe_statement, write_execute, write_parse, write_query, write_sync,
    write_terminate,
};
use crate::protocol::types::{Oid, TransactionStatus};
use crate::result::QueryResult;
use crate::state::{Action, ConnectionStateMachine, ResponseCollector};
use crate::statement::{PreparedStatement, StatementRegistry};

use super::pipeline::Pending;
use super::stream::Stream;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> u64 {
    NEXT_SESSION.fetch_add(1, Ordering::Relaxed)
}

fn not_connected() -> Error {
    Error::Connection("not connected".into())
}

/// Anything that goes wrong while establishing the session is a connection error.
fn connection_error(error: Error) -> Error {
    match error {
        Error::Connection(_) | Error::Unsupported(_) | Error::InvalidUsage(_) => error,
        other => Error::Connection(other.to_string()),
    }
}

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    /// No socket. The initial state after `disconnect`.
    Disconnected,
    /// `connect_start` returned; nothing has been sent yet.
    Starting,
    /// Socket connected, StartupMessage not yet sent.
    Made,
    /// Waiting for the server to finish authentication and startup.
    AwaitingResponse,
    /// Ready for commands.
    Ok,
    /// Unusable; reconnect.
    Bad,
}

/// What the connection is doing between calls.
pub(crate) enum Activity {
    Idle,
    /// Commands sent whose results have not been read yet
    Pipelined(VecDeque<Pending>),
    /// The server is in COPY FROM STDIN for the bulk session with this id
    Copying { session: u64 },
}

/// Synchronous PostgreSQL session.
///
/// One request is in flight at a time, except for pipelined sends. The
/// blocking methods refuse to run while pipelined results are pending or a
/// bulk load is copying.
pub struct Conn {
    opts: Opts,
    status: ConnStatus,
    stream: Option<Stream>,
    pub(super) buffer_set: BufferSet,
    handshake: Option<ConnectionStateMachine>,
    pub(super) activity: Activity,
    session_id: u64,
    server_params: Vec<(String, String)>,
    backend_pid: Option<u32>,
    transaction_status: TransactionStatus,
    pub(super) statements: StatementRegistry,
    last_error: Option<String>,
}

impl Conn {
    fn new(opts: Opts, status: ConnStatus) -> Self {
        Self {
            opts,
            status,
            stream: None,
            buffer_set: BufferSet::new(),
            handshake: None,
            activity: Activity::Idle,
            session_id: next_session_id(),
            server_params: Vec::new(),
            backend_pid: None,
            transaction_status: TransactionStatus::Idle,
            statements: StatementRegistry::default(),
            last_error: None,
        }
    }

    /// Connect and block until the session is ready.
    ///
    /// On success the search path has already been forced to
    /// `opts.search_path`. Any failure, including that last step, closes the
    /// socket and returns [`Error::Connection`].
    pub fn connect<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        let mut conn = Self::new(opts, ConnStatus::Starting);
        if let Err(e) = conn.connect_blocking() {
            let e = connection_error(e);
            tracing::warn!(error = %e, "connect failed");
            conn.stream = None;
            conn.status = ConnStatus::Bad;
            return Err(e);
        }
        Ok(conn)
    }

    fn connect_blocking(&mut self) -> Result<()> {
        let timeout = self.opts.connect_timeout;
        let mut stream = open_stream(&self.opts, timeout)?;
        stream.set_read_timeout(timeout)?;

        let mut machine = ConnectionStateMachine::new(&self.opts);
        let mut action = machine.start(&mut self.buffer_set);
        loop {
            match action {
                Action::WriteAndReadMessage => {
                    stream.write_all(&self.buffer_set.write_buffer)?;
                    stream.flush()?;
                    stream.read_message(&mut self.buffer_set)?;
                }
                Action::ReadMessage => stream.read_message(&mut self.buffer_set)?,
                Action::Finished => break,
                Action::CopyIn(_) => {
                    return Err(Error::Protocol("COPY requested during startup".into()));
                }
            }
            action = machine.step(&mut self.buffer_set)?;
        }

        stream.set_read_timeout(None)?;
        self.stream = Some(stream);
        self.adopt(&mut machine);
        self.harden()
    }

    /// Start a non-blocking connect. No I/O happens until [`poll`](Self::poll).
    pub fn connect_start<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        tracing::debug!(host = %opts.host, port = opts.port, "connect started");
        Ok(Self::new(opts, ConnStatus::Starting))
    }

    /// Advance a non-blocking connect until it is ready, fails, or `timeout` elapses.
    ///
    /// Each round does every step possible without waiting, then sleeps
    /// `opts.poll_interval` (clamped to the time left) if nothing moved.
    /// A timeout leaves the handshake where it was; poll again to resume.
    /// A timeout too large to represent (`Duration::MAX`) never expires.
    pub fn poll(&mut self, timeout: Duration) -> Result<ConnStatus> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            match self.status {
                ConnStatus::Ok => return Ok(ConnStatus::Ok),
                ConnStatus::Bad => return Err(self.bad_connection()),
                ConnStatus::Disconnected => return Err(not_connected()),
                ConnStatus::Starting | ConnStatus::Made | ConnStatus::AwaitingResponse => {}
            }

            let progressed = match self.poll_step(deadline) {
                Ok(progressed) => progressed,
                Err(e) => {
                    let e = connection_error(e);
                    tracing::warn!(error = %e, "connect failed");
                    self.stream = None;
                    self.handshake = None;
                    self.status = ConnStatus::Bad;
                    self.last_error = Some(e.to_string());
                    return Err(e);
                }
            };
            if self.status == ConnStatus::Ok {
                continue;
            }

            let mut pause = self.opts.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::Timeout(timeout));
                }
                pause = pause.min(deadline - now);
            }
            if !progressed {
                std::thread::sleep(pause);
            }
        }
    }

    /// One non-blocking round. Returns whether anything happened.
    fn poll_step(&mut self, deadline: Option<Instant>) -> Result<bool> {
        match self.status {
            ConnStatus::Starting => {
                let remaining =
                    deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
                if remaining.is_some_and(|remaining| remaining.is_zero()) {
                    return Ok(false);
                }
                let budget = match (self.opts.connect_timeout, remaining) {
                    (Some(limit), Some(remaining)) => Some(limit.min(remaining)),
                    (limit, remaining) => limit.or(remaining),
                };
                self.stream = Some(open_stream(&self.opts, budget)?);
                self.status = ConnStatus::Made;
                Ok(true)
            }
            ConnStatus::Made => {
                let mut machine = ConnectionStateMachine::new(&self.opts);
                machine.start(&mut self.buffer_set);
                self.send()?;
                self.handshake = Some(machine);
                self.status = ConnStatus::AwaitingResponse;
                Ok(true)
            }
            ConnStatus::AwaitingResponse => self.poll_handshake(),
            ConnStatus::Disconnected | ConnStatus::Ok | ConnStatus::Bad => Ok(false),
        }
    }

    fn poll_handshake(&mut self) -> Result<bool> {
        let mut progressed = false;
        loop {
            let stream = self.stream.as_mut().ok_or_else(not_connected)?;
            if !stream.try_read_message(&mut self.buffer_set)? {
                return Ok(progressed);
            }
            progressed = true;

            let machine = self
                .handshake
                .as_mut()
                .ok_or_else(|| Error::Protocol("handshake not started".into()))?;
            match machine.step(&mut self.buffer_set)? {
                Action::ReadMessage => {}
                Action::WriteAndReadMessage => {
                    stream.write_all(&self.buffer_set.write_buffer)?;
                    stream.flush()?;
                }
                Action::Finished => {
                    if let Some(mut machine) = self.handshake.take() {
                        self.adopt(&mut machine);
                    }
                    self.harden()?;
                    return Ok(true);
                }
                Action::CopyIn(_) => {
                    return Err(Error::Protocol("COPY requested during startup".into()));
                }
            }
        }
    }

    /// Take over what the handshake learned.
    fn adopt(&mut self, machine: &mut ConnectionStateMachine) {
        self.backend_pid = machine.backend_pid();
        self.transaction_status = machine.transaction_status();
        self.server_params = machine.take_server_params();
        self.status = ConnStatus::Ok;
        tracing::debug!(pid = self.backend_pid, "session established");
    }

    /// Force a known search path.
    fn harden(&mut self) -> Result<()> {
        let Some(path) = self.opts.search_path.clone() else {
            return Ok(());
        };
        let sql = format!(
            "SELECT pg_catalog.set_config('search_path', '{}', false)",
            path.replace('\'', "''")
        );
        self.execute(&sql)
            .map_err(|e| Error::Connection(format!("could not set search_path: {}", e)))?;
        Ok(())
    }

    /// Close the session. Safe to call any number of times.
    ///
    /// Pending pipelined results, the prepared statement registry and every
    /// bulk session of this connection become invalid.
    pub fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            self.buffer_set.write_buffer.clear();
            write_terminate(&mut self.buffer_set.write_buffer);
            let sent = stream
                .write_all(&self.buffer_set.write_buffer)
                .and_then(|()| stream.flush());
            if let Err(e) = sent {
                tracing::debug!(error = %e, "terminate not delivered");
            }
        }
        self.handshake = None;
        self.activity = Activity::Idle;
        self.statements.clear();
        self.session_id = next_session_id();
        self.status = ConnStatus::Disconnected;
    }

    pub fn status(&self) -> ConnStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == ConnStatus::Ok
    }

    /// Status reported by the last ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_status.in_transaction()
    }

    /// Server parameters, kept current with ParameterStatus messages.
    pub fn server_params(&self) -> &[(String, String)] {
        &self.server_params
    }

    pub fn server_param(&self, name: &str) -> Option<&str> {
        self.server_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Backend process ID.
    pub fn backend_pid(&self) -> Option<u32> {
        self.backend_pid
    }

    /// Text of the most recent failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(super) fn session_id(&self) -> u64 {
        self.session_id
    }

    // === Statement execution ===

    /// Run one or more `;`-separated statements with the simple query protocol.
    ///
    /// Returns the result of the last statement; any server error fails the call.
    pub fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        let result = self.execute_inner(sql);
        self.record(result)
    }

    fn execute_inner(&mut self, sql: &str) -> Result<QueryResult> {
        self.ensure_idle()?;
        self.buffer_set.write_buffer.clear();
        write_query(&mut self.buffer_set.write_buffer, sql);
        self.send()?;
        self.collect(false)
    }

    /// Run one parameterized statement through the unnamed statement.
    pub fn execute_params<P: Into<Params>>(&mut self, sql: &str, params: P) -> Result<QueryResult> {
        let params = params.into();
        let result = self.execute_params_inner(sql, &params);
        self.record(result)
    }

    fn execute_params_inner(&mut self, sql: &str, params: &Params) -> Result<QueryResult> {
        self.ensure_idle()?;
        self.buffer_set.write_buffer.clear();
        write_unnamed_exec(&mut self.buffer_set.write_buffer, sql, params)?;
        self.send()?;
        self.collect(true)
    }

    // === Prepared statements ===

    /// Prepare `sql` under `name`, replacing any statement of that name.
    ///
    /// `type_hints` is empty or has one OID per parameter (`0` lets the server
    /// infer). If the server counts a different number of parameters than
    /// `arity`, the statement is closed again and [`Error::ParamCount`] is
    /// returned.
    pub fn prepare(
        &mut self,
        name: &str,
        sql: &str,
        arity: usize,
        type_hints: &[Oid],
    ) -> Result<&PreparedStatement> {
        let result = self.prepare_inner(name, sql, arity, type_hints);
        let statement = self.record(result)?;
        Ok(self.statements.insert(statement))
    }

    fn prepare_inner(
        &mut self,
        name: &str,
        sql: &str,
        arity: usize,
        type_hints: &[Oid],
    ) -> Result<PreparedStatement> {
        let mut statement = PreparedStatement::new(name, sql, arity, type_hints)?;
        self.ensure_idle()?;
        self.statements.remove(name);

        self.buffer_set.write_buffer.clear();
        write_prepare(&mut self.buffer_set.write_buffer, &statement)?;
        self.send()?;
        let described = self.collect(true)?;

        if let Err(e) = statement.resolve(described.param_types()) {
            tracing::debug!(statement = name, "parameter count mismatch, closing");
            self.close_statement(name)?;
            return Err(e);
        }
        Ok(statement)
    }

    /// Execute a prepared statement.
    ///
    /// Unknown names and wrong parameter counts are rejected before anything is sent.
    pub fn exec_prepared<P: Into<Params>>(&mut self, name: &str, params: P) -> Result<QueryResult> {
        let params = params.into();
        let result = self.exec_prepared_inner(name, &params);
        self.record(result)
    }

    fn exec_prepared_inner(&mut self, name: &str, params: &Params) -> Result<QueryResult> {
        self.statements.require(name)?.check_arity(params.len())?;
        self.ensure_idle()?;
        self.buffer_set.write_buffer.clear();
        write_named_exec(&mut self.buffer_set.write_buffer, name, params)?;
        self.send()?;
        self.collect(true)
    }

    /// Close a prepared statement on the server and forget it.
    pub fn deallocate(&mut self, name: &str) -> Result<()> {
        let result = self.deallocate_inner(name);
        self.record(result)
    }

    fn deallocate_inner(&mut self, name: &str) -> Result<()> {
        self.statements.require(name)?;
        self.ensure_idle()?;
        self.close_statement(name)?;
        self.statements.remove(name);
        Ok(())
    }

    fn close_statement(&mut self, name: &str) -> Result<()> {
        self.buffer_set.write_buffer.clear();
        write_close_statement(&mut self.buffer_set.write_buffer, name);
        write_sync(&mut self.buffer_set.write_buffer);
        self.send()?;
        self.collect(true)?;
        Ok(())
    }

    /// Look up a prepared statement.
    pub fn prepared(&self, name: &str) -> Option<&PreparedStatement> {
        self.statements.get(name)
    }

    // === Request plumbing shared with the pipeline and bulk sessions ===

    pub(super) fn ensure_ready(&self) -> Result<()> {
        match self.status {
            ConnStatus::Ok => Ok(()),
            ConnStatus::Bad => Err(self.bad_connection()),
            other => Err(Error::Connection(format!(
                "connection is not ready ({:?})",
                other
            ))),
        }
    }

    /// Only one blocking request may be in flight.
    pub(super) fn ensure_idle(&self) -> Result<()> {
        self.ensure_ready()?;
        match &self.activity {
            Activity::Idle => Ok(()),
            Activity::Pipelined(queue) => Err(Error::Protocol(format!(
                "{} pipelined results pending; drain them with get_result",
                queue.len()
            ))),
            Activity::Copying { .. } => Err(Error::Protocol(
                "a COPY is in progress; finish or abort the bulk session first".into(),
            )),
        }
    }

    fn bad_connection(&self) -> Error {
        Error::Connection(format!(
            "connection is bad: {}",
            self.last_error.as_deref().unwrap_or("unknown error")
        ))
    }

    /// Remember the failure; broken connections turn Bad and leave COPY mode.
    pub(super) fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
            if e.is_connection_broken() {
                self.status = ConnStatus::Bad;
            }
            if self.status == ConnStatus::Bad {
                tracing::warn!(error = %e, "connection is bad");
                self.leave_copy_activity();
            }
        }
        result
    }

    /// Pipelined commands stay queued so each one still gets an error from `get_result`.
    pub(super) fn mark_bad(&mut self) {
        self.status = ConnStatus::Bad;
        self.leave_copy_activity();
    }

    fn leave_copy_activity(&mut self) {
        if let Activity::Copying { .. } = self.activity {
            self.activity = Activity::Idle;
        }
    }

    /// Write and flush the write buffer.
    pub(super) fn send(&mut self) -> Result<()> {
        let bytes = std::mem::take(&mut self.buffer_set.write_buffer);
        let sent = self.send_bytes(&bytes);
        self.buffer_set.write_buffer = bytes;
        sent
    }

    pub(super) fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        let sent = stream.write_all(bytes).and_then(|()| stream.flush());
        if sent.is_err() {
            self.status = ConnStatus::Bad;
        }
        sent
    }

    /// Read one message. ParameterStatus updates are applied here.
    fn recv(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.read_message(&mut self.buffer_set)?;
        if self.buffer_set.type_byte == msg_type::PARAMETER_STATUS {
            let param = ParameterStatus::parse(&self.buffer_set.read_buffer)?;
            tracing::trace!(name = param.name, value = param.value, "parameter status");
            match self.server_params.iter_mut().find(|(k, _)| k == param.name) {
                Some((_, value)) => *value = param.value.to_string(),
                None => self
                    .server_params
                    .push((param.name.to_string(), param.value.to_string())),
            }
        }
        Ok(())
    }

    /// Feed the next message to `collector`. A read or framing failure
    /// desynchronizes the stream, so the connection turns Bad.
    fn step_collector(&mut self, collector: &mut ResponseCollector) -> Result<Action> {
        let action = self
            .recv()
            .and_then(|()| collector.step(self.buffer_set.message()));
        if action.is_err() {
            self.status = ConnStatus::Bad;
        }
        action
    }

    fn finish_cycle(&mut self, collector: ResponseCollector) -> Result<QueryResult> {
        if collector.is_fatal() {
            self.status = ConnStatus::Bad;
        }
        if let Some(status) = collector.transaction_status() {
            self.transaction_status = status;
        }
        collector.into_result()
    }

    /// Read one request cycle up to ReadyForQuery.
    ///
    /// A COPY FROM STDIN reached this way is refused with CopyFail; the call
    /// then fails with [`Error::Protocol`]. `extended` says whether the
    /// request went through the extended protocol, which needs a Sync to
    /// leave the failed copy.
    pub(super) fn collect(&mut self, extended: bool) -> Result<QueryResult> {
        let mut collector = ResponseCollector::new();
        let mut refused = false;
        loop {
            match self.step_collector(&mut collector)? {
                Action::ReadMessage | Action::WriteAndReadMessage => {}
                Action::CopyIn(_) => {
                    let behind = self.queued_behind();
                    if behind > 0 {
                        // The server read the queued requests as COPY data
                        tracing::error!(behind, "COPY FROM STDIN reached inside a pipeline");
                        self.status = ConnStatus::Bad;
                        return Err(Error::Protocol(format!(
                            "COPY FROM STDIN inside a pipeline swallowed the {} requests sent after it",
                            behind
                        )));
                    }
                    tracing::warn!("refusing COPY FROM STDIN outside a bulk session");
                    self.buffer_set.write_buffer.clear();
                    write_copy_fail(
                        &mut self.buffer_set.write_buffer,
                        "COPY FROM STDIN is only accepted through a bulk session",
                    );
                    if extended {
                        write_sync(&mut self.buffer_set.write_buffer);
                    }
                    self.send()?;
                    refused = true;
                }
                Action::Finished => break,
            }
        }
        let result = self.finish_cycle(collector);
        if refused && self.status != ConnStatus::Bad {
            return Err(Error::Protocol(
                "COPY FROM STDIN must go through begin_bulk".into(),
            ));
        }
        result
    }

    /// Requests already on the wire behind the one being read.
    fn queued_behind(&self) -> usize {
        match &self.activity {
            Activity::Pipelined(queue) => queue.len(),
            Activity::Idle | Activity::Copying { .. } => 0,
        }
    }

    /// Read until the server enters COPY FROM STDIN.
    ///
    /// If the cycle ends instead, its error (or a protocol error) is returned.
    pub(super) fn await_copy_in(&mut self) -> Result<CopyInResponse> {
        let mut collector = ResponseCollector::new();
        loop {
            match self.step_collector(&mut collector)? {
                Action::CopyIn(response) => return Ok(response),
                Action::Finished => break,
                Action::ReadMessage | Action::WriteAndReadMessage => {}
            }
        }
        self.finish_cycle(collector)?;
        Err(Error::Protocol("server did not enter COPY IN mode".into()))
    }

    /// Check without blocking whether the server left copy-in mode.
    ///
    /// Notices and parameter updates are consumed. An ErrorResponse is
    /// consumed and returned as [`Error::Query`]; the ReadyForQuery that
    /// follows it is left for the caller to drain.
    pub(super) fn check_copy_state(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        if let Err(e) = stream.fill_nonblocking() {
            self.status = ConnStatus::Bad;
            return Err(e);
        }
        while let Some(type_byte) = self.stream.as_ref().and_then(Stream::peek_type) {
            if !matches!(
                type_byte,
                msg_type::NOTICE_RESPONSE | msg_type::PARAMETER_STATUS | msg_type::ERROR_RESPONSE
            ) {
                break;
            }
            self.recv()?;
            let payload = &self.buffer_set.read_buffer;
            match type_byte {
                msg_type::ERROR_RESPONSE => {
                    let error = parse_error_fields(payload)?;
                    tracing::debug!(
                        code = error.code.as_deref().unwrap_or_default(),
                        "server aborted COPY: {}",
                        error.message()
                    );
                    return Err(Error::Query(error));
                }
                msg_type::NOTICE_RESPONSE => {
                    parse_notice(payload)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub(super) fn begin_copy(&mut self, session: u64) {
        self.activity = Activity::Copying { session };
    }

    pub(super) fn end_copy(&mut self) {
        if matches!(self.activity, Activity::Copying { .. }) {
            self.activity = Activity::Idle;
        }
    }

    pub(super) fn is_copying(&self, session: u64) -> bool {
        matches!(self.activity, Activity::Copying { session: s } if s == session)
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn open_stream(opts: &Opts, timeout: Option<Duration>) -> Result<Stream> {
    let opened = match opts.socket_path() {
        Some(path) => Stream::unix(&path),
        None => {
            if opts.host.is_empty() {
                return Err(Error::InvalidUsage("host is empty".into()));
            }
            Stream::tcp(&opts.host, opts.port, timeout)
        }
    };
    opened.map_err(|e| {
        Error::Connection(format!(
            "could not connect to {}:{}: {}",
            opts.host, opts.port, e
        ))
    })
}

/// Close (forgetting any old plan) + Parse + Describe statement + Sync.
pub(super) fn write_prepare(buf: &mut Vec<u8>, statement: &PreparedStatement) -> Result<()> {
    write_close_statement(buf, &statement.name);
    write_parse(buf, &statement.name, &statement.sql, &statement.type_hints)?;
    write_describe_statement(buf, &statement.name);
    write_sync(buf);
    Ok(())
}

/// Bind + Describe portal + Execute + Sync for a named statement.
pub(super) fn write_named_exec(buf: &mut Vec<u8>, name: &str, params: &Params) -> Result<()> {
    write_bind(buf, "", name, params)?;
    write_describe_portal(buf, "");
    write_execute(buf, "");
    write_sync(buf);
    Ok(())
}

/// Parse into the unnamed statement, then run it.
pub(super) fn write_unnamed_exec(buf: &mut Vec<u8>, sql: &str, params: &Params) -> Result<()> {
    write_parse(buf, "", sql, &params.type_oids())?;
    write_named_exec(buf, "", params)
}

#[cfg(test)]
impl Conn {
    /// Session over an already-open stream.
    pub(crate) fn with_stream(opts: Opts, stream: Stream, status: ConnStatus) -> Self {
        let mut conn = Self::new(opts, status);
        conn.stream = Some(stream);
        conn
    }

    pub(crate) fn written(&self) -> &[u8] {
        self.stream.as_ref().map_or(&[][..], Stream::written)
    }

    pub(crate) fn stream_mut(&mut self) -> &mut Stream {
        self.stream.as_mut().expect("stream")
    }
}
