//! Collects the backend messages of one request cycle into a [`QueryResult`].
//!
//! A cycle ends with ReadyForQuery. The same collector serves simple queries,
//! extended-protocol executes, prepares and closes: it accepts every message
//! those can produce.

use crate::error::{Error, Result};
use crate::protocol::backend::{
    CommandComplete, CopyInResponse, DataRow, ParameterDescription, RawMessage, ReadyForQuery,
    RowDescription, msg_type, parse_error_fields, parse_notice,
};
use crate::protocol::types::TransactionStatus;
use crate::result::QueryResult;

use super::action::Action;

/// Sans-I/O collector for one request cycle.
pub struct ResponseCollector {
    result: QueryResult,
    error: Option<Error>,
    statement_done: bool,
    copy_out: bool,
    fatal: bool,
    transaction_status: Option<TransactionStatus>,
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self {
            result: QueryResult::new(),
            error: None,
            statement_done: false,
            copy_out: false,
            fatal: false,
            transaction_status: None,
        }
    }

    /// Status from the closing ReadyForQuery, once seen.
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.transaction_status
    }

    /// The server sent a FATAL or PANIC error and is closing the session.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Row data of an earlier statement in the same query string is dropped.
    fn statement_message(&mut self) {
        if self.statement_done {
            self.result.start_next_statement();
            self.statement_done = false;
        }
    }

    /// Feed one message.
    ///
    /// Returns [`Action::ReadMessage`] while the cycle continues,
    /// [`Action::CopyIn`] when the server waits for COPY data, and
    /// [`Action::Finished`] at ReadyForQuery (or after a fatal error).
    pub fn step(&mut self, msg: RawMessage<'_>) -> Result<Action> {
        let payload = msg.payload;
        match msg.type_byte {
            msg_type::ERROR_RESPONSE => {
                let error = parse_error_fields(payload)?;
                tracing::debug!(
                    code = error.code.as_deref().unwrap_or_default(),
                    "server error: {}",
                    error.message()
                );
                self.fatal = error.is_fatal();
                // Only the first error of a cycle is reported
                if self.error.is_none() {
                    self.error = Some(Error::Query(error));
                }
                if self.fatal {
                    return Ok(Action::Finished);
                }
            }
            msg_type::NOTICE_RESPONSE => {
                let notice = parse_notice(payload)?;
                self.result.add_notice(notice);
            }
            msg_type::PARAMETER_STATUS | msg_type::NOTIFICATION_RESPONSE => {}
            msg_type::PARSE_COMPLETE
            | msg_type::BIND_COMPLETE
            | msg_type::CLOSE_COMPLETE
            | msg_type::NO_DATA
            | msg_type::PORTAL_SUSPENDED => {}
            msg_type::PARAMETER_DESCRIPTION => {
                let desc = ParameterDescription::parse(payload)?;
                self.result.set_param_types(desc.oids);
            }
            msg_type::ROW_DESCRIPTION => {
                self.statement_message();
                self.result.describe(&RowDescription::parse(payload)?);
            }
            msg_type::DATA_ROW => {
                self.statement_message();
                self.result.push_row(&DataRow::parse(payload)?)?;
            }
            msg_type::COMMAND_COMPLETE => {
                self.statement_message();
                self.result.complete(CommandComplete::parse(payload)?.tag);
                self.statement_done = true;
            }
            msg_type::EMPTY_QUERY_RESPONSE => {
                self.statement_message();
                self.result.mark_empty_query();
                self.statement_done = true;
            }
            msg_type::COPY_IN_RESPONSE => {
                return Ok(Action::CopyIn(CopyInResponse::parse(payload)?));
            }
            msg_type::COPY_OUT_RESPONSE => {
                tracing::warn!("draining COPY TO STDOUT output");
                self.copy_out = true;
            }
            msg_type::COPY_DATA | msg_type::COPY_DONE if self.copy_out => {}
            msg_type::READY_FOR_QUERY => {
                self.transaction_status = Some(ReadyForQuery::parse(payload)?.status);
                return Ok(Action::Finished);
            }
            other => {
                return Err(Error::Protocol(format!(
                    "Unexpected message '{}' in query response",
                    other as char
                )));
            }
        }
        Ok(Action::ReadMessage)
    }

    /// Outcome of the finished cycle.
    pub fn into_result(self) -> Result<QueryResult> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.copy_out {
            return Err(Error::Unsupported(
                "COPY TO STDOUT is not supported; its output was discarded".into(),
            ));
        }
        Ok(self.result.finish())
    }
}

impl Default for ResponseCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ResultStatus;
    use crate::sync::script::ServerScript;

    fn run(script: ServerScript) -> (ResponseCollector, Vec<Action>) {
        let bytes = script.into_bytes();
        let mut collector = ResponseCollector::new();
        let mut actions = Vec::new();
        let mut rest = &bytes[..];
        while !rest.is_empty() {
            let len = i32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]) as usize;
            let msg = RawMessage::new(rest[0], &rest[5..1 + len]);
            actions.push(collector.step(msg).unwrap());
            rest = &rest[1 + len..];
        }
        (collector, actions)
    }

    #[test]
    fn select_rows() {
        let (collector, actions) = run(ServerScript::new()
            .row_description(&[("n", 23)])
            .data_row(&[Some("1")])
            .data_row(&[Some("2")])
            .command_complete("SELECT 2")
            .ready(b'I'));
        assert!(matches!(actions.last(), Some(Action::Finished)));
        assert_eq!(collector.transaction_status(), Some(TransactionStatus::Idle));
        let result = collector.into_result().unwrap();
        assert_eq!(result.status(), ResultStatus::OkWithData);
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.get_str(1, 0).unwrap(), Some("2"));
    }

    #[test]
    fn multi_statement_keeps_last() {
        let (collector, _) = run(ServerScript::new()
            .row_description(&[("a", 25)])
            .data_row(&[Some("x")])
            .command_complete("SELECT 1")
            .command_complete("INSERT 0 3")
            .ready(b'I'));
        let result = collector.into_result().unwrap();
        assert_eq!(result.status(), ResultStatus::OkNoData);
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.rows_affected(), Some(3));
    }

    #[test]
    fn notice_marks_warning() {
        let (collector, _) = run(ServerScript::new()
            .notice("table \"t\" does not exist, skipping")
            .command_complete("DROP TABLE")
            .ready(b'I'));
        let result = collector.into_result().unwrap();
        assert_eq!(result.status(), ResultStatus::OkWithWarning);
        assert_eq!(result.notices().len(), 1);
    }

    #[test]
    fn empty_query_is_warning() {
        let (collector, _) = run(ServerScript::new().empty_query().ready(b'I'));
        assert_eq!(
            collector.into_result().unwrap().status(),
            ResultStatus::OkWithWarning
        );
    }

    #[test]
    fn error_then_ready() {
        let (collector, actions) = run(ServerScript::new()
            .error("42601", "syntax error at or near \"selec\"")
            .ready(b'I'));
        assert!(matches!(actions[0], Action::ReadMessage));
        assert!(!collector.is_fatal());
        match collector.into_result() {
            Err(Error::Query(e)) => {
                assert_eq!(e.code.as_deref(), Some("42601"));
                assert_eq!(e.message(), "syntax error at or near \"selec\"");
            }
            other => panic!("unexpected {:?}", other.map(|r| r.status())),
        }
    }

    #[test]
    fn copy_in_is_reported() {
        let (_, actions) = run(ServerScript::new().copy_in(0, 2));
        match &actions[0] {
            Action::CopyIn(resp) => assert_eq!(resp.num_columns(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn prepare_cycle_collects_param_types() {
        let (collector, _) = run(ServerScript::new()
            .close_complete()
            .parse_complete()
            .parameter_description(&[23])
            .row_description(&[("int4", 23)])
            .ready(b'I'));
        let result = collector.into_result().unwrap();
        assert_eq!(result.param_types(), &[23]);
        assert_eq!(result.get_fields().unwrap(), vec!["int4"]);
    }
}
