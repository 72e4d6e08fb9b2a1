//! Startup and authentication state machine.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::backend::{
    Authentication, BackendKeyData, ParameterStatus, ReadyForQuery, msg_type, parse_error_fields,
    parse_notice,
};
use crate::protocol::frontend::auth::{ScramClient, md5_password};
use crate::protocol::frontend::{
    write_password, write_sasl_initial_response, write_sasl_response, write_startup,
};
use crate::protocol::types::TransactionStatus;

use super::action::Action;

const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingAuth,
    SaslInProgress,
    WaitingAuthResult,
    WaitingReady,
    Ready,
    Failed,
}

/// Drives the handshake from StartupMessage to the first ReadyForQuery.
pub struct ConnectionStateMachine {
    state: State,
    user: String,
    password: Option<String>,
    startup_params: Vec<(String, String)>,
    backend_pid: Option<u32>,
    server_params: Vec<(String, String)>,
    transaction_status: TransactionStatus,
    scram: Option<ScramClient>,
}

impl ConnectionStateMachine {
    pub fn new(opts: &Opts) -> Self {
        let mut startup_params = vec![
            ("user".to_string(), opts.user.clone()),
            ("client_encoding".to_string(), "UTF8".to_string()),
        ];
        if let Some(db) = &opts.database {
            startup_params.push(("database".to_string(), db.clone()));
        }
        if let Some(app) = &opts.application_name {
            startup_params.push(("application_name".to_string(), app.clone()));
        }
        startup_params.extend(opts.params.iter().cloned());

        Self {
            state: State::Initial,
            user: opts.user.clone(),
            password: opts.password.clone(),
            startup_params,
            backend_pid: None,
            server_params: Vec::new(),
            transaction_status: TransactionStatus::Idle,
            scram: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == State::Ready
    }

    pub fn backend_pid(&self) -> Option<u32> {
        self.backend_pid
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Server parameters reported during startup.
    pub fn take_server_params(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.server_params)
    }

    /// Queue the StartupMessage.
    pub fn start(&mut self, buffer_set: &mut BufferSet) -> Action {
        buffer_set.write_buffer.clear();
        let params: Vec<(&str, &str)> = self
            .startup_params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        write_startup(&mut buffer_set.write_buffer, &params);
        self.state = State::WaitingAuth;
        Action::WriteAndReadMessage
    }

    /// Process the message in `buffer_set`.
    pub fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let result = self.dispatch(buffer_set);
        if result.is_err() {
            self.state = State::Failed;
        }
        result
    }

    fn dispatch(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let type_byte = buffer_set.type_byte;
        match type_byte {
            msg_type::ERROR_RESPONSE => {
                let error = parse_error_fields(&buffer_set.read_buffer)?;
                return Err(Error::Connection(error.to_string()));
            }
            msg_type::NOTICE_RESPONSE => {
                parse_notice(&buffer_set.read_buffer)?;
                return Ok(Action::ReadMessage);
            }
            msg_type::PARAMETER_STATUS => {
                let param = ParameterStatus::parse(&buffer_set.read_buffer)?;
                self.server_params
                    .push((param.name.to_string(), param.value.to_string()));
                return Ok(Action::ReadMessage);
            }
            _ => {}
        }

        match self.state {
            State::WaitingAuth => self.handle_auth_request(buffer_set),
            State::SaslInProgress => self.handle_sasl(buffer_set),
            State::WaitingAuthResult => self.handle_auth_result(buffer_set),
            State::WaitingReady => self.handle_ready(buffer_set),
            State::Initial | State::Ready | State::Failed => Err(Error::Protocol(format!(
                "Unexpected message '{}' in startup state {:?}",
                type_byte as char, self.state
            ))),
        }
    }

    fn expect_auth(type_byte: u8, payload: &[u8]) -> Result<Authentication<'_>> {
        if type_byte != msg_type::AUTHENTICATION {
            return Err(Error::Protocol(format!(
                "Expected Authentication message, got '{}'",
                type_byte as char
            )));
        }
        Authentication::parse(payload)
    }

    fn password(&self) -> Result<&str> {
        self.password
            .as_deref()
            .ok_or_else(|| Error::Connection("password required but not provided".into()))
    }

    fn handle_auth_request(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let mut out = std::mem::take(&mut buffer_set.write_buffer);
        out.clear();

        let action = match Self::expect_auth(buffer_set.type_byte, &buffer_set.read_buffer)? {
            Authentication::Ok => {
                self.state = State::WaitingReady;
                Action::ReadMessage
            }
            Authentication::CleartextPassword => {
                tracing::debug!("cleartext password requested");
                write_password(&mut out, self.password()?);
                self.state = State::WaitingAuthResult;
                Action::WriteAndReadMessage
            }
            Authentication::Md5Password { salt } => {
                tracing::debug!("md5 password requested");
                let hashed = md5_password(&self.user, self.password()?, &salt);
                write_password(&mut out, &hashed);
                self.state = State::WaitingAuthResult;
                Action::WriteAndReadMessage
            }
            Authentication::Sasl { mechanisms } => {
                if !mechanisms.contains(&SCRAM_SHA_256) {
                    return Err(Error::Unsupported(format!(
                        "no supported SASL mechanism, server offers {:?}",
                        mechanisms
                    )));
                }
                tracing::debug!("SCRAM-SHA-256 requested");
                let scram = ScramClient::new(self.password()?);
                write_sasl_initial_response(
                    &mut out,
                    SCRAM_SHA_256,
                    scram.client_first_message().as_bytes(),
                );
                self.scram = Some(scram);
                self.state = State::SaslInProgress;
                Action::WriteAndReadMessage
            }
            other => {
                return Err(Error::Unsupported(format!(
                    "authentication method {:?}",
                    other
                )));
            }
        };

        buffer_set.write_buffer = out;
        Ok(action)
    }

    fn handle_sasl(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let auth = Self::expect_auth(buffer_set.type_byte, &buffer_set.read_buffer)?;
        let scram = self
            .scram
            .as_mut()
            .ok_or_else(|| Error::Protocol("SCRAM exchange not started".into()))?;
        let invalid = |e: simdutf8::basic::Utf8Error| {
            Error::Connection(format!("SCRAM: server message is not UTF-8: {}", e))
        };

        match auth {
            Authentication::SaslContinue { data } => {
                let server_first = simdutf8::basic::from_utf8(data).map_err(invalid)?;
                let client_final = scram.process_server_first(server_first)?;
                buffer_set.write_buffer.clear();
                write_sasl_response(&mut buffer_set.write_buffer, client_final.as_bytes());
                Ok(Action::WriteAndReadMessage)
            }
            Authentication::SaslFinal { data } => {
                let server_final = simdutf8::basic::from_utf8(data).map_err(invalid)?;
                scram.verify_server_final(server_final)?;
                self.state = State::WaitingAuthResult;
                Ok(Action::ReadMessage)
            }
            other => Err(Error::Protocol(format!("Unexpected SASL message {:?}", other))),
        }
    }

    fn handle_auth_result(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match Self::expect_auth(buffer_set.type_byte, &buffer_set.read_buffer)? {
            Authentication::Ok => {
                self.state = State::WaitingReady;
                Ok(Action::ReadMessage)
            }
            other => Err(Error::Connection(format!(
                "unexpected authentication result {:?}",
                other
            ))),
        }
    }

    fn handle_ready(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let payload = &buffer_set.read_buffer;
        match buffer_set.type_byte {
            msg_type::BACKEND_KEY_DATA => {
                self.backend_pid = Some(BackendKeyData::parse(payload)?.process_id());
                Ok(Action::ReadMessage)
            }
            msg_type::NEGOTIATE_PROTOCOL_VERSION => {
                tracing::warn!("server negotiated protocol version down");
                Ok(Action::ReadMessage)
            }
            msg_type::READY_FOR_QUERY => {
                self.transaction_status = ReadyForQuery::parse(payload)?.status;
                self.state = State::Ready;
                Ok(Action::Finished)
            }
            other => Err(Error::Protocol(format!(
                "Unexpected message during startup: '{}'",
                other as char
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(
        machine: &mut ConnectionStateMachine,
        bs: &mut BufferSet,
        type_byte: u8,
        payload: &[u8],
    ) -> Result<Action> {
        bs.type_byte = type_byte;
        bs.read_buffer.clear();
        bs.read_buffer.extend_from_slice(payload);
        machine.step(bs)
    }

    fn opts() -> Opts {
        Opts {
            user: "alice".into(),
            password: Some("secret".into()),
            database: Some("app".into()),
            ..Opts::default()
        }
    }

    #[test]
    fn trust_handshake() {
        let mut machine = ConnectionStateMachine::new(&opts());
        let mut bs = BufferSet::new();
        assert!(matches!(machine.start(&mut bs), Action::WriteAndReadMessage));
        assert!(bs.write_buffer.windows(6).any(|w| w == b"alice\0"));

        let steps: [(u8, &[u8]); 3] = [
            (b'R', &[0, 0, 0, 0]),
            (b'S', b"server_version\x0016.2\0"),
            (b'K', &[0, 0, 0, 9, 0, 0, 0, 1]),
        ];
        for (type_byte, payload) in steps {
            let action = feed(&mut machine, &mut bs, type_byte, payload).unwrap();
            assert!(matches!(action, Action::ReadMessage));
        }
        let action = feed(&mut machine, &mut bs, b'Z', b"I").unwrap();
        assert!(matches!(action, Action::Finished));

        assert!(machine.is_ready());
        assert_eq!(machine.backend_pid(), Some(9));
        assert_eq!(
            machine.take_server_params(),
            vec![("server_version".to_string(), "16.2".to_string())]
        );
    }

    #[test]
    fn md5_password_is_sent() {
        let mut machine = ConnectionStateMachine::new(&opts());
        let mut bs = BufferSet::new();
        machine.start(&mut bs);
        let action = feed(&mut machine, &mut bs, b'R', &[0, 0, 0, 5, 1, 2, 3, 4]).unwrap();
        assert!(matches!(action, Action::WriteAndReadMessage));
        assert_eq!(bs.write_buffer[0], b'p');
        assert_eq!(&bs.write_buffer[5..8], b"md5");
    }

    #[test]
    fn server_error_is_connection_error() {
        let mut machine = ConnectionStateMachine::new(&opts());
        let mut bs = BufferSet::new();
        machine.start(&mut bs);
        let err = feed(
            &mut machine,
            &mut bs,
            b'E',
            b"SFATAL\0C28P01\0Mpassword authentication failed for user \"alice\"\0\0",
        )
        .unwrap_err();
        match err {
            Error::Connection(text) => assert!(text.contains("password authentication failed")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!machine.is_ready());
    }

    #[test]
    fn missing_password() {
        let mut machine = ConnectionStateMachine::new(&Opts::default());
        let mut bs = BufferSet::new();
        machine.start(&mut bs);
        let err = feed(&mut machine, &mut bs, b'R', &[0, 0, 0, 3]).unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn kerberos_unsupported() {
        let mut machine = ConnectionStateMachine::new(&opts());
        let mut bs = BufferSet::new();
        machine.start(&mut bs);
        let err = feed(&mut machine, &mut bs, b'R', &[0, 0, 0, 2]).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
