//! Scripted server output and client-message decoding for unit tests.

use crate::protocol::backend::msg_type;
use crate::protocol::codec::{MessageBuilder, Reader};
use crate::protocol::types::Oid;

/// Builder for the bytes a server would send.
#[derive(Default)]
pub struct ServerScript {
    bytes: Vec<u8>,
}

impl ServerScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Append another script.
    pub fn chain(mut self, other: ServerScript) -> Self {
        self.bytes.extend(other.bytes);
        self
    }

    fn msg(mut self, type_byte: u8, write: impl FnOnce(&mut MessageBuilder<'_>)) -> Self {
        let mut msg = MessageBuilder::new(&mut self.bytes, type_byte);
        write(&mut msg);
        msg.finish();
        self
    }

    pub fn auth_ok(self) -> Self {
        self.msg(msg_type::AUTHENTICATION, |m| m.write_i32(0))
    }

    pub fn auth_cleartext(self) -> Self {
        self.msg(msg_type::AUTHENTICATION, |m| m.write_i32(3))
    }

    pub fn parameter_status(self, name: &str, value: &str) -> Self {
        self.msg(msg_type::PARAMETER_STATUS, |m| {
            m.write_cstr(name);
            m.write_cstr(value);
        })
    }

    pub fn backend_key(self, pid: u32) -> Self {
        self.msg(msg_type::BACKEND_KEY_DATA, |m| {
            m.write_u32(pid);
            m.write_u32(0xDEAD);
        })
    }

    pub fn ready(self, status: u8) -> Self {
        self.msg(msg_type::READY_FOR_QUERY, |m| m.write_u8(status))
    }

    /// Full trust-auth startup ending in an idle ReadyForQuery.
    pub fn startup(self) -> Self {
        self.auth_ok()
            .parameter_status("server_version", "16.2")
            .backend_key(4242)
            .ready(b'I')
    }

    pub fn row_description(self, fields: &[(&str, Oid)]) -> Self {
        self.msg(msg_type::ROW_DESCRIPTION, |m| {
            m.write_u16(fields.len() as u16);
            for (name, oid) in fields {
                m.write_cstr(name);
                m.write_u32(0);
                m.write_i16(0);
                m.write_u32(*oid);
                m.write_i16(-1);
                m.write_i32(-1);
                m.write_u16(0);
            }
        })
    }

    pub fn data_row(self, values: &[Option<&str>]) -> Self {
        self.msg(msg_type::DATA_ROW, |m| {
            m.write_u16(values.len() as u16);
            for value in values {
                match value {
                    Some(v) => {
                        m.write_i32(v.len() as i32);
                        m.write_bytes(v.as_bytes());
                    }
                    None => m.write_i32(-1),
                }
            }
        })
    }

    pub fn command_complete(self, tag: &str) -> Self {
        self.msg(msg_type::COMMAND_COMPLETE, |m| m.write_cstr(tag))
    }

    pub fn empty_query(self) -> Self {
        self.msg(msg_type::EMPTY_QUERY_RESPONSE, |_| {})
    }

    fn fields(self, type_byte: u8, severity: &str, code: &str, message: &str) -> Self {
        self.msg(type_byte, |m| {
            m.write_u8(b'S');
            m.write_cstr(severity);
            m.write_u8(b'V');
            m.write_cstr(severity);
            m.write_u8(b'C');
            m.write_cstr(code);
            m.write_u8(b'M');
            m.write_cstr(message);
            m.write_u8(0);
        })
    }

    pub fn error(self, code: &str, message: &str) -> Self {
        self.fields(msg_type::ERROR_RESPONSE, "ERROR", code, message)
    }

    pub fn fatal(self, code: &str, message: &str) -> Self {
        self.fields(msg_type::ERROR_RESPONSE, "FATAL", code, message)
    }

    pub fn notice(self, message: &str) -> Self {
        self.fields(msg_type::NOTICE_RESPONSE, "NOTICE", "00000", message)
    }

    pub fn parse_complete(self) -> Self {
        self.msg(msg_type::PARSE_COMPLETE, |_| {})
    }

    pub fn bind_complete(self) -> Self {
        self.msg(msg_type::BIND_COMPLETE, |_| {})
    }

    pub fn close_complete(self) -> Self {
        self.msg(msg_type::CLOSE_COMPLETE, |_| {})
    }

    pub fn no_data(self) -> Self {
        self.msg(msg_type::NO_DATA, |_| {})
    }

    pub fn parameter_description(self, oids: &[Oid]) -> Self {
        self.msg(msg_type::PARAMETER_DESCRIPTION, |m| {
            m.write_u16(oids.len() as u16);
            for oid in oids {
                m.write_u32(*oid);
            }
        })
    }

    pub fn copy_in(self, format: u8, columns: u16) -> Self {
        self.msg(msg_type::COPY_IN_RESPONSE, |m| {
            m.write_u8(format);
            m.write_u16(columns);
            for _ in 0..columns {
                m.write_u16(format as u16);
            }
        })
    }
}

/// One decoded client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    pub type_byte: u8,
    pub payload: Vec<u8>,
}

impl ClientMessage {
    /// First null-terminated string of the payload (query text, statement name ...).
    pub fn text(&self) -> String {
        let mut r = Reader::new(&self.payload);
        r.cstr().map(str::to_string).unwrap_or_default()
    }
}

/// Split client output into messages. A leading StartupMessage (no type
/// byte) is skipped when `has_startup` is set.
pub fn client_messages(mut bytes: &[u8], has_startup: bool) -> Vec<ClientMessage> {
    if has_startup {
        let len = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        bytes = &bytes[len..];
    }
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let len = i32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        out.push(ClientMessage {
            type_byte: bytes[0],
            payload: bytes[5..1 + len].to_vec(),
        });
        bytes = &bytes[1 + len..];
    }
    out
}

/// Type bytes of the client messages, as a string for compact assertions.
pub fn client_types(bytes: &[u8], has_startup: bool) -> String {
    client_messages(bytes, has_startup)
        .iter()
        .map(|m| m.type_byte as char)
        .collect()
}
