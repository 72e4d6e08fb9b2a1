//! Startup-phase backend messages.

use zerocopy::byteorder::big_endian::U32;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::Reader;
use crate::protocol::types::TransactionStatus;

/// Authentication request codes.
pub mod auth_type {
    pub const OK: i32 = 0;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const MD5_PASSWORD: i32 = 5;
    pub const SASL: i32 = 10;
    pub const SASL_CONTINUE: i32 = 11;
    pub const SASL_FINAL: i32 = 12;
}

/// Authentication request from the server.
#[derive(Debug)]
pub enum Authentication<'a> {
    Ok,
    CleartextPassword,
    Md5Password { salt: [u8; 4] },
    Sasl { mechanisms: Vec<&'a str> },
    SaslContinue { data: &'a [u8] },
    SaslFinal { data: &'a [u8] },
    /// Kerberos, GSS, SSPI and anything newer
    Other(i32),
}

impl<'a> Authentication<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let message = match r.i32()? {
            auth_type::OK => Authentication::Ok,
            auth_type::CLEARTEXT_PASSWORD => Authentication::CleartextPassword,
            auth_type::MD5_PASSWORD => {
                let salt = r
                    .bytes(4)?
                    .try_into()
                    .map_err(|_e| Error::Protocol("MD5Password: missing salt".into()))?;
                Authentication::Md5Password { salt }
            }
            auth_type::SASL => {
                let mut mechanisms = Vec::new();
                while r.rest().first().is_some_and(|&b| b != 0) {
                    mechanisms.push(r.cstr()?);
                }
                Authentication::Sasl { mechanisms }
            }
            auth_type::SASL_CONTINUE => Authentication::SaslContinue { data: r.rest() },
            auth_type::SASL_FINAL => Authentication::SaslFinal { data: r.rest() },
            other => Authentication::Other(other),
        };
        Ok(message)
    }
}

/// BackendKeyData: process id and cancellation secret.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct BackendKeyData {
    pid: U32,
    secret_key: U32,
}

impl BackendKeyData {
    pub fn parse(payload: &[u8]) -> Result<&Self> {
        Reader::new(payload).header()
    }

    pub fn process_id(&self) -> u32 {
        self.pid.get()
    }

    pub fn secret(&self) -> u32 {
        self.secret_key.get()
    }
}

/// ParameterStatus: one run-time parameter reported by the server.
#[derive(Debug, Clone)]
pub struct ParameterStatus<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> ParameterStatus<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        Ok(Self {
            name: r.cstr()?,
            value: r.cstr()?,
        })
    }
}

/// ReadyForQuery: the server finished a request cycle.
#[derive(Debug, Clone, Copy)]
pub struct ReadyForQuery {
    pub status: TransactionStatus,
}

impl ReadyForQuery {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let byte = Reader::new(payload).u8()?;
        let status = TransactionStatus::from_byte(byte).ok_or_else(|| {
            Error::Protocol(format!("ReadyForQuery: unknown transaction status {:?}", byte as char))
        })?;
        Ok(Self { status })
    }
}
