//! ErrorResponse and NoticeResponse.

use crate::error::{Result, ServerError};
use crate::protocol::codec::Reader;

/// Field type codes shared by ErrorResponse and NoticeResponse.
pub mod field_type {
    pub const SEVERITY: u8 = b'S';
    pub const SEVERITY_NON_LOCALIZED: u8 = b'V';
    pub const CODE: u8 = b'C';
    pub const MESSAGE: u8 = b'M';
    pub const DETAIL: u8 = b'D';
    pub const HINT: u8 = b'H';
    pub const POSITION: u8 = b'P';
    pub const WHERE: u8 = b'W';
    pub const SCHEMA: u8 = b's';
    pub const TABLE: u8 = b't';
    pub const COLUMN: u8 = b'c';
    pub const DATA_TYPE: u8 = b'd';
    pub const CONSTRAINT: u8 = b'n';
}

/// Parse the field list of an ErrorResponse or NoticeResponse.
pub fn parse_error_fields(payload: &[u8]) -> Result<ServerError> {
    let mut fields = ServerError::default();
    let mut r = Reader::new(payload);

    loop {
        let code = r.u8()?;
        if code == 0 {
            break;
        }
        // Server text may be in a non-UTF-8 client encoding; keep it readable anyway.
        let value = String::from_utf8_lossy(r.cstring()?).into_owned();
        match code {
            field_type::SEVERITY => fields.severity = Some(value),
            field_type::SEVERITY_NON_LOCALIZED => fields.severity_non_localized = Some(value),
            field_type::CODE => fields.code = Some(value),
            field_type::MESSAGE => fields.message = Some(value),
            field_type::DETAIL => fields.detail = Some(value),
            field_type::HINT => fields.hint = Some(value),
            field_type::POSITION => fields.position = value.parse().ok(),
            field_type::WHERE => fields.where_ = Some(value),
            field_type::SCHEMA => fields.schema = Some(value),
            field_type::TABLE => fields.table = Some(value),
            field_type::COLUMN => fields.column = Some(value),
            field_type::DATA_TYPE => fields.data_type = Some(value),
            field_type::CONSTRAINT => fields.constraint = Some(value),
            _ => tracing::trace!(field = %(code as char), "ignored error field"),
        }
    }

    Ok(fields)
}

/// Parse a NoticeResponse and log it.
pub fn parse_notice(payload: &[u8]) -> Result<ServerError> {
    let notice = parse_error_fields(payload)?;
    tracing::debug!(
        severity = notice.severity().unwrap_or_default(),
        code = notice.code.as_deref().unwrap_or_default(),
        "server notice: {}",
        notice.message()
    );
    Ok(notice)
}
