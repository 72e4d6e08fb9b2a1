//! Simple and extended query messages.

use crate::error::{Error, Result};
use crate::params::Params;
use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::Oid;

/// Most parameters one statement can carry.
pub const MAX_PARAMS: usize = i16::MAX as usize;

fn param_count(len: usize) -> Result<i16> {
    i16::try_from(len).map_err(|_e| {
        Error::InvalidUsage(format!("{} parameters exceed the limit of {}", len, MAX_PARAMS))
    })
}

/// Write a Query message. The string may hold several `;`-separated statements.
pub fn write_query(buf: &mut Vec<u8>, query: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::QUERY);
    msg.write_cstr(query);
    msg.finish();
}

/// Write a Parse message. An empty `name` targets the unnamed statement;
/// an OID of `0` lets the server infer that parameter's type.
pub fn write_parse(buf: &mut Vec<u8>, name: &str, query: &str, param_oids: &[Oid]) -> Result<()> {
    let count = param_count(param_oids.len())?;
    let mut msg = MessageBuilder::new(buf, super::msg_type::PARSE);
    msg.write_cstr(name);
    msg.write_cstr(query);
    msg.write_i16(count);
    for &oid in param_oids {
        msg.write_u32(oid);
    }
    msg.finish();
    Ok(())
}

/// Write a Bind message with per-parameter formats and a single result format.
///
/// Too many parameters or a value over 2 GiB fail before anything is written.
pub fn write_bind(buf: &mut Vec<u8>, portal: &str, statement: &str, params: &Params) -> Result<()> {
    let count = param_count(params.len())?;
    let lengths = params
        .iter()
        .map(|param| match &param.value {
            Some(value) => i32::try_from(value.len()).map_err(|_e| {
                Error::InvalidUsage(format!("{}-byte parameter does not fit a message", value.len()))
            }),
            None => Ok(-1),
        })
        .collect::<Result<Vec<i32>>>()?;

    let mut msg = MessageBuilder::new(buf, super::msg_type::BIND);
    msg.write_cstr(portal);
    msg.write_cstr(statement);

    msg.write_i16(count);
    for param in params.iter() {
        msg.write_i16(param.format.as_i16());
    }

    msg.write_i16(count);
    for (param, len) in params.iter().zip(lengths) {
        msg.write_i32(len);
        if let Some(value) = &param.value {
            msg.write_bytes(value);
        }
    }

    // One entry applies to every result column
    msg.write_i16(1);
    msg.write_i16(params.get_result_format().as_i16());
    msg.finish();
    Ok(())
}

/// Write an Execute message fetching all rows.
pub fn write_execute(buf: &mut Vec<u8>, portal: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::EXECUTE);
    msg.write_cstr(portal);
    msg.write_i32(0);
    msg.finish();
}

fn write_targeted(buf: &mut Vec<u8>, type_byte: u8, target: u8, name: &str) {
    let mut msg = MessageBuilder::new(buf, type_byte);
    msg.write_u8(target);
    msg.write_cstr(name);
    msg.finish();
}

pub fn write_describe_statement(buf: &mut Vec<u8>, name: &str) {
    write_targeted(buf, super::msg_type::DESCRIBE, b'S', name);
}

pub fn write_describe_portal(buf: &mut Vec<u8>, name: &str) {
    write_targeted(buf, super::msg_type::DESCRIBE, b'P', name);
}

/// Write a Close message for a statement. Closing an unknown name is not an error.
pub fn write_close_statement(buf: &mut Vec<u8>, name: &str) {
    write_targeted(buf, super::msg_type::CLOSE, b'S', name);
}

/// Write a Sync message. The server answers with ReadyForQuery.
pub fn write_sync(buf: &mut Vec<u8>) {
    MessageBuilder::new(buf, super::msg_type::SYNC).finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Param;
    use crate::protocol::types::FormatCode;

    #[test]
    fn parse_layout() {
        let mut buf = Vec::new();
        write_parse(&mut buf, "s1", "select $1", &[23]).unwrap();
        assert_eq!(buf[0], b'P');
        assert_eq!(&buf[5..8], b"s1\0");
        assert_eq!(&buf[buf.len() - 6..], &[0, 1, 0, 0, 0, 23]);
    }

    #[test]
    fn bind_encodes_null_and_binary() {
        let mut buf = Vec::new();
        let params = Params::new()
            .with(Param::null())
            .with(Param::binary(17, vec![0, 0xFF]))
            .result_format(FormatCode::Binary);
        write_bind(&mut buf, "", "s1", &params).unwrap();

        let body = &buf[5..];
        assert_eq!(&body[..4], b"\0s1\0");
        let expected: &[u8] = &[
            0, 2, 0, 0, 0, 1, // formats
            0, 2, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 2, 0, 0xFF, // values
            0, 1, 0, 1, // result format
        ];
        assert_eq!(&body[4..], expected);
    }

    #[test]
    fn too_many_params_write_nothing() {
        let mut buf = Vec::new();
        let oids = vec![0; MAX_PARAMS + 1];
        assert!(matches!(
            write_parse(&mut buf, "", "select 1", &oids),
            Err(Error::InvalidUsage(_))
        ));
        let params: Params = (0..=MAX_PARAMS).map(|_| Param::null()).collect();
        assert!(matches!(
            write_bind(&mut buf, "", "", &params),
            Err(Error::InvalidUsage(_))
        ));
        assert!(buf.is_empty());

        let params: Params = (0..MAX_PARAMS).map(|_| Param::null()).collect();
        write_bind(&mut buf, "", "", &params).unwrap();
        assert_eq!(&buf[7..9], &i16::MAX.to_be_bytes());
    }

    #[test]
    fn sync_and_execute() {
        let mut buf = Vec::new();
        write_execute(&mut buf, "");
        write_sync(&mut buf);
        assert_eq!(buf, [b'E', 0, 0, 0, 9, 0, 0, 0, 0, 0, b'S', 0, 0, 0, 4]);
    }
}
