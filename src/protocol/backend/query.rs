//! Query response messages.

use zerocopy::byteorder::big_endian::{I16, I32, U16, U32};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::Reader;
use crate::protocol::types::{FormatCode, Oid};

/// Fixed 18-byte part following each field name in RowDescription.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct FieldTail {
    pub table_oid: U32,
    pub column_id: I16,
    pub type_oid: U32,
    /// -1 variable length, -2 null-terminated
    pub type_size: I16,
    pub type_modifier: I32,
    pub format: U16,
}

/// One column of a RowDescription.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescription<'a> {
    pub name: &'a str,
    pub tail: &'a FieldTail,
}

impl FieldDescription<'_> {
    pub fn type_oid(&self) -> Oid {
        self.tail.type_oid.get()
    }

    pub fn format(&self) -> FormatCode {
        FormatCode::from_u16(self.tail.format.get())
    }
}

/// RowDescription: column layout of the rows that follow.
#[derive(Debug)]
pub struct RowDescription<'a> {
    fields: Vec<FieldDescription<'a>>,
}

impl<'a> RowDescription<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let count = r.u16()? as usize;
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let name = r.cstr()?;
            let tail = r.header::<FieldTail>()?;
            fields.push(FieldDescription { name, tail });
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldDescription<'a>] {
        &self.fields
    }
}

/// DataRow: one row of column values.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    num_columns: u16,
    columns: &'a [u8],
}

impl<'a> DataRow<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let num_columns = r.u16()?;
        Ok(Self {
            num_columns,
            columns: r.rest(),
        })
    }

    pub fn len(&self) -> usize {
        self.num_columns as usize
    }

    pub fn is_empty(&self) -> bool {
        self.num_columns == 0
    }

    /// Visit every value in column order; `None` is NULL.
    pub fn for_each_value(&self, mut f: impl FnMut(Option<&'a [u8]>)) -> Result<()> {
        let mut r = Reader::new(self.columns);
        for _ in 0..self.num_columns {
            f(r.nullable_bytes()?);
        }
        if !r.is_empty() {
            return Err(Error::Protocol(format!(
                "DataRow: {} trailing bytes",
                r.rest().len()
            )));
        }
        Ok(())
    }
}

/// CommandComplete: the command tag, e.g. `SELECT 5`, `INSERT 0 1`, `COPY 3`.
#[derive(Debug, Clone, Copy)]
pub struct CommandComplete<'a> {
    pub tag: &'a str,
}

impl<'a> CommandComplete<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        Ok(Self {
            tag: Reader::new(payload).cstr()?,
        })
    }

    /// Row count carried by the tag, if the command reports one.
    pub fn rows_affected(&self) -> Option<u64> {
        rows_from_tag(self.tag)
    }
}

pub(crate) fn rows_from_tag(tag: &str) -> Option<u64> {
    let mut words = tag.split_whitespace();
    let count = match (words.next()?, words.next(), words.next()) {
        ("INSERT", Some(_oid), Some(count)) => count,
        ("SELECT" | "UPDATE" | "DELETE" | "MERGE" | "COPY" | "MOVE" | "FETCH", Some(count), None) => {
            count
        }
        _ => return None,
    };
    count.parse().ok()
}

/// ParameterDescription: parameter types the server resolved for a statement.
#[derive(Debug, Clone)]
pub struct ParameterDescription {
    pub oids: Vec<Oid>,
}

impl ParameterDescription {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let count = r.u16()? as usize;
        let oids = (0..count).map(|_| r.u32()).collect::<Result<_>>()?;
        Ok(Self { oids })
    }
}
