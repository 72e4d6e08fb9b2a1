//! COPY FROM STDIN backend messages.

use crate::error::Result;
use crate::protocol::codec::Reader;
use crate::protocol::types::FormatCode;

/// CopyInResponse: the server is ready to receive COPY data.
#[derive(Debug, Clone)]
pub struct CopyInResponse {
    pub format: FormatCode,
    /// One entry per target column
    pub column_formats: Vec<FormatCode>,
}

impl CopyInResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let format = FormatCode::from_u16(r.u8()? as u16);
        let count = r.u16()? as usize;
        let column_formats = (0..count)
            .map(|_| r.u16().map(FormatCode::from_u16))
            .collect::<Result<_>>()?;
        Ok(Self {
            format,
            column_formats,
        })
    }

    pub fn num_columns(&self) -> usize {
        self.column_formats.len()
    }
}
