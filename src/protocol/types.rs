//! Common PostgreSQL wire protocol types.

/// PostgreSQL Object Identifier (OID)
pub type Oid = u32;

/// Well-known type OIDs from `pg_type`.
pub mod oid {
    use super::Oid;

    /// Unspecified: let the server infer the type
    pub const UNSPECIFIED: Oid = 0;
    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const CHAR: Oid = 18;
    pub const NAME: Oid = 19;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    pub const JSON: Oid = 114;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const BPCHAR: Oid = 1042;
    pub const VARCHAR: Oid = 1043;
    pub const DATE: Oid = 1082;
    pub const TIME: Oid = 1083;
    pub const TIMESTAMP: Oid = 1114;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const INTERVAL: Oid = 1186;
    pub const NUMERIC: Oid = 1700;
    pub const UUID: Oid = 2950;
    pub const JSONB: Oid = 3802;

    /// Look up a type OID by SQL name or alias (`"int"`, `"varchar"`, `"timestamptz"`, ...).
    pub fn from_name(name: &str) -> Option<Oid> {
        let oid = match name.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => BOOL,
            "bytea" => BYTEA,
            "char" => CHAR,
            "name" => NAME,
            "int8" | "bigint" => INT8,
            "int2" | "smallint" => INT2,
            "int" | "int4" | "integer" => INT4,
            "text" => TEXT,
            "oid" => OID,
            "json" => JSON,
            "float4" | "real" => FLOAT4,
            "float8" | "double precision" => FLOAT8,
            "bpchar" | "character" => BPCHAR,
            "varchar" | "character varying" => VARCHAR,
            "date" => DATE,
            "time" => TIME,
            "timestamp" => TIMESTAMP,
            "timestamptz" => TIMESTAMPTZ,
            "interval" => INTERVAL,
            "numeric" | "decimal" => NUMERIC,
            "uuid" => UUID,
            "jsonb" => JSONB,
            _ => return None,
        };
        Some(oid)
    }
}

/// Data format code in PostgreSQL protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum FormatCode {
    /// Text format (human-readable)
    #[default]
    Text = 0,
    /// Binary format (type-specific packed representation)
    Binary = 1,
}

impl FormatCode {
    /// Create a FormatCode from a raw u16 value. Unknown values read as text.
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => FormatCode::Binary,
            _ => FormatCode::Text,
        }
    }

    /// Wire value for Bind format lists.
    pub fn as_i16(self) -> i16 {
        self as u16 as i16
    }
}

/// Transaction status indicator from ReadyForQuery message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Idle (not in transaction block)
    #[default]
    Idle = b'I',
    /// In transaction block
    InTransaction = b'T',
    /// In failed transaction block (queries will be rejected until rollback)
    Failed = b'E',
}

impl TransactionStatus {
    /// Create a TransactionStatus from a raw byte value.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'I' => Some(TransactionStatus::Idle),
            b'T' => Some(TransactionStatus::InTransaction),
            b'E' => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// Returns true if currently in a transaction (either active or failed).
    pub fn in_transaction(self) -> bool {
        matches!(self, TransactionStatus::InTransaction | TransactionStatus::Failed)
    }
}
