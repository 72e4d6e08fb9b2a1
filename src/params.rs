//! Bound parameter values.

use crate::protocol::types::{FormatCode, Oid, oid};

/// One bound parameter.
///
/// The value is an owned byte string, so binary values may contain zero bytes.
/// `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Type hint sent with Parse; `0` lets the server infer it
    pub type_oid: Oid,
    pub value: Option<Vec<u8>>,
    pub format: FormatCode,
}

impl Param {
    /// Text-format value with no type hint.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            type_oid: oid::UNSPECIFIED,
            value: Some(value.into().into_bytes()),
            format: FormatCode::Text,
        }
    }

    /// Binary-format value. The bytes must be the type's send representation.
    pub fn binary(type_oid: Oid, value: impl Into<Vec<u8>>) -> Self {
        Self {
            type_oid,
            value: Some(value.into()),
            format: FormatCode::Binary,
        }
    }

    pub fn null() -> Self {
        Self {
            type_oid: oid::UNSPECIFIED,
            value: None,
            format: FormatCode::Text,
        }
    }

    /// Attach a type hint.
    pub fn with_type(mut self, type_oid: Oid) -> Self {
        self.type_oid = type_oid;
        self
    }
}

/// Ordered parameter list plus the format requested for result columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: Vec<Param>,
    result_format: FormatCode,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, param: Param) -> &mut Self {
        self.values.push(param);
        self
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, param: Param) -> Self {
        self.values.push(param);
        self
    }

    /// Request text or binary result columns.
    pub fn result_format(mut self, format: FormatCode) -> Self {
        self.result_format = format;
        self
    }

    pub fn get_result_format(&self) -> FormatCode {
        self.result_format
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.values.iter()
    }

    /// Type hints in parameter order.
    pub fn type_oids(&self) -> Vec<Oid> {
        self.values.iter().map(|p| p.type_oid).collect()
    }
}

impl FromIterator<Param> for Params {
    fn from_iter<I: IntoIterator<Item = Param>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
            result_format: FormatCode::Text,
        }
    }
}

impl<const N: usize> From<[Param; N]> for Params {
    fn from(values: [Param; N]) -> Self {
        values.into_iter().collect()
    }
}

impl From<Vec<Param>> for Params {
    fn from(values: Vec<Param>) -> Self {
        values.into_iter().collect()
    }
}

/// Text parameters from string slices; `None` is NULL.
impl<'a> FromIterator<Option<&'a str>> for Params {
    fn from_iter<I: IntoIterator<Item = Option<&'a str>>>(iter: I) -> Self {
        iter.into_iter()
            .map(|v| v.map_or_else(Param::null, Param::text))
            .collect()
    }
}
