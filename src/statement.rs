//! Named prepared statements and the per-connection registry.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::protocol::frontend::MAX_PARAMS;
use crate::protocol::types::Oid;

/// A statement prepared on the server under a connection-unique name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub name: String,
    pub sql: String,
    /// Declared number of parameters
    pub arity: usize,
    /// Type hints sent with Parse; empty lets the server infer every type
    pub type_hints: Vec<Oid>,
    /// Parameter types the server resolved
    pub param_types: Vec<Oid>,
}

impl PreparedStatement {
    /// Validate a prepare request before anything is sent.
    pub(crate) fn new(name: &str, sql: &str, arity: usize, type_hints: &[Oid]) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidUsage(
                "prepared statement name must not be empty".into(),
            ));
        }
        if arity > MAX_PARAMS {
            return Err(Error::InvalidUsage(format!(
                "arity {} exceeds the limit of {} parameters",
                arity, MAX_PARAMS
            )));
        }
        if !type_hints.is_empty() && type_hints.len() != arity {
            return Err(Error::ParamCount {
                statement: name.to_string(),
                expected: arity,
                actual: type_hints.len(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            sql: sql.to_string(),
            arity,
            type_hints: type_hints.to_vec(),
            param_types: Vec::new(),
        })
    }

    /// Local arity check for an execute request.
    pub(crate) fn check_arity(&self, supplied: usize) -> Result<()> {
        if supplied != self.arity {
            return Err(Error::ParamCount {
                statement: self.name.clone(),
                expected: self.arity,
                actual: supplied,
            });
        }
        Ok(())
    }

    /// Accept the server's parameter description, or report a count mismatch.
    pub(crate) fn resolve(&mut self, server_types: &[Oid]) -> Result<()> {
        if server_types.len() != self.arity {
            return Err(Error::ParamCount {
                statement: self.name.clone(),
                expected: self.arity,
                actual: server_types.len(),
            });
        }
        self.param_types = server_types.to_vec();
        Ok(())
    }
}

/// Statements prepared on one connection, keyed by name.
#[derive(Debug, Default)]
pub struct StatementRegistry {
    statements: HashMap<String, PreparedStatement>,
}

impl StatementRegistry {
    pub fn get(&self, name: &str) -> Option<&PreparedStatement> {
        self.statements.get(name)
    }

    /// Look up a statement for execution.
    pub(crate) fn require(&self, name: &str) -> Result<&PreparedStatement> {
        self.statements
            .get(name)
            .ok_or_else(|| Error::InvalidUsage(format!("unknown prepared statement {:?}", name)))
    }

    /// Register, replacing any statement of the same name.
    pub(crate) fn insert(&mut self, statement: PreparedStatement) -> &PreparedStatement {
        let name = statement.name.clone();
        self.statements.insert(name.clone(), statement);
        &self.statements[&name]
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<PreparedStatement> {
        self.statements.remove(name)
    }

    pub(crate) fn clear(&mut self) {
        self.statements.clear();
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}
