//! Per-connection session state: startup parameters, and the prepared
//! statement and portal registries used by the extended query protocol.
//!
//! A [`Session`] lives exactly as long as its connection. Nothing here is
//! shared across connections; there is no cross-session coordination.

use std::collections::HashMap;

use pgproto_common::{ProtoError, SqlState};
use pgproto_wire::{ColumnDescriptor, TransactionStatus};

/// A statement registered by `Parse`. The empty name is the unnamed
/// statement, which a later `Parse` with an empty name legally overwrites.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub sql: String,
    pub param_types: Vec<i32>,
}

/// The outcome of executing a portal's bound statement, cached until the
/// portal is re-bound.
#[derive(Debug, Clone)]
pub enum PortalResult {
    Rows {
        tag: String,
        rows: Vec<Vec<String>>,
        columns: Vec<ColumnDescriptor>,
    },
    /// The bound SQL was empty once parameters were substituted in.
    Empty,
    /// Execution failed; the error was swallowed and `Execute` should
    /// answer with `EmptyQueryResponse` rather than propagate it.
    Failed,
}

/// A statement bound to concrete parameter values by `Bind`. The empty
/// name is the unnamed portal.
#[derive(Debug, Clone)]
pub struct Portal {
    pub statement: String,
    pub param_formats: Vec<i16>,
    pub params: Vec<Option<Vec<u8>>>,
    pub result_formats: Vec<i16>,
    pub cached_result: Option<PortalResult>,
}

#[derive(Debug)]
pub struct Session {
    conn_id: u32,
    startup_params: HashMap<String, String>,
    user: Option<String>,
    statements: HashMap<String, PreparedStatement>,
    portals: HashMap<String, Portal>,
}

impl Session {
    pub fn new(conn_id: u32, startup_params: HashMap<String, String>) -> Self {
        let user = startup_params.get("user").cloned();
        Self {
            conn_id,
            startup_params,
            user,
            statements: HashMap::new(),
            portals: HashMap::new(),
        }
    }

    pub fn conn_id(&self) -> u32 {
        self.conn_id
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn startup_param(&self, key: &str) -> Option<&str> {
        self.startup_params.get(key).map(String::as_str)
    }

    /// Always idle: this implementation never runs real transactions.
    pub fn transaction_status(&self) -> TransactionStatus {
        TransactionStatus::Idle
    }

    pub fn declare_statement(&mut self, name: String, sql: String, param_types: Vec<i32>) {
        self.statements.insert(name, PreparedStatement { sql, param_types });
    }

    pub fn get_statement(&self, name: &str) -> Option<&PreparedStatement> {
        self.statements.get(name)
    }

    pub fn close_statement(&mut self, name: &str) -> Result<(), ProtoError> {
        self.statements
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| unknown("statement", name))
    }

    /// Binds `portal` to `statement_name`; the statement must already be
    /// registered. Any previously cached result for the portal is dropped.
    pub fn declare_portal(
        &mut self,
        portal_name: String,
        statement_name: &str,
        param_formats: Vec<i16>,
        params: Vec<Option<Vec<u8>>>,
        result_formats: Vec<i16>,
    ) -> Result<(), ProtoError> {
        if !self.statements.contains_key(statement_name) {
            return Err(unknown("statement", statement_name));
        }
        self.portals.insert(
            portal_name,
            Portal {
                statement: statement_name.to_owned(),
                param_formats,
                params,
                result_formats,
                cached_result: None,
            },
        );
        Ok(())
    }

    pub fn get_portal(&self, name: &str) -> Option<&Portal> {
        self.portals.get(name)
    }

    pub fn get_portal_mut(&mut self, name: &str) -> Option<&mut Portal> {
        self.portals.get_mut(name)
    }

    /// Looks up the portal's backing statement. Kept separate from
    /// `get_portal` because the borrow checker can't see through a single
    /// accessor that needs both maps at once.
    pub fn portal_statement(&self, portal_name: &str) -> Option<&PreparedStatement> {
        let portal = self.portals.get(portal_name)?;
        self.statements.get(&portal.statement)
    }

    pub fn close_portal(&mut self, name: &str) -> Result<(), ProtoError> {
        self.portals
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| unknown("portal", name))
    }
}

fn unknown(kind: &str, name: &str) -> ProtoError {
    ProtoError::error_with_code(SqlState::GENERIC, format!("unknown {kind} '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(1, HashMap::new())
    }

    #[test]
    fn closing_unknown_statement_is_an_error() {
        let mut s = session();
        assert!(s.close_statement("missing").is_err());
    }

    #[test]
    fn binding_a_portal_requires_a_known_statement() {
        let mut s = session();
        let err = s
            .declare_portal("p1".into(), "s1", vec![], vec![], vec![])
            .unwrap_err();
        assert!(err.message.contains("unknown statement"));
    }

    #[test]
    fn rebinding_a_portal_clears_its_cached_result() {
        let mut s = session();
        s.declare_statement("s1".into(), "SELECT 1".into(), vec![]);
        s.declare_portal("p1".into(), "s1", vec![], vec![], vec![]).unwrap();
        s.get_portal_mut("p1").unwrap().cached_result = Some(PortalResult::Empty);
        s.declare_portal("p1".into(), "s1", vec![], vec![], vec![]).unwrap();
        assert!(s.get_portal("p1").unwrap().cached_result.is_none());
    }

    #[test]
    fn unnamed_statement_is_legally_overwritten() {
        let mut s = session();
        s.declare_statement("".into(), "SELECT 1".into(), vec![]);
        s.declare_statement("".into(), "SELECT 2".into(), vec![]);
        assert_eq!(s.get_statement("").unwrap().sql, "SELECT 2");
    }

    #[test]
    fn transaction_status_is_always_idle() {
        assert_eq!(session().transaction_status(), TransactionStatus::Idle);
    }
}
