//! The capability surface the embedding application supplies.
//!
//! This core never touches a real data source; it calls out to an
//! `Arc<dyn Application>` for anything that needs actual data or policy
//! decisions, and falls through to sensible defaults for the rest.

use std::collections::HashMap;

use async_trait::async_trait;
use pgproto_sql::{SelectStmt, StmtTypeDelimiters};

use crate::Result;

/// One row of application data, keyed by column name. Every value already
/// travels as text, matching this server's all-text wire encoding.
pub type Row = HashMap<String, String>;

#[async_trait]
pub trait Application: Send + Sync {
    /// Answers a `SELECT` the probe responders didn't recognize. Returns
    /// the matching rows and the full set of column names the backing
    /// table exposes (not just the ones the query asked for — the result
    /// shaper does the projection).
    async fn query_tables(&self, stmt: &SelectStmt) -> Result<(Vec<Row>, Vec<String>)>;

    /// The known table names, used to answer `information_schema.tables`.
    async fn list_tables(&self) -> Vec<String>;

    /// The column names of a table, used to answer
    /// `information_schema.columns`. Returns an empty vec for an unknown
    /// table.
    async fn describe_table(&self, table_name: &str) -> Vec<String>;

    /// Whether a client needs to authenticate. Defaults to no
    /// authentication required.
    async fn is_authentication_needed(&self, _user: &str, _database: Option<&str>) -> bool {
        false
    }

    /// Validates a cleartext password. Only called when
    /// `is_authentication_needed` returned true. Defaults to accepting
    /// anything, which is never reached unless an embedder opts in above.
    async fn authenticate(&self, _user: &str, _password: &str, _database: Option<&str>) -> bool {
        true
    }

    /// Whether a plaintext connection should be rejected before startup
    /// completes. Defaults to not requiring encryption.
    fn must_use_encryption(&self) -> bool {
        false
    }

    /// Reported to the client as the `application_name` parameter status.
    fn application_name(&self) -> String {
        "postgres-proto".to_owned()
    }

    /// Statement types that are acknowledged with only a `CommandComplete`
    /// and otherwise ignored by the dispatch layer.
    fn ignore_missing_statement_types(&self) -> Vec<String> {
        vec!["SET", "BEGIN", "COMMIT", "ROLLBACK", "DEALLOCATE", "DISCARD"]
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    /// Overrides the clause-splitter keyword vocabulary. `None` uses the
    /// built-in vocabulary in `pgproto_sql::default_stmt_type_delimiters`.
    fn stmt_type_delimiters(&self) -> Option<StmtTypeDelimiters> {
        None
    }

    /// When false (the reference behavior), a protocol error raised while
    /// computing a portal's result is swallowed and the portal is marked
    /// failed rather than propagated to the client.
    fn surface_execute_errors(&self) -> bool {
        false
    }
}
