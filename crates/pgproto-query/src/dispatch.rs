//! Query dispatch: turns raw SQL text into a wire-ready result, checking
//! the probe responders before falling through to the application.

use pgproto_common::ProtoError;
use pgproto_sql::{parse_sql, ParsedStatement};
use pgproto_wire::ColumnDescriptor;

use crate::application::Application;
use crate::{probes, shaper, Result};

/// The outcome of executing one SQL statement.
pub enum QueryResult {
    /// A `SELECT`-shaped result: row description plus data rows.
    Rows {
        tag: String,
        rows: Vec<Vec<String>>,
        columns: Vec<ColumnDescriptor>,
    },
    /// A statement the application ignores beyond acknowledging it (`SET`,
    /// `BEGIN`, …): only a `CommandComplete` is emitted.
    TagOnly { tag: String },
}

pub async fn execute_query(sql: &str, app: &dyn Application) -> Result<QueryResult> {
    let parsed = parse_sql(sql, app.stmt_type_delimiters().as_ref()).map_err(ProtoError::syntax)?;

    match parsed {
        ParsedStatement::Select(stmt) => {
            if let Some((data, cols)) = probes::try_pg_catalog(&stmt) {
                let (rows, columns) = shaper::shape_select_result(&data, &cols, &stmt);
                return Ok(QueryResult::Rows { tag: "SELECT".to_owned(), rows, columns });
            }
            if probes::is_information_schema_query(&stmt) {
                let (data, cols) = probes::handle_information_schema_query(&stmt, app).await?;
                let (rows, columns) = shaper::shape_select_result(&data, &cols, &stmt);
                return Ok(QueryResult::Rows { tag: "SELECT".to_owned(), rows, columns });
            }

            let has_star = stmt.columns.iter().any(|c| c.name == "*");
            if has_star && (stmt.columns.len() > 1 || stmt.columns[0].alias.is_some()) {
                return Err(ProtoError::error("select * cannot be aliased or used with other columns"));
            }

            let (data, cols) = app.query_tables(&stmt).await?;
            let (rows, columns) = shaper::shape_select_result(&data, &cols, &stmt);
            Ok(QueryResult::Rows { tag: "SELECT".to_owned(), rows, columns })
        }
        ParsedStatement::Other { stmt_type, parts: _ } => {
            if app.ignore_missing_statement_types().contains(&stmt_type) {
                Ok(QueryResult::TagOnly { tag: stmt_type })
            } else {
                Err(ProtoError::error("statement type not supported"))
            }
        }
    }
}
