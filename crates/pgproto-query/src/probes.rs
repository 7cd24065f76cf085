//! Driver bootstrap probe queries.
//!
//! Most client drivers issue a handful of `pg_catalog` and
//! `information_schema` queries right after connecting to populate their
//! own catalogs. None of these need the application hook; they're
//! answered from a small fixed table.

use std::collections::HashMap;

use pgproto_sql::SelectStmt;

use crate::application::{Application, Row};
use crate::Result;

const PG_BUILTIN_TABLES: &[&str] = &[
    "pg_matviews",
    "pg_type",
    "pg_index",
    "pg_attribute",
    "pg_settings",
    "pg_database",
    "pg_roles",
    "pg_user",
    "pg_enum",
    "pg_class",
    "pg_namespace",
];

fn pg_builtin_functions() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("current_schema()", "public"),
        ("version()", "PostgreSQL 13.1 (Kantree Tranlation Layer)"),
        ("pg_backend_pid()", "0"),
    ])
}

fn is_builtin_function_query(stmt: &SelectStmt) -> bool {
    if !stmt.tables.is_empty() || !stmt.where_clause.is_empty() || stmt.columns.is_empty() {
        return false;
    }
    let functions = pg_builtin_functions();
    stmt.columns.iter().all(|c| functions.contains_key(c.name.as_str()))
}

fn is_builtin_table_query(stmt: &SelectStmt) -> bool {
    !stmt.tables.is_empty() && stmt.tables.iter().all(|t| PG_BUILTIN_TABLES.contains(&t.name.as_str()))
}

/// Handles `SELECT current_schema(), version(), pg_backend_pid()`-style
/// bootstrap calls and no-op reads of introspection tables the server
/// doesn't model. Returns `None` if `stmt` isn't a recognized probe.
pub fn try_pg_catalog(stmt: &SelectStmt) -> Option<(Vec<Row>, Vec<String>)> {
    if is_builtin_function_query(stmt) {
        let functions = pg_builtin_functions();
        let row: Row = functions.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let cols = functions.keys().map(|k| k.to_string()).collect();
        Some((vec![row], cols))
    } else if is_builtin_table_query(stmt) {
        Some((vec![], vec![]))
    } else {
        None
    }
}

/// Whether any table referenced by `stmt` lives in `information_schema`.
pub fn is_information_schema_query(stmt: &SelectStmt) -> bool {
    !stmt.tables.is_empty() && stmt.tables.iter().any(|t| t.schema.as_deref() == Some("information_schema"))
}

pub async fn handle_information_schema_query(
    stmt: &SelectStmt,
    app: &dyn Application,
) -> Result<(Vec<Row>, Vec<String>)> {
    let table_name = stmt.tables[0].name.as_str();
    match table_name {
        "tables" => {
            let cols = vec!["table_schema".to_owned(), "table_name".to_owned(), "table_type".to_owned()];
            let rows = app
                .list_tables()
                .await
                .into_iter()
                .map(|t| {
                    Row::from([
                        ("table_schema".to_owned(), "public".to_owned()),
                        ("table_name".to_owned(), t),
                        ("table_type".to_owned(), "BASE TABLE".to_owned()),
                    ])
                })
                .collect();
            Ok((rows, cols))
        }
        "character_sets" => Ok((
            vec![Row::from([("character_set_name".to_owned(), "UTF8".to_owned())])],
            vec!["character_set_name".to_owned()],
        )),
        "columns" => {
            if stmt.where_clause.is_empty() {
                return Ok((vec![], vec![]));
            }
            let table_name = pgproto_sql::extract_value_from_where_comparison(&stmt.where_clause, "table_name")
                .map_err(pgproto_common::ProtoError::syntax)?;
            let Some(table_name) = table_name else {
                return Ok((vec![], vec![]));
            };
            let cols = vec![
                "column_name".to_owned(),
                "ordinal_position".to_owned(),
                "is_nullable".to_owned(),
                "data_type".to_owned(),
            ];
            let rows = app
                .describe_table(&table_name)
                .await
                .into_iter()
                .enumerate()
                .map(|(i, col)| {
                    Row::from([
                        ("column_name".to_owned(), col),
                        ("ordinal_position".to_owned(), (i + 1).to_string()),
                        ("is_nullable".to_owned(), "t".to_owned()),
                        ("data_type".to_owned(), "text".to_owned()),
                    ])
                })
                .collect();
            Ok((rows, cols))
        }
        _ => Ok((vec![], vec![])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgproto_sql::{FromTableExpr, SelectColumnExpr};

    fn col(name: &str) -> SelectColumnExpr {
        SelectColumnExpr { name: name.to_owned(), alias: None }
    }

    fn table(name: &str, schema: Option<&str>) -> FromTableExpr {
        FromTableExpr { name: name.to_owned(), schema: schema.map(str::to_owned), alias: None }
    }

    fn select(columns: Vec<SelectColumnExpr>, tables: Vec<FromTableExpr>, where_clause: &str) -> SelectStmt {
        SelectStmt {
            columns,
            tables,
            where_clause: where_clause.to_owned(),
            group_by: String::new(),
            order_by: String::new(),
            limit: String::new(),
            offset: String::new(),
        }
    }

    #[test]
    fn builtin_function_probe_returns_fixed_row() {
        let stmt = select(vec![col("version()")], vec![], "");
        let (rows, cols) = try_pg_catalog(&stmt).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(cols.contains(&"version()".to_owned()));
    }

    #[test]
    fn builtin_table_probe_returns_no_rows() {
        let stmt = select(vec![col("*")], vec![table("pg_type", None)], "");
        let (rows, cols) = try_pg_catalog(&stmt).unwrap();
        assert!(rows.is_empty());
        assert!(cols.is_empty());
    }

    #[test]
    fn non_probe_query_is_not_recognized() {
        let stmt = select(vec![col("id")], vec![table("csv", None)], "");
        assert!(try_pg_catalog(&stmt).is_none());
    }

    #[test]
    fn information_schema_detection_checks_table_schema() {
        let stmt = select(vec![col("*")], vec![table("tables", Some("information_schema"))], "");
        assert!(is_information_schema_query(&stmt));
        let stmt = select(vec![col("*")], vec![table("csv", None)], "");
        assert!(!is_information_schema_query(&stmt));
    }
}
