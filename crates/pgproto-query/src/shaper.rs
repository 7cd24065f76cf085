//! Projects application-returned rows onto the columns the client asked
//! for, applying `*`-expansion and alias substitution.

use std::collections::HashMap;

use pgproto_wire::ColumnDescriptor;

use crate::application::Row;
use pgproto_sql::SelectStmt;

/// Chooses which of `cols` (the table's real columns) to project, and the
/// display name for each, based on the parsed select list.
///
/// `*` is only honored when it's the sole, unaliased select item — that's
/// the only form the parser is allowed to hand back unexpanded.
fn projected_columns(cols: &[String], stmt: &SelectStmt) -> (Vec<String>, Vec<String>) {
    if stmt.columns.len() == 1 && stmt.columns[0].name == "*" && stmt.columns[0].alias.is_none() {
        return (cols.to_vec(), cols.to_vec());
    }
    let select_cols: Vec<String> = stmt
        .columns
        .iter()
        .map(|c| c.name.rsplit('.').next().unwrap_or(&c.name).to_owned())
        .collect();
    let display_names: Vec<String> = stmt.columns.iter().map(|c| c.name.clone()).collect();
    (select_cols, display_names)
}

/// Builds the wire-ready row matrix: one row per entry in `data`, values
/// looked up by projected column name, missing keys rendered as `""`.
fn shape_rows(data: &[Row], select_cols: &[String]) -> Vec<Vec<String>> {
    data.iter()
        .map(|row| select_cols.iter().map(|c| row.get(c).cloned().unwrap_or_default()).collect())
        .collect()
}

fn shape_column_descriptors(display_names: &[String], stmt: &SelectStmt) -> Vec<ColumnDescriptor> {
    let aliases: HashMap<&str, &str> = stmt
        .columns
        .iter()
        .filter_map(|c| c.alias.as_deref().map(|a| (c.name.as_str(), a)))
        .collect();
    display_names
        .iter()
        .map(|name| ColumnDescriptor::text(aliases.get(name.as_str()).copied().unwrap_or(name)))
        .collect()
}

/// Shapes `data`/`cols` (the application's raw result) according to the
/// user's select list in `stmt`.
pub fn shape_select_result(
    data: &[Row],
    cols: &[String],
    stmt: &SelectStmt,
) -> (Vec<Vec<String>>, Vec<ColumnDescriptor>) {
    let (select_cols, display_names) = projected_columns(cols, stmt);
    let rows = shape_rows(data, &select_cols);
    let columns = shape_column_descriptors(&display_names, stmt);
    (rows, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgproto_sql::{FromTableExpr, SelectColumnExpr};

    fn stmt(columns: Vec<SelectColumnExpr>) -> SelectStmt {
        SelectStmt {
            columns,
            tables: vec![FromTableExpr { name: "t".into(), schema: None, alias: None }],
            where_clause: String::new(),
            group_by: String::new(),
            order_by: String::new(),
            limit: String::new(),
            offset: String::new(),
        }
    }

    #[test]
    fn star_expands_to_every_column_in_order() {
        let stmt = stmt(vec![SelectColumnExpr { name: "*".into(), alias: None }]);
        let data = vec![Row::from([("id".to_owned(), "1".to_owned()), ("title".to_owned(), "hello".to_owned())])];
        let (rows, cols) = shape_select_result(&data, &["id".to_owned(), "title".to_owned()], &stmt);
        assert_eq!(rows, vec![vec!["1".to_owned(), "hello".to_owned()]]);
        assert_eq!(cols.iter().map(|c| c.name.clone()).collect::<Vec<_>>(), vec!["id", "title"]);
    }

    #[test]
    fn alias_overrides_display_name_but_not_lookup_key() {
        let stmt = stmt(vec![
            SelectColumnExpr { name: "id".into(), alias: None },
            SelectColumnExpr { name: "title".into(), alias: Some("t".into()) },
        ]);
        let data = vec![Row::from([("id".to_owned(), "1".to_owned()), ("title".to_owned(), "hello".to_owned())])];
        let (rows, cols) = shape_select_result(&data, &["id".to_owned(), "title".to_owned()], &stmt);
        assert_eq!(rows, vec![vec!["1".to_owned(), "hello".to_owned()]]);
        assert_eq!(cols.iter().map(|c| c.name.clone()).collect::<Vec<_>>(), vec!["id", "t"]);
    }

    #[test]
    fn missing_key_in_data_renders_as_empty_string() {
        let stmt = stmt(vec![SelectColumnExpr { name: "missing".into(), alias: None }]);
        let data = vec![Row::new()];
        let (rows, _) = shape_select_result(&data, &["missing".to_owned()], &stmt);
        assert_eq!(rows, vec![vec!["".to_owned()]]);
    }
}
