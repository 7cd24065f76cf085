//! A small in-memory [`Application`] used by the bundled binary so the
//! server is runnable out of the box. Real embedders replace this with a
//! hook into their own storage layer.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use pgproto_query::{Application, Row};
use pgproto_sql::SelectStmt;

/// Columns are fixed per table; rows are plain string tuples keyed by
/// column name, same shape the application hook trait expects back.
pub struct DemoApplication {
    tables: HashMap<String, Vec<String>>,
    data: RwLock<HashMap<String, Vec<Row>>>,
}

impl Default for DemoApplication {
    fn default() -> Self {
        let mut tables = HashMap::new();
        tables.insert("widgets".to_owned(), vec!["id".to_owned(), "name".to_owned(), "sku".to_owned()]);
        tables.insert("orders".to_owned(), vec!["id".to_owned(), "widget_id".to_owned(), "quantity".to_owned()]);

        let mut data = HashMap::new();
        data.insert(
            "widgets".to_owned(),
            vec![
                Row::from([
                    ("id".to_owned(), "1".to_owned()),
                    ("name".to_owned(), "sprocket".to_owned()),
                    ("sku".to_owned(), "SKU-001".to_owned()),
                ]),
                Row::from([
                    ("id".to_owned(), "2".to_owned()),
                    ("name".to_owned(), "widget".to_owned()),
                    ("sku".to_owned(), "SKU-002".to_owned()),
                ]),
            ],
        );
        data.insert(
            "orders".to_owned(),
            vec![Row::from([
                ("id".to_owned(), "1".to_owned()),
                ("widget_id".to_owned(), "1".to_owned()),
                ("quantity".to_owned(), "10".to_owned()),
            ])],
        );

        Self { tables, data: RwLock::new(data) }
    }
}

#[async_trait]
impl Application for DemoApplication {
    async fn query_tables(&self, stmt: &SelectStmt) -> pgproto_query::Result<(Vec<Row>, Vec<String>)> {
        let Some(table) = stmt.tables.first() else {
            return Ok((vec![], vec![]));
        };
        let columns = self.tables.get(table.name.as_str()).cloned().unwrap_or_default();
        let rows = self.data.read().expect("data lock poisoned").get(table.name.as_str()).cloned().unwrap_or_default();
        Ok((rows, columns))
    }

    async fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    async fn describe_table(&self, table_name: &str) -> Vec<String> {
        self.tables.get(table_name).cloned().unwrap_or_default()
    }

    fn application_name(&self) -> String {
        "pgproto-server-demo".to_owned()
    }
}
