//! Clause splitting and the SELECT/FROM structural parse.
//!
//! None of this is a real SQL grammar. It locates clause keywords in a
//! token stream and hands back the raw text between them, then does a
//! light structural pass over the SELECT column list and FROM table list
//! so the query-dispatch layer can answer probe queries and shape rows
//! without re-parsing.

use std::collections::HashMap;

use thiserror::Error;

use crate::tokenizer::{self, Token, TokenizeError, TokenizeOptions};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unsupported SQL statement")]
    UnsupportedStatement,
    #[error("unhandled comparison: {0}")]
    UnhandledComparison(String),
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
}

/// The value collected for a single clause keyword. A keyword seen more
/// than once aggregates into `Many`, in the order encountered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseValue {
    One(String),
    Many(Vec<String>),
}

impl ClauseValue {
    pub fn as_one(&self) -> &str {
        match self {
            ClauseValue::One(s) => s,
            ClauseValue::Many(v) => v.last().map(|s| s.as_str()).unwrap_or(""),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            ClauseValue::One(existing) => {
                *self = ClauseValue::Many(vec![std::mem::take(existing), value]);
            }
            ClauseValue::Many(values) => values.push(value),
        }
    }
}

pub type ClauseMap = HashMap<String, ClauseValue>;

/// Keyword vocabulary for each supported statement type. `GROUP BY`-style
/// multi-word keywords are matched as an n-gram against consecutive
/// tokens joined with a single space.
pub type StmtTypeDelimiters = HashMap<String, Vec<String>>;

pub fn default_stmt_type_delimiters() -> StmtTypeDelimiters {
    let mut m = StmtTypeDelimiters::new();
    m.insert(
        "SELECT".to_owned(),
        vec!["SELECT", "FROM", "WHERE", "GROUP BY", "ORDER BY", "LIMIT", "OFFSET"]
            .into_iter()
            .map(str::to_owned)
            .collect(),
    );
    m.insert(
        "INSERT".to_owned(),
        vec!["INTO", "VALUES", "RETURNING"].into_iter().map(str::to_owned).collect(),
    );
    m.insert(
        "UPDATE".to_owned(),
        vec!["UPDATE", "SET", "FROM", "WHERE"].into_iter().map(str::to_owned).collect(),
    );
    m.insert(
        "DELETE".to_owned(),
        vec!["FROM", "WHERE"].into_iter().map(str::to_owned).collect(),
    );
    m.insert("SET".to_owned(), vec!["SET".to_owned()]);
    m.insert("BEGIN".to_owned(), vec![]);
    m.insert("COMMIT".to_owned(), vec![]);
    m.insert("ROLLBACK".to_owned(), vec![]);
    m.insert(
        "PREPARE".to_owned(),
        vec!["PREPARE", "AS"].into_iter().map(str::to_owned).collect(),
    );
    m.insert("EXECUTE".to_owned(), vec!["EXECUTE".to_owned()]);
    m.insert("DEALLOCATE".to_owned(), vec!["DEALLOCATE".to_owned()]);
    m.insert("DISCARD".to_owned(), vec!["DISCARD".to_owned()]);
    m
}

/// Strips `-- ...` line comments and `/* ... */` block comments, folds
/// CR/LF into spaces, and trims. Applied only to determine the statement
/// type; clause splitting re-tokenizes the original text.
pub fn minify_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let bytes = sql.as_bytes();
    let mut i = 0;
    let mut at_line_start = true;
    while i < bytes.len() {
        if at_line_start {
            // Skip leading whitespace on the line while looking for `--`.
            let mut j = i;
            while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
                j += 1;
            }
            if bytes[j..].starts_with(b"--") {
                while i < bytes.len() && bytes[i] != b'\n' && bytes[i] != b'\r' {
                    i += 1;
                }
                continue;
            }
        }
        at_line_start = false;
        if bytes[i..].starts_with(b"/*") {
            if let Some(rel) = sql[i + 2..].find("*/") {
                i = i + 2 + rel + 2;
                continue;
            } else {
                i = bytes.len();
                continue;
            }
        }
        match bytes[i] {
            b'\n' | b'\r' => {
                out.push(' ');
                at_line_start = true;
            }
            _ => out.push(bytes[i] as char),
        }
        i += 1;
    }
    out.trim().to_owned()
}

/// Identifies the statement type and splits the source text into clauses.
pub fn split_sql(
    sql: &str,
    stmt_type_delimiters: Option<&StmtTypeDelimiters>,
) -> Result<(String, ClauseMap), ParseError> {
    let default_map;
    let delimiters = match stmt_type_delimiters {
        Some(d) => d,
        None => {
            default_map = default_stmt_type_delimiters();
            &default_map
        }
    };

    let minified = minify_sql(sql);
    let stmt_type = minified
        .split(' ')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    let keywords = delimiters.get(&stmt_type).ok_or(ParseError::UnsupportedStatement)?;

    let tokens = tokenizer::tokenize(sql, 0, &TokenizeOptions::default())?;
    let mut parts = ClauseMap::new();
    let mut last_part: Option<String> = None;
    let mut last_part_pos = 0usize;
    let mut idx = 0usize;

    loop {
        let (found, pos, next_idx) = search_next_token(&tokens, keywords, idx);
        if let Some(part) = &last_part {
            let value = sql[last_part_pos..pos.unwrap_or(sql.len())].trim().to_owned();
            parts
                .entry(part.clone())
                .and_modify(|v| v.push(value.clone()))
                .or_insert(ClauseValue::One(value));
        }
        idx = next_idx;
        match found {
            None => break,
            Some(keyword) => {
                let keyword_pos = pos.unwrap();
                last_part_pos = keyword_pos + keyword.len();
                last_part = Some(keyword);
            }
        }
    }

    Ok((stmt_type, parts))
}

/// Scans `tokens` starting at `from_idx` for the first keyword in
/// `search` (which may be a space-joined n-gram), matched case-insensitively
/// against consecutive tokens joined with a single space.
///
/// Returns `(matched keyword, its start position, index just past it)`.
/// If nothing matches, the position is `None` and the index is the token
/// count (so the caller treats the remainder of the input as the final
/// clause's value).
fn search_next_token(
    tokens: &[Token],
    search: &[String],
    from_idx: usize,
) -> (Option<String>, Option<usize>, usize) {
    let mut i = from_idx;
    while i < tokens.len() {
        for lookup in search {
            let word_count = lookup.matches(' ').count() + 1;
            if i + word_count > tokens.len() {
                continue;
            }
            let joined = tokens[i..i + word_count]
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
                .to_ascii_uppercase();
            if joined == *lookup {
                return (Some(lookup.clone()), Some(tokens[i].pos), i + 1);
            }
        }
        i += 1;
    }
    (None, None, i)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumnExpr {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromTableExpr {
    pub name: String,
    pub schema: Option<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStmt {
    pub columns: Vec<SelectColumnExpr>,
    pub tables: Vec<FromTableExpr>,
    pub where_clause: String,
    pub group_by: String,
    pub order_by: String,
    pub limit: String,
    pub offset: String,
}

/// A parsed statement. Only `SELECT` gets a structural transform; every
/// other supported type is handed back as its raw clause map.
#[derive(Debug, Clone)]
pub enum ParsedStatement {
    Select(SelectStmt),
    Other { stmt_type: String, parts: ClauseMap },
}

pub fn parse_sql(
    sql: &str,
    stmt_type_delimiters: Option<&StmtTypeDelimiters>,
) -> Result<ParsedStatement, ParseError> {
    let (stmt_type, mut parts) = split_sql(sql, stmt_type_delimiters)?;
    if stmt_type == "SELECT" {
        Ok(ParsedStatement::Select(transform_select_stmt(&mut parts)?))
    } else {
        Ok(ParsedStatement::Other { stmt_type, parts })
    }
}

fn take_clause(parts: &mut ClauseMap, key: &str) -> String {
    parts.remove(key).map(|v| v.as_one().to_owned()).unwrap_or_default()
}

fn transform_select_stmt(parts: &mut ClauseMap) -> Result<SelectStmt, ParseError> {
    let select = take_clause(parts, "SELECT");
    let from = take_clause(parts, "FROM");
    Ok(SelectStmt {
        columns: parse_select_cols(&select)?,
        tables: parse_from_tables(&from)?,
        where_clause: take_clause(parts, "WHERE"),
        group_by: take_clause(parts, "GROUP BY"),
        order_by: take_clause(parts, "ORDER BY"),
        limit: take_clause(parts, "LIMIT"),
        offset: take_clause(parts, "OFFSET"),
    })
}

fn select_col_opts() -> TokenizeOptions {
    TokenizeOptions {
        remove_quotes: true,
        group_delimiters: vec![("(".to_owned(), ")".to_owned()), ("CASE ".to_owned(), " END".to_owned())],
        ..Default::default()
    }
}

pub fn parse_select_cols(sql: &str) -> Result<Vec<SelectColumnExpr>, ParseError> {
    let mut out = Vec::new();
    for item in tokenizer::tokenize_comma_separated_list(sql, false)? {
        let expr = item.text.trim();
        if expr.is_empty() {
            continue;
        }
        let tokens = tokenizer::tokenize(expr, 0, &select_col_opts())?;
        if tokens.is_empty() {
            continue;
        }
        let name = tokens[0].text.to_ascii_lowercase();
        let mut alias = if let Some((prefix, _)) = name.split_once('(') {
            Some(prefix.to_owned())
        } else if let Some((_, suffix)) = name.split_once('.') {
            Some(suffix.to_owned())
        } else {
            None
        };
        if tokens.len() > 1 {
            alias = Some(tokens[tokens.len() - 1].text.clone());
        }
        out.push(SelectColumnExpr { name, alias });
    }
    Ok(out)
}

pub fn parse_from_tables(sql: &str) -> Result<Vec<FromTableExpr>, ParseError> {
    let mut out = Vec::new();
    for item in tokenizer::tokenize_comma_separated_list(sql, false)? {
        let expr = item.text.trim();
        if expr.is_empty() {
            continue;
        }
        let tokens = tokenizer::tokenize(expr, 0, &TokenizeOptions { remove_quotes: true, ..Default::default() })?;
        if tokens.is_empty() {
            continue;
        }
        let mut name = tokens[0].text.to_ascii_lowercase();
        let mut schema = None;
        if let Some((s, n)) = name.clone().split_once('.') {
            schema = Some(s.to_owned());
            name = n.to_owned();
        }
        let alias = if tokens.len() > 1 {
            Some(tokens[tokens.len() - 1].text.clone())
        } else {
            None
        };
        out.push(FromTableExpr { name, schema, alias });
    }
    Ok(out)
}

/// Splits a WHERE clause on top-level ` and `/` or ` boundaries, then each
/// conjunct into exactly `(left, operator, right)`.
pub fn tokenize_where_expr(where_cond: &str) -> Result<Vec<(String, String, String)>, ParseError> {
    let conjunct_opts = TokenizeOptions {
        split_delimiters: vec![" and ".to_owned(), " or ".to_owned()],
        ..Default::default()
    };
    let mut out = Vec::new();
    for conjunct in tokenizer::tokenize(where_cond, 0, &conjunct_opts)? {
        let cmp_opts = TokenizeOptions {
            split_delimiters: vec![
                "!=".to_owned(),
                "<>".to_owned(),
                "<=".to_owned(),
                ">=".to_owned(),
                "=".to_owned(),
                "<".to_owned(),
                ">".to_owned(),
            ],
            remove_quotes: true,
            split_delimiters_as_tokens: true,
            ..Default::default()
        };
        let tokens = tokenizer::tokenize(&conjunct.text, 0, &cmp_opts)?;
        if tokens.len() != 3 {
            return Err(ParseError::UnhandledComparison(conjunct.text));
        }
        out.push((tokens[0].text.clone(), tokens[1].text.clone(), tokens[2].text.clone()));
    }
    Ok(out)
}

/// Returns the right-hand side of the first WHERE conjunct whose
/// left-hand side equals `col`.
pub fn extract_value_from_where_comparison(where_cond: &str, col: &str) -> Result<Option<String>, ParseError> {
    for (left, _op, right) in tokenize_where_expr(where_cond)? {
        if left == col {
            return Ok(Some(right));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minify_strips_line_and_block_comments() {
        let sql = "-- a comment\nSELECT 1 /* block\ncomment */ FROM t\r\n";
        assert_eq!(minify_sql(sql), "SELECT 1  FROM t");
    }

    #[test]
    fn split_sql_aggregates_repeated_keywords() {
        let (stmt_type, parts) = split_sql("PREPARE s1 AS SELECT 1 AS x", None).unwrap();
        assert_eq!(stmt_type, "PREPARE");
        assert_eq!(parts.get("PREPARE").unwrap().as_one(), "s1");
        assert_eq!(parts.get("AS").unwrap().as_one(), "SELECT 1 AS x");
    }

    #[test]
    fn split_sql_rejects_unknown_statement_type() {
        let err = split_sql("FROBNICATE t", None).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedStatement));
    }

    #[test]
    fn select_parses_columns_and_tables() {
        let parsed = parse_sql("SELECT id, title AS t FROM csv", None).unwrap();
        let ParsedStatement::Select(stmt) = parsed else {
            panic!("expected select");
        };
        assert_eq!(stmt.columns[0].name, "id");
        assert_eq!(stmt.columns[0].alias, None);
        assert_eq!(stmt.columns[1].name, "title");
        assert_eq!(stmt.columns[1].alias.as_deref(), Some("t"));
        assert_eq!(stmt.tables[0].name, "csv");
    }

    #[test]
    fn select_star_has_no_alias() {
        let parsed = parse_sql("SELECT * FROM t", None).unwrap();
        let ParsedStatement::Select(stmt) = parsed else {
            panic!("expected select");
        };
        assert_eq!(stmt.columns.len(), 1);
        assert_eq!(stmt.columns[0].name, "*");
        assert_eq!(stmt.columns[0].alias, None);
    }

    #[test]
    fn function_call_column_defaults_alias_to_function_name() {
        let cols = parse_select_cols("count(id)").unwrap();
        assert_eq!(cols[0].name, "count(id)");
        assert_eq!(cols[0].alias.as_deref(), Some("count"));
    }

    #[test]
    fn qualified_column_defaults_alias_to_suffix() {
        let cols = parse_select_cols("t.id").unwrap();
        assert_eq!(cols[0].alias.as_deref(), Some("id"));
    }

    #[test]
    fn from_table_extracts_schema_and_alias() {
        let tables = parse_from_tables("information_schema.tables t").unwrap();
        assert_eq!(tables[0].schema.as_deref(), Some("information_schema"));
        assert_eq!(tables[0].name, "tables");
        assert_eq!(tables[0].alias.as_deref(), Some("t"));
    }

    #[test]
    fn where_comparison_extracts_value_for_column() {
        let value = extract_value_from_where_comparison("table_name = 'orders' and x > 1", "table_name").unwrap();
        assert_eq!(value.as_deref(), Some("orders"));
    }

    #[test]
    fn where_comparison_errors_on_malformed_conjunct() {
        let err = tokenize_where_expr("table_name").unwrap_err();
        assert!(matches!(err, ParseError::UnhandledComparison(_)));
    }
}
