//! A forgiving, non-grammar SQL tokenizer, clause splitter, and
//! structural SELECT/FROM parser.
//!
//! This crate never validates that SQL is well-formed beyond balanced
//! quotes and grouping delimiters; it extracts just enough structure
//! (statement type, selected columns, source tables, raw WHERE text) for
//! the query-dispatch layer to route and shape a response.

mod parser;
mod tokenizer;

pub use parser::{
    default_stmt_type_delimiters, extract_value_from_where_comparison, parse_from_tables,
    parse_select_cols, parse_sql, split_sql, tokenize_where_expr, ClauseMap, ClauseValue,
    FromTableExpr, ParseError, ParsedStatement, SelectColumnExpr, SelectStmt, StmtTypeDelimiters,
};
pub use tokenizer::{
    split_sql_queries, tokenize, tokenize_comma_separated_list, Token, TokenizeError,
    TokenizeOptions,
};
