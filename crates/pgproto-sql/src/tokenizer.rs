//! A non-grammar SQL tokenizer.
//!
//! This does not parse SQL; it only knows how to split text into runs
//! while respecting quoted strings and balanced grouping delimiters (like
//! parentheses, or `CASE ... END`). The clause splitter and the SELECT
//! column/table parser in [`crate::parser`] build on top of it.

use thiserror::Error;

/// A token and the byte offset in the original (not lowercased) input at
/// which it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub pos: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("expecting closing quote, none found")]
    ExpectingClosingQuote,
    #[error("missing closing delimiter '{0}'")]
    MissingClosingDelimiter(String),
}

/// Tunable delimiter sets for [`tokenize`].
#[derive(Debug, Clone)]
pub struct TokenizeOptions {
    /// Delimiters that terminate the current token. Defaults to comma and
    /// space, matching how the reference tokenizer walks free-form SQL.
    pub split_delimiters: Vec<String>,
    /// Balanced `(open, close)` pairs. The entire span, delimiters
    /// included, becomes a single token at the opener's position.
    pub group_delimiters: Vec<(String, String)>,
    /// Quote characters. Once entered, scanning continues to the next
    /// occurrence of the same character.
    pub string_delimiters: Vec<String>,
    /// Strip the quote characters from a quoted token's contribution.
    pub remove_quotes: bool,
    /// Also emit the split delimiter itself as its own token.
    pub split_delimiters_as_tokens: bool,
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        Self {
            split_delimiters: vec![",".to_owned(), " ".to_owned()],
            group_delimiters: vec![("(".to_owned(), ")".to_owned())],
            string_delimiters: vec!["\"".to_owned(), "'".to_owned()],
            remove_quotes: false,
            split_delimiters_as_tokens: false,
        }
    }
}

enum DelimKind {
    Str,
    Open(usize),
    Close(usize),
    Split,
}

/// Tokenizes `sql` starting at byte offset `start_pos`.
///
/// Matching against the configured delimiters is case-insensitive: the
/// input is lowercased internally (byte-for-byte, via [`str::to_ascii_lowercase`]
/// so positions stay aligned) purely to locate delimiters. Token text is
/// always sliced from the original, case-preserved input.
pub fn tokenize(sql: &str, start_pos: usize, opts: &TokenizeOptions) -> Result<Vec<Token>, TokenizeError> {
    let lower = sql.to_ascii_lowercase();

    // Concatenation order matches the priority used for delimiter
    // tie-breaks: string delimiters, then group openers, then group
    // closers, then split delimiters.
    let mut delims: Vec<(String, DelimKind)> = Vec::new();
    for s in &opts.string_delimiters {
        delims.push((s.clone(), DelimKind::Str));
    }
    for (i, (open, _)) in opts.group_delimiters.iter().enumerate() {
        delims.push((open.clone(), DelimKind::Open(i)));
    }
    for (i, (_, close)) in opts.group_delimiters.iter().enumerate() {
        delims.push((close.clone(), DelimKind::Close(i)));
    }
    for s in &opts.split_delimiters {
        delims.push((s.clone(), DelimKind::Split));
    }
    let lower_delims: Vec<String> = delims.iter().map(|(t, _)| t.to_ascii_lowercase()).collect();

    let mut tokens = Vec::new();
    let mut pos = start_pos;
    let mut current = String::new();
    let mut current_pos = start_pos;

    loop {
        let found = find_next_delimiter(&lower, pos, &lower_delims);
        let Some((delim_idx, delim_pos)) = found else {
            current.push_str(&sql[pos..]);
            push_trimmed(&mut tokens, &current, current_pos);
            break;
        };
        let (delim_text, kind) = &delims[delim_idx];
        current.push_str(&sql[pos..delim_pos]);

        match kind {
            DelimKind::Str => {
                let quote_len = delim_text.len();
                let search_start = delim_pos + quote_len;
                match sql[search_start..].find(delim_text.as_str()) {
                    None => return Err(TokenizeError::ExpectingClosingQuote),
                    Some(rel) => {
                        let end_pos = search_start + rel;
                        pos = end_pos + quote_len;
                        if opts.remove_quotes {
                            current.push_str(&sql[search_start..end_pos]);
                        } else {
                            current.push_str(&sql[delim_pos..pos]);
                        }
                    }
                }
            }
            DelimKind::Open(i) => {
                let (open, close) = &opts.group_delimiters[*i];
                let lower_open = open.to_ascii_lowercase();
                let lower_close = close.to_ascii_lowercase();
                let end_pos =
                    find_next_unnested_delim(&lower, delim_pos + open.len(), &lower_open, &lower_close)?;
                pos = end_pos + close.len();
                tokens.push(Token {
                    text: sql[delim_pos..pos].trim().to_owned(),
                    pos: delim_pos,
                });
                current.clear();
                current_pos = pos;
            }
            DelimKind::Close(_) => {
                // A close delimiter reached outside of an open group is
                // not an error: it's just ordinary text (e.g. a stray `)`
                // in a string we didn't recognize as quoted).
                current.push_str(delim_text);
                pos = delim_pos + delim_text.len();
            }
            DelimKind::Split => {
                push_trimmed(&mut tokens, &current, current_pos);
                if opts.split_delimiters_as_tokens {
                    let trimmed = delim_text.trim();
                    if !trimmed.is_empty() {
                        tokens.push(Token {
                            text: trimmed.to_owned(),
                            pos: delim_pos,
                        });
                    }
                }
                pos = delim_pos + delim_text.len();
                current = String::new();
                current_pos = pos;
            }
        }
    }

    Ok(tokens)
}

fn push_trimmed(tokens: &mut Vec<Token>, current: &str, pos: usize) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        tokens.push(Token {
            text: trimmed.to_owned(),
            pos,
        });
    }
}

/// Finds the earliest occurrence (by byte position) of any delimiter at
/// or after `pos`. Ties are broken by position in `delimiters`: the
/// delimiter appearing first in the slice wins.
fn find_next_delimiter(lower_sql: &str, pos: usize, delimiters: &[String]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for (i, d) in delimiters.iter().enumerate() {
        if d.is_empty() || pos > lower_sql.len() {
            continue;
        }
        if let Some(rel) = lower_sql[pos..].find(d.as_str()) {
            let abs = pos + rel;
            match best {
                Some((_, best_pos)) if abs >= best_pos => {}
                _ => best = Some((i, abs)),
            }
        }
    }
    best
}

/// Finds the close delimiter matching the opener that precedes `pos`,
/// honoring nested occurrences of the same open/close pair.
fn find_next_unnested_delim(
    lower_sql: &str,
    pos: usize,
    open: &str,
    close: &str,
) -> Result<usize, TokenizeError> {
    let next_close = lower_sql[pos..].find(close).map(|rel| pos + rel);
    let next_open = lower_sql[pos..].find(open).map(|rel| pos + rel);
    match next_close {
        None => Err(TokenizeError::MissingClosingDelimiter(close.to_owned())),
        Some(c) => match next_open {
            Some(o) if o < c => {
                let inner_close = find_next_unnested_delim(lower_sql, o + open.len(), open, close)?;
                find_next_unnested_delim(lower_sql, inner_close + close.len(), open, close)
            }
            _ => Ok(c),
        },
    }
}

/// Tokenizes a comma-separated list, honoring parenthesized groups so
/// commas inside a function call don't split an item.
pub fn tokenize_comma_separated_list(sql: &str, remove_quotes: bool) -> Result<Vec<Token>, TokenizeError> {
    let opts = TokenizeOptions {
        split_delimiters: vec![",".to_owned()],
        remove_quotes,
        ..Default::default()
    };
    tokenize(sql, 0, &opts)
}

/// Splits a (possibly multi-statement) SQL string on top-level `;`
/// boundaries, honoring quotes and parenthesized groups.
pub fn split_sql_queries(sql: &str) -> Result<Vec<String>, TokenizeError> {
    let opts = TokenizeOptions {
        split_delimiters: vec![";".to_owned()],
        ..Default::default()
    };
    Ok(tokenize(sql, 0, &opts)?.into_iter().map(|t| t.text).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(sql: &str) -> Vec<String> {
        tokenize(sql, 0, &TokenizeOptions::default())
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn splits_on_comma_and_space() {
        assert_eq!(tok("a, b c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn keeps_parenthesized_group_as_one_token() {
        assert_eq!(tok("count(a, b), c"), vec!["count(a, b)", "c"]);
    }

    #[test]
    fn nested_parens_preserved_as_single_token() {
        let tokens = tok("f(g(x, y), z)");
        assert_eq!(tokens, vec!["f(g(x, y), z)"]);
    }

    #[test]
    fn quoted_string_is_one_token_and_quotes_removed_on_request() {
        let opts = TokenizeOptions {
            remove_quotes: true,
            ..Default::default()
        };
        let tokens = tokenize("'hello, world' x", 0, &opts).unwrap();
        assert_eq!(tokens[0].text, "hello, world");
        assert_eq!(tokens[1].text, "x");
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let err = tokenize("'unterminated", 0, &TokenizeOptions::default()).unwrap_err();
        assert_eq!(err, TokenizeError::ExpectingClosingQuote);
    }

    #[test]
    fn unterminated_group_is_an_error() {
        let err = tokenize("(a, b", 0, &TokenizeOptions::default()).unwrap_err();
        assert!(matches!(err, TokenizeError::MissingClosingDelimiter(_)));
    }

    #[test]
    fn split_delimiters_as_tokens_emits_the_delimiter() {
        let opts = TokenizeOptions {
            split_delimiters: vec!["=".to_owned()],
            split_delimiters_as_tokens: true,
            ..Default::default()
        };
        let tokens = tokenize("a=b", 0, &opts).unwrap();
        let texts: Vec<_> = tokens.into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["a", "=", "b"]);
    }

    #[test]
    fn split_sql_queries_respects_quotes_and_groups() {
        let queries = split_sql_queries("SELECT ';' FROM t; SELECT f(1; 2) FROM u").unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0], "SELECT ';' FROM t");
        assert_eq!(queries[1].trim(), "SELECT f(1; 2) FROM u");
    }

    #[test]
    fn token_positions_are_in_the_original_mixed_case_input() {
        let tokens = tokenize("SELECT Foo FROM Bar", 0, &TokenizeOptions::default()).unwrap();
        for t in &tokens {
            assert_eq!(&"SELECT Foo FROM Bar"[t.pos..t.pos + 1].to_ascii_uppercase().len(), &1);
        }
        assert_eq!(tokens[0].text, "SELECT");
        assert_eq!(tokens[1].text, "Foo");
    }
}
