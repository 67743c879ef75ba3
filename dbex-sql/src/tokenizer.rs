//! SQL Tokenizer / Splitter.
//!
//! A single character-classification pass backs both public operations:
//! splitting a batch script into executable sub-commands, and producing a
//! token stream for `CREATE`-head parsing. Both must ignore content inside
//! single-quoted strings, bracketed identifiers, line comments and block
//! comments, and both fail with `ScriptSyntax` on an unterminated string
//! or comment.

use dbex_connector::error::{DbExError, DbExResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Code,
    SingleQuoted,
    Bracketed(char),
    LineComment,
    BlockComment,
}

struct Classified {
    /// One entry per `char`, in source order, paired with its byte offset.
    chars: Vec<(usize, char, Class)>,
}

fn classify(sql: &str, bracket_pairs: &[(char, char)]) -> DbExResult<Classified> {
    let mut chars = Vec::with_capacity(sql.len());
    let mut state = Class::Code;
    let mut iter = sql.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        let this_state = state;
        match state {
            Class::Code => {
                if c == '\'' {
                    state = Class::SingleQuoted;
                } else if c == '-' && matches!(iter.peek(), Some((_, '-'))) {
                    iter.next();
                    chars.push((i, c, Class::LineComment));
                    chars.push((i + 1, '-', Class::LineComment));
                    state = Class::LineComment;
                    continue;
                } else if c == '/' && matches!(iter.peek(), Some((_, '*'))) {
                    iter.next();
                    chars.push((i, c, Class::BlockComment));
                    chars.push((i + 1, '*', Class::BlockComment));
                    state = Class::BlockComment;
                    continue;
                } else if let Some(&(_, close)) = bracket_pairs.iter().find(|(open, _)| *open == c) {
                    state = Class::Bracketed(close);
                }
            }
            Class::SingleQuoted => {
                if c == '\'' {
                    if matches!(iter.peek(), Some((_, '\''))) {
                        // Escaped '' — consume both, stay quoted.
                        let (j, q) = iter.next().unwrap();
                        chars.push((i, c, this_state));
                        chars.push((j, q, this_state));
                        continue;
                    }
                    state = Class::Code;
                }
            }
            Class::Bracketed(close) => {
                if c == close {
                    state = Class::Code;
                }
            }
            Class::LineComment => {
                if c == '\n' {
                    state = Class::Code;
                }
            }
            Class::BlockComment => {
                if c == '*' && matches!(iter.peek(), Some((_, '/'))) {
                    let (j, slash) = iter.next().unwrap();
                    chars.push((i, c, this_state));
                    chars.push((j, slash, this_state));
                    state = Class::Code;
                    continue;
                }
            }
        }
        chars.push((i, c, this_state));
    }

    match state {
        Class::SingleQuoted => Err(syntax_error(sql.len(), "unterminated string literal")),
        Class::BlockComment => Err(syntax_error(sql.len(), "unterminated block comment")),
        Class::Bracketed(close) => Err(syntax_error(sql.len(), &format!("unterminated bracketed identifier (expected `{close}`)"))),
        Class::Code | Class::LineComment => Ok(Classified { chars }),
    }
}

fn syntax_error(offset: usize, message: &str) -> DbExError {
    DbExError::ScriptSyntax {
        script: String::new(),
        offset,
        message: message.to_string(),
    }
}

fn with_script_name(mut err: DbExError, script: &str) -> DbExError {
    if let DbExError::ScriptSyntax { script: s, .. } = &mut err {
        *s = script.to_string();
    }
    err
}

/// Split `sql` on MySQL/PostgreSQL-style semicolon boundaries, honouring
/// string literals, bracketed identifiers and comments. Empty statements
/// (only whitespace/comments) are dropped.
pub fn split_on_semicolons(sql: &str, script_name: &str, bracket_pairs: &[(char, char)]) -> DbExResult<Vec<String>> {
    let classified = classify(sql, bracket_pairs).map_err(|e| with_script_name(e, script_name))?;
    let mut statements = Vec::new();
    let mut start = 0usize;
    for &(offset, c, class) in &classified.chars {
        if class == Class::Code && c == ';' {
            let piece = &sql[start..offset];
            if !is_blank(piece) {
                statements.push(piece.trim().to_string());
            }
            start = offset + c.len_utf8();
        }
    }
    let tail = &sql[start..];
    if !is_blank(tail) {
        statements.push(tail.trim().to_string());
    }
    Ok(statements)
}

/// Split `sql` on SQL Server-style `GO` batch separators: a physical line
/// whose trimmed content equals `GO`, case-insensitive, and which is not
/// itself inside a string or comment that spans multiple lines. Empty
/// batches are dropped.
pub fn split_on_go(sql: &str, script_name: &str) -> DbExResult<Vec<String>> {
    let classified = classify(sql, &[('[', ']')]).map_err(|e| with_script_name(e, script_name))?;

    // Map each byte offset to whether it sits in `Code` state, to decide if
    // an apparent `GO` line is really a batch separator.
    let mut code_at = vec![false; sql.len() + 1];
    for &(offset, c, class) in &classified.chars {
        code_at[offset] = class == Class::Code;
        let _ = c;
    }

    let mut statements = Vec::new();
    let mut start = 0usize;
    let mut line_start = 0usize;
    for (i, c) in sql.char_indices() {
        if c == '\n' {
            push_batch_if_go(sql, line_start, i, start, &code_at, &mut statements, &mut start);
            line_start = i + 1;
        }
    }
    push_batch_if_go(sql, line_start, sql.len(), start, &code_at, &mut statements, &mut start);

    let tail = &sql[start..];
    if !is_blank(tail) {
        statements.push(tail.trim().to_string());
    }
    Ok(statements)
}

fn push_batch_if_go(
    sql: &str,
    line_start: usize,
    line_end: usize,
    batch_start: usize,
    code_at: &[bool],
    statements: &mut Vec<String>,
    new_start: &mut usize,
) {
    let line = &sql[line_start..line_end];
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("go") && line.char_indices().all(|(off, _)| code_at[line_start + off]) {
        let piece = &sql[batch_start..line_start];
        if !is_blank(piece) {
            statements.push(piece.trim().to_string());
        }
        *new_start = line_end + 1;
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// A significant token produced for `CREATE`-head parsing. Comments and
/// whitespace are omitted entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    QuotedIdent(String),
    StringLiteral(String),
    Dot,
    Other(char),
}

/// Tokenize `sql` for header inspection, ignoring comments.
pub fn tokenize(sql: &str, script_name: &str, bracket_pairs: &[(char, char)]) -> DbExResult<Vec<Token>> {
    let classified = classify(sql, bracket_pairs).map_err(|e| with_script_name(e, script_name))?;
    let mut tokens = Vec::new();
    let mut i = 0usize;
    let n = classified.chars.len();
    while i < n {
        let (_, c, class) = classified.chars[i];
        match class {
            Class::LineComment | Class::BlockComment => {
                i += 1;
            }
            Class::SingleQuoted => {
                let mut s = String::new();
                while i < n && classified.chars[i].2 == Class::SingleQuoted {
                    s.push(classified.chars[i].1);
                    i += 1;
                }
                tokens.push(Token::StringLiteral(unescape_single_quotes(&s)));
            }
            Class::Bracketed(_) => {
                let mut s = String::new();
                while i < n {
                    if let Class::Bracketed(_) = classified.chars[i].2 {
                        s.push(classified.chars[i].1);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::QuotedIdent(s));
            }
            Class::Code => {
                if c.is_whitespace() {
                    i += 1;
                } else if c == '.' {
                    tokens.push(Token::Dot);
                    i += 1;
                } else if c.is_alphanumeric() || c == '_' {
                    let mut s = String::new();
                    while i < n {
                        let (_, cc, cl) = classified.chars[i];
                        if cl == Class::Code && (cc.is_alphanumeric() || cc == '_') {
                            s.push(cc);
                            i += 1;
                        } else {
                            break;
                        }
                    }
                    tokens.push(Token::Word(s));
                } else {
                    tokens.push(Token::Other(c));
                    i += 1;
                }
            }
        }
    }
    Ok(tokens)
}

fn unescape_single_quotes(s: &str) -> String {
    // `s` is the raw content between (and not including) the enclosing
    // quotes, with doubled `''` still doubled; collapse to one.
    let inner = s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')).unwrap_or(s);
    inner.replace("''", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: [(char, char); 1] = [('[', ']')];

    #[test]
    fn splits_on_semicolons_ignoring_strings_and_comments() {
        let sql = "INSERT INTO t VALUES ('a;b'); -- comment ; here\nSELECT 1;";
        let stmts = split_on_semicolons(sql, "s.sql", &SQUARE).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("'a;b'"));
    }

    #[test]
    fn splits_on_semicolons_ignoring_bracketed_identifiers() {
        let sql = "SELECT [a;b] FROM t; SELECT 2;";
        let stmts = split_on_semicolons(sql, "s.sql", &SQUARE).unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn unterminated_string_is_syntax_error() {
        let err = split_on_semicolons("SELECT 'abc", "s.sql", &SQUARE).unwrap_err();
        match err {
            DbExError::ScriptSyntax { script, .. } => assert_eq!(script, "s.sql"),
            _ => panic!("expected ScriptSyntax"),
        }
    }

    #[test]
    fn unterminated_block_comment_is_syntax_error() {
        let err = split_on_semicolons("SELECT 1; /* oops", "s.sql", &SQUARE).unwrap_err();
        assert!(matches!(err, DbExError::ScriptSyntax { .. }));
    }

    #[test]
    fn splits_on_go_lines_case_insensitively() {
        let sql = "CREATE TABLE t (id INT);\nGo\nINSERT INTO t VALUES (1);\nGO";
        let batches = split_on_go(sql, "s.sql").unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches[0].starts_with("CREATE TABLE"));
        assert!(batches[1].starts_with("INSERT"));
    }

    #[test]
    fn go_inside_a_string_is_not_a_separator() {
        let sql = "SELECT 'go';\nGO";
        let batches = split_on_go(sql, "s.sql").unwrap();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].contains("'go'"));
    }

    #[test]
    fn tokenizes_create_head() {
        let tokens = tokenize("CREATE OR ALTER VIEW [dbo].[MyView] AS SELECT 1", "s.sql", &SQUARE).unwrap();
        assert_eq!(
            tokens[..6],
            [
                Token::Word("CREATE".into()),
                Token::Word("OR".into()),
                Token::Word("ALTER".into()),
                Token::Word("VIEW".into()),
                Token::QuotedIdent("dbo".into()),
                Token::Dot,
            ]
        );
    }
}
