//! Small SQL text utilities: identifier checks and statement splitting.

use std::sync::LazyLock;

use regex::Regex;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|e| panic!("identifier regex: {e}"))
});

/// Returns `true` if `name` can be used unquoted as a table, column or index
/// name.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Returns `true` if the statement only reads (its leading keyword is
/// `SELECT`, `WITH`, `PRAGMA`, `EXPLAIN` or `VALUES`).
#[must_use]
pub fn is_read_only(sql: &str) -> bool {
    let keyword: String = sql
        .trim_start()
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();
    matches!(
        keyword.to_ascii_uppercase().as_str(),
        "SELECT" | "WITH" | "PRAGMA" | "EXPLAIN" | "VALUES"
    )
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SplitState {
    Normal,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Splits a script into individual statements.
///
/// Semicolons inside `'...'`, `"..."` and `` `...` `` are kept; `--` line
/// comments and `/* */` block comments are dropped; empty statements are
/// skipped. Doubled quotes (`'it''s'`) need no special casing: the string is
/// closed and immediately reopened.
#[must_use]
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = SplitState::Normal;
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            SplitState::Normal => match c {
                '\'' | '"' | '`' => {
                    state = SplitState::Quoted(c);
                    current.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = SplitState::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = SplitState::BlockComment;
                }
                ';' => push_statement(&mut statements, &mut current),
                _ => current.push(c),
            },
            SplitState::Quoted(quote) => {
                current.push(c);
                if c == quote {
                    state = SplitState::Normal;
                }
            }
            SplitState::LineComment => {
                if c == '\n' {
                    current.push('\n');
                    state = SplitState::Normal;
                }
            }
            SplitState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    current.push(' ');
                    state = SplitState::Normal;
                }
            }
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}
