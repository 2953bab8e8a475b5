//! The per-column mini-language.
//!
//! ```text
//! TYPE [PRIMARY KEY] [NOT NULL] [UNIQUE] [ENUM(v1,v2,...)]
//!      [DEFAULT (now|null|true|false|NUMBER|'STR'|(RAW))]
//!      [-> table.column [ON DELETE] (cascade|restrict|set null|set default|no action)]
//! ```
//!
//! Keywords are case-insensitive and modifiers may come in any order after
//! the type. `boolean` and `timestamp_ms` are integer columns with a mode.

use super::{Column, ColumnMode, ColumnType, DefaultValue, Literal, OnDelete, Reference};
use crate::error::{SchemaError, SchemaResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Group(String),
    Arrow,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Word(w) => w.clone(),
            Self::Str(s) => format!("'{s}'"),
            Self::Group(g) => format!("({g})"),
            Self::Arrow => "->".to_string(),
        }
    }
}

/// Location of the column being parsed, for error messages.
struct Ctx<'a> {
    table: &'a str,
    column: &'a str,
}

impl Ctx<'_> {
    fn unexpected(&self, found: impl Into<String>) -> SchemaError {
        SchemaError::UnexpectedToken {
            table: self.table.to_string(),
            column: self.column.to_string(),
            found: found.into(),
        }
    }

    fn missing(&self, keyword: &str, expected: &'static str) -> SchemaError {
        SchemaError::MissingArgument {
            table: self.table.to_string(),
            column: self.column.to_string(),
            keyword: keyword.to_string(),
            expected,
        }
    }

    fn unterminated(&self, what: &'static str) -> SchemaError {
        SchemaError::Unterminated {
            table: self.table.to_string(),
            column: self.column.to_string(),
            what,
        }
    }
}

fn tokenize(ctx: &Ctx<'_>, input: &str) -> SchemaResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '\'' {
            let (text, next) = read_string(ctx, &chars, i)?;
            tokens.push(Token::Str(text));
            i = next;
        } else if c == '(' {
            let (text, next) = read_group(ctx, &chars, i)?;
            tokens.push(Token::Group(text));
            i = next;
        } else if c == '-' && chars.get(i + 1) == Some(&'>') {
            tokens.push(Token::Arrow);
            i += 2;
        } else {
            let start = i;
            while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '(' && chars[i] != '\''
            {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        }
    }
    Ok(tokens)
}

/// Reads a `'...'` literal starting at `start`; `''` is an escaped quote.
fn read_string(ctx: &Ctx<'_>, chars: &[char], start: usize) -> SchemaResult<(String, usize)> {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                text.push('\'');
                i += 2;
                continue;
            }
            return Ok((text, i + 1));
        }
        text.push(chars[i]);
        i += 1;
    }
    Err(ctx.unterminated("string"))
}

/// Reads a balanced `(...)` group starting at `start`, returning its inner
/// text verbatim. Parentheses inside quotes do not count.
fn read_group(ctx: &Ctx<'_>, chars: &[char], start: usize) -> SchemaResult<(String, usize)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let inner: String = chars[start + 1..i].iter().collect();
                        return Ok((inner.trim().to_string(), i + 1));
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    Err(ctx.unterminated("group"))
}

fn parse_type(ctx: &Ctx<'_>, word: &str) -> SchemaResult<(ColumnType, Option<ColumnMode>)> {
    let parsed = match word.to_ascii_lowercase().as_str() {
        "text" => (ColumnType::Text, None),
        "integer" => (ColumnType::Integer, None),
        "real" => (ColumnType::Real, None),
        "blob" => (ColumnType::Blob, None),
        "json" => (ColumnType::Json, None),
        "boolean" => (ColumnType::Integer, Some(ColumnMode::Boolean)),
        "timestamp_ms" => (ColumnType::Integer, Some(ColumnMode::TimestampMs)),
        _ => {
            return Err(SchemaError::UnknownType {
                table: ctx.table.to_string(),
                column: ctx.column.to_string(),
                found: word.to_string(),
            })
        }
    };
    Ok(parsed)
}

fn parse_number(word: &str) -> Option<Literal> {
    if let Ok(i) = word.parse::<i64>() {
        return Some(Literal::Int(i));
    }
    word.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Literal::Float)
}

/// Splits `a, 'b', c` into values, stripping optional single quotes. Inside
/// a quoted value `''` is an escaped quote.
fn split_enum_values(group: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = group.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if quoted && chars.peek() == Some(&'\'') => {
                chars.next();
                current.push('\'');
            }
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                values.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        values.push(current.trim().to_string());
    }
    values
}

struct Parser<'a> {
    ctx: Ctx<'a>,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_word(&self) -> Option<String> {
        match self.tokens.get(self.pos) {
            Some(Token::Word(w)) => Some(w.to_ascii_lowercase()),
            _ => None,
        }
    }

    fn expect_word(&mut self, keyword: &str, expected: &'static str) -> SchemaResult<String> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w.to_ascii_lowercase()),
            Some(other) => Err(self.ctx.unexpected(other.describe())),
            None => Err(self.ctx.missing(keyword, expected)),
        }
    }

    fn expect_keyword(&mut self, keyword: &str, wanted: &'static str) -> SchemaResult<()> {
        let word = self.expect_word(keyword, wanted)?;
        if word == wanted {
            Ok(())
        } else {
            Err(self.ctx.unexpected(word))
        }
    }

    fn parse_default(&mut self) -> SchemaResult<DefaultValue> {
        let value = match self.next() {
            Some(Token::Group(raw)) => return Ok(DefaultValue::Raw { sql: raw }),
            Some(Token::Str(s)) => Literal::Text(s),
            Some(Token::Word(w)) => match w.to_ascii_lowercase().as_str() {
                "now" => Literal::Now,
                "null" => Literal::Null,
                "true" => Literal::Bool(true),
                "false" => Literal::Bool(false),
                _ => parse_number(&w).ok_or_else(|| self.ctx.unexpected(w.clone()))?,
            },
            Some(Token::Arrow) => return Err(self.ctx.unexpected("->")),
            None => return Err(self.ctx.missing("default", "a value")),
        };
        Ok(DefaultValue::Value { value })
    }

    fn parse_reference(&mut self) -> SchemaResult<Reference> {
        let target = match self.next() {
            Some(Token::Word(w)) => w,
            Some(other) => return Err(self.ctx.unexpected(other.describe())),
            None => return Err(self.ctx.missing("->", "table.column")),
        };
        let (table, column) = target
            .split_once('.')
            .filter(|(t, c)| !t.is_empty() && !c.is_empty())
            .ok_or_else(|| self.ctx.unexpected(target.clone()))?;
        let mut reference = Reference {
            table: table.to_string(),
            column: column.to_string(),
            on_delete: None,
        };

        let Some(word) = self.peek_word() else {
            return Ok(reference);
        };
        let on_delete = match word.as_str() {
            "on" => {
                self.pos += 1;
                self.expect_keyword("on", "delete")?;
                Some(self.parse_action()?)
            }
            "ondelete" | "cascade" | "restrict" | "set" | "no" => {
                if word == "ondelete" {
                    self.pos += 1;
                }
                Some(self.parse_action()?)
            }
            _ => None,
        };
        reference.on_delete = on_delete;
        Ok(reference)
    }

    fn parse_action(&mut self) -> SchemaResult<OnDelete> {
        let word = self.expect_word("on delete", "an action")?;
        match word.as_str() {
            "cascade" => Ok(OnDelete::Cascade),
            "restrict" => Ok(OnDelete::Restrict),
            "set" => match self.expect_word("set", "null or default")?.as_str() {
                "null" => Ok(OnDelete::SetNull),
                "default" => Ok(OnDelete::SetDefault),
                other => Err(self.ctx.unexpected(other)),
            },
            "no" => {
                self.expect_keyword("no", "action")?;
                Ok(OnDelete::NoAction)
            }
            other => Err(self.ctx.unexpected(other)),
        }
    }
}

/// Parses one column definition written in the DSL.
///
/// # Errors
///
/// Returns a [`SchemaError`] describing the first token that does not fit
/// the grammar.
pub fn parse_column(table: &str, name: &str, dsl: &str) -> SchemaResult<Column> {
    let ctx = Ctx {
        table,
        column: name,
    };
    let tokens = tokenize(&ctx, dsl)?;
    let mut parser = Parser {
        ctx,
        tokens,
        pos: 0,
    };

    let (column_type, mode) = match parser.next() {
        Some(Token::Word(w)) => parse_type(&parser.ctx, &w)?,
        Some(other) => return Err(parser.ctx.unexpected(other.describe())),
        None => {
            return Err(SchemaError::EmptyDefinition {
                table: table.to_string(),
                column: name.to_string(),
            })
        }
    };
    let mut column = Column::new(name, column_type);
    column.mode = mode;

    while let Some(token) = parser.next() {
        match token {
            Token::Arrow => column.references = Some(parser.parse_reference()?),
            Token::Word(w) => match w.to_ascii_lowercase().as_str() {
                "primary" => {
                    parser.expect_keyword("primary", "key")?;
                    column.primary_key = true;
                }
                "not" => {
                    parser.expect_keyword("not", "null")?;
                    column.not_null = true;
                }
                "null" => column.not_null = false,
                "unique" => column.unique = true,
                "enum" => match parser.next() {
                    Some(Token::Group(values)) => {
                        column.enum_values = Some(split_enum_values(&values));
                    }
                    Some(other) => return Err(parser.ctx.unexpected(other.describe())),
                    None => return Err(parser.ctx.missing("enum", "(v1,v2,...)")),
                },
                "default" => column.default = Some(parser.parse_default()?),
                _ => return Err(parser.ctx.unexpected(w)),
            },
            other => return Err(parser.ctx.unexpected(other.describe())),
        }
    }

    Ok(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column_definition;

    fn col(dsl: &str) -> Column {
        parse_column("t", "c", dsl).unwrap()
    }

    #[test]
    fn plain_types() {
        assert_eq!(col("text").column_type, ColumnType::Text);
        assert_eq!(col("REAL").column_type, ColumnType::Real);
        assert_eq!(col("json").column_type, ColumnType::Json);
    }

    #[test]
    fn aliases_set_mode() {
        let flag = col("boolean not null default false");
        assert_eq!(flag.column_type, ColumnType::Integer);
        assert_eq!(flag.mode, Some(ColumnMode::Boolean));
        assert_eq!(
            flag.default,
            Some(DefaultValue::Value {
                value: Literal::Bool(false)
            })
        );

        let ts = col("timestamp_ms not null default now");
        assert_eq!(ts.mode, Some(ColumnMode::TimestampMs));
        assert_eq!(
            ts.default,
            Some(DefaultValue::Value {
                value: Literal::Now
            })
        );
    }

    #[test]
    fn constraints_in_any_order() {
        let c = col("text unique not null");
        assert!(c.unique);
        assert!(c.not_null);
        assert!(!c.primary_key);
        assert!(col("integer primary key").primary_key);
    }

    #[test]
    fn enum_values() {
        let c = col("text not null enum('draft', 'published',archived)");
        assert_eq!(
            c.enum_values,
            Some(vec![
                "draft".to_string(),
                "published".to_string(),
                "archived".to_string()
            ])
        );
    }

    #[test]
    fn enum_values_with_escaped_quotes() {
        let c = col("text enum('it''s', 'a,b', plain)");
        assert_eq!(
            c.enum_values,
            Some(vec![
                "it's".to_string(),
                "a,b".to_string(),
                "plain".to_string()
            ])
        );
        assert!(column_definition(&c).ends_with("CHECK (c IN ('it''s', 'a,b', 'plain'))"));
    }

    #[test]
    fn default_forms() {
        assert_eq!(
            col("text default 'it''s'").default,
            Some(DefaultValue::Value {
                value: Literal::Text("it's".into())
            })
        );
        assert_eq!(
            col("real default -1.5").default,
            Some(DefaultValue::Value {
                value: Literal::Float(-1.5)
            })
        );
        assert_eq!(
            col("integer default 0").default,
            Some(DefaultValue::Value {
                value: Literal::Int(0)
            })
        );
        assert_eq!(
            col("text default (datetime('now', 'localtime'))").default,
            Some(DefaultValue::Raw {
                sql: "datetime('now', 'localtime')".into()
            })
        );
    }

    #[test]
    fn references_with_actions() {
        let c = col("integer not null -> users.id cascade");
        let r = c.references.unwrap();
        assert_eq!(r.table, "users");
        assert_eq!(r.column, "id");
        assert_eq!(r.on_delete, Some(OnDelete::Cascade));

        let c = col("integer ->users.id on delete set null");
        assert_eq!(c.references.unwrap().on_delete, Some(OnDelete::SetNull));

        let c = col("integer -> users.id");
        assert_eq!(c.references.unwrap().on_delete, None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            parse_column("t", "c", "varchar"),
            Err(SchemaError::UnknownType { .. })
        ));
        assert!(matches!(
            parse_column("t", "c", "text sparkly"),
            Err(SchemaError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_column("t", "c", "text default 'open"),
            Err(SchemaError::Unterminated { what: "string", .. })
        ));
        assert!(matches!(
            parse_column("t", "c", "text default"),
            Err(SchemaError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse_column("t", "c", "  "),
            Err(SchemaError::EmptyDefinition { .. })
        ));
        assert!(matches!(
            parse_column("t", "c", "integer -> users"),
            Err(SchemaError::UnexpectedToken { .. })
        ));
    }
}
