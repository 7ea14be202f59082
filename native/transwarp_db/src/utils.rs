/// Utility functions and helpers for transwarp_db
///
/// This module provides the SQL text helpers used by the executor and the driver:
/// placeholder rewriting, statement classification, identifier quoting, INSERT
/// construction and statement timing.
use std::time::{Duration, Instant};

/// Rewrite portable `?` placeholders into LibSQL's numbered `?N` form.
///
/// Returns the rewritten SQL and the number of parameters it expects. Question
/// marks inside string literals, quoted identifiers and comments are left alone.
/// Already numbered placeholders (`?3`) are kept, and a bare `?` takes the next
/// number after the highest seen so far, matching SQLite's own numbering.
///
/// Values are never spliced into the text; they are bound by the driver.
pub fn rewrite_placeholders(sql: &str) -> (String, usize) {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Normal,
        Quoted(char),
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut highest = 0usize;
    let mut state = State::Normal;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                '\'' | '"' | '`' => {
                    state = State::Quoted(c);
                    out.push(c);
                }
                '[' => {
                    state = State::Quoted(']');
                    out.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    state = State::LineComment;
                    out.push(c);
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = State::BlockComment;
                    out.push(c);
                    out.push('*');
                    chars.next();
                }
                '?' => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        digits.push(d);
                        chars.next();
                    }
                    out.push('?');
                    if digits.is_empty() {
                        highest = highest.saturating_add(1);
                        out.push_str(&highest.to_string());
                    } else {
                        if let Ok(n) = digits.parse::<usize>() {
                            highest = highest.max(n);
                        }
                        out.push_str(&digits);
                    }
                }
                _ => out.push(c),
            },
            State::Quoted(close) => {
                if c == close {
                    state = State::Normal;
                }
                out.push(c);
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Normal;
                }
                out.push(c);
            }
            State::BlockComment => {
                out.push(c);
                if c == '*' && chars.peek() == Some(&'/') {
                    out.push('/');
                    chars.next();
                    state = State::Normal;
                }
            }
        }
    }

    (out, highest)
}

/// Query type enumeration, keyed on a statement's first keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    With,
    Create,
    Drop,
    Alter,
    Begin,
    Commit,
    Rollback,
    Pragma,
    Other,
}

impl QueryType {
    /// Statements that must run inside a driver transaction when autocommit is off.
    ///
    /// `WITH` is not included: whether it writes depends on what follows the
    /// common table expressions, see [`statement_writes`].
    pub fn needs_transaction(self) -> bool {
        matches!(
            self,
            QueryType::Insert
                | QueryType::Update
                | QueryType::Delete
                | QueryType::Replace
                | QueryType::Create
                | QueryType::Drop
                | QueryType::Alter
        )
    }
}

/// Whether a statement modifies the database and so must open a transaction.
///
/// A `WITH` statement writes when a write keyword appears outside string
/// literals, quoted identifiers and comments. A read-only CTE does not open a
/// transaction, so it never holds a read snapshot past the statement.
pub fn statement_writes(sql: &str) -> bool {
    match detect_query_type(sql) {
        QueryType::With => bare_words(sql).iter().any(|word| {
            ["INSERT", "UPDATE", "DELETE", "REPLACE"]
                .iter()
                .any(|k| word.eq_ignore_ascii_case(k))
        }),
        other => other.needs_transaction(),
    }
}

/// Words of a statement that are not inside literals, quoted identifiers or comments.
fn bare_words(sql: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = None;
    let mut quote = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(close) = quote {
            if c == close {
                quote = None;
            }
            continue;
        }

        if c.is_ascii_alphanumeric() || c == '_' {
            start.get_or_insert(i);
            continue;
        }
        if let Some(s) = start.take() {
            words.push(&sql[s..i]);
        }

        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '[' => quote = Some(']'),
            '-' if chars.peek().map(|&(_, n)| n) == Some('-') => {
                for (_, n) in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek().map(|&(_, n)| n) == Some('*') => {
                chars.next();
                let mut prev = ' ';
                for (_, n) in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            _ => {}
        }
    }

    if let Some(s) = start {
        words.push(&sql[s..]);
    }
    words
}

/// Detect the query type from a SQL statement
///
/// Examines the first keyword to categorize the statement.
pub fn detect_query_type(sql: &str) -> QueryType {
    let keyword = first_keyword(sql);

    const KEYWORDS: [(&str, QueryType); 14] = [
        ("SELECT", QueryType::Select),
        ("INSERT", QueryType::Insert),
        ("UPDATE", QueryType::Update),
        ("DELETE", QueryType::Delete),
        ("REPLACE", QueryType::Replace),
        ("WITH", QueryType::With),
        ("CREATE", QueryType::Create),
        ("DROP", QueryType::Drop),
        ("ALTER", QueryType::Alter),
        ("BEGIN", QueryType::Begin),
        ("COMMIT", QueryType::Commit),
        ("END", QueryType::Commit),
        ("ROLLBACK", QueryType::Rollback),
        ("PRAGMA", QueryType::Pragma),
    ];

    KEYWORDS
        .iter()
        .find(|(k, _)| keyword.eq_ignore_ascii_case(k))
        .map_or(QueryType::Other, |(_, t)| *t)
}

/// Determines if a statement returns rows and must be read through `query()`.
///
/// True for statements starting with SELECT, VALUES, EXPLAIN or PRAGMA, for a
/// read-only WITH, and for any statement carrying a RETURNING clause. A WITH that
/// prefixes a write goes through `execute()` so its affected row count is kept.
///
/// ## Limitation: String and Comment Handling
///
/// This is keyword matching, not SQL parsing; a RETURNING inside a string literal
/// also matches. False positives are safe (`query()` works for any statement),
/// false negatives would lose rows.
pub fn should_use_query(sql: &str) -> bool {
    let keyword = first_keyword(sql);
    if ["SELECT", "VALUES", "EXPLAIN", "PRAGMA"]
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
    {
        return true;
    }
    if keyword.eq_ignore_ascii_case("WITH") && !statement_writes(sql) {
        return true;
    }

    sql.split(|c: char| c.is_ascii_whitespace() || c == '(' || c == ')' || c == ',')
        .any(|word| word.eq_ignore_ascii_case("RETURNING"))
}

/// First keyword of a statement, skipping leading whitespace and comments.
fn first_keyword(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }

    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Quote an identifier with backticks, doubling any embedded backtick.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Build an INSERT statement naming the given columns in order.
///
/// One portable `?` placeholder is emitted per column. An empty column list
/// inserts a row of defaults.
pub fn build_insert_sql<'a>(table: &str, columns: impl IntoIterator<Item = &'a str>) -> String {
    let columns: Vec<String> = columns.into_iter().map(quote_identifier).collect();
    if columns.is_empty() {
        return format!("insert into {} default values", quote_identifier(table));
    }

    let placeholders = vec!["?"; columns.len()].join(",");
    format!(
        "insert into {} ({}) values ({})",
        quote_identifier(table),
        columns.join(","),
        placeholders
    )
}

/// Log a finished statement with its elapsed time.
///
/// Statements at or above `slow` are logged at warn level.
pub fn record_statement(sql: &str, params: usize, started: Instant, slow: Duration, ok: bool) {
    let elapsed = started.elapsed();
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    if elapsed >= slow {
        tracing::warn!(sql, params, elapsed_ms, success = ok, "slow statement");
    } else {
        tracing::debug!(sql, params, elapsed_ms, success = ok, "statement finished");
    }
}
