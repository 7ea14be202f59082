#![no_main]
//! Structured SQL fuzzing
//!
//! Builds SQL-like statements from structured input: a keyword, a body, a run of
//! placeholders and an optional quoted literal holding question marks. Checks
//! that only the placeholders outside the literal are numbered.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use transwarp_db::{detect_query_type, rewrite_placeholders, should_use_query};

/// SQL-like input for fuzzing
#[derive(Debug, Arbitrary)]
struct SqlInput<'a> {
    /// Optional leading whitespace
    leading_whitespace: Option<&'a str>,
    /// SQL keyword (may be mangled)
    keyword: SqlKeyword,
    /// Body of the SQL
    body: &'a str,
    /// Optional RETURNING clause
    has_returning: bool,
    /// Number of bare placeholders appended after the body
    placeholders: u8,
    /// Question marks placed inside a string literal
    quoted_marks: u8,
}

/// SQL keywords to test
#[derive(Debug, Arbitrary)]
enum SqlKeyword {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Begin,
    Commit,
    Rollback,
    Pragma,
    With,
    Explain,
    /// Random bytes as keyword
    Random(u8, u8, u8, u8, u8, u8),
}

impl SqlKeyword {
    fn as_str(&self) -> String {
        match self {
            SqlKeyword::Select => "SELECT".to_string(),
            SqlKeyword::Insert => "INSERT".to_string(),
            SqlKeyword::Update => "UPDATE".to_string(),
            SqlKeyword::Delete => "DELETE".to_string(),
            SqlKeyword::Create => "CREATE".to_string(),
            SqlKeyword::Drop => "DROP".to_string(),
            SqlKeyword::Alter => "ALTER".to_string(),
            SqlKeyword::Begin => "BEGIN".to_string(),
            SqlKeyword::Commit => "COMMIT".to_string(),
            SqlKeyword::Rollback => "ROLLBACK".to_string(),
            SqlKeyword::Pragma => "PRAGMA".to_string(),
            SqlKeyword::With => "WITH".to_string(),
            SqlKeyword::Explain => "EXPLAIN".to_string(),
            SqlKeyword::Random(a, b, c, d, e, f) => {
                format!(
                    "{}{}{}{}{}{}",
                    char::from(*a),
                    char::from(*b),
                    char::from(*c),
                    char::from(*d),
                    char::from(*e),
                    char::from(*f)
                )
            }
        }
    }
}

fuzz_target!(|input: SqlInput| {
    let mut prefix = String::new();

    if let Some(ws) = input.leading_whitespace {
        prefix.push_str(ws);
    }

    prefix.push_str(&input.keyword.as_str());
    prefix.push(' ');
    prefix.push_str(input.body);

    // Keep the prefix from opening a literal or comment that would swallow the rest
    let mut sql: String = prefix
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | '`' | '[' | '-' | '/' | '?'))
        .collect();

    sql.push_str(" '");
    sql.push_str(&"?".repeat(usize::from(input.quoted_marks)));
    sql.push('\'');

    for _ in 0..input.placeholders {
        sql.push_str(", ?");
    }

    if input.has_returning {
        sql.push_str(" RETURNING *");
    }

    let _ = should_use_query(&sql);
    let _ = detect_query_type(&sql);

    let (_, count) = rewrite_placeholders(&sql);
    assert_eq!(count, usize::from(input.placeholders), "sql: {sql:?}");
});
