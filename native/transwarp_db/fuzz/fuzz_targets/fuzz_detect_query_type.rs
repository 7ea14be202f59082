#![no_main]
//! Fuzz test for statement classification
//!
//! detect_query_type decides whether the driver opens a transaction before a
//! statement, and should_use_query decides whether its rows are buffered. Both
//! must handle all inputs without panicking.

use libfuzzer_sys::fuzz_target;
use transwarp_db::{detect_query_type, should_use_query, QueryType};

fuzz_target!(|data: &[u8]| {
    if let Ok(sql) = std::str::from_utf8(data) {
        let query_type = detect_query_type(sql);
        let uses_query = should_use_query(sql);

        if query_type == QueryType::Select {
            assert!(uses_query, "SELECT must be read through query(): {sql:?}");
        }
    }
});
