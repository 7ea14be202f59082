#![no_main]
//! Fuzz test for placeholder rewriting
//!
//! Every statement passes through rewrite_placeholders before it reaches the
//! driver, so it must accept any text. A rewritten statement must also be stable
//! under a second rewrite and report the same parameter count.

use libfuzzer_sys::fuzz_target;
use transwarp_db::rewrite_placeholders;

fuzz_target!(|data: &[u8]| {
    if let Ok(sql) = std::str::from_utf8(data) {
        let (once, count) = rewrite_placeholders(sql);
        let (twice, recount) = rewrite_placeholders(&once);
        assert_eq!(once, twice);
        assert_eq!(count, recount);
    }
});
