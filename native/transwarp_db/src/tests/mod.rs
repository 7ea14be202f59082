//! Unit tests for transwarp_db
//!
//! Tests are organized into submodules that follow the main library modules.
//! Context, scope and executor tests run against a recording driver bound to the
//! calling test thread; they never touch the process-wide engine.

mod scope_tests;
