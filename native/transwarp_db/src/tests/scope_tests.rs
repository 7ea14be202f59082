//! Tests for scopes, transactions and the statement executor
//!
//! Each test runs on its own thread, so the thread-local context starts empty.
//! The outermost scope is bound to a recording driver; everything inside uses
//! the public API exactly as model code would.

use super::test_utils::{Event, RecordingDriver};
use crate::context;
use crate::error::Error;
use crate::models::Value;
use crate::params;
use crate::query::{insert, select, select_int, select_one, select_scalar, update, Statement};
use crate::scope::{with_connection, ConnectionScope};
use crate::transaction::{with_transaction, TransactionScope};
use std::time::Duration;

fn execute_event(sql: &str, params: Vec<Value>) -> Event {
    Event::Execute {
        sql: sql.to_string(),
        params,
        timeout: None,
    }
}

mod connection_scopes {
    use super::*;

    #[test]
    fn test_entering_a_scope_does_not_connect() {
        let driver = RecordingDriver::new();
        let scope = driver.scope();
        assert!(scope.owns_initialization());
        assert!(context::is_initialized());
        scope.exit().unwrap();

        assert!(!context::is_initialized());
        assert!(driver.events().is_empty());
    }

    #[test]
    fn test_nested_scopes_share_one_connection() {
        let driver = RecordingDriver::new();
        let outer = driver.scope();
        update("update t set a=1", params![]).unwrap();
        let outer_id = context::connection_id().unwrap();

        let inner = ConnectionScope::enter();
        assert!(!inner.owns_initialization());
        update("update t set a=2", params![]).unwrap();
        assert_eq!(context::connection_id(), Some(outer_id));
        inner.exit().unwrap();

        // The inner scope did not initialize the context, so it is still usable
        assert!(context::is_initialized());
        update("update t set a=3", params![]).unwrap();
        assert_eq!(driver.count(&Event::Close), 0);

        outer.exit().unwrap();
        assert!(!context::is_initialized());
        assert_eq!(driver.count(&Event::Connect), 1);
        assert_eq!(driver.count(&Event::Close), 1);
    }

    #[test]
    fn test_with_connection_joins_enclosing_scope() {
        let driver = RecordingDriver::new();
        let _outer = driver.scope();

        let ids = with_connection(|| {
            update("update t set a=1", params![])?;
            let first = context::connection_id();
            with_connection(|| {
                update("update t set a=2", params![])?;
                Ok((first, context::connection_id()))
            })
        })
        .unwrap();

        assert_eq!(ids.0, ids.1);
        assert!(context::is_initialized());
        assert_eq!(driver.count(&Event::Connect), 1);
    }

    #[test]
    fn test_scope_without_statements_never_connects() {
        let driver = RecordingDriver::new();
        let scope = driver.scope();
        with_connection(|| Ok(())).unwrap();
        scope.exit().unwrap();
        assert!(driver.events().is_empty());
    }

    #[test]
    fn test_panic_inside_scope_still_cleans_up() {
        let driver = RecordingDriver::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = driver.scope();
            update("update t set a=1", params![]).unwrap();
            panic!("model code failed");
        }));

        assert!(result.is_err());
        assert!(!context::is_initialized());
        assert_eq!(driver.count(&Event::Close), 1);
    }

    #[test]
    fn test_error_from_body_is_returned_unchanged() {
        let driver = RecordingDriver::new();
        let _outer = driver.scope();
        let result: crate::Result<()> = with_connection(|| Err(Error::EmptyResult));
        assert!(matches!(result, Err(Error::EmptyResult)));
    }

    #[test]
    fn test_statement_without_scope_or_engine_fails_cleanly() {
        // No scope and no process-wide engine in unit tests
        let result = select("select 1", params![]);
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert!(!context::is_initialized());
    }
}

mod auto_commit {
    use super::*;

    #[test]
    fn test_update_outside_transaction_commits_each_statement() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        update("update t set a=?", params![1]).unwrap();
        update("update t set a=?", params![2]).unwrap();

        assert_eq!(
            driver.events(),
            vec![
                Event::Connect,
                execute_event("update t set a=?1", vec![Value::Integer(1)]),
                Event::Commit,
                execute_event("update t set a=?1", vec![Value::Integer(2)]),
                Event::Commit,
            ]
        );
    }

    #[test]
    fn test_select_never_commits() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();
        select("select * from t", params![]).unwrap();
        assert_eq!(driver.count(&Event::Commit), 0);
    }

    #[test]
    fn test_update_inside_transaction_defers_commit() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        with_transaction(|| {
            update("update t set a=1", params![])?;
            update("update t set a=2", params![])?;
            assert_eq!(driver.count(&Event::Commit), 0);
            Ok(())
        })
        .unwrap();

        assert_eq!(driver.count(&Event::Commit), 1);
        assert_eq!(context::transaction_depth(), 0);
    }

    #[test]
    fn test_failed_auto_commit_statement_rolls_back() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        let err = update("update fail set a=1", params![]).unwrap_err();
        assert!(err.is_database());
        assert_eq!(driver.count(&Event::Commit), 0);
        assert_eq!(driver.count(&Event::Rollback), 1);
    }

    #[test]
    fn test_failed_auto_commit_rolls_back_before_returning() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        driver.fail_next_commit();
        let err = update("update t set a=1", params![]).unwrap_err();
        assert!(err.is_database());
        assert_eq!(
            driver.events(),
            vec![
                Event::Connect,
                execute_event("update t set a=1", vec![]),
                Event::Commit,
                Event::Rollback,
            ]
        );

        // The next standalone statement commits only its own work
        update("update t set a=2", params![]).unwrap();
        assert_eq!(
            driver.events()[4..],
            [execute_event("update t set a=2", vec![]), Event::Commit]
        );
    }

    #[test]
    fn test_affected_row_count_is_returned() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();
        assert_eq!(update("delete from t", params![]).unwrap(), 1);
    }
}

mod transactions {
    use super::*;

    #[test]
    fn test_nested_transactions_commit_once_at_outermost() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        with_transaction(|| {
            update("update t set a=1", params![])?;
            with_transaction(|| {
                assert_eq!(context::transaction_depth(), 2);
                update("update t set a=2", params![])
            })?;
            assert_eq!(driver.count(&Event::Commit), 0);
            update("update t set a=3", params![])
        })
        .unwrap();

        assert_eq!(driver.count(&Event::Commit), 1);
        assert_eq!(driver.count(&Event::Rollback), 0);
        assert_eq!(*driver.events().last().unwrap(), Event::Commit);
    }

    #[test]
    fn test_error_rolls_back_and_propagates() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        let result: crate::Result<()> = with_transaction(|| {
            update("update t set a=1", params![])?;
            Err(Error::EmptyResult)
        });

        assert!(matches!(result, Err(Error::EmptyResult)));
        assert_eq!(driver.count(&Event::Commit), 0);
        assert_eq!(driver.count(&Event::Rollback), 1);
        assert_eq!(context::transaction_depth(), 0);
    }

    #[test]
    fn test_inner_rollback_makes_outer_commit_fail() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        let outer = TransactionScope::begin().unwrap();
        update("update t set a=1", params![]).unwrap();

        let inner = TransactionScope::begin().unwrap();
        update("update t set a=2", params![]).unwrap();
        inner.rollback().unwrap();
        assert_eq!(driver.count(&Event::Rollback), 0);

        assert!(matches!(outer.commit(), Err(Error::RolledBack)));
        assert_eq!(driver.count(&Event::Commit), 0);
        assert_eq!(driver.count(&Event::Rollback), 1);
    }

    #[test]
    fn test_rollback_only_mark_does_not_leak_into_next_transaction() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        let outer = TransactionScope::begin().unwrap();
        update("update t set a=1", params![]).unwrap();
        TransactionScope::begin().unwrap().rollback().unwrap();
        assert!(outer.commit().is_err());

        with_transaction(|| update("update t set a=2", params![])).unwrap();
        assert_eq!(driver.count(&Event::Commit), 1);
    }

    #[test]
    fn test_dropping_guard_rolls_back() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();
        {
            let _tx = TransactionScope::begin().unwrap();
            update("update t set a=1", params![]).unwrap();
        }
        assert_eq!(driver.count(&Event::Rollback), 1);
        assert_eq!(driver.count(&Event::Commit), 0);
        assert_eq!(context::transaction_depth(), 0);
    }

    #[test]
    fn test_transaction_without_statements_never_connects() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();
        with_transaction(|| Ok(())).unwrap();
        assert!(driver.events().is_empty());
    }

    #[test]
    fn test_connection_closes_after_committed_transaction() {
        let driver = RecordingDriver::new();
        let scope = driver.scope();
        with_transaction(|| update("update t set a=1", params![])).unwrap();
        scope.exit().unwrap();

        assert_eq!(
            driver.events(),
            vec![
                Event::Connect,
                execute_event("update t set a=1", vec![]),
                Event::Commit,
                Event::Close,
            ]
        );
    }
}

mod executor {
    use super::*;

    #[test]
    fn test_parameter_count_mismatch_fails_before_connecting() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        let err = update("update t set a=? where id=?", params![1]).unwrap_err();
        assert!(matches!(
            err,
            Error::ParameterCount {
                expected: 2,
                actual: 1
            }
        ));
        assert!(driver.events().is_empty());
    }

    #[test]
    fn test_values_are_bound_not_spliced() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        select("select * from user where id=?", params!["1' or id='2"]).unwrap();
        assert_eq!(
            driver.events()[1],
            Event::Query {
                sql: "select * from user where id=?1".to_string(),
                params: vec![Value::from("1' or id='2")],
                timeout: None,
            }
        );
    }

    #[test]
    fn test_select_returns_rows_in_order() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();
        driver.push_result(
            &["id"],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        );

        let rows = select("select id from t order by id", params![]).unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.get_i64("id").unwrap()).collect();
        assert_eq!(ids, [1, 2]);
    }

    #[test]
    fn test_select_one_returns_first_row_or_none() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();
        driver.push_result(
            &["id"],
            vec![vec![Value::Integer(5)], vec![Value::Integer(6)]],
        );

        let row = select_one("select id from t", params![]).unwrap().unwrap();
        assert_eq!(row.get_i64("id").unwrap(), 5);
        assert!(select_one("select id from t", params![]).unwrap().is_none());
    }

    #[test]
    fn test_select_scalar_rules() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        driver.push_result(&["count(*)"], vec![vec![Value::Integer(3)]]);
        assert_eq!(
            select_scalar("select count(*) from t", params![]).unwrap(),
            Value::Integer(3)
        );

        driver.push_result(
            &["id", "name"],
            vec![vec![Value::Integer(1), Value::from("a")]],
        );
        assert!(matches!(
            select_scalar("select * from t", params![]),
            Err(Error::MultiColumns(2))
        ));

        assert!(matches!(
            select_scalar("select id from t where 0", params![]),
            Err(Error::EmptyResult)
        ));
    }

    #[test]
    fn test_select_int_rules() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        driver.push_result(&["n"], vec![vec![Value::Integer(42)]]);
        assert_eq!(select_int("select count(*) as n from t", params![]).unwrap(), 42);

        driver.push_result(&["name"], vec![vec![Value::from("x")]]);
        assert!(matches!(
            select_int("select name from t", params![]),
            Err(Error::TypeMismatch { found: "text", .. })
        ));
    }

    #[test]
    fn test_statement_timeout_reaches_driver() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        Statement::new("update t set a=?")
            .bind(1)
            .timeout(Duration::from_millis(1500))
            .update()
            .unwrap();

        assert_eq!(
            driver.events()[1],
            Event::Execute {
                sql: "update t set a=?1".to_string(),
                params: vec![Value::Integer(1)],
                timeout: Some(Duration::from_millis(1500)),
            }
        );
    }

    #[test]
    fn test_insert_names_exactly_the_given_columns() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();

        insert("user", [("id", Value::from(1)), ("name", Value::from("Ada"))]).unwrap();
        assert_eq!(
            driver.events()[1],
            execute_event(
                "insert into `user` (`id`,`name`) values (?1,?2)",
                vec![Value::Integer(1), Value::from("Ada")]
            )
        );
        assert_eq!(driver.count(&Event::Commit), 1);
    }

    #[test]
    fn test_query_error_is_a_database_error() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();
        let err = select("select * from fail", params![]).unwrap_err();
        assert!(err.is_database());
        assert!(context::is_initialized());
    }

    #[test]
    fn test_ping() {
        let driver = RecordingDriver::new();
        let _scope = driver.scope();
        driver.push_result(&["1"], vec![vec![Value::Integer(1)]]);
        crate::query::ping().unwrap();
        assert_eq!(driver.executed(), ["SELECT 1"]);
    }
}

mod nesting_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Property: n nested scopes share one connection that only the outermost exit closes
        #[test]
        fn nested_scopes_close_once_at_outermost_exit(depth in 1usize..16) {
            let driver = RecordingDriver::new();
            let mut scopes = vec![driver.scope()];
            update("update t set a=?", params![0]).unwrap();
            let id = context::connection_id();

            for level in 1..depth {
                scopes.push(ConnectionScope::enter());
                update("update t set a=?", params![i64::try_from(level).unwrap()]).unwrap();
                prop_assert_eq!(context::connection_id(), id);
            }

            while scopes.len() > 1 {
                let inner = scopes.pop().unwrap();
                prop_assert!(!inner.owns_initialization());
                inner.exit().unwrap();
                prop_assert!(context::is_initialized());
                prop_assert_eq!(driver.count(&Event::Close), 0);
            }

            scopes.pop().unwrap().exit().unwrap();
            prop_assert!(!context::is_initialized());
            prop_assert_eq!(driver.count(&Event::Connect), 1);
            prop_assert_eq!(driver.count(&Event::Close), 1);
            let events = driver.events();
            prop_assert_eq!(events.last(), Some(&Event::Close));
        }

        /// Property: n nested transactions commit once, when the outermost one ends
        #[test]
        fn nested_transactions_commit_once(depth in 1usize..16) {
            let driver = RecordingDriver::new();
            let _scope = driver.scope();

            let mut transactions = Vec::new();
            for level in 1..=depth {
                transactions.push(TransactionScope::begin().unwrap());
                prop_assert_eq!(context::transaction_depth(), level);
                update("update t set a=1", params![]).unwrap();
            }

            while let Some(tx) = transactions.pop() {
                tx.commit().unwrap();
                prop_assert_eq!(context::transaction_depth(), transactions.len());
                let expected_commits = usize::from(transactions.is_empty());
                prop_assert_eq!(driver.count(&Event::Commit), expected_commits);
            }
        }
    }
}
