//! End-to-end test through `create_engine` with a local LibSQL database
//!
//! The engine is a process singleton, so this binary holds a single test that
//! walks the whole public surface against one database file.

use std::fs;
use std::path::PathBuf;
use std::thread;
use transwarp_db::{
    create_engine, insert, params, ping, select, select_int, select_one, update, with_connection,
    with_transaction, EngineConfig, Error, Statement, Value,
};
use uuid::Uuid;

/// Removes the database file and its SQLite side files on drop.
struct TestDbGuard {
    db_path: PathBuf,
}

impl Drop for TestDbGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.db_path);
        for suffix in ["-wal", "-shm", "-journal", "-info"] {
            let _ = fs::remove_file(format!("{}{suffix}", self.db_path.display()));
        }
    }
}

#[test]
fn test_full_flow_on_local_database() {
    let db_path =
        std::env::temp_dir().join(format!("z_transwarp_db_engine-{}.db", Uuid::new_v4()));
    let _guard = TestDbGuard {
        db_path: db_path.clone(),
    };

    let config: EngineConfig = serde_json::from_value(serde_json::json!({
        "mode": "local",
        "database": db_path.to_str().unwrap(),
        "busy_timeout_ms": 2000,
        "statement_timeout_ms": 10000,
    }))
    .unwrap();
    create_engine(config).unwrap();
    assert!(matches!(
        create_engine(EngineConfig::local("other.db")),
        Err(Error::Configuration(_))
    ));

    ping().unwrap();

    update(
        "create table account (id integer primary key, owner text not null, balance integer not null)",
        params![],
    )
    .unwrap();
    insert(
        "account",
        [("id", Value::from(1)), ("owner", Value::from("ada")), ("balance", Value::from(100))],
    )
    .unwrap();
    insert(
        "account",
        [("id", Value::from(2)), ("owner", Value::from("grace")), ("balance", Value::from(0))],
    )
    .unwrap();

    // Transfer commits both updates together
    with_transaction(|| {
        update(
            "update account set balance=balance-? where id=?",
            params![30, 1],
        )?;
        update(
            "update account set balance=balance+? where id=?",
            params![30, 2],
        )
    })
    .unwrap();

    // A failed transfer leaves both balances untouched
    let failed: transwarp_db::Result<()> = with_transaction(|| {
        update(
            "update account set balance=balance-? where id=?",
            params![500, 1],
        )?;
        Err(Error::Configuration("insufficient funds".to_string()))
    });
    assert!(failed.is_err());

    let balances = with_connection(|| {
        let rows = select("select id, balance from account order by id", params![])?;
        rows.iter()
            .map(|row| row.get_i64("balance"))
            .collect::<transwarp_db::Result<Vec<i64>>>()
    })
    .unwrap();
    assert_eq!(balances, [70, 30]);

    // Another thread sees the committed state through its own connection
    let total = thread::spawn(|| select_int("select sum(balance) from account", params![]))
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(total, 100);

    let owner = Statement::new("select owner from account where id=?")
        .bind(2)
        .select_scalar()
        .unwrap();
    assert_eq!(owner.as_str(), Some("grace"));

    assert!(
        select_one("select * from account where owner=?", params!["ada' or '1'='1"])
            .unwrap()
            .is_none()
    );
    assert!(!transwarp_db::is_initialized());
}
