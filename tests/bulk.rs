//! Integration tests for COPY FROM STDIN bulk loads.
//!
//! Loaded rows are read back through the `postgres` crate on a separate
//! connection, so they are only visible after a commit.
//!
//! - `test_text_load` - Text rows with NULLs and escaped values, batched
//! - `test_binary_load` - Binary tuples with the stream header and trailer
//! - `test_abort_rolls_back` - Aborted load leaves the table untouched
//! - `test_server_rejects_row` - Bad data fails the load and rolls back
//! - `test_caller_transaction` - Load inside a transaction the caller owns
//! - `test_commands_refused_while_copying` - Other commands fail, the load survives

use std::env;
use std::process;

use postgres::{Client, NoTls};
use zero_psql::copy::escape_text;
use zero_psql::sync::{BulkOptions, BulkState, Conn};
use zero_psql::{Error, FormatCode, TransactionStatus};

fn database_url() -> Option<String> {
    let mut db_url = env::var("DATABASE_URL").ok()?;
    if !db_url.contains("sslmode=") {
        if db_url.contains('?') {
            db_url.push_str("&sslmode=disable");
        } else {
            db_url.push_str("?sslmode=disable");
        }
    }
    Some(db_url)
}

/// A fresh `(id int4, name text)` table, a session on it and a checking client.
fn setup(suffix: &str) -> Option<(Conn, Client, String)> {
    let db_url = database_url()?;
    let table = format!("zero_psql_bulk_{}_{}", suffix, process::id());
    let mut client = Client::connect(&db_url, NoTls).expect("Failed to connect");
    client
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} (id int4 NOT NULL, name text)"
        ))
        .unwrap();
    let conn = Conn::connect(db_url.as_str()).expect("Failed to connect");
    Some((conn, client, table))
}

fn teardown(client: &mut Client, table: &str) {
    client
        .batch_execute(&format!("DROP TABLE IF EXISTS {}", table))
        .unwrap();
}

fn count(client: &mut Client, table: &str) -> i64 {
    client
        .query_one(&format!("SELECT count(*) FROM {}", table), &[])
        .unwrap()
        .get(0)
}

#[test]
fn test_text_load() {
    let Some((mut conn, mut client, table)) = setup("text") else {
        return;
    };

    let options = BulkOptions {
        batch_rows: 100,
        ..BulkOptions::default()
    };
    let mut bulk = conn.begin_bulk_with(&table, &["id", "name"], options).unwrap();
    assert_eq!(bulk.state(), BulkState::Copying);

    for i in 0..1000 {
        let id = i.to_string();
        let name = format!("row\t{}\\", i);
        let name = escape_text(name.as_bytes());
        let name = (i % 10 != 0).then_some(&*name);
        bulk.push_row(&mut conn, &[Some(id.as_bytes()), name])
            .unwrap();
    }
    assert!(bulk.rows_sent() >= 900);

    let rows = bulk.finish(&mut conn).unwrap();
    assert_eq!(rows, 1000);
    assert_eq!(bulk.state(), BulkState::Ended);
    assert_eq!(conn.transaction_status(), TransactionStatus::Idle);

    assert_eq!(count(&mut client, &table), 1000);
    let nulls: i64 = client
        .query_one(&format!("SELECT count(*) FROM {} WHERE name IS NULL", table), &[])
        .unwrap()
        .get(0);
    assert_eq!(nulls, 100);
    let name: String = client
        .query_one(&format!("SELECT name FROM {} WHERE id = 7", table), &[])
        .unwrap()
        .get(0);
    assert_eq!(name, "row\t7\\");

    teardown(&mut client, &table);
}

#[test]
fn test_binary_load() {
    let Some((mut conn, mut client, table)) = setup("binary") else {
        return;
    };

    let mut bulk = conn.begin_bulk(&table, &[], FormatCode::Binary).unwrap();
    let rows: Vec<(Vec<u8>, Option<&[u8]>)> = vec![
        (1_i32.to_be_bytes().to_vec(), Some(&b"one"[..])),
        (2_i32.to_be_bytes().to_vec(), None),
        (3_i32.to_be_bytes().to_vec(), Some(&"trois \u{e9}".as_bytes()[..])),
    ];
    for (id, name) in &rows {
        bulk.push_row(&mut conn, &[Some(id.as_slice()), *name])
            .unwrap();
    }
    assert_eq!(bulk.finish(&mut conn).unwrap(), 3);

    let loaded: Vec<(i32, Option<String>)> = client
        .query(&format!("SELECT id, name FROM {} ORDER BY id", table), &[])
        .unwrap()
        .iter()
        .map(|row| (row.get(0), row.get(1)))
        .collect();
    assert_eq!(
        loaded,
        vec![
            (1, Some("one".to_string())),
            (2, None),
            (3, Some("trois \u{e9}".to_string())),
        ]
    );

    teardown(&mut client, &table);
}

#[test]
fn test_abort_rolls_back() {
    let Some((mut conn, mut client, table)) = setup("abort") else {
        return;
    };

    let mut bulk = conn.begin_bulk(&table, &["id"], FormatCode::Text).unwrap();
    bulk.push_row(&mut conn, &[Some(&b"1"[..])]).unwrap();
    bulk.flush(&mut conn).unwrap();
    bulk.abort(&mut conn, "changed my mind").unwrap();

    assert_eq!(bulk.state(), BulkState::Ended);
    assert!(conn.is_ready());
    assert!(!conn.in_transaction());
    assert!(matches!(
        bulk.push_row(&mut conn, &[Some(&b"2"[..])]),
        Err(Error::Protocol(_))
    ));
    assert_eq!(count(&mut client, &table), 0);

    teardown(&mut client, &table);
}

#[test]
fn test_server_rejects_row() {
    let Some((mut conn, mut client, table)) = setup("reject") else {
        return;
    };

    let mut bulk = conn.begin_bulk(&table, &["id"], FormatCode::Text).unwrap();
    bulk.push_row(&mut conn, &[Some(&b"1"[..])]).unwrap();
    bulk.push_row(&mut conn, &[Some(&b"not a number"[..])]).unwrap();
    let err = bulk.finish(&mut conn).unwrap_err();
    assert_eq!(err.sqlstate(), Some("22P02"), "{:?}", err);

    assert!(conn.is_ready());
    assert!(!conn.in_transaction());
    assert_eq!(count(&mut client, &table), 0);

    // The connection is usable for the next load
    let mut bulk = conn.begin_bulk(&table, &["id"], FormatCode::Text).unwrap();
    bulk.push_row(&mut conn, &[Some(&b"5"[..])]).unwrap();
    assert_eq!(bulk.finish(&mut conn).unwrap(), 1);
    assert_eq!(count(&mut client, &table), 1);

    teardown(&mut client, &table);
}

#[test]
fn test_caller_transaction() {
    let Some((mut conn, mut client, table)) = setup("caller_tx") else {
        return;
    };

    conn.execute("BEGIN").unwrap();
    let mut bulk = conn.begin_bulk(&table, &["id"], FormatCode::Text).unwrap();
    bulk.push_row(&mut conn, &[Some(&b"1"[..])]).unwrap();
    assert_eq!(bulk.finish(&mut conn).unwrap(), 1);

    // Not committed on the caller's behalf
    assert!(conn.in_transaction());
    assert_eq!(count(&mut client, &table), 0);
    conn.execute("COMMIT").unwrap();
    assert_eq!(count(&mut client, &table), 1);

    teardown(&mut client, &table);
}

#[test]
fn test_commands_refused_while_copying() {
    let Some((mut conn, mut client, table)) = setup("busy") else {
        return;
    };

    let mut bulk = conn.begin_bulk(&table, &["id", "name"], FormatCode::Text).unwrap();
    bulk.push_row(&mut conn, &[Some(&b"1"[..]), Some(&b"a"[..])])
        .unwrap();
    assert!(matches!(conn.execute("SELECT 1"), Err(Error::Protocol(_))));
    assert!(matches!(conn.send_query("SELECT 1"), Err(Error::Protocol(_))));
    assert!(matches!(conn.execute("COMMIT"), Err(Error::Protocol(_))));

    bulk.push_rows(
        &mut conn,
        [
            &[Some(&b"2"[..]), None][..],
            &[Some(&b"3"[..]), Some(&b"c"[..])][..],
        ],
    )
    .unwrap();
    assert_eq!(bulk.finish(&mut conn).unwrap(), 3);

    let result = conn
        .execute(&format!("SELECT count(*) FROM {}", table))
        .unwrap();
    assert_eq!(result.get_str(0, 0).unwrap(), Some("3"));

    teardown(&mut client, &table);
}
