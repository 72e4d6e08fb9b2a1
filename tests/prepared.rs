//! Integration tests for prepared statements.
//!
//! - `test_prepare_and_execute` - Prepare once, execute with different parameters
//! - `test_single_int_param` - One `int` parameter echoes back
//! - `test_arity_mismatch` - Declared arity disagrees with the server
//! - `test_local_arity_check` - Wrong parameter count is rejected before sending
//! - `test_reprepare_replaces` - Same name, new SQL
//! - `test_deallocate` - Statement disappears from server and registry
//! - `test_binary_results` - Binary result format
//! - `test_null_and_typed_params` - NULL and binary parameters

use std::env;

use zero_psql::sync::Conn;
use zero_psql::{Error, FormatCode, Param, Params, ResultStatus, oid};

fn get_conn() -> Option<Conn> {
    let mut db_url = env::var("DATABASE_URL").ok()?;
    if !db_url.contains("sslmode=") {
        if db_url.contains('?') {
            db_url.push_str("&sslmode=disable");
        } else {
            db_url.push_str("?sslmode=disable");
        }
    }
    Some(Conn::connect(db_url.as_str()).expect("Failed to connect"))
}

fn server_has_statement(conn: &mut Conn, name: &str) -> bool {
    let result = conn
        .execute_params(
            "SELECT count(*) FROM pg_prepared_statements WHERE name = $1",
            [Param::text(name)],
        )
        .unwrap();
    result.get_str(0, 0).unwrap() == Some("1")
}

#[test]
fn test_prepare_and_execute() {
    let Some(mut conn) = get_conn() else { return };

    let statement = conn.prepare("add", "SELECT $1::int + $2::int", 2, &[]).unwrap();
    assert_eq!(statement.param_types, vec![oid::INT4, oid::INT4]);

    for (a, b, sum) in [("1", "2", "3"), ("40", "2", "42"), ("-5", "5", "0")] {
        let result = conn
            .exec_prepared("add", [Param::text(a), Param::text(b)])
            .unwrap();
        assert_eq!(result.status(), ResultStatus::OkWithData);
        assert_eq!(result.get_str(0, 0).unwrap(), Some(sum));
    }
}

#[test]
fn test_single_int_param() {
    let Some(mut conn) = get_conn() else { return };

    conn.prepare("p1", "select $1::int", 1, &[]).unwrap();
    let result = conn.exec_prepared("p1", [Param::text("42")]).unwrap();
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.num_fields(), 1);
    assert_eq!(result.get_str(0, 0).unwrap(), Some("42"));
}

#[test]
fn test_arity_mismatch() {
    let Some(mut conn) = get_conn() else { return };

    let err = conn
        .prepare("two", "SELECT $1::int, $2::int", 1, &[])
        .unwrap_err();
    assert!(
        matches!(err, Error::ParamCount { expected: 1, actual: 2, .. }),
        "{:?}",
        err
    );

    // The statement was closed on the server and is not registered
    assert!(conn.prepared("two").is_none());
    assert!(!server_has_statement(&mut conn, "two"));
    assert!(conn.is_ready());
}

#[test]
fn test_local_arity_check() {
    let Some(mut conn) = get_conn() else { return };
    conn.prepare("one", "SELECT $1::text", 1, &[]).unwrap();

    let err = conn.exec_prepared("one", Params::new()).unwrap_err();
    assert!(matches!(err, Error::ParamCount { expected: 1, actual: 0, .. }));
    assert!(err.is_local());

    let err = conn.exec_prepared("missing", [Param::text("x")]).unwrap_err();
    assert!(matches!(err, Error::InvalidUsage(_)), "{:?}", err);

    let result = conn.exec_prepared("one", [Param::text("still fine")]).unwrap();
    assert_eq!(result.get_str(0, 0).unwrap(), Some("still fine"));
}

#[test]
fn test_reprepare_replaces() {
    let Some(mut conn) = get_conn() else { return };

    conn.prepare("q", "SELECT 'first'", 0, &[]).unwrap();
    conn.prepare("q", "SELECT 'second', $1::int", 1, &[]).unwrap();

    assert_eq!(conn.prepared("q").unwrap().arity, 1);
    let result = conn.exec_prepared("q", [Param::text("7")]).unwrap();
    assert_eq!(result.get_str(0, 0).unwrap(), Some("second"));
    assert_eq!(result.get_str(0, 1).unwrap(), Some("7"));
}

#[test]
fn test_deallocate() {
    let Some(mut conn) = get_conn() else { return };

    conn.prepare("gone", "SELECT 1", 0, &[]).unwrap();
    assert!(server_has_statement(&mut conn, "gone"));

    conn.deallocate("gone").unwrap();
    assert!(conn.prepared("gone").is_none());
    assert!(!server_has_statement(&mut conn, "gone"));

    assert!(matches!(conn.deallocate("gone"), Err(Error::InvalidUsage(_))));
}

#[test]
fn test_binary_results() {
    let Some(mut conn) = get_conn() else { return };

    conn.prepare("bin", "SELECT $1::int4", 1, &[oid::INT4]).unwrap();
    let params = Params::from([Param::text("258")]).result_format(FormatCode::Binary);
    let result = conn.exec_prepared("bin", params).unwrap();

    let fields = result.fields().unwrap();
    assert_eq!(fields[0].format, FormatCode::Binary);
    assert_eq!(fields[0].type_oid, oid::INT4);
    assert_eq!(result.get_value(0, 0).unwrap(), Some(&[0u8, 0, 1, 2][..]));
}

#[test]
fn test_null_and_typed_params() {
    let Some(mut conn) = get_conn() else { return };

    let result = conn
        .execute_params(
            "SELECT $1::text IS NULL, $2::int8",
            [
                Param::null(),
                Param::binary(oid::INT8, 9_i64.to_be_bytes().to_vec()),
            ],
        )
        .unwrap();
    assert_eq!(result.get_str(0, 0).unwrap(), Some("t"));
    assert_eq!(result.get_str(0, 1).unwrap(), Some("9"));
}
