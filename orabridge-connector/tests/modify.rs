use orabridge_connector::{
    build_delete, build_insert, BindValue, RemoteError, TransactionEnd,
};
use orabridge_core::data::DataValue;
use pretty_assertions::assert_eq;

mod common;

#[test]
fn test_insert_then_commit() {
    let driver = common::scripted_emp_driver();
    driver.script_modify("INSERT INTO \"EMP\"", 1);
    let state = driver.state();
    let mut exec = common::executor(driver);
    let table = common::describe_emp(&mut exec);

    let query = build_insert(&table).unwrap();
    assert_eq!(
        query.sql,
        "INSERT INTO \"EMP\" (\"ID\", \"NAME\") VALUES (?, ?)"
    );

    let outcome = exec
        .execute_modify(
            &common::conf(),
            1,
            &query,
            &table,
            &[
                DataValue::Int64(1),
                DataValue::Utf8String("ann".to_string()),
            ],
            &[],
            &common::xact_start(),
        )
        .unwrap();

    assert_eq!(outcome.affected, 1);
    assert_eq!(outcome.returned, None);
    assert_eq!(
        state.lock().unwrap().binds_for("INSERT INTO \"EMP\""),
        vec![
            (1, BindValue::Text("1".to_string())),
            (2, BindValue::Text("ann".to_string())),
        ]
    );

    exec.sessions_mut()
        .end_transaction(TransactionEnd::Commit, false)
        .unwrap();
    assert_eq!(state.lock().unwrap().immediates, vec!["COMMIT"]);
}

#[test]
fn test_delete_without_key_fails_before_any_remote_call() {
    // Catalog lookup finds no primary key for this table
    let driver = orabridge_connector::testing::MockDriver::new();
    driver.script_query(
        "FETCH FIRST 1 ROW ONLY",
        orabridge_connector::testing::emp_columns(),
        vec![],
    );
    driver.script_query("all_cons_columns", vec![], vec![]);
    let state = driver.state();
    let mut exec = common::executor(driver);
    let table = common::describe_emp(&mut exec);

    let prepared_after_describe = state.lock().unwrap().prepared.len();
    let err = build_delete(&table).unwrap_err();
    let remote = err.downcast_ref::<RemoteError>().unwrap();

    assert!(remote
        .message
        .contains("no primary key column specified"));
    assert!(remote.hint.is_some());
    // Nothing was sent to the remote engine
    let state = state.lock().unwrap();
    assert_eq!(state.prepared.len(), prepared_after_describe);
    assert_eq!(state.immediates, Vec::<String>::new());
}

#[test]
fn test_rollback_ends_remote_transaction() {
    let driver = common::scripted_emp_driver();
    driver.script_modify("INSERT INTO \"EMP\"", 1);
    let state = driver.state();
    let mut exec = common::executor(driver);
    let table = common::describe_emp(&mut exec);

    let query = build_insert(&table).unwrap();
    exec.execute_modify(
        &common::conf(),
        1,
        &query,
        &table,
        &[DataValue::Int64(2), DataValue::Null],
        &[],
        &common::xact_start(),
    )
    .unwrap();

    exec.sessions_mut()
        .end_transaction(TransactionEnd::Rollback, false)
        .unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.immediates, vec!["ROLLBACK"]);
    assert_eq!(state.open_statements(), 0);
}
