use orabridge_connector::{build_select, RawColumn, SelectQuery, TableScope, Target};
use orabridge_core::data::{DataType, DataValue};
use orabridge_core::sqlil::Expr;
use pretty_assertions::assert_eq;

mod common;

#[test]
fn test_describe_then_scan_with_pushed_down_filter() {
    let driver = common::scripted_emp_driver();
    driver.script_query(
        "WHERE (\"ID\" = ?)",
        vec![],
        vec![
            vec![
                RawColumn::Bytes(b"7".to_vec()),
                RawColumn::Bytes(b"ann".to_vec()),
            ],
        ],
    );
    let state = driver.state();
    let mut exec = common::executor(driver);

    let mut table = common::describe_emp(&mut exec);
    table.mark_all_used();

    let mut select = SelectQuery::scan(TableScope::new(1, "t1", &table));
    select.targets = vec![
        Target::Column { rel_id: 1, attnum: 1 },
        Target::Column { rel_id: 1, attnum: 2 },
    ];
    select.conds = vec![Expr::binary(
        Expr::column(1, 1, DataType::Int64),
        "=",
        Expr::param(1, DataType::Int64),
    )];
    select.limit = Some(10);

    let plan = build_select(&select).unwrap();
    assert_eq!(
        plan.query.sql,
        "SELECT \"ID\", \"NAME\" FROM \"EMP\" t1 WHERE (\"ID\" = ?) FETCH FIRST 10 ROWS ONLY"
    );
    assert!(plan.local_cond_indices.is_empty());
    assert_eq!(plan.query.retrieved_attrs, vec![1, 2]);

    let scan = exec
        .open_scan(
            &common::conf(),
            1,
            &plan.query,
            &[DataValue::Int64(7)],
            2,
            50,
            &common::xact_start(),
        )
        .unwrap();

    assert_eq!(
        exec.fetch_next(&scan, &table, None).unwrap(),
        Some(vec![
            DataValue::Int64(7),
            DataValue::Utf8String("ann".to_string())
        ])
    );
    assert_eq!(exec.fetch_next(&scan, &table, None).unwrap(), None);

    exec.close_scan(scan).unwrap();

    let state = state.lock().unwrap();
    // Scan statement released; the connection stays cached
    assert_eq!(state.open_statements(), 0);
    assert_eq!(state.open_connections(), 1);
    assert_eq!(state.connects.len(), 1);
    assert_eq!(state.prefetches.last().map(|p| p.1), Some(50));
}

#[test]
fn test_untranslatable_condition_stays_local() {
    let driver = common::scripted_emp_driver();
    let mut exec = common::executor(driver);
    let table = common::describe_emp(&mut exec);

    let mut select = SelectQuery::scan(TableScope::new(1, "t1", &table));
    select.targets = vec![Target::Column { rel_id: 1, attnum: 1 }];
    select.conds = vec![
        Expr::binary(
            Expr::column(1, 1, DataType::Int64),
            "=",
            Expr::param(1, DataType::Int64),
        ),
        // Empty string literals have no remote equivalent
        Expr::binary(
            Expr::column(1, 2, DataType::Utf8String(Default::default())),
            "=",
            Expr::literal(DataValue::Utf8String(String::new())),
        ),
    ];

    let plan = build_select(&select).unwrap();

    assert_eq!(
        plan.query.sql,
        "SELECT \"ID\" FROM \"EMP\" t1 WHERE (\"ID\" = ?)"
    );
    assert_eq!(plan.local_cond_indices, vec![1]);
}

#[test]
fn test_scan_reuses_cached_connection_across_queries() {
    let driver = common::scripted_emp_driver();
    driver.script_query("FROM \"EMP\" t1", vec![], vec![]);
    let state = driver.state();
    let mut exec = common::executor(driver);
    let table = common::describe_emp(&mut exec);

    let mut select = SelectQuery::scan(TableScope::new(1, "t1", &table));
    select.targets = vec![Target::Column { rel_id: 1, attnum: 1 }];
    let plan = build_select(&select).unwrap();

    for _ in 0..3 {
        let scan = exec
            .open_scan(&common::conf(), 1, &plan.query, &[], 2, 50, &common::xact_start())
            .unwrap();
        assert_eq!(exec.fetch_next(&scan, &table, None).unwrap(), None);
        exec.close_scan(scan).unwrap();
    }

    assert_eq!(state.lock().unwrap().connects.len(), 1);
}
