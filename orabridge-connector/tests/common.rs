use orabridge_connector::testing::{emp_columns, MockDriver};
use orabridge_connector::{
    describe_table, ConnectionConfig, ExecutionDriver, HandleCache, LocalColumn, RawColumn,
    SessionManager, TableDescriptor, TableOptions,
};
use orabridge_core::data::chrono::{DateTime, FixedOffset, TimeZone};
use orabridge_core::data::{DataType, StringOptions};

/// A mock with the `EMP` table scripted: the zero-row describe probe plus
/// the primary-key catalog lookup (key: `ID`)
pub fn scripted_emp_driver() -> MockDriver {
    let driver = MockDriver::new();
    driver.script_query("FETCH FIRST 1 ROW ONLY", emp_columns(), vec![]);
    driver.script_query(
        "all_cons_columns",
        vec![],
        vec![vec![
            RawColumn::Bytes(b"ID".to_vec()),
            RawColumn::Bytes(b"1".to_vec()),
        ]],
    );
    driver
}

pub fn executor(driver: MockDriver) -> ExecutionDriver {
    ExecutionDriver::new(SessionManager::new(HandleCache::new(Box::new(driver))))
}

pub fn conf() -> ConnectionConfig {
    ConnectionConfig {
        connect_string: Some("db1".to_string()),
        user: Some("scott".to_string()),
        password: Some("tiger".to_string()),
        token: None,
        locale: None,
    }
}

pub fn emp_locals() -> Vec<LocalColumn> {
    vec![
        LocalColumn {
            name: "id".to_string(),
            attnum: 1,
            r#type: DataType::Int64,
            type_mod: -1,
            strict_encoding: None,
        },
        LocalColumn {
            name: "name".to_string(),
            attnum: 2,
            r#type: DataType::Utf8String(StringOptions::default()),
            type_mod: -1,
            strict_encoding: None,
        },
    ]
}

/// Builds the `EMP` descriptor through the full describe path
pub fn describe_emp(exec: &mut ExecutionDriver) -> TableDescriptor {
    let session = exec.sessions_mut().get_session(&conf(), 1).unwrap();
    describe_table(
        exec.sessions_mut().cache_mut(),
        session,
        &TableOptions::new(None, "EMP"),
        "emp",
        &emp_locals(),
    )
    .unwrap()
}

pub fn xact_start() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
        .unwrap()
}
