//! Statement execution against the remote engine.
//!
//! The executor is deliberately retry-free: failures propagate to the host
//! with their classification attached and the host decides whether the
//! statement is worth replaying. Serialization failures surface from the
//! fetch path with `is_retryable()` set.

use orabridge_core::{
    data::{
        chrono::{DateTime, FixedOffset},
        DataValue,
    },
    err::Result,
};
use orabridge_logging::debug;

use crate::{
    error::{from_status, ErrorKind},
    params::{bind_modify_row, bind_scan_params, BindKind},
    rows::{convert_column, convert_row},
    session::{Session, SessionManager},
    BindValue, BuiltQuery, ConnectionConfig, StmtHandle, TableDescriptor,
};

/// An open remote cursor
#[derive(Debug, Clone, Copy)]
pub struct Scan {
    pub session: Session,
    stmt: StmtHandle,
    /// Width of the local result row, indexed by attribute number
    target_cols: i16,
}

/// Result of one DML statement
#[derive(Debug, Clone, PartialEq)]
pub struct ModifyOutcome {
    pub affected: u64,
    /// The RETURNING row, present when the statement carried output slots
    pub returned: Option<Vec<DataValue>>,
}

/// Runs built statements over cached sessions
pub struct ExecutionDriver {
    sessions: SessionManager,
}

impl ExecutionDriver {
    pub fn new(sessions: SessionManager) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }

    /// Prepares, binds and executes a SELECT, leaving the cursor open.
    ///
    /// `values` carries the host-evaluated expression parameter values in
    /// parameter-list order; `prefetch` is the rows-per-round-trip hint from
    /// the table options; `xact_start` feeds the transaction-timestamp slots
    /// left by the `?/*:now*/` token.
    pub fn open_scan(
        &mut self,
        conf: &ConnectionConfig,
        host_level: u32,
        query: &BuiltQuery,
        values: &[DataValue],
        target_cols: i16,
        prefetch: u32,
        xact_start: &DateTime<FixedOffset>,
    ) -> Result<Scan> {
        let session = self.sessions.get_session(conf, host_level)?;
        let binds = bind_scan_params(&query.params, values, xact_start)?;
        let stmt = self.prepare_bound(session, query, &binds)?;

        self.sessions
            .cache()
            .driver()
            .lock()
            .unwrap()
            .set_prefetch(stmt, prefetch.max(1))
            .map_err(|st| {
                from_status(ErrorKind::Execution, "Failed to set statement prefetch", st)
            })?;

        self.execute(stmt)?;

        Ok(Scan {
            session,
            stmt,
            target_cols,
        })
    }

    /// Fetches the next row of an open scan, converted to local values.
    ///
    /// Returns `None` once the cursor is exhausted. Lock-timeout and
    /// deadlock diagnostics on the fetch path classify as retryable.
    pub fn fetch_next(
        &mut self,
        scan: &Scan,
        table: &TableDescriptor,
        lob_truncation: Option<usize>,
    ) -> Result<Option<Vec<DataValue>>> {
        let driver = self.sessions.cache().driver();

        let more = driver
            .lock()
            .unwrap()
            .fetch(scan.stmt)
            .map_err(|st| from_status(ErrorKind::Execution, "Failed to fetch remote row", st))?;
        if !more {
            return Ok(None);
        }

        convert_row(&driver, scan.stmt, table, scan.target_cols, lob_truncation).map(Some)
    }

    /// Closes the scan's statement; the connection stays cached for the
    /// rest of the transaction
    pub fn close_scan(&mut self, scan: Scan) -> Result<()> {
        self.sessions
            .cache_mut()
            .release_statement(scan.session.conn, scan.stmt)
    }

    /// Executes one INSERT/UPDATE/DELETE row and reads back its RETURNING
    /// slots, if any
    pub fn execute_modify(
        &mut self,
        conf: &ConnectionConfig,
        host_level: u32,
        query: &BuiltQuery,
        table: &TableDescriptor,
        new_row: &[DataValue],
        old_row: &[DataValue],
        xact_start: &DateTime<FixedOffset>,
    ) -> Result<ModifyOutcome> {
        let session = self.sessions.get_session(conf, host_level)?;
        let binds = bind_modify_row(&query.params, new_row, old_row, xact_start)?;
        let stmt = self.prepare_bound(session, query, &binds)?;

        let affected = self.execute(stmt)?;
        let returned = self.read_returning(stmt, query, table)?;

        self.sessions
            .cache_mut()
            .release_statement(session.conn, stmt)?;

        Ok(ModifyOutcome { affected, returned })
    }

    /// Truncation has no parameters or results; it goes straight through
    /// the immediate-execution path
    pub fn execute_truncate(
        &mut self,
        conf: &ConnectionConfig,
        host_level: u32,
        query: &BuiltQuery,
    ) -> Result<()> {
        let session = self.sessions.get_session(conf, host_level)?;
        let handle = self.sessions.cache().connection_handle(session.conn)?;

        debug!("remote: {}", query.sql);
        self.sessions
            .cache()
            .driver()
            .lock()
            .unwrap()
            .execute_immediate(handle, &query.sql)
            .map_err(|st| from_status(ErrorKind::Execution, "Failed to truncate remote table", st))
    }

    fn prepare_bound(
        &mut self,
        session: Session,
        query: &BuiltQuery,
        binds: &[BindValue],
    ) -> Result<StmtHandle> {
        let stmt = self.sessions.cache_mut().allocate_statement(session.conn)?;
        let driver = self.sessions.cache().driver();

        debug!("remote: {}", query.annotated_sql);
        // The guard must drop before release_statement re-locks the driver
        let prepared = driver.lock().unwrap().prepare(stmt, &query.sql);
        if let Err(st) = prepared {
            let _ = self.sessions.cache_mut().release_statement(session.conn, stmt);
            return Err(from_status(
                ErrorKind::Execution,
                "Failed to prepare remote statement",
                st,
            ));
        }

        for (i, value) in binds.iter().enumerate() {
            debug!("bind {}: {:?}", i + 1, value);
            driver
                .lock()
                .unwrap()
                .bind(stmt, (i + 1) as u32, value)
                .map_err(|st| {
                    from_status(ErrorKind::Execution, "Failed to bind remote parameter", st)
                })?;
        }

        Ok(stmt)
    }

    fn execute(&mut self, stmt: StmtHandle) -> Result<u64> {
        self.sessions
            .cache()
            .driver()
            .lock()
            .unwrap()
            .execute(stmt)
            .map_err(|st| from_status(ErrorKind::Execution, "Failed to execute remote statement", st))
    }

    /// Reads output-bound slots back into a local row indexed by attribute
    /// number. Bind positions are 1-based indices into the parameter list.
    fn read_returning(
        &mut self,
        stmt: StmtHandle,
        query: &BuiltQuery,
        table: &TableDescriptor,
    ) -> Result<Option<Vec<DataValue>>> {
        let outputs: Vec<u32> = query
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind == BindKind::Output)
            .map(|(i, _)| (i + 1) as u32)
            .collect();
        if outputs.is_empty() {
            return Ok(None);
        }

        let width = table.columns.iter().map(|c| c.attnum).max().unwrap_or(0);
        let mut row = vec![DataValue::Null; width.max(0) as usize];
        let driver = self.sessions.cache().driver();

        for (pos, attnum) in outputs.iter().zip(&query.retrieved_attrs) {
            let raw = driver.lock().unwrap().read_output(stmt, *pos).map_err(|st| {
                from_status(ErrorKind::Execution, "Failed to read output parameter", st)
            })?;

            if let Some(col) = table.column_by_attnum(*attnum) {
                row[*attnum as usize - 1] = convert_column(&driver, table, col, raw, None)?;
            }
        }

        Ok(Some(row))
    }
}
