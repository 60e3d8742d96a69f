//! Test doubles for the driver call surface.
//!
//! [`MockDriver`] is an in-process scripted fake: it records every call and
//! serves canned describe/fetch results matched by a substring of the
//! prepared SQL. No remote engine is involved anywhere in the test suites.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::{
    type_codes, BindValue, ConnHandle, DriverResult, DriverStatus, EnvHandle, LobHandle,
    OracleDriver, RawColumn, RemoteColumn, StmtHandle,
};

pub type SharedMockState = Arc<Mutex<MockState>>;

/// One canned result, matched against prepared SQL by substring
struct ScriptedQuery {
    needle: String,
    columns: Vec<RemoteColumn>,
    rows: Vec<Vec<RawColumn>>,
    affected: u64,
    outputs: HashMap<u32, RawColumn>,
}

#[derive(Default)]
struct StmtState {
    sql: Option<String>,
    /// Index of the current row; `None` before the first fetch
    cursor: Option<usize>,
    binds: Vec<(u32, BindValue)>,
}

/// Observable state of the mock: call logs, live handles and scripts
#[derive(Default)]
pub struct MockState {
    next_handle: u64,
    envs: HashSet<u64>,
    conns: HashSet<u64>,
    stmts: HashMap<u64, StmtState>,
    /// Freed statements, kept so binds stay inspectable after release
    retired: Vec<StmtState>,
    lobs: HashMap<u64, Vec<u8>>,
    scripts: Vec<ScriptedQuery>,
    fail_queue: VecDeque<DriverStatus>,

    /// (server, user, password, token) per connect call
    pub connects: Vec<(String, String, String, String)>,
    /// SQL issued through `execute_immediate`, in order
    pub immediates: Vec<String>,
    /// SQL prepared on statements, in order
    pub prepared: Vec<String>,
    /// Prefetch row counts set per statement
    pub prefetches: Vec<(StmtHandle, u32)>,
    pub cancelled: usize,
    pub closed_lobs: usize,
}

impl MockState {
    /// The next remote call (connect/prepare/execute/fetch/immediate) fails
    /// with this status
    pub fn fail_next(&mut self, status: DriverStatus) {
        self.fail_queue.push_back(status);
    }

    pub fn open_connections(&self) -> usize {
        self.conns.len()
    }

    pub fn open_statements(&self) -> usize {
        self.stmts.len()
    }

    pub fn add_lob(&mut self, bytes: Vec<u8>) -> LobHandle {
        let handle = self.alloc();
        self.lobs.insert(handle, bytes);
        LobHandle(handle)
    }

    /// Binds recorded against the statement whose SQL contains `needle`,
    /// whether the statement is still live or already freed
    pub fn binds_for(&self, needle: &str) -> Vec<(u32, BindValue)> {
        self.stmts
            .values()
            .chain(self.retired.iter())
            .find(|s| s.sql.as_deref().map(|sql| sql.contains(needle)).unwrap_or(false))
            .map(|s| s.binds.clone())
            .unwrap_or_default()
    }

    fn alloc(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn take_failure(&mut self) -> DriverResult<()> {
        match self.fail_queue.pop_front() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn script_for(&self, sql: &str) -> Option<&ScriptedQuery> {
        self.scripts.iter().rev().find(|s| sql.contains(&s.needle))
    }

    fn stmt(&mut self, stmt: StmtHandle) -> DriverResult<&mut StmtState> {
        self.stmts
            .get_mut(&stmt.0)
            .ok_or_else(|| DriverStatus::new(-1, "unknown statement handle"))
    }
}

/// Scripted driver fake. Cheap to construct; grab [`MockDriver::state`]
/// before handing the box to the cache.
pub struct MockDriver {
    state: SharedMockState,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn state(&self) -> SharedMockState {
        Arc::clone(&self.state)
    }

    pub fn fail_next(&self, status: DriverStatus) {
        self.state.lock().unwrap().fail_next(status);
    }

    /// Serves `columns`/`rows` for any statement whose SQL contains `needle`
    pub fn script_query(
        &self,
        needle: &str,
        columns: Vec<RemoteColumn>,
        rows: Vec<Vec<RawColumn>>,
    ) {
        let affected = rows.len() as u64;
        self.state.lock().unwrap().scripts.push(ScriptedQuery {
            needle: needle.to_string(),
            columns,
            rows,
            affected,
            outputs: HashMap::new(),
        });
    }

    /// Serves an affected-row count for a DML statement matched by `needle`
    pub fn script_modify(&self, needle: &str, affected: u64) {
        self.state.lock().unwrap().scripts.push(ScriptedQuery {
            needle: needle.to_string(),
            columns: vec![],
            rows: vec![],
            affected,
            outputs: HashMap::new(),
        });
    }

    /// Scripts the value read back from an output placeholder after a DML
    /// statement matched by `needle` executes
    pub fn script_output(&self, needle: &str, pos: u32, value: RawColumn) {
        let mut state = self.state.lock().unwrap();
        if let Some(script) = state.scripts.iter_mut().find(|s| s.needle == needle) {
            script.outputs.insert(pos, value);
            return;
        }
        let mut outputs = HashMap::new();
        outputs.insert(pos, value);
        state.scripts.push(ScriptedQuery {
            needle: needle.to_string(),
            columns: vec![],
            rows: vec![],
            affected: 1,
            outputs,
        });
    }

    pub fn add_lob(&self, bytes: Vec<u8>) -> LobHandle {
        self.state.lock().unwrap().add_lob(bytes)
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl OracleDriver for MockDriver {
    fn create_env(&mut self, _locale: &str) -> DriverResult<EnvHandle> {
        let mut state = self.state.lock().unwrap();
        let handle = state.alloc();
        state.envs.insert(handle);
        Ok(EnvHandle(handle))
    }

    fn destroy_env(&mut self, env: EnvHandle) -> DriverResult<()> {
        if self.state.lock().unwrap().envs.remove(&env.0) {
            Ok(())
        } else {
            Err(DriverStatus::new(-1, "unknown environment handle"))
        }
    }

    fn connect(
        &mut self,
        env: EnvHandle,
        server: &str,
        user: &str,
        password: &str,
        token: &str,
    ) -> DriverResult<ConnHandle> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;

        if !state.envs.contains(&env.0) {
            return Err(DriverStatus::new(-1, "unknown environment handle"));
        }

        state.connects.push((
            server.to_string(),
            user.to_string(),
            password.to_string(),
            token.to_string(),
        ));

        let handle = state.alloc();
        state.conns.insert(handle);
        Ok(ConnHandle(handle))
    }

    fn set_autocommit(&mut self, conn: ConnHandle, _enabled: bool) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        if state.conns.contains(&conn.0) {
            Ok(())
        } else {
            Err(DriverStatus::new(-1, "unknown connection handle"))
        }
    }

    fn disconnect(&mut self, conn: ConnHandle) -> DriverResult<()> {
        if self.state.lock().unwrap().conns.remove(&conn.0) {
            Ok(())
        } else {
            Err(DriverStatus::new(-1, "unknown connection handle"))
        }
    }

    fn alloc_statement(&mut self, conn: ConnHandle) -> DriverResult<StmtHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.conns.contains(&conn.0) {
            return Err(DriverStatus::new(-1, "unknown connection handle"));
        }
        let handle = state.alloc();
        state.stmts.insert(handle, StmtState::default());
        Ok(StmtHandle(handle))
    }

    fn free_statement(&mut self, stmt: StmtHandle) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.stmts.remove(&stmt.0) {
            Some(entry) => {
                state.retired.push(entry);
                Ok(())
            }
            None => Err(DriverStatus::new(-1, "unknown statement handle")),
        }
    }

    fn cancel(&mut self, _stmt: StmtHandle) -> DriverResult<()> {
        self.state.lock().unwrap().cancelled += 1;
        Ok(())
    }

    fn execute_immediate(&mut self, conn: ConnHandle, sql: &str) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        if !state.conns.contains(&conn.0) {
            return Err(DriverStatus::new(-1, "unknown connection handle"));
        }
        state.immediates.push(sql.to_string());
        Ok(())
    }

    fn prepare(&mut self, stmt: StmtHandle, sql: &str) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        state.prepared.push(sql.to_string());
        let entry = state.stmt(stmt)?;
        entry.sql = Some(sql.to_string());
        entry.cursor = None;
        entry.binds.clear();
        Ok(())
    }

    fn set_prefetch(&mut self, stmt: StmtHandle, rows: u32) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.stmt(stmt)?;
        state.prefetches.push((stmt, rows));
        Ok(())
    }

    fn describe(&mut self, stmt: StmtHandle) -> DriverResult<Vec<RemoteColumn>> {
        let mut state = self.state.lock().unwrap();
        let sql = state.stmt(stmt)?.sql.clone().unwrap_or_default();
        Ok(state
            .script_for(&sql)
            .map(|s| s.columns.clone())
            .unwrap_or_default())
    }

    fn bind(&mut self, stmt: StmtHandle, pos: u32, value: &BindValue) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.stmt(stmt)?.binds.push((pos, value.clone()));
        Ok(())
    }

    fn execute(&mut self, stmt: StmtHandle) -> DriverResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        let sql = state.stmt(stmt)?.sql.clone().unwrap_or_default();
        let affected = state.script_for(&sql).map(|s| s.affected).unwrap_or(0);
        state.stmt(stmt)?.cursor = None;
        Ok(affected)
    }

    fn fetch(&mut self, stmt: StmtHandle) -> DriverResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        let sql = state.stmt(stmt)?.sql.clone().unwrap_or_default();
        let row_count = state.script_for(&sql).map(|s| s.rows.len()).unwrap_or(0);

        let entry = state.stmt(stmt)?;
        let next = entry.cursor.map(|c| c + 1).unwrap_or(0);
        if next < row_count {
            entry.cursor = Some(next);
            Ok(true)
        } else {
            entry.cursor = Some(row_count);
            Ok(false)
        }
    }

    fn get_column(&mut self, stmt: StmtHandle, col: usize) -> DriverResult<RawColumn> {
        let state = self.state.lock().unwrap();
        let entry = state
            .stmts
            .get(&stmt.0)
            .ok_or_else(|| DriverStatus::new(-1, "unknown statement handle"))?;
        let sql = entry.sql.clone().unwrap_or_default();
        let cursor = entry
            .cursor
            .ok_or_else(|| DriverStatus::new(-1, "no current row"))?;

        state
            .script_for(&sql)
            .and_then(|s| s.rows.get(cursor))
            .and_then(|row| row.get(col))
            .cloned()
            .ok_or_else(|| DriverStatus::new(-1, "no current row"))
    }

    fn read_lob_chunk(&mut self, lob: LobHandle, offset: u64, len: usize) -> DriverResult<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let bytes = state
            .lobs
            .get(&lob.0)
            .ok_or_else(|| DriverStatus::new(-1, "unknown lob handle"))?;

        let start = (offset as usize).min(bytes.len());
        let end = (start + len).min(bytes.len());
        Ok(bytes[start..end].to_vec())
    }

    fn close_lob(&mut self, lob: LobHandle) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.lobs.contains_key(&lob.0) {
            return Err(DriverStatus::new(-1, "unknown lob handle"));
        }
        state.closed_lobs += 1;
        Ok(())
    }

    fn read_output(&mut self, stmt: StmtHandle, pos: u32) -> DriverResult<RawColumn> {
        let mut state = self.state.lock().unwrap();
        let sql = state.stmt(stmt)?.sql.clone().unwrap_or_default();
        Ok(state
            .script_for(&sql)
            .and_then(|s| s.outputs.get(&pos))
            .cloned()
            .unwrap_or(RawColumn::Null))
    }
}

/// A two-column describe result used across the test suites:
/// `ID NUMBER(10,0)` and `NAME VARCHAR2(100)`
pub fn emp_columns() -> Vec<RemoteColumn> {
    vec![
        RemoteColumn {
            name: "ID".to_string(),
            type_code: type_codes::NUMBER,
            char_len: 0,
            byte_len: 22,
            precision: 10,
            scale: 0,
            nullable: false,
            charset: 0,
        },
        RemoteColumn {
            name: "NAME".to_string(),
            type_code: type_codes::VARCHAR2,
            char_len: 100,
            byte_len: 100,
            nullable: true,
            precision: 0,
            scale: 0,
            charset: 873,
        },
    ]
}
