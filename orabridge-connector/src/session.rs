use orabridge_core::err::Result;
use orabridge_logging::debug;

use crate::{
    error::{from_status, ErrorKind},
    ConnId, ConnectionConfig, EnvId, HandleCache,
};

/// Handles resolved for one unit of query execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub env: EnvId,
    pub conn: ConnId,
}

/// How a transaction or subtransaction boundary ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEnd {
    Commit,
    Rollback,
}

/// Resolves cache entries for query execution and keeps every cached
/// connection's remote transaction state aligned with the host's
/// transaction nesting.
///
/// The host reports its current nesting depth when a session is requested;
/// remote savepoints are established lazily so a connection first touched
/// at depth 4 receives savepoints 2, 3 and 4 in order. Savepoint names are
/// `s<level>`; the remote engine overwrites a redefined name, which is
/// exactly the semantic rollback-to-level needs.
pub struct SessionManager {
    cache: HandleCache,
}

impl SessionManager {
    pub fn new(cache: HandleCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &HandleCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut HandleCache {
        &mut self.cache
    }

    /// Resolves (and opens if needed) the connection for the given config,
    /// then brings its savepoint chain up to the host's nesting depth.
    ///
    /// A host depth of 0 is treated as 1: any query execution implies an
    /// open transaction.
    pub fn get_session(&mut self, conf: &ConnectionConfig, host_level: u32) -> Result<Session> {
        let env = self.cache.acquire_environment(conf.locale())?;
        let conn = self
            .cache
            .acquire_connection(env, &conf.key(), conf.password())?;

        let target = host_level.max(1);
        self.ensure_savepoints(conn, target)?;

        Ok(Session { env, conn })
    }

    /// Issues `SAVEPOINT s<n>` for every level between the connection's
    /// current depth and `target`, in ascending order.
    pub fn ensure_savepoints(&mut self, conn: ConnId, target: u32) -> Result<()> {
        let mut level = self.cache.connection_level(conn)?;
        if level >= target {
            return Ok(());
        }

        let handle = self.cache.connection_handle(conn)?;
        let driver = self.cache.driver();

        while level < target {
            level += 1;
            // Level 1 is the transaction itself; the remote transaction
            // starts implicitly with the first statement.
            if level >= 2 {
                let sql = format!("SAVEPOINT s{}", level);
                debug!("remote: {}", sql);
                driver
                    .lock()
                    .unwrap()
                    .execute_immediate(handle, &sql)
                    .map_err(|st| {
                        from_status(ErrorKind::Execution, "Failed to set remote savepoint", st)
                    })?;
            }
            self.cache.set_connection_level(conn, level)?;
        }

        Ok(())
    }

    /// Ends the host's subtransaction at `level` on every connection that
    /// reached that depth.
    ///
    /// Commit is a complete no-op: the savepoint stays in place, the
    /// tracked depth stays put, and re-entering the level overwrites the
    /// name remotely. Only rollback replays `ROLLBACK TO SAVEPOINT s<level>`
    /// and drops the tracked depth below it.
    pub fn end_subtransaction(&mut self, level: u32, end: TransactionEnd) -> Result<()> {
        if end == TransactionEnd::Commit {
            return Ok(());
        }

        for conn in self.cache.connection_ids() {
            if self.cache.connection_level(conn)? < level {
                continue;
            }

            let handle = self.cache.connection_handle(conn)?;
            let sql = format!("ROLLBACK TO SAVEPOINT s{}", level);
            debug!("remote: {}", sql);
            self.cache
                .driver()
                .lock()
                .unwrap()
                .execute_immediate(handle, &sql)
                .map_err(|st| {
                    from_status(
                        ErrorKind::Execution,
                        "Failed to roll back remote savepoint",
                        st,
                    )
                })?;

            self.cache.set_connection_level(conn, level - 1)?;
        }

        Ok(())
    }

    /// Ends the host's top-level transaction on every connection with an
    /// open remote transaction.
    ///
    /// Open statements are closed first (the remote boundary invalidates
    /// their cursors), then COMMIT or ROLLBACK is issued and the level
    /// resets to 0. With `suppress_errors` set, remote failures are logged
    /// and swallowed (abort paths must not raise again).
    pub fn end_transaction(&mut self, end: TransactionEnd, suppress_errors: bool) -> Result<()> {
        for conn in self.cache.connection_ids() {
            if self.cache.connection_level(conn)? == 0 {
                continue;
            }

            self.cache.release_all_statements(conn, suppress_errors)?;

            let handle = self.cache.connection_handle(conn)?;
            let sql = match end {
                TransactionEnd::Commit => "COMMIT",
                TransactionEnd::Rollback => "ROLLBACK",
            };
            debug!("remote: {}", sql);

            let res = self.cache.driver().lock().unwrap().execute_immediate(handle, sql);
            if let Err(st) = res {
                if !suppress_errors {
                    return Err(from_status(
                        ErrorKind::Execution,
                        "Failed to end remote transaction",
                        st,
                    ));
                }
                orabridge_logging::warn!("ignoring transaction-end failure: {}", st.message);
            }

            self.cache.set_connection_level(conn, 0)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;
    use pretty_assertions::assert_eq;

    fn manager() -> (SessionManager, crate::testing::SharedMockState) {
        let driver = MockDriver::new();
        let state = driver.state();
        (
            SessionManager::new(HandleCache::new(Box::new(driver))),
            state,
        )
    }

    fn conf(server: &str) -> ConnectionConfig {
        ConnectionConfig {
            connect_string: Some(server.to_string()),
            user: Some("scott".to_string()),
            password: Some("tiger".to_string()),
            token: None,
            locale: None,
        }
    }

    #[test]
    fn test_first_session_opens_transaction_without_savepoint() {
        let (mut mgr, state) = manager();

        let session = mgr.get_session(&conf("db1"), 0).unwrap();

        assert_eq!(mgr.cache().connection_level(session.conn).unwrap(), 1);
        assert_eq!(state.lock().unwrap().immediates, Vec::<String>::new());
    }

    #[test]
    fn test_savepoints_established_in_ascending_order() {
        let (mut mgr, state) = manager();

        mgr.get_session(&conf("db1"), 4).unwrap();

        assert_eq!(
            state.lock().unwrap().immediates,
            vec!["SAVEPOINT s2", "SAVEPOINT s3", "SAVEPOINT s4"]
        );
    }

    #[test]
    fn test_savepoints_not_reissued_at_same_level() {
        let (mut mgr, state) = manager();

        mgr.get_session(&conf("db1"), 2).unwrap();
        mgr.get_session(&conf("db1"), 2).unwrap();

        assert_eq!(state.lock().unwrap().immediates, vec!["SAVEPOINT s2"]);
    }

    #[test]
    fn test_subtransaction_rollback_replays_savepoint() {
        let (mut mgr, state) = manager();

        let session = mgr.get_session(&conf("db1"), 3).unwrap();
        mgr.end_subtransaction(3, TransactionEnd::Rollback).unwrap();

        assert_eq!(mgr.cache().connection_level(session.conn).unwrap(), 2);
        assert_eq!(
            state.lock().unwrap().immediates.last().unwrap(),
            "ROLLBACK TO SAVEPOINT s3"
        );
    }

    #[test]
    fn test_subtransaction_commit_is_remote_noop() {
        let (mut mgr, state) = manager();

        let session = mgr.get_session(&conf("db1"), 2).unwrap();
        mgr.end_subtransaction(2, TransactionEnd::Commit).unwrap();

        // The tracked depth is untouched, so re-entering level 2 does not
        // reissue the savepoint
        assert_eq!(mgr.cache().connection_level(session.conn).unwrap(), 2);
        mgr.get_session(&conf("db1"), 2).unwrap();
        // Only the original SAVEPOINT; no RELEASE, no rollback
        assert_eq!(state.lock().unwrap().immediates, vec!["SAVEPOINT s2"]);
    }

    #[test]
    fn test_end_transaction_commits_every_open_connection() {
        let (mut mgr, state) = manager();

        let a = mgr.get_session(&conf("db1"), 1).unwrap();
        let b = mgr.get_session(&conf("db2"), 1).unwrap();
        assert_ne!(a.conn, b.conn);

        mgr.end_transaction(TransactionEnd::Commit, false).unwrap();

        assert_eq!(state.lock().unwrap().immediates, vec!["COMMIT", "COMMIT"]);
        assert_eq!(mgr.cache().connection_level(a.conn).unwrap(), 0);
        assert_eq!(mgr.cache().connection_level(b.conn).unwrap(), 0);
    }

    #[test]
    fn test_end_transaction_skips_idle_connections() {
        let (mut mgr, state) = manager();

        mgr.get_session(&conf("db1"), 1).unwrap();
        mgr.end_transaction(TransactionEnd::Rollback, false).unwrap();
        // Second boundary with no new work on the connection
        mgr.end_transaction(TransactionEnd::Rollback, false).unwrap();

        assert_eq!(state.lock().unwrap().immediates, vec!["ROLLBACK"]);
    }

    #[test]
    fn test_end_transaction_closes_open_statements_first() {
        let (mut mgr, state) = manager();

        let session = mgr.get_session(&conf("db1"), 1).unwrap();
        mgr.cache_mut().allocate_statement(session.conn).unwrap();

        mgr.end_transaction(TransactionEnd::Commit, false).unwrap();

        assert!(mgr.cache().statements(session.conn).unwrap().is_empty());
        assert_eq!(state.lock().unwrap().open_statements(), 0);
    }

    #[test]
    fn test_suppressed_transaction_end_swallows_remote_failure() {
        let (mut mgr, state) = manager();

        mgr.get_session(&conf("db1"), 1).unwrap();
        state
            .lock()
            .unwrap()
            .fail_next(crate::DriverStatus::new(3114, "not connected"));

        mgr.end_transaction(TransactionEnd::Rollback, true).unwrap();
    }
}
