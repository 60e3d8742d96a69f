use orabridge_core::err::{bail, Result};
use orabridge_logging::{debug, warn};

use crate::{
    error::{from_status, ErrorKind, RemoteError},
    ConnHandle, DriverStatus, EnvHandle, OracleDriver, SharedDriver, StmtHandle,
};

/// Stable identifier of a cached environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(u64);

/// Stable identifier of a cached connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

/// Cache matching key of a physical connection.
///
/// Absent components normalize to the empty string, so a missing credential
/// and an explicitly empty one match the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub server: String,
    pub user: String,
    pub token: String,
}

impl ConnectionKey {
    pub fn new(server: Option<&str>, user: Option<&str>, token: Option<&str>) -> Self {
        Self {
            server: server.unwrap_or("").to_string(),
            user: user.unwrap_or("").to_string(),
            token: token.unwrap_or("").to_string(),
        }
    }
}

/// One remote client environment per distinct locale
struct Environment {
    id: EnvId,
    locale: String,
    handle: EnvHandle,
    connections: Vec<Connection>,
}

/// One cached physical connection
struct Connection {
    id: ConnId,
    key: ConnectionKey,
    handle: ConnHandle,
    /// 0 = no open remote transaction, N = N savepoint levels established
    xact_level: u32,
    /// Open statement handles, most recently allocated first
    statements: Vec<StmtHandle>,
}

/// Process-wide registry of remote environment, connection and statement
/// handles.
///
/// An explicit instance with an explicit lifecycle: construct once at
/// process start, call [`HandleCache::shutdown`] at process end. Connections
/// are expensive (auth round-trip) and carry transactional state, so they
/// are cached and keyed by identity; statement handles are cheap and cached
/// only so an open cursor can be found again on scan continuation.
///
/// Not internally synchronized beyond the driver mutex; the host is expected
/// to drive one operation at a time per instance.
pub struct HandleCache {
    driver: SharedDriver,
    envs: Vec<Environment>,
    next_id: u64,
    /// When set, teardown errors are swallowed (process shutdown)
    silent: bool,
}

impl HandleCache {
    pub fn new(driver: Box<dyn OracleDriver>) -> Self {
        Self {
            driver: crate::shared_driver(driver),
            envs: Vec::new(),
            next_id: 1,
            silent: false,
        }
    }

    /// A shared handle to the underlying driver, for the execution layers
    pub fn driver(&self) -> SharedDriver {
        SharedDriver::clone(&self.driver)
    }

    /// Enables/disables silent teardown mode
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Returns the environment for the locale, creating it on first use.
    ///
    /// Matching is an exact string comparison. A failed creation leaves the
    /// cache unchanged.
    pub fn acquire_environment(&mut self, locale: &str) -> Result<EnvId> {
        if let Some(env) = self.envs.iter().find(|e| e.locale == locale) {
            return Ok(env.id);
        }

        let handle = self
            .driver
            .lock()
            .unwrap()
            .create_env(locale)
            .map_err(|st| {
                from_status(
                    ErrorKind::Connection,
                    "Failed to create remote environment",
                    st,
                )
            })?;

        let id = EnvId(self.alloc_id());
        self.envs.push(Environment {
            id,
            locale: locale.to_string(),
            handle,
            connections: Vec::new(),
        });
        debug!("created environment for locale {:?}", locale);

        Ok(id)
    }

    /// Returns the cached connection matching `key`, or opens a new one.
    ///
    /// New connections get remote autocommit disabled before being cached,
    /// and start at transaction level 0.
    pub fn acquire_connection(
        &mut self,
        env_id: EnvId,
        key: &ConnectionKey,
        password: &str,
    ) -> Result<ConnId> {
        let id = ConnId(self.alloc_id());
        let env = self.env_mut(env_id)?;

        if let Some(conn) = env.connections.iter().find(|c| c.key == *key) {
            debug!("reusing cached connection to {:?}", key.server);
            return Ok(conn.id);
        }

        let env_handle = env.handle;
        let handle = {
            let mut driver = self.driver.lock().unwrap();

            let handle = driver
                .connect(env_handle, &key.server, &key.user, password, &key.token)
                .map_err(|st| auth_error(key, password, st))?;

            if let Err(st) = driver.set_autocommit(handle, false) {
                // Keep the cache consistent: the half-initialized connection
                // must not be retained.
                let _ = driver.disconnect(handle);
                return Err(from_status(
                    ErrorKind::Connection,
                    "Failed to disable remote autocommit",
                    st,
                ));
            }

            handle
        };

        debug!("connected to {:?} as {:?}", key.server, key.user);

        let env = self.env_mut(env_id)?;
        env.connections.push(Connection {
            id,
            key: key.clone(),
            handle,
            xact_level: 0,
            statements: Vec::new(),
        });

        Ok(id)
    }

    /// Closes all of the connection's statements, disconnects and removes it
    /// from the cache. Idempotent in silent mode.
    pub fn release_connection(&mut self, env_id: EnvId, conn_id: ConnId) -> Result<()> {
        let silent = self.silent;
        let driver = self.driver();
        let env = match self.env_mut(env_id) {
            Ok(env) => env,
            Err(_) if silent => return Ok(()),
            Err(err) => return Err(err),
        };

        let pos = match env.connections.iter().position(|c| c.id == conn_id) {
            Some(pos) => pos,
            None if silent => return Ok(()),
            None => bail!("connection is not cached"),
        };

        let conn = env.connections.remove(pos);
        let mut driver = driver.lock().unwrap();

        for stmt in conn.statements {
            if let Err(st) = driver.free_statement(stmt) {
                if !silent {
                    return Err(from_status(
                        ErrorKind::Execution,
                        "Failed to free statement handle",
                        st,
                    ));
                }
                warn!("ignoring statement teardown failure: {}", st.message);
            }
        }

        if let Err(st) = driver.disconnect(conn.handle) {
            if !silent {
                return Err(from_status(
                    ErrorKind::Connection,
                    "Failed to disconnect",
                    st,
                ));
            }
            warn!("ignoring disconnect failure: {}", st.message);
        }

        debug!("released connection to {:?}", conn.key.server);
        Ok(())
    }

    /// Releases an environment; only legal once its connection list is empty
    pub fn release_environment(&mut self, env_id: EnvId) -> Result<()> {
        let pos = self
            .envs
            .iter()
            .position(|e| e.id == env_id)
            .ok_or_else(|| RemoteError::new(ErrorKind::Execution, "environment is not cached"))?;

        if !self.envs[pos].connections.is_empty() {
            bail!("cannot release environment with live connections");
        }

        let env = self.envs.remove(pos);
        if let Err(st) = self.driver.lock().unwrap().destroy_env(env.handle) {
            if !self.silent {
                return Err(from_status(
                    ErrorKind::Connection,
                    "Failed to destroy remote environment",
                    st,
                ));
            }
            warn!("ignoring environment teardown failure: {}", st.message);
        }

        Ok(())
    }

    /// Allocates a statement handle on the connection.
    ///
    /// The handle is recorded most-recently-allocated first; a failed
    /// allocation leaves the connection's handle list untouched.
    pub fn allocate_statement(&mut self, conn_id: ConnId) -> Result<StmtHandle> {
        let driver = self.driver();
        let conn = self.conn_mut(conn_id)?;
        let handle = driver
            .lock()
            .unwrap()
            .alloc_statement(conn.handle)
            .map_err(|st| {
                from_status(ErrorKind::Execution, "Failed to allocate statement", st)
            })?;

        conn.statements.insert(0, handle);
        Ok(handle)
    }

    /// Removes the statement from the connection's handle list and frees it
    pub fn release_statement(&mut self, conn_id: ConnId, stmt: StmtHandle) -> Result<()> {
        let silent = self.silent;
        let driver = self.driver();
        let conn = self.conn_mut(conn_id)?;

        let pos = match conn.statements.iter().position(|s| *s == stmt) {
            Some(pos) => pos,
            None if silent => return Ok(()),
            None => bail!("statement handle is not tracked by this connection"),
        };
        conn.statements.remove(pos);

        if let Err(st) = driver.lock().unwrap().free_statement(stmt) {
            if !silent {
                return Err(from_status(
                    ErrorKind::Execution,
                    "Failed to free statement handle",
                    st,
                ));
            }
            warn!("ignoring statement teardown failure: {}", st.message);
        }

        Ok(())
    }

    /// Closes every open statement of the connection (a remote transaction
    /// boundary invalidates cursors)
    pub fn release_all_statements(&mut self, conn_id: ConnId, silent: bool) -> Result<()> {
        let stmts = self.conn_mut(conn_id)?.statements.clone();
        let saved = self.silent;
        self.silent = self.silent || silent;
        let res = stmts
            .into_iter()
            .try_for_each(|stmt| self.release_statement(conn_id, stmt));
        self.silent = saved;
        res
    }

    /// Best-effort broadcast cancel over every open statement handle.
    /// Errors are ignored; the cache does not know which statement is
    /// currently executing.
    pub fn cancel_all(&mut self) {
        let mut driver = self.driver.lock().unwrap();
        for env in self.envs.iter() {
            for conn in env.connections.iter() {
                for stmt in conn.statements.iter() {
                    let _ = driver.cancel(*stmt);
                }
            }
        }
    }

    /// Tears down every cached handle, swallowing errors
    pub fn shutdown(&mut self) {
        self.silent = true;

        let env_ids: Vec<EnvId> = self.envs.iter().map(|e| e.id).collect();
        for env_id in env_ids {
            let conn_ids: Vec<ConnId> = match self.env_mut(env_id) {
                Ok(env) => env.connections.iter().map(|c| c.id).collect(),
                Err(_) => continue,
            };
            for conn_id in conn_ids {
                let _ = self.release_connection(env_id, conn_id);
            }
            let _ = self.release_environment(env_id);
        }
    }

    pub fn connection_level(&self, conn_id: ConnId) -> Result<u32> {
        Ok(self.conn(conn_id)?.xact_level)
    }

    pub fn set_connection_level(&mut self, conn_id: ConnId, level: u32) -> Result<()> {
        self.conn_mut(conn_id)?.xact_level = level;
        Ok(())
    }

    pub fn connection_handle(&self, conn_id: ConnId) -> Result<ConnHandle> {
        Ok(self.conn(conn_id)?.handle)
    }

    /// Ids of every cached connection, for transaction-boundary broadcasts
    pub fn connection_ids(&self) -> Vec<ConnId> {
        self.envs
            .iter()
            .flat_map(|e| e.connections.iter().map(|c| c.id))
            .collect()
    }

    /// Open statement handles of a connection, most recently allocated first
    pub fn statements(&self, conn_id: ConnId) -> Result<Vec<StmtHandle>> {
        Ok(self.conn(conn_id)?.statements.clone())
    }

    fn env_mut(&mut self, id: EnvId) -> Result<&mut Environment> {
        self.envs
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| RemoteError::new(ErrorKind::Execution, "environment is not cached").into())
    }

    fn conn(&self, id: ConnId) -> Result<&Connection> {
        self.envs
            .iter()
            .flat_map(|e| e.connections.iter())
            .find(|c| c.id == id)
            .ok_or_else(|| RemoteError::new(ErrorKind::Execution, "connection is not cached").into())
    }

    fn conn_mut(&mut self, id: ConnId) -> Result<&mut Connection> {
        self.envs
            .iter_mut()
            .flat_map(|e| e.connections.iter_mut())
            .find(|c| c.id == id)
            .ok_or_else(|| RemoteError::new(ErrorKind::Execution, "connection is not cached").into())
    }
}

impl Drop for HandleCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Auth failures include each credential component as a separate detail
/// line for diagnosability. This is the only path where the password is
/// echoed.
fn auth_error(key: &ConnectionKey, password: &str, status: DriverStatus) -> orabridge_core::err::Error {
    let detail = format!(
        "{}\nserver: {}\nuser: {}\npassword: {}\ntoken: {}",
        status.message, key.server, key.user, password, key.token
    );

    RemoteError::new(ErrorKind::Connection, "Failed to connect to remote server")
        .with_detail(detail)
        .into()
}
