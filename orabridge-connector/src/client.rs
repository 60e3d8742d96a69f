use std::sync::{Arc, Mutex};

/// Opaque remote environment handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvHandle(pub u64);

/// Opaque remote connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle(pub u64);

/// Opaque remote statement handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtHandle(pub u64);

/// Opaque large-object locator, valid until the owning row is fetched past
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LobHandle(pub u64);

/// Raw diagnostic record returned by a failed driver call.
///
/// Never inspected by callers directly; `error::from_status` is the single
/// normalization point that classifies these.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverStatus {
    /// Numeric error code reported by the remote engine
    pub code: i32,
    /// SQLSTATE-style condition class, when the driver supplies one
    pub sqlstate: Option<String>,
    /// Verbatim diagnostic message text
    pub message: String,
}

impl DriverStatus {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            sqlstate: None,
            message: message.into(),
        }
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverStatus>;

/// Public type codes reported by the driver's describe call.
///
/// `BOOLEAN` is deliberately absent: the driver reports boolean columns
/// with a code outside this enumeration (see `OracleType::from_code`).
pub mod type_codes {
    pub const VARCHAR2: i32 = 1;
    pub const NUMBER: i32 = 2;
    pub const LONG: i32 = 8;
    pub const DATE: i32 = 12;
    pub const RAW: i32 = 23;
    pub const LONG_RAW: i32 = 24;
    pub const CHAR: i32 = 96;
    pub const BINARY_FLOAT: i32 = 100;
    pub const BINARY_DOUBLE: i32 = 101;
    pub const XML: i32 = 108;
    pub const CLOB: i32 = 112;
    pub const BLOB: i32 = 113;
    pub const TIMESTAMP: i32 = 187;
    pub const TIMESTAMP_TZ: i32 = 188;
    pub const INTERVAL_YM: i32 = 189;
    pub const INTERVAL_DS: i32 = 190;
    pub const TIMESTAMP_LTZ: i32 = 232;
}

/// Per-column metadata returned by the driver's describe call
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteColumn {
    pub name: String,
    /// One of [`type_codes`], or an out-of-enumeration code
    pub type_code: i32,
    /// Length in characters for character types
    pub char_len: u32,
    /// Length in bytes for character/binary types
    pub byte_len: u32,
    pub precision: i16,
    pub scale: i16,
    pub nullable: bool,
    /// Character set id; 0 when the column carries no codepage
    pub charset: u16,
}

/// A fetched column buffer in the driver's wire representation
#[derive(Debug, Clone, PartialEq)]
pub enum RawColumn {
    /// NULL indicator set
    Null,
    /// The raw value buffer. Character and numeric data arrive as text
    /// bytes; `LONG`-family columns prefix the payload with a 4-byte
    /// little-endian length.
    Bytes(Vec<u8>),
    /// A LOB locator to be read in chunks
    Lob(LobHandle),
}

/// A parameter value in the driver's wire representation
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    /// Standard text rendering of the value
    Text(String),
    /// Raw length-prefixed LOB payload
    Bytes(Vec<u8>),
    /// Output binding slot (RETURNING ... INTO)
    Output,
}

/// The blocking, synchronous call surface of the remote client library.
///
/// Every method is a remote round-trip (or a local handle operation) and
/// reports failure as a raw [`DriverStatus`]. The cache/session layers own
/// all handle lifetimes; implementations only allocate and free.
pub trait OracleDriver: Send {
    /// Allocates a client environment configured for the given locale
    fn create_env(&mut self, locale: &str) -> DriverResult<EnvHandle>;

    fn destroy_env(&mut self, env: EnvHandle) -> DriverResult<()>;

    /// Opens a physical connection. When `token` is non-empty, token-based
    /// auth is attempted; otherwise user/password auth is used.
    fn connect(
        &mut self,
        env: EnvHandle,
        server: &str,
        user: &str,
        password: &str,
        token: &str,
    ) -> DriverResult<ConnHandle>;

    fn set_autocommit(&mut self, conn: ConnHandle, enabled: bool) -> DriverResult<()>;

    /// Graceful disconnect of a connection previously returned by `connect`
    fn disconnect(&mut self, conn: ConnHandle) -> DriverResult<()>;

    fn alloc_statement(&mut self, conn: ConnHandle) -> DriverResult<StmtHandle>;

    fn free_statement(&mut self, stmt: StmtHandle) -> DriverResult<()>;

    /// Best-effort cancellation of an executing statement
    fn cancel(&mut self, stmt: StmtHandle) -> DriverResult<()>;

    /// Executes a statement that produces no result set (savepoints,
    /// COMMIT/ROLLBACK, TRUNCATE)
    fn execute_immediate(&mut self, conn: ConnHandle, sql: &str) -> DriverResult<()>;

    fn prepare(&mut self, stmt: StmtHandle, sql: &str) -> DriverResult<()>;

    /// Rows transferred per fetch round-trip on this statement
    fn set_prefetch(&mut self, stmt: StmtHandle, rows: u32) -> DriverResult<()>;

    /// Column metadata of a prepared query
    fn describe(&mut self, stmt: StmtHandle) -> DriverResult<Vec<RemoteColumn>>;

    /// Binds the value for the 1-based placeholder position
    fn bind(&mut self, stmt: StmtHandle, pos: u32, value: &BindValue) -> DriverResult<()>;

    /// Executes the prepared statement, returning the affected row count
    fn execute(&mut self, stmt: StmtHandle) -> DriverResult<u64>;

    /// Advances to the next row; false once the result set is exhausted
    fn fetch(&mut self, stmt: StmtHandle) -> DriverResult<bool>;

    /// The raw buffer of the given 0-based column of the current row
    fn get_column(&mut self, stmt: StmtHandle, col: usize) -> DriverResult<RawColumn>;

    /// Reads up to `len` bytes of a LOB starting at `offset`
    fn read_lob_chunk(
        &mut self,
        lob: LobHandle,
        offset: u64,
        len: usize,
    ) -> DriverResult<Vec<u8>>;

    fn close_lob(&mut self, lob: LobHandle) -> DriverResult<()>;

    /// Reads the value bound to an output placeholder after execution
    fn read_output(&mut self, stmt: StmtHandle, pos: u32) -> DriverResult<RawColumn>;
}

/// Shared handle to the driver.
///
/// The engine itself is single-threaded per process; the mutex only guards
/// against a multi-threaded host embedding several executors.
pub type SharedDriver = Arc<Mutex<Box<dyn OracleDriver>>>;

pub fn shared_driver(driver: Box<dyn OracleDriver>) -> SharedDriver {
    Arc::new(Mutex::new(driver))
}
