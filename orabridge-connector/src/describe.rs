use orabridge_core::{data::DataType, err::Result};
use orabridge_logging::debug;

use crate::{
    error::{from_status, ErrorKind},
    types::{check_convert, OracleType},
    HandleCache, RawColumn, Session, TableOptions,
};

/// Quotes an identifier for the remote dialect, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A host-side column definition, as resolved by the host catalog layer.
///
/// Matched against remote columns by case-insensitive name.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalColumn {
    pub name: String,
    /// 1-based local attribute number
    pub attnum: i16,
    pub r#type: DataType,
    /// Host type modifier, required for precision/scale-correct text output
    pub type_mod: i32,
    /// Per-column override of the table's encoding strictness
    pub strict_encoding: Option<bool>,
}

/// Static metadata for one remote column plus its local mapping.
///
/// Immutable after [`describe_table`] except for the `used` flag, which is
/// set during plan-specific column pruning.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub remote_name: String,
    pub remote_type: OracleType,
    pub char_len: u32,
    pub byte_len: u32,
    pub precision: i16,
    pub scale: i16,
    pub nullable: bool,
    pub charset: u16,
    /// 1-based ordinal within the remote primary key, 0 when not a member
    pub pkey_ordinal: u32,
    /// Fetch buffer size for the column's text rendering, fixed at describe
    /// time
    pub val_size: usize,

    /// Local attribute number; 0 when no local column maps to this one
    pub attnum: i16,
    pub local_name: String,
    pub local_type: DataType,
    pub type_mod: i32,
    pub strict_encoding: Option<bool>,

    /// Whether the current query needs this column
    pub used: bool,
}

impl ColumnDescriptor {
    /// Part of the row identity used to target UPDATE/DELETE
    pub fn is_pkey(&self) -> bool {
        self.pkey_ordinal > 0 && self.attnum > 0
    }

    pub fn is_mapped(&self) -> bool {
        self.attnum > 0
    }
}

/// Static metadata for a remote table.
///
/// Built once per planning cycle; deep-cloned when carried into
/// upper-relation or DML contexts so one plan's column pruning never leaks
/// into another's.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub options: TableOptions,
    /// Local table name, for diagnostics only
    pub local_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// The schema-qualified, quoted remote table name
    pub fn qualified_name(&self) -> String {
        match self.options.schema.as_deref() {
            Some(schema) => format!(
                "{}.{}",
                quote_identifier(schema),
                quote_identifier(&self.options.table)
            ),
            None => quote_identifier(&self.options.table),
        }
    }

    pub fn column_by_attnum(&self, attnum: i16) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.attnum == attnum)
    }

    /// Flags the given local attribute numbers as needed by the query
    pub fn mark_used(&mut self, attnums: &[i16]) {
        for col in self.columns.iter_mut() {
            if col.attnum > 0 && attnums.contains(&col.attnum) {
                col.used = true;
            }
        }
    }

    pub fn mark_all_used(&mut self) {
        for col in self.columns.iter_mut() {
            if col.attnum > 0 {
                col.used = true;
            }
        }
    }

    pub fn used_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.used)
    }

    pub fn pkey_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_pkey())
    }
}

/// Builds the descriptor for a remote table.
///
/// Issues a zero-row probe to obtain per-column metadata from the driver's
/// describe call, computes fetch buffer sizes, merges primary-key membership
/// from a separate catalog query, and maps local columns by case-insensitive
/// name. Every mapped column passes the type-compatibility gate or the whole
/// build fails with `InvalidDataType`.
pub fn describe_table(
    cache: &mut HandleCache,
    session: Session,
    options: &TableOptions,
    local_name: &str,
    local_columns: &[LocalColumn],
) -> Result<TableDescriptor> {
    let qualified = match options.schema.as_deref() {
        Some(schema) => format!(
            "{}.{}",
            quote_identifier(schema),
            quote_identifier(&options.table)
        ),
        None => quote_identifier(&options.table),
    };

    let remote_columns = probe_columns(cache, session, &qualified)?;
    let pkey = discover_primary_key(cache, session, options)?;

    let mut columns = Vec::with_capacity(remote_columns.len());
    for remote in remote_columns {
        let remote_type = OracleType::from_code(remote.type_code, remote.charset);
        let val_size = remote_type.val_size(&remote, options.max_long());
        let pkey_ordinal = pkey
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&remote.name))
            .map(|(_, ordinal)| *ordinal)
            .unwrap_or(0);

        let local = local_columns
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(&remote.name));

        if let Some(local) = local {
            check_convert(remote_type, remote.scale, &local.r#type, &local.name)?;
        }

        columns.push(ColumnDescriptor {
            remote_name: remote.name.clone(),
            remote_type,
            char_len: remote.char_len,
            byte_len: remote.byte_len,
            precision: remote.precision,
            scale: remote.scale,
            nullable: remote.nullable,
            charset: remote.charset,
            pkey_ordinal,
            val_size,
            attnum: local.map(|l| l.attnum).unwrap_or(0),
            local_name: local.map(|l| l.name.clone()).unwrap_or_default(),
            local_type: local.map(|l| l.r#type.clone()).unwrap_or(DataType::Null),
            type_mod: local.map(|l| l.type_mod).unwrap_or(-1),
            strict_encoding: local.and_then(|l| l.strict_encoding),
            used: false,
        });
    }

    debug!(
        "described remote table {} ({} columns)",
        qualified,
        columns.len()
    );

    Ok(TableDescriptor {
        options: options.clone(),
        local_name: local_name.to_string(),
        columns,
    })
}

/// The zero-row probe: prepares `SELECT * FROM <table>` limited to one row
/// and reads the driver's column metadata. An object-not-found diagnostic
/// surfaces as `TableNotFound`.
fn probe_columns(
    cache: &mut HandleCache,
    session: Session,
    qualified: &str,
) -> Result<Vec<crate::RemoteColumn>> {
    let sql = format!("SELECT * FROM {} FETCH FIRST 1 ROW ONLY", qualified);
    let stmt = cache.allocate_statement(session.conn)?;
    let driver = cache.driver();

    let res = (|| {
        let mut driver = driver.lock().unwrap();
        driver.prepare(stmt, &sql).map_err(|st| {
            from_status(
                ErrorKind::Execution,
                format!("Failed to describe remote table {}", qualified),
                st,
            )
        })?;
        driver.describe(stmt).map_err(|st| {
            from_status(
                ErrorKind::Execution,
                format!("Failed to describe remote table {}", qualified),
                st,
            )
        })
    })();

    cache.release_statement(session.conn, stmt)?;
    res
}

/// Primary-key membership from the remote catalog: (column name, 1-based
/// ordinal within the key)
fn discover_primary_key(
    cache: &mut HandleCache,
    session: Session,
    options: &TableOptions,
) -> Result<Vec<(String, u32)>> {
    let sql = format!(
        "SELECT ccol.column_name, ccol.position \
         FROM all_cons_columns ccol \
         JOIN all_constraints con \
           ON con.owner = ccol.owner AND con.constraint_name = ccol.constraint_name \
         WHERE con.constraint_type = 'P' \
           AND con.table_name = {} \
           {} \
         ORDER BY ccol.position",
        quote_literal(&options.table),
        match options.schema.as_deref() {
            Some(schema) => format!("AND con.owner = {}", quote_literal(schema)),
            None => "AND con.owner = USER".to_string(),
        }
    );

    let stmt = cache.allocate_statement(session.conn)?;
    let driver = cache.driver();

    let res = (|| {
        let mut driver = driver.lock().unwrap();
        driver.prepare(stmt, &sql).map_err(|st| {
            from_status(ErrorKind::Execution, "Failed to query remote catalog", st)
        })?;
        driver.execute(stmt).map_err(|st| {
            from_status(ErrorKind::Execution, "Failed to query remote catalog", st)
        })?;

        let mut key = Vec::new();
        while driver.fetch(stmt).map_err(|st| {
            from_status(ErrorKind::Execution, "Failed to fetch remote catalog row", st)
        })? {
            let name = column_text(driver.get_column(stmt, 0).map_err(|st| {
                from_status(ErrorKind::Execution, "Failed to read remote catalog row", st)
            })?)?;
            let position = column_text(driver.get_column(stmt, 1).map_err(|st| {
                from_status(ErrorKind::Execution, "Failed to read remote catalog row", st)
            })?)?;

            let ordinal = position
                .parse::<u32>()
                .map_err(|_| {
                    orabridge_core::err::anyhow!(
                        "unexpected key ordinal {:?} in remote catalog",
                        position
                    )
                })?;
            key.push((name, ordinal));
        }

        Ok(key)
    })();

    cache.release_statement(session.conn, stmt)?;
    res
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn column_text(raw: RawColumn) -> Result<String> {
    match raw {
        RawColumn::Bytes(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        _ => Ok(String::new()),
    }
}
