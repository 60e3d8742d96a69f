//! Full-statement SQL assembly on top of the expression deparser.
//!
//! Deparsed fragments carry internal `:p<N>` placeholders; the final text
//! handed to the driver always uses bare `?`. Finalization scans the
//! assembled statement, rewrites each `:p<N>` and records parameters in
//! their execution order. The `?/*:now*/` token survives finalization
//! verbatim so the execution layer can pattern-match it.

use itertools::Itertools;
use orabridge_core::{
    data::DataType,
    err::{bail, Result},
    sqlil::{Expr, Ordering},
};

use crate::{
    deparse::{translate, translate_ordering, DeparseContext, ParamRegistry, TableScope, Translation, NOW_TOKEN},
    error::{ErrorKind, RemoteError},
    params::{BindKind, ParamDesc, ParamSource},
    types::OracleType,
    TableDescriptor,
};

/// The remote engine's hard cap on placeholders per statement
pub const MAX_PARAMS_PER_STMT: u32 = 65535;

/// A fully assembled remote statement
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    /// Final statement text with bare `?` placeholders
    pub sql: String,
    /// The same text with `:p<N>` markers, for diagnostics/EXPLAIN output
    pub annotated_sql: String,
    /// Parameters in execution (placeholder-position) order
    pub params: Vec<ParamDesc>,
    /// Local attribute numbers of the retrieved columns, in select-list
    /// order; 0 marks a computed (expression) target
    pub retrieved_attrs: Vec<i16>,
}

/// One item of a SELECT's target list
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A column of a relation in scope
    Column { rel_id: u32, attnum: i16 },
    /// A computed expression (aggregate, grouping key, ...)
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    /// Rewritten as an EXISTS condition in the enclosing WHERE; the remote
    /// dialect has no join form with guaranteed-equivalent semantics
    Semi,
}

/// A two-way join between the first and second scope of a select
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub conds: Vec<Expr>,
}

/// Inputs for assembling one SELECT
pub struct SelectQuery<'a> {
    pub scopes: Vec<TableScope<'a>>,
    /// Present when two scopes participate; never more than two-way
    pub join: Option<Join>,
    pub targets: Vec<Target>,
    pub conds: Vec<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Vec<Expr>,
    pub order_by: Vec<Ordering>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub for_update: bool,
    /// Whether this is a grouping/aggregation stage (gates aggregates)
    pub grouping: bool,
}

impl<'a> SelectQuery<'a> {
    pub fn scan(scope: TableScope<'a>) -> Self {
        Self {
            scopes: vec![scope],
            join: None,
            targets: vec![],
            conds: vec![],
            group_by: vec![],
            having: vec![],
            order_by: vec![],
            limit: None,
            offset: None,
            for_update: false,
            grouping: false,
        }
    }
}

/// A built SELECT plus the conditions that must stay local
pub struct SelectPlan {
    pub query: BuiltQuery,
    /// Indices into the input `conds` that did not translate
    pub local_cond_indices: Vec<usize>,
}

/// Assembles a SELECT statement.
///
/// Untranslatable WHERE/HAVING conditions are silently kept local and
/// reported back; an untranslatable target or sort key is an error, since
/// the host only requests pushdown of vetted expressions.
pub fn build_select(query: &SelectQuery) -> Result<SelectPlan> {
    if query.scopes.is_empty() {
        bail!("SELECT requires at least one relation in scope");
    }
    if query.join.is_some() && query.scopes.len() != 2 {
        bail!("join pushdown is strictly two-way");
    }

    let mut ctx = if query.grouping {
        DeparseContext::for_grouping(&query.scopes)
    } else {
        DeparseContext::new(&query.scopes)
    };

    // Target list
    let mut retrieved_attrs = Vec::with_capacity(query.targets.len());
    let mut select_items = Vec::with_capacity(query.targets.len());
    for target in query.targets.iter() {
        match target {
            Target::Column { rel_id, attnum } => {
                let expr = column_expr(&query.scopes, *rel_id, *attnum)?;
                match translate(&expr, &mut ctx) {
                    Translation::Translated(sql) => {
                        select_items.push(sql);
                        retrieved_attrs.push(*attnum);
                    }
                    Translation::Rejected => bail!("target column is not shippable"),
                }
            }
            Target::Expr(expr) => match translate(expr, &mut ctx) {
                Translation::Translated(sql) => {
                    select_items.push(sql);
                    retrieved_attrs.push(0);
                }
                Translation::Rejected => bail!("target expression is not shippable"),
            },
        }
    }
    // A query retrieving no columns (COUNT-only shapes) still needs a
    // non-empty select list
    let select_list = if select_items.is_empty() {
        "NULL".to_string()
    } else {
        select_items.iter().join(", ")
    };

    // FROM clause
    let mut where_conds: Vec<String> = Vec::new();
    let from_clause = match query.join.as_ref() {
        None => query
            .scopes
            .iter()
            .map(|s| format!("{} {}", s.table.qualified_name(), s.alias))
            .join(", "),
        Some(join) => {
            let left = &query.scopes[0];
            let right = &query.scopes[1];
            let conds = join
                .conds
                .iter()
                .map(|c| match translate(c, &mut ctx) {
                    Translation::Translated(sql) => Ok(sql),
                    Translation::Rejected => bail!("join condition is not shippable"),
                })
                .collect::<Result<Vec<_>>>()?;

            match join.kind {
                JoinKind::Inner => format!(
                    "{} {} INNER JOIN {} {} ON {}",
                    left.table.qualified_name(),
                    left.alias,
                    right.table.qualified_name(),
                    right.alias,
                    if conds.is_empty() {
                        "(1 = 1)".to_string()
                    } else {
                        conds.iter().join(" AND ")
                    }
                ),
                JoinKind::Semi => {
                    where_conds.push(format!(
                        "EXISTS (SELECT NULL FROM {} {} WHERE {})",
                        right.table.qualified_name(),
                        right.alias,
                        if conds.is_empty() {
                            "(1 = 1)".to_string()
                        } else {
                            conds.iter().join(" AND ")
                        }
                    ));
                    format!("{} {}", left.table.qualified_name(), left.alias)
                }
            }
        }
    };

    // WHERE: untranslatable conditions fall back to local evaluation
    let mut local_cond_indices = Vec::new();
    for (i, cond) in query.conds.iter().enumerate() {
        match translate(cond, &mut ctx) {
            Translation::Translated(sql) => where_conds.push(sql),
            Translation::Rejected => local_cond_indices.push(i),
        }
    }

    let group_by = query
        .group_by
        .iter()
        .map(|e| match translate(e, &mut ctx) {
            Translation::Translated(sql) => Ok(sql),
            Translation::Rejected => bail!("grouping key is not shippable"),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut having = Vec::new();
    for (i, cond) in query.having.iter().enumerate() {
        match translate(cond, &mut ctx) {
            Translation::Translated(sql) => having.push(sql),
            Translation::Rejected => local_cond_indices.push(query.conds.len() + i),
        }
    }

    let order_by = query
        .order_by
        .iter()
        .map(|o| match translate_ordering(o, &mut ctx) {
            Translation::Translated(sql) => Ok(sql),
            Translation::Rejected => bail!("sort key is not shippable"),
        })
        .collect::<Result<Vec<_>>>()?;

    let clauses = [
        format!("SELECT {}", select_list),
        format!("FROM {}", from_clause),
        if where_conds.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_conds.iter().join(" AND "))
        },
        if group_by.is_empty() {
            String::new()
        } else {
            format!("GROUP BY {}", group_by.iter().join(", "))
        },
        if having.is_empty() {
            String::new()
        } else {
            format!("HAVING {}", having.iter().join(" AND "))
        },
        if order_by.is_empty() {
            String::new()
        } else {
            format!("ORDER BY {}", order_by.iter().join(", "))
        },
        match query.offset {
            Some(n) => format!("OFFSET {} ROWS", n),
            None => String::new(),
        },
        match query.limit {
            Some(n) => format!("FETCH FIRST {} ROWS ONLY", n),
            None => String::new(),
        },
        if query.for_update {
            "FOR UPDATE".to_string()
        } else {
            String::new()
        },
    ];

    let annotated = clauses.iter().filter(|c| !c.is_empty()).join(" ");
    let (sql, params) = finalize_placeholders(&annotated, &ctx.params)?;

    Ok(SelectPlan {
        query: BuiltQuery {
            sql,
            annotated_sql: annotated,
            params,
            retrieved_attrs,
        },
        local_cond_indices,
    })
}

fn column_expr(scopes: &[TableScope], rel_id: u32, attnum: i16) -> Result<Expr> {
    let scope = scopes
        .iter()
        .find(|s| s.rel_id == rel_id)
        .ok_or_else(|| orabridge_core::err::anyhow!("target relation is not in scope"))?;
    let col = scope
        .table
        .column_by_attnum(attnum)
        .ok_or_else(|| orabridge_core::err::anyhow!("target column is not described"))?;

    Ok(Expr::column(rel_id, attnum, col.local_type.clone()))
}

/// The value placeholder for one column of a DML statement. Temporal
/// columns get an explicit cast; the driver cannot infer their type from a
/// bare placeholder.
fn value_placeholder(remote: OracleType) -> &'static str {
    match remote {
        OracleType::Date => "CAST(? AS DATE)",
        OracleType::Timestamp | OracleType::TimestampLtz => "CAST(? AS TIMESTAMP)",
        OracleType::TimestampTz => "CAST(? AS TIMESTAMP WITH TIME ZONE)",
        _ => "?",
    }
}

/// Appends `RETURNING <used cols> INTO ?, ...` when any column is flagged
/// used, adding one synthetic output parameter per column
fn returning_clause(
    table: &TableDescriptor,
    params: &mut Vec<ParamDesc>,
    retrieved_attrs: &mut Vec<i16>,
) -> String {
    let used: Vec<_> = table.used_columns().collect();
    if used.is_empty() {
        return String::new();
    }

    let cols = used
        .iter()
        .map(|c| crate::describe::quote_identifier(&c.remote_name))
        .join(", ");
    let slots = used.iter().map(|_| "?").join(", ");

    for col in used {
        params.push(ParamDesc::output(col.local_type.clone()));
        retrieved_attrs.push(col.attnum);
    }

    format!(" RETURNING {} INTO {}", cols, slots)
}

/// WHERE clause targeting one row by its primary-key columns.
///
/// Raised before any remote call: without at least one key column the
/// statement cannot be guaranteed to affect a single row.
fn pkey_where_clause(table: &TableDescriptor, params: &mut Vec<ParamDesc>) -> Result<String> {
    let keys: Vec<_> = table.pkey_columns().collect();
    if keys.is_empty() {
        return Err(RemoteError::new(
            ErrorKind::Execution,
            "no primary key column specified for UPDATE/DELETE row targeting",
        )
        .with_hint("Mark the columns that form the primary key with the \"key\" column option")
        .into());
    }

    let conds = keys
        .iter()
        .map(|c| {
            params.push(ParamDesc {
                local_type: c.local_type.clone(),
                kind: BindKind::for_remote_type(c.remote_type),
                source: ParamSource::KeyColumn(c.attnum),
            });
            format!(
                "{} = {}",
                crate::describe::quote_identifier(&c.remote_name),
                value_placeholder(c.remote_type)
            )
        })
        .join(" AND ");

    Ok(format!(" WHERE {}", conds))
}

/// Assembles an INSERT over every mapped column
pub fn build_insert(table: &TableDescriptor) -> Result<BuiltQuery> {
    let cols: Vec<_> = table.columns.iter().filter(|c| c.is_mapped()).collect();
    if cols.is_empty() {
        bail!("remote table has no mapped columns to insert into");
    }

    let mut params: Vec<ParamDesc> = cols
        .iter()
        .map(|c| ParamDesc {
            local_type: c.local_type.clone(),
            kind: BindKind::for_remote_type(c.remote_type),
            source: ParamSource::Column(c.attnum),
        })
        .collect();

    let mut retrieved_attrs = Vec::new();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        table.qualified_name(),
        cols.iter()
            .map(|c| crate::describe::quote_identifier(&c.remote_name))
            .join(", "),
        cols.iter()
            .map(|c| value_placeholder(c.remote_type))
            .join(", "),
        returning_clause(table, &mut params, &mut retrieved_attrs),
    );

    Ok(BuiltQuery {
        annotated_sql: sql.clone(),
        sql,
        params,
        retrieved_attrs,
    })
}

/// Assembles an UPDATE of the given local columns, targeted by primary key
pub fn build_update(table: &TableDescriptor, target_attnums: &[i16]) -> Result<BuiltQuery> {
    let targets: Vec<_> = table
        .columns
        .iter()
        .filter(|c| c.is_mapped() && target_attnums.contains(&c.attnum))
        .collect();
    if targets.is_empty() {
        return Err(RemoteError::new(
            ErrorKind::Execution,
            "no columns modified by UPDATE",
        )
        .with_hint("Remove the table from the statement or update at least one mapped column")
        .into());
    }

    let mut params: Vec<ParamDesc> = targets
        .iter()
        .map(|c| ParamDesc {
            local_type: c.local_type.clone(),
            kind: BindKind::for_remote_type(c.remote_type),
            source: ParamSource::Column(c.attnum),
        })
        .collect();

    let set_clause = targets
        .iter()
        .map(|c| {
            format!(
                "{} = {}",
                crate::describe::quote_identifier(&c.remote_name),
                value_placeholder(c.remote_type)
            )
        })
        .join(", ");

    let where_clause = pkey_where_clause(table, &mut params)?;
    let mut retrieved_attrs = Vec::new();
    let sql = format!(
        "UPDATE {} SET {}{}{}",
        table.qualified_name(),
        set_clause,
        where_clause,
        returning_clause(table, &mut params, &mut retrieved_attrs),
    );

    Ok(BuiltQuery {
        annotated_sql: sql.clone(),
        sql,
        params,
        retrieved_attrs,
    })
}

/// Assembles a DELETE targeted by primary key
pub fn build_delete(table: &TableDescriptor) -> Result<BuiltQuery> {
    let mut params = Vec::new();
    let where_clause = pkey_where_clause(table, &mut params)?;
    let mut retrieved_attrs = Vec::new();
    let sql = format!(
        "DELETE FROM {}{}{}",
        table.qualified_name(),
        where_clause,
        returning_clause(table, &mut params, &mut retrieved_attrs),
    );

    Ok(BuiltQuery {
        annotated_sql: sql.clone(),
        sql,
        params,
        retrieved_attrs,
    })
}

pub fn build_truncate(table: &TableDescriptor) -> Result<BuiltQuery> {
    let sql = format!("TRUNCATE TABLE {}", table.qualified_name());
    Ok(BuiltQuery {
        annotated_sql: sql.clone(),
        sql,
        params: vec![],
        retrieved_attrs: vec![],
    })
}

/// Rows per INSERT round-trip: bounded by the placeholder cap, and
/// collapsing to 1 whenever the modify path carries an output-binding
/// clause, retrieves zero result columns, or fires row-level triggers —
/// none of which can be expressed against a batched statement.
pub fn compute_batch_size(
    configured: u32,
    params_per_row: u32,
    has_returning: bool,
    result_columns: usize,
    has_row_triggers: bool,
) -> u32 {
    if has_returning || result_columns == 0 || has_row_triggers {
        return 1;
    }

    let cap = if params_per_row == 0 {
        configured
    } else {
        MAX_PARAMS_PER_STMT / params_per_row
    };

    configured.min(cap).max(1)
}

/// Rewrites internal `:p<N>` markers to bare `?`, producing the parameter
/// list in execution order. Quoted strings and identifiers are skipped;
/// the `?/*:now*/` token is kept verbatim but still appends its synthetic
/// transaction-timestamp parameter at the right position.
pub fn finalize_placeholders(
    annotated: &str,
    registry: &ParamRegistry,
) -> Result<(String, Vec<ParamDesc>)> {
    let mut sql = String::with_capacity(annotated.len());
    let mut params = Vec::new();
    let bytes = annotated.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            // String literal: copy until the closing quote (doubled quotes
            // stay inside the literal)
            b'\'' => {
                let start = i;
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\'' {
                        if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                sql.push_str(&annotated[start..i]);
            }
            b'"' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                sql.push_str(&annotated[start..i]);
            }
            b'?' if annotated[i..].starts_with(NOW_TOKEN) => {
                sql.push_str(NOW_TOKEN);
                params.push(ParamDesc {
                    local_type: DataType::DateTimeWithTZ,
                    kind: BindKind::String,
                    source: ParamSource::TransactionTimestamp,
                });
                i += NOW_TOKEN.len();
            }
            b':' if i + 1 < bytes.len() && bytes[i + 1] == b'p' => {
                let digits_start = i + 2;
                let mut j = digits_start;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
                if j == digits_start {
                    sql.push(':');
                    i += 1;
                    continue;
                }

                let pos: usize = annotated[digits_start..j].parse().unwrap();
                let expr = registry
                    .exprs()
                    .get(pos - 1)
                    .ok_or_else(|| {
                        orabridge_core::err::anyhow!("placeholder :p{} has no registered parameter", pos)
                    })?;

                let local_type = expr.r#type();
                params.push(ParamDesc {
                    kind: if local_type.is_numeric() {
                        BindKind::Number
                    } else {
                        BindKind::String
                    },
                    local_type,
                    source: ParamSource::Expr(Box::new(expr.clone())),
                });
                sql.push('?');
                i = j;
            }
            b => {
                // Copy whole code points; placeholders are ASCII-only
                let len = match b {
                    b if b < 0x80 => 1,
                    b if b < 0xe0 => 2,
                    b if b < 0xf0 => 3,
                    _ => 4,
                };
                let end = (i + len).min(bytes.len());
                sql.push_str(&annotated[i..end]);
                i = end;
            }
        }
    }

    Ok((sql, params))
}
