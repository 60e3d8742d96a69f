use orabridge_core::{
    data::{
        chrono::{DateTime, FixedOffset},
        DataType, DataValue,
    },
    err::{bail, Result},
    sqlil::Expr,
};

use crate::{types::OracleType, BindValue};

/// How a parameter's value travels to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    /// Standard text rendering
    String,
    /// Numeric text rendering
    Number,
    /// Raw character LOB payload
    LobText,
    /// Raw binary LOB payload
    LobBinary,
    /// Output slot for RETURNING ... INTO
    Output,
}

impl BindKind {
    /// The bind kind appropriate for a value stored in the given remote
    /// column type
    pub fn for_remote_type(remote: OracleType) -> Self {
        match remote {
            OracleType::Clob => Self::LobText,
            OracleType::Blob => Self::LobBinary,
            t if t.is_numeric() => Self::Number,
            _ => Self::String,
        }
    }
}

/// Where a parameter's runtime value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSource {
    /// The new row, at this local attribute number
    Column(i16),
    /// The old-row identity slot, at this local attribute number
    /// (UPDATE/DELETE row targeting)
    KeyColumn(i16),
    /// An expression the host executor evaluates at runtime
    Expr(Box<Expr>),
    /// The host transaction's start timestamp (the `?/*:now*/` token)
    TransactionTimestamp,
    /// No input value; the driver writes the result here after execution
    Output,
}

/// One entry of a query's execution-ordered parameter list.
///
/// The order of the containing `Vec` is bind order; it is derived from the
/// final placeholder positions in the SQL text, never rearranged afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDesc {
    pub local_type: DataType,
    pub kind: BindKind,
    pub source: ParamSource,
}

impl ParamDesc {
    pub fn output(local_type: DataType) -> Self {
        Self {
            local_type,
            kind: BindKind::Output,
            source: ParamSource::Output,
        }
    }
}

/// Renders one runtime value into its wire representation.
///
/// NULL binds NULL regardless of type. LOB kinds bypass text rendering and
/// carry a length-prefixed byte payload.
pub fn render_param(kind: BindKind, value: &DataValue) -> Result<BindValue> {
    if value.is_null() {
        return Ok(BindValue::Null);
    }

    match kind {
        BindKind::Output => Ok(BindValue::Output),
        BindKind::LobText => match value {
            DataValue::Utf8String(s) | DataValue::JSON(s) | DataValue::XML(s) => {
                Ok(BindValue::Bytes(length_prefixed(s.as_bytes())))
            }
            _ => bail!("cannot bind {:?} as a character LOB", DataType::from(value)),
        },
        BindKind::LobBinary => match value {
            DataValue::Binary(bytes) => Ok(BindValue::Bytes(length_prefixed(bytes))),
            _ => bail!("cannot bind {:?} as a binary LOB", DataType::from(value)),
        },
        BindKind::String | BindKind::Number => Ok(BindValue::Text(render_text(value)?)),
    }
}

/// The standard text rendering of a value, as the remote engine expects it
fn render_text(value: &DataValue) -> Result<String> {
    Ok(match value {
        DataValue::Utf8String(s) | DataValue::JSON(s) | DataValue::XML(s) => s.clone(),
        DataValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
        DataValue::Int16(v) => v.to_string(),
        DataValue::Int32(v) => v.to_string(),
        DataValue::Int64(v) => v.to_string(),
        DataValue::Float32(v) => v.to_string(),
        DataValue::Float64(v) => v.to_string(),
        DataValue::Decimal(v) => v.to_string(),
        // Dates bind with the time fixed at midnight
        DataValue::Date(d) => format!("{} 00:00:00", d.format("%Y-%m-%d")),
        DataValue::Time(t) => format!("1970-01-01 {}", t.format("%H:%M:%S%.9f")),
        DataValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.9f").to_string(),
        DataValue::DateTimeWithTZ(dt) => dt.format("%Y-%m-%d %H:%M:%S%.9f %:z").to_string(),
        // The remote representation carries no hyphens
        DataValue::Uuid(u) => u.simple().to_string(),
        DataValue::Interval(iv) => {
            let p = iv.parts();
            if iv.days == 0 && iv.micros == 0 {
                format!("{}-{}", p.years, p.months)
            } else if iv.months == 0 {
                format!("{} {:02}:{:02}:{:012.9}", p.days, p.hours, p.minutes, p.seconds)
            } else {
                bail!("mixed year-month/day-second interval has no remote text form")
            }
        }
        DataValue::Binary(_) => bail!("binary data must bind as a LOB parameter"),
        DataValue::Null => unreachable!("NULL is handled before rendering"),
    })
}

fn length_prefixed(payload: &[u8]) -> Vec<u8> {
    let mut buf = (payload.len() as u32).to_le_bytes().to_vec();
    buf.extend_from_slice(payload);
    buf
}

/// Binds a scan query's parameters.
///
/// `supplied` carries the host-evaluated values for expression-sourced
/// parameters, in parameter-list order; transaction-timestamp parameters
/// are injected from `xact_start`.
pub fn bind_scan_params(
    params: &[ParamDesc],
    supplied: &[DataValue],
    xact_start: &DateTime<FixedOffset>,
) -> Result<Vec<BindValue>> {
    let mut values = supplied.iter();
    params
        .iter()
        .map(|p| match &p.source {
            ParamSource::TransactionTimestamp => {
                render_param(BindKind::String, &DataValue::DateTimeWithTZ(*xact_start))
            }
            ParamSource::Expr(_) | ParamSource::Column(_) | ParamSource::KeyColumn(_) => {
                let value = values
                    .next()
                    .ok_or_else(|| orabridge_core::err::anyhow!("too few parameter values supplied"))?;
                render_param(p.kind, value)
            }
            ParamSource::Output => bail!("scan queries cannot carry output parameters"),
        })
        .collect()
}

/// Binds one row of a DML statement's parameters.
///
/// Both rows are indexed by local attribute number: column-sourced
/// parameters read the new row, key-sourced parameters read the old-row
/// identity slot.
pub fn bind_modify_row(
    params: &[ParamDesc],
    new_row: &[DataValue],
    old_row: &[DataValue],
    xact_start: &DateTime<FixedOffset>,
) -> Result<Vec<BindValue>> {
    params
        .iter()
        .map(|p| match &p.source {
            ParamSource::Column(attnum) => {
                render_param(p.kind, row_value(new_row, *attnum))
            }
            ParamSource::KeyColumn(attnum) => {
                render_param(p.kind, row_value(old_row, *attnum))
            }
            ParamSource::TransactionTimestamp => {
                render_param(BindKind::String, &DataValue::DateTimeWithTZ(*xact_start))
            }
            ParamSource::Output => Ok(BindValue::Output),
            ParamSource::Expr(_) => bail!("DML parameters must be row-sourced"),
        })
        .collect()
}

fn row_value(row: &[DataValue], attnum: i16) -> &DataValue {
    row.get(attnum as usize - 1).unwrap_or(&DataValue::Null)
}
