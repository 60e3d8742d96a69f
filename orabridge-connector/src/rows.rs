//! Fetched-row conversion from the driver's wire buffers to local values.

use orabridge_core::{
    data::{
        chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime},
        uuid::Uuid,
        DataType, DataValue, IntervalValue,
    },
    err::{bail, Context, Result},
};

use crate::{
    error::{from_status, ErrorKind},
    ColumnDescriptor, LobHandle, RawColumn, SharedDriver, StmtHandle, TableDescriptor,
};

/// Bytes requested per LOB read round-trip
const LOB_CHUNK: usize = 32768;

/// Converts the driver's current row into local values.
///
/// The output has `target_cols` slots indexed by local attribute number.
/// A slot is NULL when no descriptor column maps to it (locally dropped
/// columns), when the column is past the descriptor, was not marked used,
/// or the remote indicator says NULL.
///
/// The statement retrieves only the used columns, so driver result
/// positions are compact: the n-th used column is result column n,
/// regardless of where it sits in the descriptor.
///
/// `lob_truncation` bounds LOB retrieval for sampling reads; full content
/// is fetched when `None`.
pub fn convert_row(
    driver: &SharedDriver,
    stmt: StmtHandle,
    table: &TableDescriptor,
    target_cols: i16,
    lob_truncation: Option<usize>,
) -> Result<Vec<DataValue>> {
    let mut values = vec![DataValue::Null; target_cols.max(0) as usize];
    let mut result_idx = 0;

    for col in table.columns.iter() {
        if col.attnum < 1 || col.attnum > target_cols || !col.used {
            continue;
        }

        let idx = result_idx;
        result_idx += 1;

        let raw = driver
            .lock()
            .unwrap()
            .get_column(stmt, idx)
            .map_err(|st| {
                from_status(
                    ErrorKind::Execution,
                    format!("Failed to read column \"{}\"", col.remote_name),
                    st,
                )
            })?;

        values[col.attnum as usize - 1] =
            convert_column(driver, table, col, raw, lob_truncation)?;
    }

    Ok(values)
}

/// Converts one raw column buffer (also used for RETURNING output slots)
pub fn convert_column(
    driver: &SharedDriver,
    table: &TableDescriptor,
    col: &ColumnDescriptor,
    raw: RawColumn,
    lob_truncation: Option<usize>,
) -> Result<DataValue> {
    let bytes = match raw {
        RawColumn::Null => return Ok(DataValue::Null),
        RawColumn::Lob(lob) => read_lob(driver, lob, lob_truncation)?,
        RawColumn::Bytes(buf) if col.remote_type.is_long() => long_payload(&buf)?,
        RawColumn::Bytes(buf) => buf,
    };

    // Binary data is copied raw, never transcoded
    if col.local_type == DataType::Binary {
        return Ok(DataValue::Binary(bytes));
    }

    let strict = col
        .strict_encoding
        .or(table.options.strict_encoding)
        .unwrap_or(true);
    let mut text = decode_text(bytes, strict, &col.remote_name)?;

    // Locale decimal comma normalizes to a point before numeric parsing
    if col.local_type.is_numeric() {
        text = text.replace(',', ".");
    }

    parse_text_value(&text, &col.local_type)
        .with_context(|| format!("Failed to convert column \"{}\"", col.remote_name))
}

/// Chunked LOB retrieval, bounded by `truncation` when supplied.
/// The locator is closed as soon as the content is in hand.
fn read_lob(driver: &SharedDriver, lob: LobHandle, truncation: Option<usize>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut offset = 0u64;

    loop {
        let want = match truncation {
            Some(limit) if buf.len() >= limit => break,
            Some(limit) => (limit - buf.len()).min(LOB_CHUNK),
            None => LOB_CHUNK,
        };

        let chunk = driver
            .lock()
            .unwrap()
            .read_lob_chunk(lob, offset, want)
            .map_err(|st| from_status(ErrorKind::Execution, "Failed to read LOB chunk", st))?;
        if chunk.is_empty() {
            break;
        }

        offset += chunk.len() as u64;
        buf.extend(chunk);
    }

    let _ = driver.lock().unwrap().close_lob(lob);
    Ok(buf)
}

/// `LONG`-family buffers carry their payload length in the first 4 bytes
fn long_payload(buf: &[u8]) -> Result<Vec<u8>> {
    if buf.len() < 4 {
        bail!("malformed long column buffer ({} bytes)", buf.len());
    }

    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if buf.len() < 4 + len {
        bail!(
            "long column buffer truncated: header says {} bytes, {} available",
            len,
            buf.len() - 4
        );
    }

    Ok(buf[4..4 + len].to_vec())
}

fn decode_text(bytes: Vec<u8>, strict: bool, column: &str) -> Result<String> {
    if strict {
        String::from_utf8(bytes)
            .map_err(|_| {
                orabridge_core::err::anyhow!(
                    "column \"{}\" contains bytes invalid in the local encoding",
                    column
                )
            })
    } else {
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Parses the remote text rendering of a value into the local type
pub fn parse_text_value(text: &str, r#type: &DataType) -> Result<DataValue> {
    Ok(match r#type {
        DataType::Utf8String(_) | DataType::Varchar(_) | DataType::FixedChar(_) => {
            DataValue::Utf8String(text.to_string())
        }
        DataType::JSON => DataValue::JSON(text.to_string()),
        DataType::XML => DataValue::XML(text.to_string()),
        DataType::Int16 => DataValue::Int16(text.trim().parse()?),
        DataType::Int32 => DataValue::Int32(text.trim().parse()?),
        DataType::Int64 => DataValue::Int64(text.trim().parse()?),
        DataType::Float32 => DataValue::Float32(text.trim().parse()?),
        DataType::Float64 => DataValue::Float64(text.trim().parse()?),
        DataType::Decimal(_) => DataValue::Decimal(text.trim().parse()?),
        DataType::Boolean => DataValue::Boolean(!matches!(text.trim(), "0" | "")),
        DataType::Date => DataValue::Date(parse_date(text.trim())?),
        DataType::Time => DataValue::Time(parse_time(text.trim())?),
        DataType::DateTime => DataValue::DateTime(parse_datetime(text.trim())?),
        DataType::DateTimeWithTZ => DataValue::DateTimeWithTZ(
            DateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S%.f %:z")
                .with_context(|| format!("invalid zoned timestamp text {:?}", text))?,
        ),
        DataType::Uuid => DataValue::Uuid(
            Uuid::parse_str(text.trim())
                .with_context(|| format!("invalid uuid text {:?}", text))?,
        ),
        DataType::Interval => DataValue::Interval(parse_interval(text.trim())?),
        DataType::Binary | DataType::Null => {
            bail!("type {:?} has no text representation", r#type)
        }
    })
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.date());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("invalid date text {:?}", text))
}

fn parse_time(text: &str) -> Result<NaiveTime> {
    let time_part = text.rsplit(' ').next().unwrap_or(text);
    NaiveTime::parse_from_str(time_part, "%H:%M:%S%.f")
        .with_context(|| format!("invalid time text {:?}", text))
}

fn parse_datetime(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .with_context(|| format!("invalid timestamp text {:?}", text))
}

/// The remote interval text forms: `Y-M` (year-month) and
/// `D HH:MM:SS[.F]` (day-second), either optionally sign-prefixed
fn parse_interval(text: &str) -> Result<IntervalValue> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, text),
    };

    let iv = if let Some((days, clock)) = body.split_once(' ') {
        let days: i32 = days.trim().parse().context("invalid interval days")?;
        let mut parts = clock.split(':');
        let hours: i64 = parts.next().unwrap_or("0").parse().context("invalid interval hours")?;
        let minutes: i64 = parts
            .next()
            .unwrap_or("0")
            .parse()
            .context("invalid interval minutes")?;
        let seconds: f64 = parts
            .next()
            .unwrap_or("0")
            .parse()
            .context("invalid interval seconds")?;

        IntervalValue::new(
            0,
            days,
            hours * 3_600_000_000 + minutes * 60_000_000 + (seconds * 1_000_000.0) as i64,
        )
    } else if let Some((years, months)) = body.split_once('-') {
        let years: i32 = years.trim().parse().context("invalid interval years")?;
        let months: i32 = months.trim().parse().context("invalid interval months")?;
        IntervalValue::new(years * 12 + months, 0, 0)
    } else {
        bail!("invalid interval text {:?}", text);
    };

    Ok(if negative {
        IntervalValue::new(-iv.months, -iv.days, -iv.micros)
    } else {
        iv
    })
}
