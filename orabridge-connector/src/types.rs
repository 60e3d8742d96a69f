use orabridge_core::{
    data::DataType,
    err::{Error, Result},
};

use crate::{error::{ErrorKind, RemoteError}, type_codes, RemoteColumn};

/// The remote engine's column types, as reported by the describe call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OracleType {
    Varchar2,
    Char,
    Number,
    Long,
    Raw,
    LongRaw,
    BinaryFloat,
    BinaryDouble,
    Clob,
    Blob,
    Xml,
    Date,
    Timestamp,
    TimestampTz,
    TimestampLtz,
    IntervalYm,
    IntervalDs,
    Boolean,
}

impl OracleType {
    /// Maps a raw describe type code to the remote type.
    ///
    /// Two driver quirks are papered over here:
    /// - boolean columns are reported with a code outside the public
    ///   enumeration, so any unknown code maps to [`OracleType::Boolean`]
    /// - `LONG` without a character set id is really `LONG RAW`; the driver
    ///   reports both under the same code
    pub fn from_code(code: i32, charset: u16) -> Self {
        match code {
            type_codes::VARCHAR2 => Self::Varchar2,
            type_codes::CHAR => Self::Char,
            type_codes::NUMBER => Self::Number,
            type_codes::LONG if charset == 0 => Self::LongRaw,
            type_codes::LONG => Self::Long,
            type_codes::RAW => Self::Raw,
            type_codes::LONG_RAW => Self::LongRaw,
            type_codes::BINARY_FLOAT => Self::BinaryFloat,
            type_codes::BINARY_DOUBLE => Self::BinaryDouble,
            type_codes::CLOB => Self::Clob,
            type_codes::BLOB => Self::Blob,
            type_codes::XML => Self::Xml,
            type_codes::DATE => Self::Date,
            type_codes::TIMESTAMP => Self::Timestamp,
            type_codes::TIMESTAMP_TZ => Self::TimestampTz,
            type_codes::TIMESTAMP_LTZ => Self::TimestampLtz,
            type_codes::INTERVAL_YM => Self::IntervalYm,
            type_codes::INTERVAL_DS => Self::IntervalDs,
            _ => Self::Boolean,
        }
    }

    /// Character-family types whose buffers arrive as text in the client
    /// character set
    pub fn is_character(&self) -> bool {
        matches!(self, Self::Varchar2 | Self::Char | Self::Long | Self::Clob)
    }

    /// Types fetched as a LOB locator and read in chunks
    pub fn is_lob(&self) -> bool {
        matches!(self, Self::Clob | Self::Blob | Self::Xml)
    }

    /// Types whose raw buffer carries a leading 4-byte length
    pub fn is_long(&self) -> bool {
        matches!(self, Self::Long | Self::LongRaw)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Number | Self::BinaryFloat | Self::BinaryDouble)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::Date | Self::Timestamp | Self::TimestampTz | Self::TimestampLtz
        )
    }

    /// The remote type name, for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Varchar2 => "VARCHAR2",
            Self::Char => "CHAR",
            Self::Number => "NUMBER",
            Self::Long => "LONG",
            Self::Raw => "RAW",
            Self::LongRaw => "LONG RAW",
            Self::BinaryFloat => "BINARY_FLOAT",
            Self::BinaryDouble => "BINARY_DOUBLE",
            Self::Clob => "CLOB",
            Self::Blob => "BLOB",
            Self::Xml => "XMLTYPE",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            Self::TimestampLtz => "TIMESTAMP WITH LOCAL TIME ZONE",
            Self::IntervalYm => "INTERVAL YEAR TO MONTH",
            Self::IntervalDs => "INTERVAL DAY TO SECOND",
            Self::Boolean => "BOOLEAN",
        }
    }

    /// Size of the per-row fetch buffer for this column's text rendering.
    ///
    /// LOB types return 0 (fetched as a locator, read in chunks);
    /// `LONG`-family columns are bounded by the configured `max_long`.
    pub fn val_size(&self, col: &RemoteColumn, max_long: u32) -> usize {
        match self {
            Self::Varchar2 | Self::Char => col.byte_len as usize + 1,
            // Hex text rendering of the raw bytes
            Self::Raw => 2 * col.byte_len as usize + 1,
            Self::Number if col.precision > 0 => col.precision as usize + 5,
            Self::Number => 40,
            Self::BinaryFloat | Self::BinaryDouble => 25,
            Self::Long | Self::LongRaw => max_long as usize + 1,
            Self::Clob | Self::Blob | Self::Xml => 0,
            Self::Date => 20,
            Self::Timestamp | Self::TimestampTz | Self::TimestampLtz => 45,
            Self::IntervalYm | Self::IntervalDs => 30,
            Self::Boolean => 2,
        }
    }
}

/// Whether the remote type can be converted to the local type without
/// changing values.
///
/// This is an exhaustive allow-list, evaluated at plan build; any pairing
/// not listed is rejected before a remote call is made. `scale` is the
/// remote numeric scale and only gates the integer/boolean conversions.
pub fn can_convert(remote: OracleType, scale: i16, local: &DataType) -> bool {
    use OracleType::*;

    match local {
        DataType::Binary => matches!(remote, Blob | Raw | LongRaw),
        DataType::XML => remote == Xml,
        DataType::Utf8String(_) | DataType::Varchar(_) | DataType::FixedChar(_) => {
            remote.is_character()
        }
        DataType::Decimal(_) | DataType::Float32 | DataType::Float64 => remote.is_numeric(),
        // Fractional digits would be silently dropped
        DataType::Int16 | DataType::Int32 | DataType::Int64 | DataType::Boolean => {
            (remote == Number && scale <= 0) || remote == Boolean
        }
        DataType::Date | DataType::Time | DataType::DateTime | DataType::DateTimeWithTZ => {
            remote.is_temporal()
        }
        DataType::JSON => matches!(remote, Varchar2 | Clob),
        DataType::Uuid => matches!(remote, Varchar2 | Char | Clob),
        DataType::Interval => matches!(remote, IntervalYm | IntervalDs),
        DataType::Null => false,
    }
}

/// `can_convert` as a hard gate, raising `InvalidDataType`
pub fn check_convert(
    remote: OracleType,
    scale: i16,
    local: &DataType,
    column: &str,
) -> Result<()> {
    if can_convert(remote, scale, local) {
        return Ok(());
    }

    Err(Error::from(
        RemoteError::new(
            ErrorKind::InvalidDataType,
            format!(
                "column \"{}\" cannot be converted from remote type {} to local type {:?}",
                column,
                remote.name(),
                local
            ),
        )
        .with_hint("Change the local column type to one supported for this remote type"),
    ))
}
