use serde::{Deserialize, Serialize};

use super::DataValue;

/// Data type of values in the local (host) type system.
///
/// These are the types the host query engine hands us and expects back;
/// the connector maps them to and from the remote column types.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum DataType {
    /// Unbounded character data
    Utf8String(StringOptions),
    /// Bounded variable-length character data
    Varchar(StringOptions),
    /// Blank-padded fixed-length character data
    FixedChar(StringOptions),
    Binary,
    Boolean,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal(DecimalOptions),
    JSON,
    XML,
    Date,
    Time,
    DateTime,
    DateTimeWithTZ,
    Interval,
    Uuid,
    Null,
}

impl DataType {
    pub fn rust_string() -> Self {
        Self::Utf8String(StringOptions::new(None))
    }

    /// Whether the type is in the character-string family.
    ///
    /// Comparison pushdown is restricted for these (collation semantics
    /// differ between engines), and their remote storage type must be a
    /// character type for a column reference to be shippable.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::Utf8String(_) | Self::Varchar(_) | Self::FixedChar(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Float32
                | Self::Float64
                | Self::Decimal(_)
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::Date | Self::Time | Self::DateTime | Self::DateTimeWithTZ
        )
    }
}

/// Options for character data types
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct StringOptions {
    /// Maximum length of the string data in bytes
    pub length: Option<u32>,
}

impl StringOptions {
    pub fn new(length: Option<u32>) -> Self {
        Self { length }
    }
}

/// Decimal options
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Default)]
pub struct DecimalOptions {
    /// The capacity of number of digits for the type
    pub precision: Option<u16>,
    /// The number of digits after the decimal point '.'
    pub scale: Option<u16>,
}

impl DecimalOptions {
    pub fn new(precision: Option<u16>, scale: Option<u16>) -> Self {
        Self { precision, scale }
    }
}

// Provide conversion from DataValue into DataType
impl<'a> From<&'a DataValue> for DataType {
    fn from(v: &'a DataValue) -> Self {
        match v {
            DataValue::Null => DataType::Null,
            DataValue::Utf8String(_) => DataType::Utf8String(StringOptions::default()),
            DataValue::Binary(_) => DataType::Binary,
            DataValue::Boolean(_) => DataType::Boolean,
            DataValue::Int16(_) => DataType::Int16,
            DataValue::Int32(_) => DataType::Int32,
            DataValue::Int64(_) => DataType::Int64,
            DataValue::Float32(_) => DataType::Float32,
            DataValue::Float64(_) => DataType::Float64,
            DataValue::Decimal(_) => DataType::Decimal(DecimalOptions::default()),
            DataValue::JSON(_) => DataType::JSON,
            DataValue::XML(_) => DataType::XML,
            DataValue::Date(_) => DataType::Date,
            DataValue::Time(_) => DataType::Time,
            DataValue::DateTime(_) => DataType::DateTime,
            DataValue::DateTimeWithTZ(_) => DataType::DateTimeWithTZ,
            DataValue::Interval(_) => DataType::Interval,
            DataValue::Uuid(_) => DataType::Uuid,
        }
    }
}
