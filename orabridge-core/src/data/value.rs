use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

/// Data container for the respective local types
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, EnumAsInner)]
pub enum DataValue {
    Null,
    Utf8String(String),
    Binary(Vec<u8>),
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(rust_decimal::Decimal),
    JSON(String),
    XML(String),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    DateTime(chrono::NaiveDateTime),
    DateTimeWithTZ(chrono::DateTime<chrono::FixedOffset>),
    Interval(IntervalValue),
    Uuid(uuid::Uuid),
}

impl From<&str> for DataValue {
    fn from(str: &str) -> Self {
        DataValue::Utf8String(str.to_string())
    }
}

/// An interval quantity, stored as normalized (months, days, microseconds)
/// the way the host engine represents it.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct IntervalValue {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

impl IntervalValue {
    pub fn new(months: i32, days: i32, micros: i64) -> Self {
        Self {
            months,
            days,
            micros,
        }
    }

    /// Decomposes into the six calendar magnitudes used for rendering.
    /// Seconds carry the fractional microseconds.
    pub fn parts(&self) -> IntervalParts {
        IntervalParts {
            years: self.months / 12,
            months: self.months % 12,
            days: self.days,
            hours: (self.micros / 3_600_000_000) as i32,
            minutes: ((self.micros / 60_000_000) % 60) as i32,
            seconds: (self.micros % 60_000_000) as f64 / 1_000_000.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0 && self.micros == 0
    }
}

/// Calendar decomposition of an [`IntervalValue`]
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct IntervalParts {
    pub years: i32,
    pub months: i32,
    pub days: i32,
    pub hours: i32,
    pub minutes: i32,
    pub seconds: f64,
}
