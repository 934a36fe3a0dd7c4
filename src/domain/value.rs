//! Cell values and their natural ordering.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};

/// Value of one cell, as returned by a column model.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Time(DateTime<Utc>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            CellValue::UInt(v) => Some(v),
            CellValue::Int(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Ordering between values of comparable kinds; None when the kinds differ.
    ///
    /// Integers and floats compare numerically across variants.
    pub fn natural_cmp(&self, other: &CellValue) -> Option<Ordering> {
        use CellValue::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (UInt(a), UInt(b)) => Some(a.cmp(b)),
            (Int(a), UInt(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (UInt(a), Int(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Float(a), Float(b)) => Some(a.total_cmp(b)),
            (Float(a), Int(b)) => Some(a.total_cmp(&(*b as f64))),
            (Int(a), Float(b)) => Some((*a as f64).total_cmp(b)),
            (Float(a), UInt(b)) => Some(a.total_cmp(&(*b as f64))),
            (UInt(a), Float(b)) => Some((*a as f64).total_cmp(b)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Time(a), Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Position of the value's kind when kinds differ. Numeric variants share a rank.
    fn kind_rank(&self) -> u8 {
        match self {
            CellValue::Bool(_) => 0,
            CellValue::Int(_) | CellValue::UInt(_) | CellValue::Float(_) => 1,
            CellValue::Time(_) => 2,
            CellValue::Text(_) => 3,
            CellValue::Null => 4,
        }
    }

    /// Natural ordering when the kinds are comparable, otherwise kind rank and then
    /// string representation.
    ///
    /// Mixed kinds never interleave, so the result is a total order over any column.
    pub fn compare(&self, other: &CellValue) -> Ordering {
        self.natural_cmp(other).unwrap_or_else(|| {
            self.kind_rank()
                .cmp(&other.kind_rank())
                .then_with(|| self.to_string().cmp(&other.to_string()))
        })
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(v) => write!(f, "{v}"),
            CellValue::Int(v) => write!(f, "{v}"),
            CellValue::UInt(v) => write!(f, "{v}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(v) => f.write_str(v),
            CellValue::Time(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M")),
        }
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<u64> for CellValue {
    fn from(v: u64) -> Self {
        CellValue::UInt(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}
