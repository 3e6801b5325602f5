use serde::{Deserialize, Serialize};

///
/// Logical/business data-type for a column.
///
/// Ordered by widening rank within the `Integer -> Decimal -> String` ladder
/// (see `widening_rank`). `Boolean`, `Datetime` and `Uuid` only widen to
/// `String`; they never widen into each other or into numeric types.
///
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum DataType {
    Unknown,  // Unable to map short-code to a known value.
    Boolean,  // 1,0 - uses byte.
    Datetime, // 8-byte, long, millis-since epoch.
    Integer,  // 8-byte (-2^63 <-> 2^63-1).
    Decimal,  // rust-decimal.
    String,   // UTF-8.
    Uuid,     // 16-byte (UUID).
}

pub const TRUE: &str  = "1";
pub const FALSE: &str = "0";

impl DataType {
    pub fn as_str(&self) -> &str {
        self.into()
    }

    ///
    /// Position in the `Integer < Decimal < String` widening ladder, or `None` if this
    /// type doesn't participate in numeric widening (it may still widen to `String`).
    ///
    fn widening_rank(&self) -> Option<u8> {
        match self {
            DataType::Integer => Some(0),
            DataType::Decimal => Some(1),
            DataType::String  => Some(2),
            _ => None,
        }
    }

    ///
    /// Can a column currently typed `self` accept a proposed type of `other` without
    /// narrowing? Returns the resulting (possibly widened) type, or `None` if the
    /// combination is a coercion conflict.
    ///
    /// Identity always succeeds. `Unknown` widens to anything (it represents a column
    /// that hasn't seen data yet). Otherwise only the `Integer -> Decimal -> String`
    /// ladder widens; everything else (including `String` narrowing back to `Integer`)
    /// is a conflict.
    ///
    pub fn widen(&self, other: &DataType) -> Option<DataType> {
        if self == other {
            return Some(*self);
        }

        if *self == DataType::Unknown {
            return Some(*other);
        }
        if *other == DataType::Unknown {
            return Some(*self);
        }

        match (self.widening_rank(), other.widening_rank()) {
            (Some(a), Some(b)) if a <= b => Some(*other),
            (Some(a), Some(b)) if a > b => Some(*self),
            _ => None,
        }
    }
}

impl From<&str> for DataType {
    fn from(value: &str) -> Self {
        match value {
            "BO" => DataType::Boolean,
            "DT" => DataType::Datetime,
            "DE" => DataType::Decimal,
            "IN" => DataType::Integer,
            "ST" => DataType::String,
            "ID" => DataType::Uuid,
            _    => DataType::Unknown,
        }
    }
}

impl From<&DataType> for &str {
    fn from(dt: &DataType) -> Self {
        match dt {
            DataType::Unknown  => "??",
            DataType::Boolean  => "BO",
            DataType::Datetime => "DT",
            DataType::Decimal  => "DE",
            DataType::Integer  => "IN",
            DataType::String   => "ST",
            DataType::Uuid     => "ID",
        }
    }
}
