//! The dynamic value model every CBOR item decodes into.

use std::fmt;

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use url::Url;

/// A decoded CBOR data item.
///
/// Maps keep their insertion order and may contain duplicate keys (the
/// decoder does not reject them); the accessors below act on the first
/// matching entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// CBOR `undefined` (simple value 23).
    Undefined,
    Null,
    Bool(bool),
    /// Any integer that fits in an `i64`.
    Integer(i64),
    /// Integers outside the `i64` range.
    BigInt(Bignum),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Timestamp(DateTime<Utc>),
    Uri(Url),
    /// Unassigned simple values (major type 7, 0..=19).
    Simple(SimpleValue),
}

/// An integer that does not fit in an `i64`.  Anything smaller is a
/// [`Value::Integer`], so the two variants never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bignum(BigInt);

impl Bignum {
    pub fn as_bigint(&self) -> &BigInt {
        &self.0
    }

    pub fn into_inner(self) -> BigInt {
        self.0
    }
}

impl TryFrom<BigInt> for Bignum {
    /// The value fits in an `i64` after all.
    type Error = i64;

    fn try_from(b: BigInt) -> Result<Self, i64> {
        match i64::try_from(&b) {
            Ok(i) => Err(i),
            Err(_) => Ok(Self(b)),
        }
    }
}

impl fmt::Display for Bignum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A simple value code in 0..=19.
///
/// 20..=23 are `false`, `true`, `null` and `undefined`, 24..=31 are
/// reserved, and the two-byte codes 32..=255 are not carried by this model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimpleValue(pub(crate) u8);

impl SimpleValue {
    pub const MAX: u8 = 19;

    pub fn new(code: u8) -> Option<Self> {
        (code <= Self::MAX).then_some(Self(code))
    }

    pub fn code(self) -> u8 {
        self.0
    }
}

impl Value {
    /// An empty map.
    pub fn map() -> Self {
        Self::Map(Vec::new())
    }

    /// Look up a text key in a map.  Returns `None` for non-maps.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Set a text key in a map, replacing the first existing entry or
    /// appending a new one.  Returns the previous value.  No-op on non-maps.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        let Self::Map(entries) = self else {
            return None;
        };
        let value = value.into();
        match entries.iter_mut().find(|(k, _)| k.as_str() == Some(key)) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                entries.push((Value::Text(key.to_string()), value));
                None
            }
        }
    }

    /// Remove the first entry with a text key from a map.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let Self::Map(entries) = self else {
            return None;
        };
        let idx = entries.iter().position(|(k, _)| k.as_str() == Some(key))?;
        Some(entries.remove(idx).1)
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Non-negative integers, including those only representable as a
    /// bignum.  Integral floats are accepted too, since JSON peers often
    /// send ids that way.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(i) => u64::try_from(*i).ok(),
            Self::BigInt(b) => u64::try_from(b.as_bigint()).ok(),
            Self::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f < 18_446_744_073_709_551_616.0 => {
                Some(*f as u64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Loose truthiness as peers of the protocol apply it to flags such as
    /// `ok` and `complete`: `undefined`, `null`, `false`, zero, NaN and the
    /// empty string are false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0 && !f.is_nan(),
            Self::Text(s) => !s.is_empty(),
            _ => true,
        }
    }
}

/// Truthiness of an optional field; absent is false.
pub fn truthy(v: Option<&Value>) -> bool {
    v.is_some_and(Value::is_truthy)
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! from_small_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(i: $t) -> Self {
                Self::Integer(i64::from(i))
            }
        })*
    };
}

from_small_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Self::from(BigInt::from(u))
    }
}

impl From<i128> for Value {
    fn from(i: i128) -> Self {
        Self::from(BigInt::from(i))
    }
}

impl From<BigInt> for Value {
    fn from(b: BigInt) -> Self {
        match Bignum::try_from(b) {
            Ok(big) => Self::BigInt(big),
            Err(i) => Self::Integer(i),
        }
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Self::Float(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Self::Array(a)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Url> for Value {
    fn from(u: Url) -> Self {
        Self::Uri(u)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map_or(Self::Null, Into::into)
    }
}

impl<K: Into<Value>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
