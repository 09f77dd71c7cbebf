//! Recursive-descent CBOR decoder.
//!
//! Accepts definite and indefinite-length items, half/single/double floats
//! and the semantic tags listed in the crate docs.  Anything that is not
//! well-formed per RFC 8949 is rejected with [`CborError::MalformedInput`].

use chrono::{DateTime, Utc};
use num_bigint::{BigInt, Sign};
use url::Url;

use crate::encode::{
    MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP, MAJOR_NEGATIVE, MAJOR_TAG, MAJOR_TEXT, MAJOR_UNSIGNED,
    TAG_DATETIME, TAG_EPOCH, TAG_NEG_BIGNUM, TAG_POS_BIGNUM, TAG_URI,
};
use crate::error::{CborError, Result};
use crate::io::{ByteSource, SliceSource};
use crate::value::{SimpleValue, Value};

const BREAK: u8 = 0xff;
const INDEFINITE: u8 = 31;

/// Nesting limit for arrays, maps and tags.
pub const MAX_DEPTH: usize = 512;

/// Largest single allocation made ahead of the bytes actually arriving.
const READ_CHUNK: usize = 64 * 1024;

/// Decode exactly one item from `bytes`.  Trailing bytes are an error.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let mut src = SliceSource::new(bytes);
    let value = decode_from(&mut src)?;
    if !src.is_empty() {
        return Err(CborError::malformed(format!(
            "{} trailing bytes after item",
            bytes.len() - src.position()
        )));
    }
    Ok(value)
}

/// Decode one item from `src`, leaving anything after it unread.
pub fn decode_from<S: ByteSource + ?Sized>(src: &mut S) -> Result<Value> {
    Decoder { src, depth: 0 }.item()
}

struct Decoder<'s, S: ?Sized> {
    src: &'s mut S,
    depth: usize,
}

impl<S: ByteSource + ?Sized> Decoder<'_, S> {
    fn item(&mut self) -> Result<Value> {
        let header = self.src.read_byte()?;
        self.item_with_header(header)
    }

    fn item_with_header(&mut self, header: u8) -> Result<Value> {
        if header == BREAK {
            return Err(CborError::malformed("break marker outside indefinite item"));
        }
        if self.depth >= MAX_DEPTH {
            return Err(CborError::malformed("nesting too deep"));
        }
        self.depth += 1;
        let value = self.dispatch(header);
        self.depth -= 1;
        value
    }

    fn dispatch(&mut self, header: u8) -> Result<Value> {
        let info = header & 0x1f;
        match header >> 5 {
            MAJOR_UNSIGNED => Ok(Value::from(self.argument(info)?)),
            MAJOR_NEGATIVE => {
                let n = self.argument(info)?;
                Ok(match i64::try_from(n) {
                    Ok(i) => Value::Integer(-1 - i),
                    Err(_) => Value::from(-BigInt::from(n) - 1u8),
                })
            }
            MAJOR_BYTES => self.byte_string(info).map(Value::Bytes),
            MAJOR_TEXT => self.text_string(info).map(Value::Text),
            MAJOR_ARRAY => self.array(info),
            MAJOR_MAP => self.map(info),
            MAJOR_TAG => self.tagged(info),
            _ => self.simple(info),
        }
    }

    /// Read the argument selected by the low five header bits.
    fn argument(&mut self, info: u8) -> Result<u64> {
        match info {
            0..=23 => Ok(u64::from(info)),
            24 => Ok(u64::from(self.src.read_byte()?)),
            25 => {
                let mut b = [0u8; 2];
                self.src.read_exact(&mut b)?;
                Ok(u64::from(u16::from_be_bytes(b)))
            }
            26 => {
                let mut b = [0u8; 4];
                self.src.read_exact(&mut b)?;
                Ok(u64::from(u32::from_be_bytes(b)))
            }
            27 => {
                let mut b = [0u8; 8];
                self.src.read_exact(&mut b)?;
                Ok(u64::from_be_bytes(b))
            }
            _ => Err(CborError::malformed(format!("invalid additional info {info}"))),
        }
    }

    fn length(&mut self, info: u8) -> Result<usize> {
        let len = self.argument(info)?;
        usize::try_from(len).map_err(|_| CborError::malformed(format!("length {len} too large")))
    }

    fn raw(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.src.remaining().is_some_and(|left| left < len) {
            return Err(CborError::UnexpectedEnd);
        }
        let mut buf = Vec::with_capacity(len.min(READ_CHUNK));
        while buf.len() < len {
            let start = buf.len();
            let take = (len - start).min(READ_CHUNK);
            buf.resize(start + take, 0);
            self.src.read_exact(&mut buf[start..])?;
        }
        Ok(buf)
    }

    /// Chunks of an indefinite string: definite items of the same major
    /// type up to the break marker.
    fn chunks(&mut self, major: u8, mut each: impl FnMut(Vec<u8>) -> Result<()>) -> Result<()> {
        loop {
            let header = self.src.read_byte()?;
            if header == BREAK {
                return Ok(());
            }
            if header >> 5 != major || header & 0x1f == INDEFINITE {
                return Err(CborError::malformed(format!(
                    "invalid indefinite-length chunk header {header:#04x}"
                )));
            }
            let len = self.length(header & 0x1f)?;
            each(self.raw(len)?)?;
        }
    }

    fn byte_string(&mut self, info: u8) -> Result<Vec<u8>> {
        if info != INDEFINITE {
            let len = self.length(info)?;
            return self.raw(len);
        }
        let mut out = Vec::new();
        self.chunks(MAJOR_BYTES, |chunk| {
            out.extend_from_slice(&chunk);
            Ok(())
        })?;
        Ok(out)
    }

    fn text_string(&mut self, info: u8) -> Result<String> {
        if info != INDEFINITE {
            let len = self.length(info)?;
            return utf8(self.raw(len)?);
        }
        let mut out = String::new();
        self.chunks(MAJOR_TEXT, |chunk| {
            out.push_str(&utf8(chunk)?);
            Ok(())
        })?;
        Ok(out)
    }

    fn array(&mut self, info: u8) -> Result<Value> {
        let mut items = Vec::new();
        if info == INDEFINITE {
            loop {
                let header = self.src.read_byte()?;
                if header == BREAK {
                    break;
                }
                items.push(self.item_with_header(header)?);
            }
        } else {
            let len = self.length(info)?;
            items.reserve(self.capacity_hint(len));
            for _ in 0..len {
                items.push(self.item()?);
            }
        }
        Ok(Value::Array(items))
    }

    fn map(&mut self, info: u8) -> Result<Value> {
        let mut entries = Vec::new();
        if info == INDEFINITE {
            // After each value the next header is either the break or the
            // next key; a break where a value belongs is malformed and is
            // caught by `item`.
            loop {
                let header = self.src.read_byte()?;
                if header == BREAK {
                    break;
                }
                let key = self.item_with_header(header)?;
                let value = self.item()?;
                entries.push((key, value));
            }
        } else {
            let len = self.length(info)?;
            entries.reserve(self.capacity_hint(len));
            for _ in 0..len {
                let key = self.item()?;
                let value = self.item()?;
                entries.push((key, value));
            }
        }
        Ok(Value::Map(entries))
    }

    fn capacity_hint(&self, len: usize) -> usize {
        len.min(self.src.remaining().unwrap_or(1024))
    }

    fn tagged(&mut self, info: u8) -> Result<Value> {
        let tag = self.argument(info)?;
        let inner = self.item()?;
        Ok(match (tag, inner) {
            (TAG_DATETIME, Value::Text(s)) => match DateTime::parse_from_rfc3339(&s) {
                Ok(t) => Value::Timestamp(t.with_timezone(&Utc)),
                Err(_) => Value::Text(s),
            },
            (TAG_EPOCH, Value::Integer(secs)) => DateTime::from_timestamp(secs, 0)
                .map_or(Value::Integer(secs), Value::Timestamp),
            (TAG_EPOCH, Value::Float(secs)) => {
                epoch_float(secs).map_or(Value::Float(secs), Value::Timestamp)
            }
            (TAG_POS_BIGNUM, Value::Bytes(b)) => Value::from(BigInt::from_bytes_be(Sign::Plus, &b)),
            (TAG_NEG_BIGNUM, Value::Bytes(b)) => {
                Value::from(-BigInt::from_bytes_be(Sign::Plus, &b) - 1u8)
            }
            (TAG_URI, Value::Text(s)) => match Url::parse(&s) {
                Ok(u) => Value::Uri(u),
                Err(_) => Value::Text(s),
            },
            (_, inner) => inner,
        })
    }

    fn simple(&mut self, info: u8) -> Result<Value> {
        match info {
            0..=19 => Ok(Value::Simple(SimpleValue(info))),
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            23 => Ok(Value::Undefined),
            24 => {
                // One-byte simple value extension: consumed, reported as undefined.
                self.src.read_byte()?;
                Ok(Value::Undefined)
            }
            25 => {
                let mut b = [0u8; 2];
                self.src.read_exact(&mut b)?;
                Ok(Value::Float(half_to_f64(u16::from_be_bytes(b))))
            }
            26 => {
                let mut b = [0u8; 4];
                self.src.read_exact(&mut b)?;
                Ok(Value::Float(f64::from(f32::from_be_bytes(b))))
            }
            27 => {
                let mut b = [0u8; 8];
                self.src.read_exact(&mut b)?;
                Ok(Value::Float(f64::from_be_bytes(b)))
            }
            _ => Err(CborError::malformed(format!("invalid simple value code {info}"))),
        }
    }
}

fn utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| CborError::malformed(format!("invalid UTF-8 in text: {e}")))
}

fn epoch_float(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// IEEE 754 binary16 → f64.
pub fn half_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = i32::from((bits >> 10) & 0x1f);
    let frac = f64::from(bits & 0x3ff) / 1024.0;
    match exp {
        0 => sign * 2f64.powi(-14) * frac,
        0x1f if frac != 0.0 => f64::NAN,
        0x1f => sign * f64::INFINITY,
        _ => sign * 2f64.powi(exp - 15) * (1.0 + frac),
    }
}
