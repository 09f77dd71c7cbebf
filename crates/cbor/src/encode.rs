//! Shortest-form CBOR encoder.
//!
//! Length/argument selection follows the ladder the Publisher server
//! expects byte-for-byte: inline below 24, then 1, 2 and 4 following bytes
//! up to `0xFF`, `0xFFFF` and `0x7FFF_FFFF`, and 8 bytes beyond that.  Note
//! that `0x8000_0000..=0xFFFF_FFFF` therefore takes the 8-byte form.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use num_bigint::{BigInt, Sign};

use crate::error::Result;
use crate::io::ByteSink;
use crate::value::Value;

pub(crate) const MAJOR_UNSIGNED: u8 = 0;
pub(crate) const MAJOR_NEGATIVE: u8 = 1;
pub(crate) const MAJOR_BYTES: u8 = 2;
pub(crate) const MAJOR_TEXT: u8 = 3;
pub(crate) const MAJOR_ARRAY: u8 = 4;
pub(crate) const MAJOR_MAP: u8 = 5;
pub(crate) const MAJOR_TAG: u8 = 6;
pub(crate) const MAJOR_SIMPLE: u8 = 7;

pub(crate) const TAG_DATETIME: u64 = 0;
pub(crate) const TAG_EPOCH: u64 = 1;
pub(crate) const TAG_POS_BIGNUM: u64 = 2;
pub(crate) const TAG_NEG_BIGNUM: u64 = 3;
pub(crate) const TAG_URI: u64 = 32;

const FALSE: u8 = 0xf4;
const TRUE: u8 = 0xf5;
const NULL: u8 = 0xf6;
const UNDEFINED: u8 = 0xf7;
const FLOAT32: u8 = 0xfa;
const FLOAT64: u8 = 0xfb;

/// Encode a value into a fresh buffer.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    // Writing into a Vec cannot fail.
    let _ = encode_into(value, &mut out);
    out
}

/// Encode a value into the supplied sink.
pub fn encode_into<S: ByteSink + ?Sized>(value: &Value, sink: &mut S) -> Result<()> {
    match value {
        Value::Bool(false) => sink.write(&[FALSE]),
        Value::Bool(true) => sink.write(&[TRUE]),
        Value::Null => sink.write(&[NULL]),
        Value::Undefined => sink.write(&[UNDEFINED]),
        Value::Integer(i) => write_integer(sink, *i),
        Value::BigInt(b) => write_bigint(sink, b.as_bigint()),
        Value::Float(f) => write_float(sink, *f),
        Value::Text(s) => write_text(sink, s),
        Value::Bytes(b) => {
            write_header(sink, MAJOR_BYTES, b.len() as u64)?;
            sink.reserve(b.len());
            sink.write(b)
        }
        Value::Array(items) => {
            write_header(sink, MAJOR_ARRAY, items.len() as u64)?;
            items.iter().try_for_each(|item| encode_into(item, sink))
        }
        Value::Map(entries) => {
            write_header(sink, MAJOR_MAP, entries.len() as u64)?;
            entries.iter().try_for_each(|(k, v)| {
                encode_into(k, sink)?;
                encode_into(v, sink)
            })
        }
        Value::Timestamp(t) => write_timestamp(sink, t),
        Value::Uri(u) => {
            write_header(sink, MAJOR_TAG, TAG_URI)?;
            write_text(sink, u.as_str())
        }
        Value::Simple(s) => sink.write(&[(MAJOR_SIMPLE << 5) | s.code()]),
    }
}

/// Tag 0 text for years 1..=9999, which RFC 3339 can spell; tag 1 epoch
/// seconds otherwise.
fn write_timestamp<S: ByteSink + ?Sized>(sink: &mut S, t: &DateTime<Utc>) -> Result<()> {
    if (1..=9999).contains(&t.year()) {
        write_header(sink, MAJOR_TAG, TAG_DATETIME)?;
        return write_text(sink, &t.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }
    write_header(sink, MAJOR_TAG, TAG_EPOCH)?;
    let secs = t.timestamp();
    match t.timestamp_subsec_nanos() {
        0 => write_integer(sink, secs),
        nanos => write_float(sink, secs as f64 + f64::from(nanos) / 1e9),
    }
}

/// Write a major-type header with its argument in shortest form.
pub(crate) fn write_header<S: ByteSink + ?Sized>(sink: &mut S, major: u8, arg: u64) -> Result<()> {
    let m = major << 5;
    if arg < 24 {
        sink.write(&[m | arg as u8])
    } else if arg <= 0xff {
        sink.write(&[m | 24, arg as u8])
    } else if arg <= 0xffff {
        let b = (arg as u16).to_be_bytes();
        sink.write(&[m | 25, b[0], b[1]])
    } else if arg <= 0x7fff_ffff {
        let b = (arg as u32).to_be_bytes();
        sink.write(&[m | 26, b[0], b[1], b[2], b[3]])
    } else {
        write_u64_form(sink, major, arg)
    }
}

fn write_u64_form<S: ByteSink + ?Sized>(sink: &mut S, major: u8, arg: u64) -> Result<()> {
    let mut buf = [0u8; 9];
    buf[0] = (major << 5) | 27;
    buf[1..].copy_from_slice(&arg.to_be_bytes());
    sink.write(&buf)
}

fn write_integer<S: ByteSink + ?Sized>(sink: &mut S, i: i64) -> Result<()> {
    if i >= 0 {
        write_header(sink, MAJOR_UNSIGNED, i as u64)
    } else {
        // -1 - i, computed without overflow for i64::MIN.
        write_header(sink, MAJOR_NEGATIVE, !(i as u64))
    }
}

fn write_bigint<S: ByteSink + ?Sized>(sink: &mut S, b: &BigInt) -> Result<()> {
    if let Ok(i) = i64::try_from(b) {
        return write_integer(sink, i);
    }
    let (major, tag, magnitude) = match b.sign() {
        Sign::Minus => (MAJOR_NEGATIVE, TAG_NEG_BIGNUM, -b - 1u8),
        _ => (MAJOR_UNSIGNED, TAG_POS_BIGNUM, b.clone()),
    };
    if let Ok(u) = u64::try_from(&magnitude) {
        return write_u64_form(sink, major, u);
    }
    let (_, bytes) = magnitude.to_bytes_be();
    write_header(sink, MAJOR_TAG, tag)?;
    write_header(sink, MAJOR_BYTES, bytes.len() as u64)?;
    sink.write(&bytes)
}

fn write_float<S: ByteSink + ?Sized>(sink: &mut S, f: f64) -> Result<()> {
    let single = f as f32;
    if f64::from(single) == f {
        let b = single.to_be_bytes();
        sink.write(&[FLOAT32, b[0], b[1], b[2], b[3]])
    } else {
        let mut buf = [0u8; 9];
        buf[0] = FLOAT64;
        buf[1..].copy_from_slice(&f.to_be_bytes());
        sink.write(&buf)
    }
}

fn write_text<S: ByteSink + ?Sized>(sink: &mut S, s: &str) -> Result<()> {
    write_header(sink, MAJOR_TEXT, s.len() as u64)?;
    sink.reserve(s.len());
    sink.write(s.as_bytes())
}
