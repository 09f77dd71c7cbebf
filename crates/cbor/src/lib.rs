//! `bfo-cbor`: CBOR (RFC 8949) codec for the BFO Publisher wire protocol.
//!
//! Every frame exchanged with a Publisher server is a single CBOR item,
//! normally a map.  This crate provides the dynamic [`Value`] model those
//! frames decode into, plus a shortest-form encoder and a recursive-descent
//! decoder that accepts everything in RFC 8949 Appendix A.
//!
//! ```rust
//! use bfo_cbor::{decode, encode, Value};
//!
//! let msg: Value = [("type", Value::from("status")), ("message_id", Value::from(1))]
//!     .into_iter()
//!     .collect();
//! let bytes = encode(&msg);
//! assert_eq!(decode(&bytes).unwrap(), msg);
//! ```
//!
//! # Semantic tags
//!
//! Only a handful of tags are interpreted on decode; everything else is
//! passed through as the inner item:
//!
//! | Tag | Inner item  | Decoded as           |
//! |-----|-------------|----------------------|
//! | 0   | text        | [`Value::Timestamp`] |
//! | 1   | number      | [`Value::Timestamp`] |
//! | 2/3 | byte string | integer / bignum     |
//! | 32  | text        | [`Value::Uri`]       |

pub mod decode;
pub mod encode;
pub mod error;
pub mod io;
pub mod json;
pub mod value;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use decode::{decode, decode_from};
pub use encode::{encode, encode_into};
pub use error::{CborError, Result};
pub use io::{ByteSink, ByteSource, ReadSource, SliceSource, WriteSink};
pub use value::{Bignum, SimpleValue, Value};

pub use num_bigint::BigInt;
