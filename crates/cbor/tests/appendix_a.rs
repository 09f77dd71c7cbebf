//! RFC 8949 Appendix A: every example must decode to the listed value.

use bfo_cbor::{decode, BigInt, SimpleValue, Value};
use chrono::{TimeZone, Utc};

fn d(hex_str: &str) -> Value {
    let bytes = hex::decode(hex_str).unwrap();
    decode(&bytes).unwrap_or_else(|e| panic!("{hex_str}: {e}"))
}

fn arr(items: impl IntoIterator<Item = Value>) -> Value {
    Value::Array(items.into_iter().collect())
}

fn map<K: Into<Value>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Value {
    pairs.into_iter().collect()
}

fn ints(items: impl IntoIterator<Item = i64>) -> Value {
    arr(items.into_iter().map(Value::from))
}

fn float(hex_str: &str) -> f64 {
    match d(hex_str) {
        Value::Float(f) => f,
        other => panic!("{hex_str}: expected float, got {other:?}"),
    }
}

#[test]
fn unsigned_integers() {
    let cases: &[(&str, u64)] = &[
        ("00", 0),
        ("01", 1),
        ("0a", 10),
        ("17", 23),
        ("1818", 24),
        ("1819", 25),
        ("1864", 100),
        ("1903e8", 1000),
        ("1a000f4240", 1_000_000),
        ("1b000000e8d4a51000", 1_000_000_000_000),
        ("1bffffffffffffffff", u64::MAX),
    ];
    for (hex_str, expected) in cases {
        assert_eq!(d(hex_str), Value::from(*expected), "{hex_str}");
    }
}

#[test]
fn negative_integers() {
    let cases: &[(&str, i64)] = &[("20", -1), ("29", -10), ("3863", -100), ("3903e7", -1000)];
    for (hex_str, expected) in cases {
        assert_eq!(d(hex_str), Value::Integer(*expected), "{hex_str}");
    }
    assert_eq!(
        d("3bffffffffffffffff"),
        Value::from(-BigInt::from(u64::MAX) - 1u8)
    );
}

#[test]
fn bignums() {
    assert_eq!(
        d("c249010000000000000000"),
        Value::from(BigInt::from(u64::MAX) + 1u8)
    );
    assert_eq!(
        d("c349010000000000000000"),
        Value::from(-BigInt::from(u64::MAX) - 2u8)
    );
}

#[test]
fn floats() {
    let cases: &[(&str, f64)] = &[
        ("f90000", 0.0),
        ("f93c00", 1.0),
        ("fb3ff199999999999a", 1.1),
        ("f93e00", 1.5),
        ("f97bff", 65504.0),
        ("fa47c35000", 100000.0),
        ("fa7f7fffff", 3.4028234663852886e+38),
        ("fb7e37e43c8800759c", 1.0e+300),
        ("f90001", 5.960464477539063e-8),
        ("f90400", 0.00006103515625),
        ("f9c400", -4.0),
        ("fbc010666666666666", -4.1),
        ("f97c00", f64::INFINITY),
        ("f9fc00", f64::NEG_INFINITY),
        ("fa7f800000", f64::INFINITY),
        ("faff800000", f64::NEG_INFINITY),
        ("fb7ff0000000000000", f64::INFINITY),
        ("fbfff0000000000000", f64::NEG_INFINITY),
    ];
    for (hex_str, expected) in cases {
        assert_eq!(float(hex_str), *expected, "{hex_str}");
    }

    let neg_zero = float("f98000");
    assert_eq!(neg_zero, 0.0);
    assert!(neg_zero.is_sign_negative());

    for nan in ["f97e00", "fa7fc00000", "fb7ff8000000000000"] {
        assert!(float(nan).is_nan(), "{nan}");
    }
}

#[test]
fn simple_values() {
    assert_eq!(d("f4"), Value::Bool(false));
    assert_eq!(d("f5"), Value::Bool(true));
    assert_eq!(d("f6"), Value::Null);
    assert_eq!(d("f7"), Value::Undefined);
    assert_eq!(d("f0"), Value::Simple(SimpleValue::new(16).unwrap()));
    // One-byte extension form is reported as undefined.
    assert_eq!(d("f8ff"), Value::Undefined);
}

#[test]
fn tags() {
    let instant = Utc.with_ymd_and_hms(2013, 3, 21, 20, 4, 0).unwrap();
    assert_eq!(
        d("c074323031332d30332d32315432303a30343a30305a"),
        Value::Timestamp(instant)
    );
    assert_eq!(d("c11a514b67b0"), Value::Timestamp(instant));
    assert_eq!(
        d("c1fb41d452d9ec200000"),
        Value::Timestamp(instant + chrono::Duration::milliseconds(500))
    );
    // Unrecognized tags pass the inner item through.
    assert_eq!(d("d74401020304"), Value::Bytes(vec![1, 2, 3, 4]));
    assert_eq!(d("d818456449455446"), Value::Bytes(b"dIETF".to_vec()));
    assert_eq!(
        d("d82076687474703a2f2f7777772e6578616d706c652e636f6d"),
        Value::Uri(url::Url::parse("http://www.example.com").unwrap())
    );
}

#[test]
fn strings() {
    assert_eq!(d("40"), Value::Bytes(vec![]));
    assert_eq!(d("4401020304"), Value::Bytes(vec![1, 2, 3, 4]));
    assert_eq!(d("60"), Value::from(""));
    assert_eq!(d("6161"), Value::from("a"));
    assert_eq!(d("6449455446"), Value::from("IETF"));
    assert_eq!(d("62225c"), Value::from("\"\\"));
    assert_eq!(d("62c3bc"), Value::from("\u{00fc}"));
    assert_eq!(d("63e6b0b4"), Value::from("\u{6c34}"));
    assert_eq!(d("64f0908591"), Value::from("\u{10151}"));
}

#[test]
fn arrays_and_maps() {
    let nested = arr([Value::from(1), ints([2, 3]), ints([4, 5])]);
    let one_to_25 = ints(1..=25);

    assert_eq!(d("80"), arr([]));
    assert_eq!(d("83010203"), ints([1, 2, 3]));
    assert_eq!(d("8301820203820405"), nested);
    assert_eq!(
        d("98190102030405060708090a0b0c0d0e0f101112131415161718181819"),
        one_to_25
    );
    assert_eq!(d("a0"), Value::map());
    assert_eq!(
        d("a201020304"),
        Value::Map(vec![
            (Value::from(1), Value::from(2)),
            (Value::from(3), Value::from(4)),
        ])
    );
    assert_eq!(
        d("a26161016162820203"),
        map([("a", Value::from(1)), ("b", ints([2, 3]))])
    );
    assert_eq!(
        d("826161a161626163"),
        arr([Value::from("a"), map([("b", "c")])])
    );
    assert_eq!(
        d("a56161614161626142616361436164614461656145"),
        map([("a", "A"), ("b", "B"), ("c", "C"), ("d", "D"), ("e", "E")])
    );
}

#[test]
fn indefinite_length_items() {
    let nested = arr([Value::from(1), ints([2, 3]), ints([4, 5])]);

    assert_eq!(d("5f42010243030405ff"), Value::Bytes(vec![1, 2, 3, 4, 5]));
    assert_eq!(d("7f657374726561646d696e67ff"), Value::from("streaming"));
    assert_eq!(d("9fff"), arr([]));
    assert_eq!(d("9f018202039f0405ffff"), nested);
    assert_eq!(d("9f01820203820405ff"), nested);
    assert_eq!(d("83018202039f0405ff"), nested);
    assert_eq!(d("83019f0203ff820405"), nested);
    assert_eq!(
        d("9f0102030405060708090a0b0c0d0e0f101112131415161718181819ff"),
        ints(1..=25)
    );
    assert_eq!(
        d("bf61610161629f0203ffff"),
        map([("a", Value::from(1)), ("b", ints([2, 3]))])
    );
    assert_eq!(
        d("826161bf61626163ff"),
        arr([Value::from("a"), map([("b", "c")])])
    );
    assert_eq!(
        d("bf6346756ef563416d7421ff"),
        map([("Fun", Value::Bool(true)), ("Amt", Value::from(-2))])
    );
}
