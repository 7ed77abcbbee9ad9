//! Tests for string literal escape decoding and encoding

use crate::compiler::codegen::string_escapes::{decode, encode};
use proptest::prelude::*;

#[test]
fn decodes_every_known_escape() {
    let decoded = decode(r"a\n\r\t\\\0b");
    assert_eq!(
        decoded.bytes,
        vec![b'a', b'\n', b'\r', b'\t', b'\\', 0, b'b'],
        "all simple escapes should decode to their byte values"
    );
    assert!(
        decoded.unknown_escapes.is_empty(),
        "known escapes should not be flagged"
    );
}

#[test]
fn decodes_quote_escape() {
    let decoded = decode(r#"say \"hi\""#);
    assert_eq!(decoded.bytes, b"say \"hi\"".to_vec());
}

#[test]
fn decodes_hex_escapes() {
    let decoded = decode(r"\x00\x41\xff");
    assert_eq!(decoded.bytes, vec![0x00, 0x41, 0xff]);
    assert!(decoded.unknown_escapes.is_empty());
}

#[test]
fn hex_escape_with_one_digit_still_decodes() {
    let decoded = decode(r"\x5");
    assert_eq!(decoded.bytes, vec![0x5]);
}

#[test]
fn unknown_escapes_pass_through_verbatim() {
    let decoded = decode(r"\q");
    assert_eq!(
        decoded.bytes,
        vec![b'\\', b'q'],
        "the backslash and the character should both be copied"
    );
    assert_eq!(
        decoded.unknown_escapes,
        vec!['q'],
        "unknown escapes should be reported for the warning"
    );
}

#[test]
fn trailing_backslash_is_kept() {
    let decoded = decode("abc\\");
    assert_eq!(decoded.bytes, b"abc\\".to_vec());
}

#[test]
fn encode_round_trips_the_escape_set() {
    let original = b"line\none\r\ttab \\ \"quoted\" \x00 \x07\xff end".to_vec();
    let encoded = encode(&original);
    let decoded = decode(&encoded);
    assert_eq!(
        decoded.bytes, original,
        "encoding then decoding should give back the original bytes"
    );
    assert!(decoded.unknown_escapes.is_empty());
}

proptest! {
    #[test]
    fn encode_decode_round_trips_any_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let encoded = encode(&bytes);
        let decoded = decode(&encoded);
        prop_assert_eq!(decoded.bytes, bytes);
        prop_assert!(decoded.unknown_escapes.is_empty());
    }
}
