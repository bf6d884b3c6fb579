// runforge-core/tests/hashing.rs
// ============================================================================
// Module: Canonical Codec Tests
// Description: Tests for canonical encodings and digest rendering.
// ============================================================================
//! ## Overview
//! Validates byte-stability of both frozen encodings and the prefixed
//! digest format.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use runforge_core::Sha256Digest;
use runforge_core::canonical_json_bytes;
use runforge_core::compact_json_bytes;
use runforge_core::hash_canonical_value;
use serde_json::json;

/// Canonical form sorts keys recursively regardless of insertion order.
#[test]
fn canonical_form_sorts_keys_recursively() {
    let value = json!({
        "zeta": {"b": 1, "a": 2},
        "alpha": [{"y": true, "x": false}],
    });
    let bytes = canonical_json_bytes(&value).expect("canonical encode");
    let text = String::from_utf8(bytes).expect("utf8");
    let alpha = text.find("\"alpha\"").expect("alpha present");
    let zeta = text.find("\"zeta\"").expect("zeta present");
    assert!(alpha < zeta);
    let a = text.find("\"a\"").expect("a present");
    let b = text.find("\"b\"").expect("b present");
    assert!(a < b);
    let x = text.find("\"x\"").expect("x present");
    let y = text.find("\"y\"").expect("y present");
    assert!(x < y);
}

/// Canonical form uses 2-space indentation and one trailing newline.
#[test]
fn canonical_form_is_indented_with_trailing_newline() {
    let bytes = canonical_json_bytes(&json!({"key": "value"})).expect("canonical encode");
    let text = String::from_utf8(bytes).expect("utf8");
    assert_eq!(text, "{\n  \"key\": \"value\"\n}\n");
}

/// Non-ASCII content is preserved, not escaped.
#[test]
fn canonical_form_preserves_unicode() {
    let bytes = canonical_json_bytes(&json!({"name": "žluťoučký"})).expect("canonical encode");
    let text = String::from_utf8(bytes).expect("utf8");
    assert!(text.contains("žluťoučký"));
    assert!(!text.contains("\\u"));
}

/// Compact form has no whitespace and sorted keys.
#[test]
fn compact_form_is_whitespace_free_and_sorted() {
    let value = json!({"b": 1, "a": {"d": 2, "c": 3}});
    let bytes = compact_json_bytes(&value).expect("compact encode");
    let text = String::from_utf8(bytes).expect("utf8");
    assert_eq!(text, r#"{"a":{"c":3,"d":2},"b":1}"#);
}

/// Identical values encode to identical bytes across repeated calls.
#[test]
fn encodings_are_byte_stable() {
    let value = json!({"list": [1, 2, 3], "nested": {"k": "v"}});
    assert_eq!(
        canonical_json_bytes(&value).expect("first"),
        canonical_json_bytes(&value).expect("second"),
    );
    assert_eq!(
        compact_json_bytes(&value).expect("first"),
        compact_json_bytes(&value).expect("second"),
    );
}

/// Digests carry the sha256 prefix over 64 lowercase hex chars.
#[test]
fn digest_format_is_prefixed_lowercase_hex() {
    let digest = Sha256Digest::of_bytes(b"hello\n");
    assert!(digest.as_str().starts_with("sha256:"));
    assert_eq!(digest.hex().len(), 64);
    assert!(digest.hex().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    // Known vector for "hello\n".
    assert_eq!(
        digest.as_str(),
        "sha256:5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
    );
}

/// Hashing a value is the hash of its compact encoding.
#[test]
fn value_hash_matches_compact_bytes() {
    let value = json!({"b": "2", "a": "1"});
    let via_value = hash_canonical_value(&value).expect("hash value");
    let via_bytes = Sha256Digest::of_bytes(&compact_json_bytes(&value).expect("compact"));
    assert_eq!(via_value, via_bytes);
}
