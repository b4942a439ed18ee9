// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn uuid_gen_produces_short_lowercase_hex() {
    let gen = UuidIdGen;
    let id = gen.next();
    assert_eq!(id.len(), 8);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn uuid_gen_is_unique_across_calls() {
    let gen = UuidIdGen;
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
}

#[test]
fn sequential_gen_counts_up() {
    let gen = SequentialIdGen::new("w");
    assert_eq!(gen.next(), "w1");
    assert_eq!(gen.next(), "w2");
    // Clones share the counter
    let clone = gen.clone();
    assert_eq!(clone.next(), "w3");
    assert_eq!(gen.next(), "w4");
}

define_id! {
    /// Test ID type.
    pub struct TestId;
}

#[test]
fn define_id_basics() {
    let id = TestId::new("abc");
    assert_eq!(id.as_str(), "abc");
    assert_eq!(id.to_string(), "abc");
    assert_eq!(id, "abc");
    assert_eq!(TestId::from("abc".to_string()), TestId::from("abc"));
}
