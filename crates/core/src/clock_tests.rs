// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_moves_forward() {
    let clock = SystemClock;
    let a = clock.now_ms();
    let b = clock.now_ms();
    assert!(b >= a);
    // Sanity: after 2020-01-01
    assert!(a > 1_577_836_800_000);
}

#[test]
fn fake_clock_advances_and_shares_time_across_clones() {
    let clock = FakeClock::new(1_000);
    let clone = clock.clone();
    assert_eq!(clock.now_ms(), 1_000);

    clock.advance(Duration::from_secs(5));
    assert_eq!(clone.now_ms(), 6_000);

    clone.set_ms(42);
    assert_eq!(clock.now_ms(), 42);
}
