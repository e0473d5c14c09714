//! Version tokens for optimistic concurrency.
//!
//! Every etag is derived from a process-wide counter that is seeded from the
//! wall clock in 100ns ticks and never moves backwards, so two calls can never
//! observe the same value even when the clock stalls or runs backwards.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

static LAST_TICK: AtomicU64 = AtomicU64::new(0);

/// Returns the next strictly increasing tick.
fn next_tick() -> u64 {
    let now = Utc::now()
        .timestamp_nanos_opt()
        .map(|n| (n / 100) as u64)
        .unwrap_or(0);

    let previous = LAST_TICK
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);

    now.max(previous + 1)
}

/// Produces a new opaque, quoted etag such as `"0x08DC1F2A3B4C5D6E"`.
pub fn new_etag() -> String {
    format!("\"0x{:016X}\"", next_tick())
}
