// SPDX-License-Identifier: MIT

//! Lock-free dataplane counters.
//!
//! Frame-validation failures and per-send errors are absorbed rather than
//! propagated as errors. This module is where they become visible: every
//! drop or failed send bumps a counter here in addition to a `log` record,
//! keeping error counters separate from the hot path.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of [`Metrics`] at a point in time.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSnapshot {
    pub frames_dropped_short: u64,
    pub frames_dropped_bad_magic: u64,
    pub frames_dropped_bad_version: u64,
    pub frames_dropped_unknown_source: u64,
    pub sends_failed: u64,
    pub pings_sent: u64,
    pub pongs_received: u64,
}

/// Shared, lock-free counters updated by the dispatch and heartbeat workers.
#[derive(Debug, Default)]
pub struct Metrics {
    frames_dropped_short: AtomicU64,
    frames_dropped_bad_magic: AtomicU64,
    frames_dropped_bad_version: AtomicU64,
    frames_dropped_unknown_source: AtomicU64,
    sends_failed: AtomicU64,
    pings_sent: AtomicU64,
    pongs_received: AtomicU64,
}

macro_rules! counter_bump {
    ($name:ident) => {
        pub(crate) fn $name(&self) {
            self.$name.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl Metrics {
    counter_bump!(frames_dropped_short);
    counter_bump!(frames_dropped_bad_magic);
    counter_bump!(frames_dropped_bad_version);
    counter_bump!(frames_dropped_unknown_source);
    counter_bump!(sends_failed);
    counter_bump!(pings_sent);
    counter_bump!(pongs_received);

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_dropped_short: self.frames_dropped_short.load(Ordering::Relaxed),
            frames_dropped_bad_magic: self.frames_dropped_bad_magic.load(Ordering::Relaxed),
            frames_dropped_bad_version: self.frames_dropped_bad_version.load(Ordering::Relaxed),
            frames_dropped_unknown_source: self
                .frames_dropped_unknown_source
                .load(Ordering::Relaxed),
            sends_failed: self.sends_failed.load(Ordering::Relaxed),
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            pongs_received: self.pongs_received.load(Ordering::Relaxed),
        }
    }
}
