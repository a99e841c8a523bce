// SPDX-License-Identifier: MIT

//! Single source of truth for the ring's wire and runtime constants.
//!
//! Per-link tunables (`ping_interval`, `pong_timeout`, `latency_exp`,
//! `latency_fix`) are *not* here: the data model keeps them on each
//! [`crate::registry::Link`] so that different peers can be tuned
//! independently. This module only holds the defaults and the structural
//! constants that are the same for every ring.

use std::time::Duration;

/// 32-bit big-endian magic identifying this protocol on the wire.
pub const FRAME_MAGIC: u32 = 0x4b4e_5452; // "KNTR"

/// Wire format version. Frames with any other value are dropped silently.
pub const FRAME_VERSION: u8 = 1;

/// Fixed frame header size in bytes: magic(4) + version(1) + type(1) + reserved(2).
pub const FRAME_HEADER_LEN: usize = 8;

/// Maximum number of parallel links a single host may own.
pub const MAX_LINKS: usize = 8;

/// Length, in bytes, of the per-direction delivery window. Must be a power
/// of two no greater than `SEQ_MAX + 1`.
pub const CBUF_SIZE: usize = 256;

/// Highest representable sequence number; sequence space wraps modulo
/// `SEQ_MAX + 1`.
pub const SEQ_MAX: u16 = u16::MAX;

/// Maximum total datagram size (header + body) sent or received on any
/// socket owned by the ring.
pub const DATABUF_SIZE: usize = 131_072;

/// Size of the ping frame body: an 8-byte second count plus an 8-byte
/// nanosecond count, both relative to the handle's monotonic epoch.
pub const PING_BODY_LEN: usize = 16;

/// `FRAME_HEADER_LEN + PING_BODY_LEN`, the fixed size of PING/PONG frames.
pub const PING_FRAME_LEN: usize = FRAME_HEADER_LEN + PING_BODY_LEN;

/// Default interval between PINGs sent on a newly configured link.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(1000);

/// Default silence window after which an enabled link is disabled.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default weight applied to the previous latency estimate in the
/// exponential smoother (see [`crate::registry::link::smooth_latency`]).
pub const DEFAULT_LATENCY_EXP: u32 = 7;

/// Default weight applied to the new RTT sample in the smoother; must be
/// strictly greater than `DEFAULT_LATENCY_EXP`.
pub const DEFAULT_LATENCY_FIX: u32 = 8;

/// Heartbeat worker tick resolution. The source uses 200ms; kept as the
/// default here too.
pub const HEARTBEAT_RESOLUTION: Duration = Duration::from_millis(200);

/// Dispatch worker readiness-wait timeout. The source busy-polls with a
/// zero timeout (flagged in the design notes as a likely bug); this crate
/// uses a small positive timeout instead.
pub const DISPATCH_POLL_TIMEOUT: Duration = Duration::from_millis(25);

/// Size of the flat node-id index: every `u16` node id must fit.
pub const HOST_INDEX_SIZE: usize = 65536;

/// Maximum mio events drained per dispatch poll iteration.
pub const MAX_POLL_EVENTS: usize = 128;
