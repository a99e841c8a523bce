// SPDX-License-Identifier: MIT

//! A multi-path peer-to-peer UDP datagram ring.
//!
//! A single process exchanges opaque application payloads with a set of
//! remote peer nodes over several redundant links at once. Applications
//! feed and drain payloads through one local endpoint ([`Handle::get_fd`]);
//! the core fans each outgoing payload out over every host's enabled
//! links, accepts equivalent inbound payloads from any of a host's links,
//! and continuously probes liveness and latency to decide which links are
//! currently usable.
//!
//! See [`Handle`] for the entry point, [`registry`] for the host/link
//! directory, and [`seqfilter`] for the per-sender delivery window this
//! crate makes directly callable by an application-layer protocol that
//! wants duplicate suppression over wrapping sequence numbers.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod handle;
pub mod heartbeat;
pub mod listener;
pub mod metrics;
pub mod registry;
pub mod seqfilter;

pub use error::{ErrorKind, Result, RingError};
pub use frame::{FrameError, FrameType};
pub use handle::Handle;
pub use metrics::{Metrics, MetricsSnapshot};
pub use registry::{Host, HostGuard, HostRegistry, Link, LinkSnapshot, RegistryGuard};
pub use seqfilter::SeqFilter;
