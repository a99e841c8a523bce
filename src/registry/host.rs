// SPDX-License-Identifier: MIT

//! A remote peer node and its parallel links.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::config::MAX_LINKS;
use crate::seqfilter::SeqFilter;

use super::link::Link;

/// One remote peer, identified by a 16-bit node id.
///
/// Owns exactly [`crate::config::MAX_LINKS`] [`Link`] slots, each with a
/// `link_id` equal to its array index, and the per-direction [`SeqFilter`]
/// state used to dedup inbound DATA frames.
pub struct Host {
    node_id: u16,
    active: AtomicBool,
    links: [Link; MAX_LINKS],
    unicast_rx: Mutex<SeqFilter>,
    broadcast_rx: Mutex<SeqFilter>,
}

impl Host {
    pub(crate) fn new(node_id: u16) -> Self {
        Self {
            node_id,
            active: AtomicBool::new(false),
            links: std::array::from_fn(|i| Link::new(i as u8)),
            unicast_rx: Mutex::new(SeqFilter::new()),
            broadcast_rx: Mutex::new(SeqFilter::new()),
        }
    }

    #[must_use]
    pub fn node_id(&self) -> u16 {
        self.node_id
    }

    /// Fan-out policy: `false` sends via the first enabled link only;
    /// `true` sends via every enabled link.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    #[must_use]
    pub fn links(&self) -> &[Link; MAX_LINKS] {
        &self.links
    }

    #[must_use]
    pub fn link(&self, link_id: u8) -> Option<&Link> {
        self.links.get(link_id as usize)
    }

    /// Decide whether sequence `s` on the given direction should be
    /// delivered. See [`SeqFilter::should_deliver`].
    pub fn should_deliver(&self, broadcast: bool, s: u16) -> bool {
        let filter = if broadcast { &self.broadcast_rx } else { &self.unicast_rx };
        filter.lock().should_deliver(s)
    }

    /// Mark sequence `s` on the given direction as delivered. See
    /// [`SeqFilter::has_been_delivered`].
    pub fn has_been_delivered(&self, broadcast: bool, s: u16) {
        let filter = if broadcast { &self.broadcast_rx } else { &self.unicast_rx };
        filter.lock().has_been_delivered(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_are_pre_assigned_stable_ids() {
        let host = Host::new(7);
        for (i, link) in host.links().iter().enumerate() {
            assert_eq!(link.link_id() as usize, i);
        }
    }

    #[test]
    fn unicast_and_broadcast_filters_are_independent() {
        let host = Host::new(1);
        assert!(host.should_deliver(false, 10));
        host.has_been_delivered(false, 10);
        assert!(!host.should_deliver(false, 10));
        // Broadcast direction is untouched by the unicast mark.
        assert!(host.should_deliver(true, 10));
    }

    #[test]
    fn active_defaults_to_first_enabled_only() {
        let host = Host::new(1);
        assert!(!host.is_active());
        host.set_active(true);
        assert!(host.is_active());
    }
}
