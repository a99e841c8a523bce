// SPDX-License-Identifier: MIT

//! Concurrent, in-memory directory of hosts and their links, plus the set
//! of bound inbound listener sockets.
//!
//! A single [`parking_lot::RwLock`] covers the host list, the flat
//! node-id index, and the listener list. Readers ([`HostRegistry::get`],
//! [`HostRegistry::acquire`], [`HostRegistry::foreach`]) take the shared
//! side; [`HostRegistry::add`], [`HostRegistry::remove`] and
//! [`HostRegistry::listener_add`] take the exclusive side.
//!
//! Lock acquisition is RAII: the guards returned by `get`/`acquire`
//! release the lock when dropped.

pub mod host;
pub mod link;

use std::net::SocketAddr;
use std::ops::{ControlFlow, Deref};
use std::sync::Arc;

use mio::net::UdpSocket as MioUdpSocket;
use mio::{Registry, Token};
use parking_lot::{RwLock, RwLockReadGuard};
use socket2::{Domain, Socket, Type};

use crate::config::HOST_INDEX_SIZE;
use crate::error::{RingError, Result};

pub use host::Host;
pub use link::{Link, LinkSnapshot};

/// A bound inbound socket registered with the dispatch worker's readiness
/// reactor.
///
/// The socket is reference-counted because a [`Link`] configured against
/// this listener's address sends from the very same socket it is received
/// on (see `listener_socket`) — there is no separate, unpolled per-link
/// socket for a PONG reply to go unseen on.
pub(crate) struct ListenerEntry {
    pub(crate) addr: SocketAddr,
    pub(crate) socket: Arc<MioUdpSocket>,
    pub(crate) token: Token,
}

struct RegistryInner {
    hosts: Vec<Host>,
    /// node_id -> index into `hosts`. `HOST_INDEX_SIZE` entries, one per
    /// possible `u16` node id.
    index: Box<[Option<u32>]>,
    listeners: Vec<ListenerEntry>,
}

impl RegistryInner {
    fn new() -> Self {
        Self {
            hosts: Vec::new(),
            index: vec![None; HOST_INDEX_SIZE].into_boxed_slice(),
            listeners: Vec::new(),
        }
    }
}

/// The host/link registry and listener set.
pub struct HostRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::new()),
        }
    }

    /// Look up one host by node id. Holds the shared lock for the lifetime
    /// of the returned guard.
    #[must_use]
    pub fn get(&self, node_id: u16) -> Option<HostGuard<'_>> {
        let guard = self.inner.read();
        let idx = guard.index[node_id as usize]?;
        Some(HostGuard { guard, idx })
    }

    /// Acquire the shared lock and obtain a view over every host. No
    /// ordering among hosts is guaranteed.
    #[must_use]
    pub fn acquire(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            guard: self.inner.read(),
        }
    }

    /// Visit every host until `visit` returns [`ControlFlow::Break`].
    /// Acquires the shared lock for the duration of the call.
    pub fn foreach(&self, visit: impl FnMut(&Host) -> ControlFlow<()>) {
        let guard = self.inner.read();
        Self::foreach_locked(&guard.hosts, visit);
    }

    /// Same as [`HostRegistry::foreach`], but for a caller that already
    /// holds a [`RegistryGuard`] or [`HostGuard`] — avoids relocking the
    /// shared lock a caller already holds.
    pub fn foreach_locked(hosts: &[Host], mut visit: impl FnMut(&Host) -> ControlFlow<()>) {
        for host in hosts {
            if visit(host).is_break() {
                break;
            }
        }
    }

    /// Register a new host. Fails with [`RingError::HostExists`] if
    /// `node_id` is already registered.
    pub fn add(&self, node_id: u16) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.index[node_id as usize].is_some() {
            return Err(RingError::HostExists(node_id));
        }
        inner.hosts.push(Host::new(node_id));
        let idx = (inner.hosts.len() - 1) as u32;
        inner.index[node_id as usize] = Some(idx);
        Ok(())
    }

    /// Unregister a host. Fails with [`RingError::HostNotFound`] if
    /// `node_id` is not registered.
    pub fn remove(&self, node_id: u16) -> Result<()> {
        let mut inner = self.inner.write();
        let idx = inner.index[node_id as usize]
            .take()
            .ok_or(RingError::HostNotFound(node_id))? as usize;

        let last = inner.hosts.len() - 1;
        inner.hosts.swap_remove(idx);

        if idx != last {
            // swap_remove moved the host formerly at `last` into `idx`;
            // fix up its index entry so get(moved_id) still resolves.
            let moved_id = inner.hosts[idx].node_id();
            inner.index[moved_id as usize] = Some(idx as u32);
        }
        Ok(())
    }

    /// Bind `addr`, register it with `registry` for read readiness, and add
    /// it to the listener set under the exclusive lock. Returns the
    /// socket's actual bound address, since `addr`'s port may be `0`
    /// (OS-assigned).
    ///
    /// Binds with `SO_REUSEADDR` set so a listener can be re-added on the
    /// same address immediately after a prior `Handle` using it has torn
    /// down, the way `TIME_WAIT` would otherwise briefly forbid.
    pub fn listener_add(&self, addr: SocketAddr, registry: &Registry, token: Token) -> Result<SocketAddr> {
        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let raw = Socket::new(domain, Type::DGRAM, None)?;
        raw.set_reuse_address(true)?;
        raw.set_nonblocking(true)?;
        raw.bind(&addr.into())?;

        let mut socket = MioUdpSocket::from_std(raw.into());
        registry.register(&mut socket, token, mio::Interest::READABLE)?;
        let bound_addr = socket.local_addr()?;

        let mut inner = self.inner.write();
        inner.listeners.push(ListenerEntry {
            addr: bound_addr,
            socket: Arc::new(socket),
            token,
        });
        Ok(bound_addr)
    }

    /// Find the listener registered under `token`, if any, and run `f`
    /// against it under the shared lock.
    pub(crate) fn with_listener<R>(&self, token: Token, f: impl FnOnce(&ListenerEntry) -> R) -> Option<R> {
        let inner = self.inner.read();
        inner.listeners.iter().find(|l| l.token == token).map(f)
    }

    /// The shared socket a listener bound at `addr` sends and receives on,
    /// for wiring a [`Link`] to reuse it (`Link::configure`) instead of
    /// opening a private socket the reactor never polls.
    #[must_use]
    pub fn listener_socket(&self, addr: SocketAddr) -> Option<Arc<MioUdpSocket>> {
        let inner = self.inner.read();
        inner.listeners.iter().find(|l| l.addr == addr).map(|l| l.socket.clone())
    }

    /// Reverse-lookup the host whose link's configured remote address
    /// matches `source`. Returns `None` for an unrecognised source, which
    /// the caller treats as a drop.
    pub(crate) fn find_by_source(&self, source: SocketAddr) -> Option<HostGuard<'_>> {
        let guard = self.inner.read();
        let idx = guard
            .hosts
            .iter()
            .position(|h| h.links().iter().any(|l| l.matches_source(source)))?;
        Some(HostGuard {
            guard,
            idx: idx as u32,
        })
    }
}

/// RAII read-lock guard over the whole registry, as returned by
/// [`HostRegistry::acquire`].
pub struct RegistryGuard<'a> {
    guard: RwLockReadGuard<'a, RegistryInner>,
}

impl<'a> RegistryGuard<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.guard.hosts.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guard.hosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guard.hosts.is_empty()
    }
}

/// RAII read-lock guard over a single host, as returned by
/// [`HostRegistry::get`].
pub struct HostGuard<'a> {
    guard: RwLockReadGuard<'a, RegistryInner>,
    idx: u32,
}

impl<'a> Deref for HostGuard<'a> {
    type Target = Host;
    fn deref(&self) -> &Host {
        &self.guard.hosts[self.idx as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn add_then_get_returns_the_same_host() {
        let reg = HostRegistry::new();
        reg.add(7).unwrap();
        assert_eq!(reg.get(7).unwrap().node_id(), 7);
    }

    #[test]
    fn add_is_idempotent_protected_by_exists() {
        let reg = HostRegistry::new();
        reg.add(7).unwrap();
        let err = reg.add(7).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Exists);
    }

    #[test]
    fn remove_missing_is_not_found() {
        let reg = HostRegistry::new();
        let err = reg.remove(1).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn remove_fixes_up_the_swapped_host_index() {
        let reg = HostRegistry::new();
        reg.add(1).unwrap();
        reg.add(2).unwrap();
        reg.add(3).unwrap();

        // Removing the middle host causes a swap_remove; the host that
        // used to be last must still resolve by id afterwards.
        reg.remove(2).unwrap();
        assert!(reg.get(2).is_none());
        assert_eq!(reg.get(1).unwrap().node_id(), 1);
        assert_eq!(reg.get(3).unwrap().node_id(), 3);
    }

    #[test]
    fn foreach_visits_every_host_until_break() {
        let reg = HostRegistry::new();
        reg.add(1).unwrap();
        reg.add(2).unwrap();
        reg.add(3).unwrap();

        let mut seen = Vec::new();
        reg.foreach(|h| {
            seen.push(h.node_id());
            ControlFlow::Continue(())
        });
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn foreach_can_stop_early() {
        let reg = HostRegistry::new();
        reg.add(1).unwrap();
        reg.add(2).unwrap();

        let mut count = 0;
        reg.foreach(|_| {
            count += 1;
            ControlFlow::Break(())
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn acquire_gives_a_stable_snapshot_view() {
        let reg = HostRegistry::new();
        reg.add(1).unwrap();
        reg.add(2).unwrap();
        let view = reg.acquire();
        assert_eq!(view.len(), 2);
    }

    /// Concurrent add/remove/get never observes a host whose
    /// `link[i].link_id != i` — every host is born with its full link
    /// array in one `Host::new` call, so a racing reader can only ever see
    /// a host that is either fully present or entirely absent (index
    /// lookup misses), never a partially built one.
    #[test]
    fn concurrent_add_remove_get_never_observes_a_misassigned_link_id() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let reg = Arc::new(HostRegistry::new());
        let stop = Arc::new(AtomicBool::new(false));

        let writer = {
            let reg = reg.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                for round in 0..2_000u16 {
                    let id = round % 64;
                    let _ = reg.remove(id);
                    let _ = reg.add(id);
                }
                stop.store(true, Ordering::Release);
            })
        };

        let reader = {
            let reg = reg.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    for id in 0..64u16 {
                        if let Some(host) = reg.get(id) {
                            for (i, link) in host.links().iter().enumerate() {
                                assert_eq!(link.link_id() as usize, i);
                            }
                        }
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
    }
}
