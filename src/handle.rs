// SPDX-License-Identifier: MIT

//! Handle lifecycle: construction, wiring, and teardown of the local
//! endpoint pair, the readiness reactor, the registry, and the two
//! background workers.

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use mio::net::UnixDatagram as MioUnixDatagram;
use mio::{Interest, Poll, Waker};
use std::os::unix::net::UnixDatagram;

use crate::dispatch::DispatchWorker;
use crate::error::Result;
use crate::heartbeat::HeartbeatWorker;
use crate::listener::{TokenAllocator, LOCAL_TOKEN, WAKER_TOKEN};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::registry::{Host, HostGuard, HostRegistry, RegistryGuard};

/// Process-wide root of one ring: the local endpoint pair, the registry,
/// the listener set, and the Dispatch/Heartbeat workers.
///
/// Construction is all-or-nothing: any step that fails unwinds the steps
/// already taken, in exact reverse, simply by returning the error and
/// letting already-created locals drop (a `Poll`'s epoll fd, the paired
/// sockets, the waker). Teardown is the mirror image, driven by
/// [`Handle`]'s `Drop` impl: signal both workers to stop, join them, and
/// only then let the local endpoint's sockets close.
pub struct Handle {
    app_side: UnixDatagram,
    poll_registry: mio::Registry,
    token_alloc: TokenAllocator,
    hosts: Arc<HostRegistry>,
    metrics: Arc<Metrics>,
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
    dispatch_thread: Option<JoinHandle<()>>,
    heartbeat_thread: Option<JoinHandle<()>>,
}

impl Handle {
    /// Build a new ring: binds the local endpoint pair, the readiness
    /// reactor, and starts the Dispatch and Heartbeat workers.
    pub fn new() -> Result<Self> {
        let poll = Poll::new()?;
        let poll_registry = poll.registry().try_clone()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        let (core_side, app_side) = UnixDatagram::pair()?;
        core_side.set_nonblocking(true)?;
        let mut core_side = MioUnixDatagram::from_std(core_side);
        poll.registry()
            .register(&mut core_side, LOCAL_TOKEN, Interest::READABLE)?;

        let running = Arc::new(AtomicBool::new(true));
        let hosts = Arc::new(HostRegistry::new());
        let metrics = Arc::new(Metrics::default());
        let epoch = Instant::now();

        let dispatch = DispatchWorker::new(poll, core_side, hosts.clone(), metrics.clone(), running.clone(), epoch);
        let dispatch_thread = dispatch.spawn()?;

        let heartbeat = HeartbeatWorker::new(hosts.clone(), metrics.clone(), running.clone(), epoch);
        let heartbeat_thread = match heartbeat.spawn() {
            Ok(handle) => handle,
            Err(e) => {
                running.store(false, Ordering::Release);
                let _ = waker.wake();
                let _ = dispatch_thread.join();
                return Err(e.into());
            }
        };

        Ok(Self {
            app_side,
            poll_registry,
            token_alloc: TokenAllocator::new(),
            hosts,
            metrics,
            running,
            waker,
            dispatch_thread: Some(dispatch_thread),
            heartbeat_thread: Some(heartbeat_thread),
        })
    }

    /// The application-facing endpoint descriptor: write payloads to send
    /// them out over the ring, read payloads delivered from peers.
    #[must_use]
    pub fn get_fd(&self) -> RawFd {
        self.app_side.as_raw_fd()
    }

    /// A duplicated, independently owned handle onto the application-side
    /// endpoint, for in-process Rust callers that would rather not manage
    /// the raw descriptor from [`Handle::get_fd`] themselves.
    pub fn try_clone_app_side(&self) -> std::io::Result<UnixDatagram> {
        self.app_side.try_clone()
    }

    /// Bind `addr` and register it as an inbound listener. Returns the
    /// socket's actual bound address (useful when `addr`'s port is `0`):
    /// pass it to [`HostRegistry::listener_socket`] to wire a [`crate::Link`]
    /// to send and receive over the same socket.
    pub fn listener_add(&self, addr: SocketAddr) -> Result<SocketAddr> {
        let token = self.token_alloc.next_token();
        self.hosts.listener_add(addr, &self.poll_registry, token)
    }

    /// The underlying host/link registry, for callers that want the full
    /// API surface (`add`/`remove`/`get`/`acquire`/`foreach`) rather than
    /// the delegating convenience methods below.
    #[must_use]
    pub fn registry(&self) -> &HostRegistry {
        &self.hosts
    }

    pub fn add(&self, node_id: u16) -> Result<()> {
        self.hosts.add(node_id)
    }

    pub fn remove(&self, node_id: u16) -> Result<()> {
        self.hosts.remove(node_id)
    }

    #[must_use]
    pub fn get(&self, node_id: u16) -> Option<HostGuard<'_>> {
        self.hosts.get(node_id)
    }

    #[must_use]
    pub fn acquire(&self) -> RegistryGuard<'_> {
        self.hosts.acquire()
    }

    pub fn foreach(&self, visit: impl FnMut(&Host) -> ControlFlow<()>) {
        self.hosts.foreach(visit);
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        let _ = self.waker.wake();
        if let Some(thread) = self.dispatch_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.heartbeat_thread.take() {
            let _ = thread.join();
        }
    }
}
