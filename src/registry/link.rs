// SPDX-License-Identifier: MIT

//! One network path to a remote host.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::UdpSocket;
use parking_lot::Mutex;

use crate::config::{DEFAULT_LATENCY_EXP, DEFAULT_LATENCY_FIX, DEFAULT_PING_INTERVAL, DEFAULT_PONG_TIMEOUT};
use crate::error::{RingError, Result};

/// Mutable, per-link runtime state. Kept behind a small `Mutex` so the
/// Dispatch and Heartbeat workers can both touch it concurrently while only
/// holding the registry's *shared* (read) lock.
struct LinkRuntime {
    remote_addr: Option<SocketAddr>,
    socket: Option<Arc<UdpSocket>>,
    enabled: bool,
    ping_last: Instant,
    pong_last: Instant,
    ping_interval: Duration,
    pong_timeout: Duration,
    latency_micros: u64,
    latency_exp: u32,
    latency_fix: u32,
}

/// One of up to [`crate::config::MAX_LINKS`] slots on a [`super::Host`].
///
/// `link_id` is immutable and equal to the link's index within its owning
/// host's link array. Everything else is configured after construction;
/// its outbound socket may be reopened by later configuration calls.
pub struct Link {
    link_id: u8,
    state: Mutex<LinkRuntime>,
}

/// Point-in-time view of a link's liveness/latency state, returned by
/// [`Link::snapshot`] for callers (tests, telemetry) that want a plain
/// value without holding the internal lock.
#[derive(Debug, Clone, Copy)]
pub struct LinkSnapshot {
    pub link_id: u8,
    pub remote_addr: Option<SocketAddr>,
    pub enabled: bool,
    pub latency_micros: u64,
}

impl Link {
    pub(crate) fn new(link_id: u8) -> Self {
        let now = Instant::now();
        Self {
            link_id,
            state: Mutex::new(LinkRuntime {
                remote_addr: None,
                socket: None,
                enabled: false,
                ping_last: now,
                pong_last: now,
                ping_interval: DEFAULT_PING_INTERVAL,
                pong_timeout: DEFAULT_PONG_TIMEOUT,
                latency_micros: 0,
                latency_exp: DEFAULT_LATENCY_EXP,
                latency_fix: DEFAULT_LATENCY_FIX,
            }),
        }
    }

    #[must_use]
    pub fn link_id(&self) -> u8 {
        self.link_id
    }

    /// Point this link at `remote_addr`, sending and receiving over
    /// `socket` — a listener socket already bound and registered with the
    /// dispatch worker's reactor (see [`super::HostRegistry::listener_socket`]),
    /// not a private socket of the link's own. Resets `enabled` to `false`:
    /// a link is only re-enabled by an actual PONG.
    pub fn configure(
        &self,
        socket: Arc<UdpSocket>,
        remote_addr: SocketAddr,
        ping_interval: Duration,
        pong_timeout: Duration,
        latency_exp: u32,
        latency_fix: u32,
    ) -> Result<()> {
        if latency_exp >= latency_fix {
            return Err(RingError::InvalidLink(format!(
                "latency_exp ({latency_exp}) must be < latency_fix ({latency_fix})"
            )));
        }

        let mut state = self.state.lock();
        state.remote_addr = Some(remote_addr);
        state.socket = Some(socket);
        state.enabled = false;
        state.ping_interval = ping_interval;
        state.pong_timeout = pong_timeout;
        state.latency_exp = latency_exp;
        state.latency_fix = latency_fix;
        state.latency_micros = 0;
        let now = Instant::now();
        state.ping_last = now;
        state.pong_last = now;
        Ok(())
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    #[must_use]
    pub fn snapshot(&self) -> LinkSnapshot {
        let state = self.state.lock();
        LinkSnapshot {
            link_id: self.link_id,
            remote_addr: state.remote_addr,
            enabled: state.enabled,
            latency_micros: state.latency_micros,
        }
    }

    /// Non-blocking send of `buf` to this link's configured remote address.
    /// Returns `Ok(None)` if the link has no remote address/socket
    /// configured yet (not an error: the fan-out loop simply skips it).
    pub(crate) fn send(&self, buf: &[u8]) -> std::io::Result<Option<usize>> {
        let (socket, addr) = {
            let state = self.state.lock();
            match (state.socket.clone(), state.remote_addr) {
                (Some(s), Some(a)) => (s, a),
                _ => return Ok(None),
            }
        };
        socket.send_to(buf, addr).map(Some)
    }

    /// True if this link's configured remote address matches `addr` — used
    /// by the dispatch worker to reverse-lookup the (host, link) pair that
    /// owns an inbound datagram's source address.
    pub(crate) fn matches_source(&self, addr: SocketAddr) -> bool {
        self.state.lock().remote_addr == Some(addr)
    }

    /// Heartbeat tick for this link: send a PING if due, and disable the
    /// link if it has gone silent past `pong_timeout`. `ping_buf` must
    /// already contain a full PING frame whose timestamp body this call
    /// will overwrite.
    pub(crate) fn heartbeat_tick(
        &self,
        now: Instant,
        epoch: Instant,
        ping_buf: &mut [u8],
        write_timestamp: impl FnOnce(&mut [u8], Duration),
    ) -> Option<(Arc<UdpSocket>, SocketAddr)> {
        let mut state = self.state.lock();

        if state.enabled && now.duration_since(state.pong_last) >= state.pong_timeout {
            state.enabled = false;
        }

        if now.duration_since(state.ping_last) < state.ping_interval {
            return None;
        }
        let (socket, addr) = match (state.socket.clone(), state.remote_addr) {
            (Some(s), Some(a)) => (s, a),
            _ => return None,
        };
        state.ping_last = now;
        write_timestamp(ping_buf, now.duration_since(epoch));
        Some((socket, addr))
    }

    /// Process a PONG arriving at `now` whose body carries an elapsed time
    /// of `sent_elapsed` (relative to `epoch`). Updates `pong_last`,
    /// `enabled`, and the smoothed latency estimate.
    pub(crate) fn record_pong(&self, now: Instant, epoch: Instant, sent_elapsed: Duration) {
        let mut state = self.state.lock();
        let now_elapsed = now.duration_since(epoch);
        let sample_micros = now_elapsed.saturating_sub(sent_elapsed).as_micros() as u64;

        state.pong_last = now;
        state.enabled = true;
        state.latency_micros = smooth_latency(
            state.latency_micros,
            sample_micros,
            state.latency_exp,
            state.latency_fix,
        );
    }
}

/// Integer-arithmetic exponential smoother:
/// `latency <- (latency * latency_exp + sample * (latency_fix - latency_exp)) / latency_fix`.
pub(crate) fn smooth_latency(latency: u64, sample: u64, latency_exp: u32, latency_fix: u32) -> u64 {
    let latency_exp = u64::from(latency_exp);
    let latency_fix = u64::from(latency_fix);
    (latency * latency_exp + sample * (latency_fix - latency_exp)) / latency_fix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoother_is_a_one_eighth_weighted_average() {
        // latency_exp=7, latency_fix=8: new = (old*7 + sample*1) / 8
        assert_eq!(smooth_latency(800, 1600, 7, 8), (800 * 7 + 1600) / 8);
    }

    #[test]
    fn fresh_link_starts_disabled() {
        let link = Link::new(0);
        assert!(!link.is_enabled());
        assert_eq!(link.link_id(), 0);
    }

    #[test]
    fn configure_rejects_bad_weights() {
        let link = Link::new(0);
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let socket = Arc::new(UdpSocket::bind(addr).unwrap());
        let err = link
            .configure(socket, addr, DEFAULT_PING_INTERVAL, DEFAULT_PONG_TIMEOUT, 8, 8)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Invalid);
    }

    /// A PONG moves `latency` strictly toward the new sample (never past
    /// it, never away from it) rather than snapping or drifting.
    #[test]
    fn record_pong_moves_latency_strictly_toward_the_sample() {
        let link = Link::new(0);
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let socket = Arc::new(UdpSocket::bind(addr).unwrap());
        link.configure(socket, addr, DEFAULT_PING_INTERVAL, DEFAULT_PONG_TIMEOUT, 7, 8)
            .unwrap();

        let epoch = Instant::now();
        let now = epoch;
        link.record_pong(now, epoch, Duration::from_micros(0));
        let first = link.snapshot().latency_micros;
        assert_eq!(first, 0, "first sample with elapsed=0 and prior latency=0 stays 0");

        // A second, larger sample should pull latency up, but only by the
        // smoother's 1/8 weight — strictly between the old value and the
        // raw sample, never equal to the raw sample itself.
        let later = now + Duration::from_millis(100);
        link.record_pong(later, epoch, Duration::from_millis(20));
        let second = link.snapshot().latency_micros;
        let raw_sample_micros = Duration::from_millis(80).as_micros() as u64;
        assert!(
            second > first && second < raw_sample_micros,
            "expected {first} < {second} < {raw_sample_micros}"
        );
    }

    /// If no PONG arrives within `pong_timeout`, the next heartbeat tick
    /// disables the link.
    #[test]
    fn heartbeat_tick_disables_link_after_pong_timeout_elapses() {
        let link = Link::new(0);
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let socket = Arc::new(UdpSocket::bind(addr).unwrap());
        let pong_timeout = Duration::from_millis(50);
        link.configure(socket, addr, Duration::from_secs(60), pong_timeout, 7, 8)
            .unwrap();

        let epoch = Instant::now();
        link.record_pong(epoch, epoch, Duration::from_micros(0));
        assert!(link.is_enabled());

        let mut ping_buf = [0u8; 16];
        let past_timeout = epoch + pong_timeout + Duration::from_millis(1);
        link.heartbeat_tick(past_timeout, epoch, &mut ping_buf, |body, elapsed| {
            crate::frame::encode_timestamp(body, elapsed);
        });
        assert!(!link.is_enabled(), "link must be disabled once pong_timeout has elapsed");
    }
}
