// SPDX-License-Identifier: MIT

//! The Dispatch Worker: a readiness-driven loop servicing the local
//! endpoint and every registered listener socket.

use std::io::{self, ErrorKind as IoErrorKind};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use mio::net::UnixDatagram;
use mio::{Events, Poll};

use crate::config::{DATABUF_SIZE, DISPATCH_POLL_TIMEOUT, FRAME_HEADER_LEN, MAX_POLL_EVENTS, PING_BODY_LEN};
use crate::frame::{self, FrameError, FrameType};
use crate::listener::{LOCAL_TOKEN, WAKER_TOKEN};
use crate::metrics::Metrics;
use crate::registry::HostRegistry;

/// Owns the Dispatch Worker's poll loop. Constructed by
/// [`crate::handle::Handle::new`] and run on its own thread for the
/// lifetime of the handle.
pub(crate) struct DispatchWorker {
    poll: Poll,
    local: UnixDatagram,
    registry: Arc<HostRegistry>,
    metrics: Arc<Metrics>,
    running: Arc<AtomicBool>,
    epoch: Instant,
    /// Set once the local endpoint has hit end-of-stream. Outbound service
    /// stops permanently at that point; inbound and heartbeat service keep
    /// running.
    local_closed: bool,
}

impl DispatchWorker {
    pub(crate) fn new(
        poll: Poll,
        local: UnixDatagram,
        registry: Arc<HostRegistry>,
        metrics: Arc<Metrics>,
        running: Arc<AtomicBool>,
        epoch: Instant,
    ) -> Self {
        Self {
            poll,
            local,
            registry,
            metrics,
            running,
            epoch,
            local_closed: false,
        }
    }

    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("knetring-dispatch".to_string())
            .spawn(move || self.run())
    }

    fn run(mut self) {
        let mut events = Events::with_capacity(MAX_POLL_EVENTS);
        let mut out_buf = [0u8; DATABUF_SIZE];
        let mut in_buf = [0u8; DATABUF_SIZE];

        while self.running.load(Ordering::Acquire) {
            match self.poll.poll(&mut events, Some(DISPATCH_POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!(target: "knetring::dispatch", "poll error: {e}");
                    continue;
                }
            }

            if !self.running.load(Ordering::Acquire) {
                break;
            }

            for event in events.iter() {
                match event.token() {
                    WAKER_TOKEN => {
                        // Only wakes the loop so the running check above re-fires.
                    }
                    LOCAL_TOKEN => {
                        if !self.local_closed {
                            self.service_local(&mut out_buf);
                        }
                    }
                    token => self.service_listener(token, &mut in_buf),
                }
            }
        }

        log::debug!(target: "knetring::dispatch", "dispatch worker stopped");
    }

    /// Drain one outbound message from the local endpoint and fan it out
    /// to every host per its `active` policy.
    fn service_local(&mut self, out_buf: &mut [u8]) {
        let body_cap = out_buf.len() - FRAME_HEADER_LEN;
        let n = match self.local.recv(&mut out_buf[FRAME_HEADER_LEN..FRAME_HEADER_LEN + body_cap]) {
            Ok(0) => {
                log::info!(target: "knetring::dispatch", "local endpoint closed; outbound service stopped");
                self.local_closed = true;
                if let Err(e) = self.poll.registry().deregister(&mut self.local) {
                    log::warn!(target: "knetring::dispatch", "failed to deregister local endpoint: {e}");
                }
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == IoErrorKind::WouldBlock => return,
            Err(e) => {
                log::warn!(target: "knetring::dispatch", "local endpoint read failed: {e}");
                return;
            }
        };

        frame::encode_header(out_buf, FrameType::Data);
        let frame = &out_buf[..FRAME_HEADER_LEN + n];

        let view = self.registry.acquire();
        for host in view.iter() {
            let mut sent_any = false;
            for link in host.links() {
                if !link.is_enabled() {
                    continue;
                }
                match link.send(frame) {
                    Ok(Some(sent)) if sent == frame.len() => {
                        sent_any = true;
                    }
                    Ok(_) => {
                        self.metrics.sends_failed();
                    }
                    Err(e) => {
                        log::debug!(target: "knetring::dispatch", "send failed on link {}: {e}", link.link_id());
                        self.metrics.sends_failed();
                    }
                }
                if sent_any && !host.is_active() {
                    break;
                }
            }
        }
    }

    /// Service one readable listener socket: receive, validate, and
    /// dispatch by frame type.
    fn service_listener(&self, token: mio::Token, in_buf: &mut [u8]) {
        let received = self.registry.with_listener(token, |entry| entry.socket.recv_from(in_buf));
        let Some(result) = received else {
            return;
        };

        let (n, source) = match result {
            Ok(pair) => pair,
            Err(e) if e.kind() == IoErrorKind::WouldBlock => return,
            Err(e) => {
                log::debug!(target: "knetring::dispatch", "listener recv failed: {e}");
                return;
            }
        };

        let frame_type = match frame::decode_header(&in_buf[..n]) {
            Ok(t) => t,
            Err(FrameError::TooShort) => {
                self.metrics.frames_dropped_short();
                return;
            }
            Err(FrameError::BadMagic) => {
                self.metrics.frames_dropped_bad_magic();
                return;
            }
            Err(FrameError::BadVersion) => {
                self.metrics.frames_dropped_bad_version();
                return;
            }
        };

        match frame_type {
            FrameType::Data => self.handle_data(&in_buf[..n], source),
            FrameType::Ping => self.handle_ping(token, &mut in_buf[..n], source),
            FrameType::Pong => self.handle_pong(&in_buf[..n], source),
            FrameType::Unknown(code) => {
                log::trace!(target: "knetring::dispatch", "ignoring unknown frame type {code:#x} from {source}");
            }
        }
    }

    fn handle_data(&self, frame: &[u8], source: SocketAddr) {
        if self.registry.find_by_source(source).is_none() {
            self.metrics.frames_dropped_unknown_source();
            return;
        }
        let payload = &frame[FRAME_HEADER_LEN..];
        if let Err(e) = self.local.send(payload) {
            log::debug!(target: "knetring::dispatch", "local endpoint write failed: {e}");
        }
    }

    fn handle_ping(&self, token: mio::Token, frame: &mut [u8], source: SocketAddr) {
        if self.registry.find_by_source(source).is_none() {
            self.metrics.frames_dropped_unknown_source();
            return;
        }
        frame::rewrite_type(frame, FrameType::Pong);
        let sent = self
            .registry
            .with_listener(token, |entry| entry.socket.send_to(frame, source));
        if let Some(Err(e)) = sent {
            log::debug!(target: "knetring::dispatch", "pong reflection failed: {e}");
        }
    }

    fn handle_pong(&self, frame: &[u8], source: SocketAddr) {
        let Some(host) = self.registry.find_by_source(source) else {
            self.metrics.frames_dropped_unknown_source();
            return;
        };
        let Some(link) = host.links().iter().find(|l| l.matches_source(source)) else {
            return;
        };
        if frame.len() < FRAME_HEADER_LEN + PING_BODY_LEN {
            self.metrics.frames_dropped_short();
            return;
        }
        let sent_elapsed = frame::decode_timestamp(&frame[FRAME_HEADER_LEN..]);
        link.record_pong(Instant::now(), self.epoch, sent_elapsed);
        self.metrics.pongs_received();
    }
}
