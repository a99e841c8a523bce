// SPDX-License-Identifier: MIT

//! The Heartbeat Worker: a periodic tick that walks every link of every
//! host, sending PINGs and ageing out silent links.

use std::io::{self, ErrorKind as IoErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::config::{HEARTBEAT_RESOLUTION, PING_FRAME_LEN};
use crate::frame::{self, FrameType};
use crate::metrics::Metrics;
use crate::registry::HostRegistry;

pub(crate) struct HeartbeatWorker {
    registry: Arc<HostRegistry>,
    metrics: Arc<Metrics>,
    running: Arc<AtomicBool>,
    epoch: Instant,
}

impl HeartbeatWorker {
    pub(crate) fn new(registry: Arc<HostRegistry>, metrics: Arc<Metrics>, running: Arc<AtomicBool>, epoch: Instant) -> Self {
        Self {
            registry,
            metrics,
            running,
            epoch,
        }
    }

    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("knetring-heartbeat".to_string())
            .spawn(move || self.run())
    }

    fn run(self) {
        let mut ping_buf = [0u8; PING_FRAME_LEN];
        frame::encode_header(&mut ping_buf, FrameType::Ping);

        while self.running.load(Ordering::Acquire) {
            self.tick(&mut ping_buf);
            thread::sleep(HEARTBEAT_RESOLUTION);
        }

        log::debug!(target: "knetring::heartbeat", "heartbeat worker stopped");
    }

    fn tick(&self, ping_buf: &mut [u8]) {
        let now = Instant::now();
        let view = self.registry.acquire();
        for host in view.iter() {
            for link in host.links() {
                let target = link.heartbeat_tick(now, self.epoch, &mut ping_buf[8..], |body, elapsed| {
                    frame::encode_timestamp(body, elapsed);
                });
                let Some((socket, addr)) = target else {
                    continue;
                };
                match socket.send_to(ping_buf, addr) {
                    Ok(_) => self.metrics.pings_sent(),
                    Err(e) if e.kind() == IoErrorKind::WouldBlock => {}
                    Err(e) => {
                        log::debug!(target: "knetring::heartbeat", "ping send failed on link {}: {e}", link.link_id());
                        self.metrics.sends_failed();
                    }
                }
            }
        }
    }
}
