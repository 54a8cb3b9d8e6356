//! Relay event loop.
//!
//! One task owns the assembly table and the viewer registry. It interleaves
//! UDP receipt, viewer join/leave events and the periodic sweep, so neither
//! structure needs a lock. Completion and fanout for a frame happen inside the
//! processing of the fragment that completed it.

use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use vssp_core::{
    AssembledFrame, AssemblyConfig, AssemblyTable, FragmentHeader, InsertOutcome, PolicyError,
    ProtocolError, SweepReport, HEADER_LEN,
};

use crate::fanout::{self, FanoutReport};
use crate::registry::{ViewerChannel, ViewerId, ViewerRegistry, ViewerSink};
use crate::stats::{RelayStats, SharedStats};

/// Log a progress summary every this many shipped frames.
const SUMMARY_EVERY_FRAMES: u64 = 100;

/// Viewer lifecycle, sent by connection handlers to the relay loop.
#[derive(Debug)]
pub enum ViewerEvent {
    Joined {
        id: ViewerId,
        channel: ViewerChannel,
    },
    Left {
        id: ViewerId,
    },
}

/// What happened to one datagram.
#[derive(Debug)]
pub enum Ingest {
    Foreign,
    Malformed(ProtocolError),
    /// Reached the table without completing a frame.
    Fragment(InsertOutcome),
    /// Completed a frame, which was offered to every viewer.
    Broadcast(FanoutReport),
}

/// Bind the fragment socket, asking the kernel for a `recv_buffer`-byte receive
/// buffer first (0 keeps the OS default). Headset bursts of full-size fragments
/// overflow typical defaults.
pub fn bind_ingest_socket(bind: SocketAddr, recv_buffer: usize) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))?;
    if recv_buffer > 0 {
        match socket.set_recv_buffer_size(recv_buffer) {
            Ok(()) => {
                let actual = socket.recv_buffer_size()?;
                if actual < recv_buffer {
                    warn!(
                        requested = recv_buffer,
                        actual, "Kernel clamped the UDP receive buffer"
                    );
                } else {
                    debug!(requested = recv_buffer, actual, "UDP receive buffer set");
                }
            }
            Err(e) => warn!(
                requested = recv_buffer,
                error = %e,
                "Unable to set UDP receive buffer, using OS default"
            ),
        }
    }
    socket.set_nonblocking(true)?;
    socket.bind(&bind.into())?;
    UdpSocket::from_std(socket.into())
}

pub struct Relay<S = ViewerChannel> {
    table: AssemblyTable,
    registry: ViewerRegistry<S>,
    max_age: Duration,
    sweep_interval: Duration,
    stats: RelayStats,
    shared: SharedStats,
}

impl<S: ViewerSink> Relay<S> {
    pub fn new(config: &AssemblyConfig, shared: SharedStats) -> Result<Self, PolicyError> {
        Ok(Self {
            table: AssemblyTable::from_config(config)?,
            registry: ViewerRegistry::new(),
            max_age: config.max_age(),
            sweep_interval: config.sweep_interval(),
            stats: RelayStats::default(),
            shared,
        })
    }

    pub fn register_viewer(&mut self, id: ViewerId, sink: S) {
        self.registry.register(id, sink);
        info!(viewer = id, viewers = self.registry.len(), "Viewer registered");
    }

    pub fn remove_viewer(&mut self, id: ViewerId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            info!(viewer = id, viewers = self.registry.len(), "Viewer left");
        }
        removed
    }

    /// Run one datagram through codec, table and (on completion) fanout.
    pub fn handle_datagram(&mut self, datagram: &[u8], now: Instant) -> Ingest {
        self.stats.datagrams += 1;

        let (header, payload) = match FragmentHeader::parse(datagram) {
            Ok(parsed) => parsed,
            Err(e) if e.is_foreign() => {
                self.stats.foreign += 1;
                debug!(len = datagram.len(), "Ignoring foreign datagram");
                return Ingest::Foreign;
            }
            Err(e) => {
                self.stats.malformed += 1;
                debug!(len = datagram.len(), error = %e, "Dropping malformed fragment");
                return Ingest::Malformed(e);
            }
        };

        match self.table.insert(&header, payload, now) {
            InsertOutcome::Completed(frame) => Ingest::Broadcast(self.broadcast(frame)),
            outcome => {
                match outcome {
                    InsertOutcome::IndexOutOfRange => debug!(
                        frame = %header.key(),
                        index = header.fragment_index,
                        count = header.fragment_count,
                        "Dropping out-of-range fragment"
                    ),
                    InsertOutcome::AlreadyFinished => debug!(
                        frame = %header.key(),
                        index = header.fragment_index,
                        "Dropping fragment for shipped frame"
                    ),
                    _ => {}
                }
                Ingest::Fragment(outcome)
            }
        }
    }

    fn broadcast(&mut self, frame: AssembledFrame) -> FanoutReport {
        if frame.is_partial() {
            debug!(
                frame = %frame.key,
                missing = frame.missing.len(),
                fragments = frame.fragment_count,
                "Shipping partial frame with empty filler"
            );
        }

        let report = fanout::broadcast(&mut self.registry, &frame);
        self.stats.frames_broadcast += 1;
        self.stats.envelopes_delivered += report.delivered as u64;
        self.stats.envelopes_dropped += report.dropped_oldest as u64;
        self.stats.viewers_dropped += report.removed.len() as u64;
        for id in &report.removed {
            info!(viewer = *id, "Viewer removed after failed delivery");
        }

        debug!(
            frame = %frame.key,
            mode = frame.mode,
            codec = frame.codec,
            size = frame.bytes.len(),
            viewers = report.delivered,
            "Frame broadcast"
        );
        if self.stats.frames_broadcast % SUMMARY_EVERY_FRAMES == 0 {
            let table = self.table.stats();
            info!(
                frames = self.stats.frames_broadcast,
                viewers = self.registry.len(),
                partial = table.frames_partial,
                lost = table.evicted_stale + table.evicted_capacity,
                dropped_fragments = table.fragments_dropped(),
                "Relay progress"
            );
        }
        report
    }

    /// Purge buffers idle past the staleness window.
    pub fn sweep(&mut self, now: Instant) -> SweepReport {
        let report = self.table.sweep(now, self.max_age);
        if report.discarded > 0 {
            debug!(
                discarded = report.discarded,
                in_flight = self.table.len(),
                "Discarded stale incomplete frames"
            );
        }
        report
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            viewers_connected: self.registry.len(),
            buffers_in_flight: self.table.assembling(),
            assembly: self.table.stats(),
            ..self.stats.clone()
        }
    }

    pub async fn publish_stats(&self) {
        *self.shared.write().await = self.stats();
    }

    pub fn table(&self) -> &AssemblyTable {
        &self.table
    }

    pub fn viewers(&self) -> usize {
        self.registry.len()
    }
}

impl Relay<ViewerChannel> {
    pub fn handle_event(&mut self, event: ViewerEvent) {
        match event {
            ViewerEvent::Joined { id, channel } => self.register_viewer(id, channel),
            ViewerEvent::Left { id } => {
                self.remove_viewer(id);
            }
        }
    }

    /// Drive the relay until `shutdown` resolves. Individual datagrams and
    /// socket errors never end the loop.
    pub async fn run<F>(
        mut self,
        socket: UdpSocket,
        mut events: mpsc::Receiver<ViewerEvent>,
        max_datagram: usize,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        let mut buf = vec![0u8; max_datagram.max(HEADER_LEN)];
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_source: Option<SocketAddr> = None;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping relay loop");
                    break;
                }
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, source)) => {
                        if last_source != Some(source) {
                            debug!(source = %source, "Receiving fragments");
                            last_source = Some(source);
                        }
                        self.handle_datagram(&buf[..len], Instant::now());
                    }
                    Err(e) => warn!(error = %e, "UDP receive failed"),
                },
                Some(event) = events.recv() => self.handle_event(event),
                _ = sweep.tick() => {
                    self.sweep(Instant::now());
                    self.publish_stats().await;
                }
            }
        }

        self.registry.clear();
        self.publish_stats().await;
    }
}
