//! Test sender: streams a frame to a relay as VSSP fragments, optionally
//! dropping a share of them to exercise threshold completion.

use anyhow::{ensure, Context};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use vssp_core::fragment::{FrameDescriptor, Fragmenter, MAX_PAYLOAD};

#[derive(Debug, Clone)]
pub struct SendOptions {
    pub target: SocketAddr,
    pub fps: f64,
    pub frames: u32,
    pub first_frame_id: u32,
    pub mode: u8,
    pub eye: u8,
    pub codec: u8,
    /// Probability of skipping each fragment, in [0, 1).
    pub loss: f64,
    pub max_payload: usize,
}

impl SendOptions {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            fps: 30.0,
            frames: 1,
            first_frame_id: 0,
            mode: 0,
            eye: 0,
            codec: 1,
            loss: 0.0,
            max_payload: MAX_PAYLOAD,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendSummary {
    pub frames: u32,
    pub datagrams: u64,
    /// Fragments skipped by simulated loss.
    pub skipped: u64,
    pub bytes: u64,
}

/// A recognizable frame body for when no file is given.
pub fn test_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Send `frame` `options.frames` times, one frame per tick at `options.fps`,
/// with consecutive frame ids.
pub async fn send_frames(frame: &[u8], options: &SendOptions) -> anyhow::Result<SendSummary> {
    ensure!(options.fps > 0.0, "fps must be positive, got {}", options.fps);
    ensure!(
        (0.0..1.0).contains(&options.loss),
        "loss must be in [0, 1), got {}",
        options.loss
    );

    let fragmenter = Fragmenter::new(options.max_payload)?;
    let local: SocketAddr = if options.target.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = UdpSocket::bind(local)
        .await
        .context("Failed to bind sender socket")?;

    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / options.fps));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();
    let mut summary = SendSummary::default();

    info!(
        target = %options.target,
        frames = options.frames,
        size = frame.len(),
        fps = options.fps,
        loss = options.loss,
        "Sending frames"
    );

    for n in 0..options.frames {
        ticker.tick().await;
        let descriptor = FrameDescriptor {
            frame_id: options.first_frame_id.wrapping_add(n),
            mode: options.mode,
            eye: options.eye,
            codec: options.codec,
            flags: 0,
            timestamp_ms: started.elapsed().as_millis() as u32,
        };

        for datagram in fragmenter.split(frame, &descriptor)? {
            if options.loss > 0.0 && rng.gen_bool(options.loss) {
                summary.skipped += 1;
                continue;
            }
            socket
                .send_to(&datagram, options.target)
                .await
                .with_context(|| format!("Failed to send to {}", options.target))?;
            summary.datagrams += 1;
            summary.bytes += datagram.len() as u64;
        }
        summary.frames += 1;
        debug!(frame_id = descriptor.frame_id, "Frame sent");
    }

    info!(
        frames = summary.frames,
        datagrams = summary.datagrams,
        skipped = summary.skipped,
        bytes = summary.bytes,
        "Send complete"
    );
    Ok(summary)
}
