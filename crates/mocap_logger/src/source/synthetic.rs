//! Locally generated tracking data for dry runs without a tracking server.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::StreamingSource;
use crate::config::frame_period;
use crate::error::{CaptureError, Result};
use crate::records::{BodyId, FrameSummary};
use crate::sink::EventSinks;

const MARKERS_PER_BODY: u32 = 4;

/// Emits one frame summary and `rigid_bodies` poses per period on a
/// background thread. Bodies move on circles of radius 1 around the origin,
/// one revolution every 4 seconds.
pub struct SyntheticSource {
    rate_hz: f64,
    rigid_bodies: u32,
    frame_limit: Option<u64>,
    worker: Option<Worker>,
}

struct Worker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<u64>,
}

impl SyntheticSource {
    pub fn new(rate_hz: f64, rigid_bodies: u32) -> Self {
        Self {
            rate_hz,
            rigid_bodies,
            frame_limit: None,
            worker: None,
        }
    }

    /// Stop emitting after `frames` periods; the source stays connected until shutdown.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }
}

#[async_trait::async_trait]
impl StreamingSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn start(&mut self, sinks: EventSinks) -> Result<()> {
        if self.worker.is_some() {
            return Err(CaptureError::connection(self.name(), "already started"));
        }
        let period = frame_period(self.rate_hz).ok_or_else(|| {
            CaptureError::connection(self.name(), format!("invalid rate {} Hz", self.rate_hz))
        })?;

        let (stop_tx, stop_rx) = mpsc::channel();
        let rigid_bodies = self.rigid_bodies;
        let frame_limit = self.frame_limit;

        let handle = std::thread::Builder::new()
            .name("synthetic-source".into())
            .spawn(move || emit_loop(sinks, stop_rx, period, rigid_bodies, frame_limit))
            .map_err(|e| CaptureError::connection("synthetic", e))?;

        log::info!(
            "Synthetic source started: {:.1} Hz, {} rigid bodies",
            self.rate_hz,
            self.rigid_bodies
        );
        self.worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        // The worker may already have exited; a closed channel is fine.
        let _ = worker.stop_tx.send(());
        let frames = tokio::task::spawn_blocking(move || worker.handle.join())
            .await
            .map_err(|e| CaptureError::connection("synthetic", e))?
            .map_err(|_| CaptureError::connection("synthetic", "emitter thread panicked"))?;

        log::info!("Synthetic source stopped after {} frames", frames);
        Ok(())
    }
}

fn emit_loop(
    sinks: EventSinks,
    stop_rx: mpsc::Receiver<()>,
    period: Duration,
    rigid_bodies: u32,
    frame_limit: Option<u64>,
) -> u64 {
    let started = Instant::now();
    let mut next_tick = started;
    let mut frame_number: u64 = 0;

    loop {
        if frame_limit.is_some_and(|limit| frame_number >= limit) {
            // Idle until shutdown.
            let _ = stop_rx.recv();
            break;
        }

        let wait = next_tick.saturating_duration_since(Instant::now());
        match stop_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        emit_frame(&sinks, frame_number, rigid_bodies, started.elapsed());
        frame_number += 1;
        next_tick += period;
    }

    frame_number
}

fn emit_frame(sinks: &EventSinks, frame_number: u64, rigid_bodies: u32, t: Duration) {
    sinks.frames.on_frame(&FrameSummary {
        frame_number: Some(frame_number),
        marker_count: Some(rigid_bodies * MARKERS_PER_BODY),
        rigid_body_count: Some(rigid_bodies),
    });

    let phase = t.as_secs_f64() * std::f64::consts::FRAC_PI_2;
    for body in 0..rigid_bodies {
        let angle = phase + f64::from(body) * std::f64::consts::TAU / f64::from(rigid_bodies);
        sinks.rigid_bodies.on_rigid_body(
            BodyId::Number(i64::from(body) + 1),
            [angle.cos(), angle.sin(), 1.0 + 0.1 * f64::from(body)],
            [0.0, 0.0, angle.to_degrees() % 360.0],
        );
    }
}
