//! Process supervisor: drives one capture from startup to shutdown.
//!
//! ```text
//! IDLE ──► CONNECTING ──► STREAMING ──► SHUTTING_DOWN ──► TERMINATED
//!              │                                              ▲
//!              └──────────── start / open failure ────────────┘
//! ```
//!
//! Shutdown order is fixed: stop the source, close the sink gate (waits for
//! any in-flight append), then close the logs.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::clock::SessionClock;
use crate::config::LoggerConfig;
use crate::error::{CaptureError, Result};
use crate::session::{CaptureSession, CaptureStats, ErrorSink, LogErrorSink};
use crate::sink::{EventSinks, SinkGate};
use crate::source::StreamingSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupervisorState {
    Idle,
    Connecting,
    Streaming,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Streaming => "STREAMING",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed capture.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSummary {
    pub session_id: String,
    pub frame_log: PathBuf,
    pub rigid_body_log: PathBuf,
    pub stats: CaptureStats,
    /// Events the source delivered after it was told to stop.
    pub dropped_after_stop: u64,
}

pub struct Supervisor {
    config: LoggerConfig,
    error_sink: Arc<dyn ErrorSink>,
    state: SupervisorState,
    state_tx: watch::Sender<SupervisorState>,
    transitions: Vec<SupervisorState>,
}

impl Supervisor {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            error_sink: Arc::new(LogErrorSink),
            state: SupervisorState::Idle,
            state_tx: watch::Sender::new(SupervisorState::Idle),
            transitions: vec![SupervisorState::Idle],
        }
    }

    /// Route runtime persistence failures somewhere other than the log.
    pub fn with_error_sink(mut self, error_sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = error_sink;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Follow state changes from another task.
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn transitions(&self) -> &[SupervisorState] {
        &self.transitions
    }

    fn enter(&mut self, next: SupervisorState) {
        log::info!("Supervisor: {} -> {}", self.state, next);
        self.state = next;
        self.transitions.push(next);
        self.state_tx.send_replace(next);
    }

    /// Run a capture until `shutdown_rx` fires (or its sender is dropped).
    ///
    /// Returns a connection or IO error if the capture never reached
    /// `Streaming`. In that case the logs hold at most their header rows.
    pub async fn run(
        &mut self,
        source: &mut dyn StreamingSource,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> Result<CaptureSummary> {
        if self.state != SupervisorState::Idle {
            log::warn!("Supervisor already ran (state {}); starting over", self.state);
            self.state = SupervisorState::Idle;
            self.transitions = vec![SupervisorState::Idle];
            self.state_tx.send_replace(SupervisorState::Idle);
        }

        self.enter(SupervisorState::Connecting);
        let session = match CaptureSession::open_with(
            &self.config.output_dir,
            self.config.durability,
            self.error_sink.clone(),
            SessionClock::start(),
        ) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                self.enter(SupervisorState::Terminated);
                return Err(e);
            }
        };

        let gate = SinkGate::new(EventSinks::from_shared(session.clone()));
        if let Err(e) = source.start(gate.sinks()).await {
            log::error!("Failed to start {} source: {}", source.name(), e);
            if let Err(shutdown_err) = source.shutdown().await {
                log::debug!("Cleanup after failed start: {}", shutdown_err);
            }
            gate.close();
            if let Err(close_err) = close_logs(&session).await {
                log::warn!("Failed to close logs: {}", close_err);
            }
            self.enter(SupervisorState::Terminated);
            return Err(e);
        }

        self.enter(SupervisorState::Streaming);
        log::info!(
            "Recording session {} to {}",
            session.session_id(),
            session.output_dir().display()
        );

        if shutdown_rx.changed().await.is_err() {
            log::warn!("Shutdown channel closed, stopping capture");
        }

        self.enter(SupervisorState::ShuttingDown);
        if let Err(e) = source.shutdown().await {
            log::error!("Failed to stop {} source cleanly: {}", source.name(), e);
        }

        // Waits for deliveries already past the gate; closing blocks briefly.
        let gate_handle = gate.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || gate_handle.close()).await {
            log::error!("Sink gate close task failed: {}", e);
        }

        let close_result = close_logs(&session).await;
        let summary = CaptureSummary {
            session_id: session.session_id().to_string(),
            frame_log: session.frame_log_path().to_path_buf(),
            rigid_body_log: session.rigid_body_log_path().to_path_buf(),
            stats: session.stats(),
            dropped_after_stop: gate.dropped_after_close(),
        };
        self.enter(SupervisorState::Terminated);
        close_result?;

        if summary.dropped_after_stop > 0 {
            log::warn!(
                "{} events arrived after the source was stopped and were not recorded",
                summary.dropped_after_stop
            );
        }
        log::info!(
            "Session {} finished: {}",
            summary.session_id,
            summary.stats
        );
        Ok(summary)
    }
}

/// Close both logs on the blocking pool; closing syncs them to disk.
async fn close_logs(session: &Arc<CaptureSession>) -> Result<()> {
    let closing = session.clone();
    match tokio::task::spawn_blocking(move || closing.close()).await {
        Ok(result) => result,
        Err(e) => Err(CaptureError::io(
            session.output_dir(),
            std::io::Error::other(e),
        )),
    }
}
