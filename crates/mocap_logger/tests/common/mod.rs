//! Test helpers for capture scenario tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use mocap_logger::config::LoggerConfig;
use mocap_logger::records::{BodyId, FrameSummary};
use mocap_logger::{CaptureError, ErrorSink, EventSinks, StreamingSource};

/// Header plus data rows of a CSV log.
pub struct CsvLog {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvLog {
    pub fn read(path: &Path) -> Self {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_path(path)
            .unwrap_or_else(|e| panic!("failed to open {}: {e}", path.display()));
        let header = reader
            .headers()
            .unwrap()
            .iter()
            .map(str::to_string)
            .collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        Self { header, rows }
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row[0].parse().expect("timestamp column is a float"))
            .collect()
    }

    pub fn assert_non_decreasing(&self) {
        let timestamps = self.timestamps();
        for pair in timestamps.windows(2) {
            assert!(pair[0] <= pair[1], "timestamps out of order: {pair:?}");
        }
    }
}

pub fn config_in(dir: &Path) -> LoggerConfig {
    LoggerConfig {
        output_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

/// Error sink that keeps every reported error.
#[derive(Default)]
pub struct CollectingErrorSink {
    pub errors: Mutex<Vec<String>>,
}

impl ErrorSink for CollectingErrorSink {
    fn report(&self, error: &CaptureError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

impl CollectingErrorSink {
    pub fn count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Source that refuses to connect.
pub struct RefusingSource;

#[async_trait::async_trait]
impl StreamingSource for RefusingSource {
    fn name(&self) -> &str {
        "refusing"
    }

    async fn start(&mut self, _sinks: EventSinks) -> mocap_logger::Result<()> {
        Err(CaptureError::connection(self.name(), "server unreachable"))
    }

    async fn shutdown(&mut self) -> mocap_logger::Result<()> {
        Ok(())
    }
}

/// Source whose delivery thread keeps firing in a tight loop, interleaving
/// frames and rigid bodies, and which does NOT stop that thread on shutdown.
/// Models a collaborator with a late callback still in flight.
pub struct RunawaySource {
    pub delivered: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RunawaySource {
    pub fn new() -> Self {
        Self {
            delivered: Arc::new(AtomicU64::new(0)),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Actually stop the delivery thread (test teardown).
    pub fn halt(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

#[async_trait::async_trait]
impl StreamingSource for RunawaySource {
    fn name(&self) -> &str {
        "runaway"
    }

    async fn start(&mut self, sinks: EventSinks) -> mocap_logger::Result<()> {
        let delivered = self.delivered.clone();
        let stop = self.stop.clone();
        self.handle = Some(std::thread::spawn(move || {
            let mut frame: u64 = 0;
            while !stop.load(Ordering::SeqCst) {
                sinks.frames.on_frame(&FrameSummary {
                    frame_number: Some(frame),
                    marker_count: Some(4),
                    rigid_body_count: Some(1),
                });
                sinks
                    .rigid_bodies
                    .on_rigid_body(BodyId::Number(1), [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]);
                delivered.fetch_add(2, Ordering::SeqCst);
                frame += 1;
            }
        }));
        Ok(())
    }

    async fn shutdown(&mut self) -> mocap_logger::Result<()> {
        // Deliberately leaves the thread running.
        Ok(())
    }
}
