//! Capture session: owns the frame and rigid-body logs of one recording run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::clock::SessionClock;
use crate::config::Durability;
use crate::error::{CaptureError, Result};
use crate::records::{BodyId, FrameRecord, FrameSummary, RigidBodyRecord};
use crate::sink::{FrameSink, RigidBodySink};
use crate::writer::DurableLogWriter;

pub const FRAME_LOG_PREFIX: &str = "mocap_frames";
pub const RIGID_BODY_LOG_PREFIX: &str = "mocap_rigidbodies";
pub const LOG_EXTENSION: &str = "csv";

/// Receives runtime failures that must not interrupt the capture.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &CaptureError);
}

/// Default error sink: logs each failure.
#[derive(Debug, Default)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, error: &CaptureError) {
        log::error!("{error}");
    }
}

/// Per-session write counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub frames_written: u64,
    pub rigid_bodies_written: u64,
    pub frame_failures: u64,
    pub rigid_body_failures: u64,
}

impl fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames, {} rigid-body poses",
            self.frames_written, self.rigid_bodies_written
        )?;
        let failures = self.frame_failures + self.rigid_body_failures;
        if failures > 0 {
            write!(f, " ({failures} records failed to persist)")?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Counters {
    frames_written: AtomicU64,
    rigid_bodies_written: AtomicU64,
    frame_failures: AtomicU64,
    rigid_body_failures: AtomicU64,
}

/// One logging run: a shared session identity, a clock zero-point and the
/// two logs named after it.
///
/// The ingestion entry points take `&self` and are safe to call from the
/// source's delivery threads. Failures there go to the [`ErrorSink`] and
/// never propagate back to the caller.
pub struct CaptureSession {
    session_id: String,
    output_dir: PathBuf,
    clock: SessionClock,
    frames: DurableLogWriter<FrameRecord>,
    rigid_bodies: DurableLogWriter<RigidBodyRecord>,
    error_sink: Arc<dyn ErrorSink>,
    counters: Counters,
}

impl CaptureSession {
    /// Open a session in `output_dir` with default durability and error reporting.
    pub fn open(output_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(
            output_dir,
            Durability::default(),
            Arc::new(LogErrorSink),
            SessionClock::start(),
        )
    }

    /// Open a session with an explicit clock. The clock's start names the logs.
    pub fn open_with(
        output_dir: impl AsRef<Path>,
        durability: Durability,
        error_sink: Arc<dyn ErrorSink>,
        clock: SessionClock,
    ) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir).map_err(|e| CaptureError::io(&output_dir, e))?;

        let session_id = clock.session_id();
        let frames = DurableLogWriter::initialize(
            log_path(&output_dir, FRAME_LOG_PREFIX, &session_id),
            durability,
        )?;
        let rigid_bodies = DurableLogWriter::initialize(
            log_path(&output_dir, RIGID_BODY_LOG_PREFIX, &session_id),
            durability,
        )?;

        log::info!(
            "Capture session {} opened in {}",
            session_id,
            output_dir.display()
        );

        Ok(Self::from_writers(
            output_dir,
            clock,
            frames,
            rigid_bodies,
            error_sink,
        ))
    }

    /// Assemble a session around logs that are already initialized.
    pub fn from_writers(
        output_dir: impl Into<PathBuf>,
        clock: SessionClock,
        frames: DurableLogWriter<FrameRecord>,
        rigid_bodies: DurableLogWriter<RigidBodyRecord>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            session_id: clock.session_id(),
            output_dir: output_dir.into(),
            clock,
            frames,
            rigid_bodies,
            error_sink,
            counters: Counters::default(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn frame_log_path(&self) -> &Path {
        self.frames.path()
    }

    pub fn rigid_body_log_path(&self) -> &Path {
        self.rigid_bodies.path()
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// Record one frame summary.
    pub fn on_frame(&self, frame: &FrameSummary) {
        let clock = self.clock;
        let result = self
            .frames
            .append_with(|| FrameRecord::new(clock.elapsed(), frame));
        self.tally(
            result,
            &self.counters.frames_written,
            &self.counters.frame_failures,
        );
    }

    /// Record one rigid-body pose.
    pub fn on_rigid_body(&self, body_id: BodyId, position: [f64; 3], rotation: [f64; 3]) {
        let clock = self.clock;
        let result = self.rigid_bodies.append_with(|| {
            RigidBodyRecord::new(clock.elapsed(), body_id, position, rotation)
        });
        self.tally(
            result,
            &self.counters.rigid_bodies_written,
            &self.counters.rigid_body_failures,
        );
    }

    fn tally(&self, result: Result<()>, written: &AtomicU64, failed: &AtomicU64) {
        match result {
            Ok(()) => {
                written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                failed.fetch_add(1, Ordering::Relaxed);
                self.error_sink.report(&e);
            }
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_written: self.counters.frames_written.load(Ordering::Relaxed),
            rigid_bodies_written: self.counters.rigid_bodies_written.load(Ordering::Relaxed),
            frame_failures: self.counters.frame_failures.load(Ordering::Relaxed),
            rigid_body_failures: self.counters.rigid_body_failures.load(Ordering::Relaxed),
        }
    }

    /// Flush and close both logs. Safe to call repeatedly.
    ///
    /// Both logs are closed even if the first one fails; the first error is returned.
    pub fn close(&self) -> Result<()> {
        let frames = self.frames.close();
        let rigid_bodies = self.rigid_bodies.close();
        frames.and(rigid_bodies)
    }

    pub fn is_closed(&self) -> bool {
        self.frames.is_closed() && self.rigid_bodies.is_closed()
    }
}

impl FrameSink for CaptureSession {
    fn on_frame(&self, frame: &FrameSummary) {
        CaptureSession::on_frame(self, frame);
    }
}

impl RigidBodySink for CaptureSession {
    fn on_rigid_body(&self, body_id: BodyId, position: [f64; 3], rotation: [f64; 3]) {
        CaptureSession::on_rigid_body(self, body_id, position, rotation);
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close capture session {}: {}", self.session_id, e);
        }
    }
}

fn log_path(dir: &Path, prefix: &str, session_id: &str) -> PathBuf {
    dir.join(format!("{prefix}_{session_id}.{LOG_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppendError;
    use crate::writer::testing::LimitedStorage;
    use chrono::{Local, TimeZone};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct CollectingErrorSink {
        errors: Mutex<Vec<String>>,
    }

    impl ErrorSink for CollectingErrorSink {
        fn report(&self, error: &CaptureError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    fn rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_open_names_logs_after_session_start() {
        let dir = tempfile::tempdir().unwrap();
        let started = Local.with_ymd_and_hms(2025, 1, 31, 23, 59, 58).unwrap();
        let clock = SessionClock::from_zero_point(started, Instant::now());
        let session = CaptureSession::open_with(
            dir.path(),
            Durability::Flush,
            Arc::new(LogErrorSink),
            clock,
        )
        .unwrap();

        assert_eq!(session.session_id(), "20250131_235958");
        assert_eq!(
            session.frame_log_path(),
            dir.path().join("mocap_frames_20250131_235958.csv")
        );
        assert_eq!(
            session.rigid_body_log_path(),
            dir.path().join("mocap_rigidbodies_20250131_235958.csv")
        );
        assert!(session.frame_log_path().exists());
        assert!(session.rigid_body_log_path().exists());
    }

    #[test]
    fn test_open_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let session = CaptureSession::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(session.output_dir(), nested.as_path());
    }

    #[test]
    fn test_open_existing_directory_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let first = CaptureSession::open(dir.path()).unwrap();
        first.close().unwrap();
        let second = CaptureSession::open(dir.path());
        assert!(second.is_ok());
    }

    #[test]
    fn test_open_fails_when_directory_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let result = CaptureSession::open(&blocker);
        assert!(matches!(result, Err(CaptureError::Io { .. })));
    }

    #[test]
    fn test_frame_row_matches_event() {
        let dir = tempfile::tempdir().unwrap();
        let zero = Instant::now() - Duration::from_micros(16_700);
        let clock = SessionClock::from_zero_point(Local::now(), zero);
        let session =
            CaptureSession::open_with(dir.path(), Durability::Flush, Arc::new(LogErrorSink), clock)
                .unwrap();

        session.on_frame(&FrameSummary {
            frame_number: Some(42),
            marker_count: Some(8),
            rigid_body_count: Some(2),
        });

        let rows = rows(session.frame_log_path());
        assert_eq!(rows.len(), 1);
        let timestamp: f64 = rows[0][0].parse().unwrap();
        assert!(timestamp >= 0.0167, "timestamp {timestamp}");
        assert!(timestamp < 1.0, "timestamp {timestamp}");
        assert_eq!(&rows[0][1..], &["42", "8", "2"]);
    }

    #[test]
    fn test_absent_count_is_distinct_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let session = CaptureSession::open(dir.path()).unwrap();

        session.on_frame(&FrameSummary {
            frame_number: None,
            marker_count: Some(0),
            rigid_body_count: None,
        });

        let rows = rows(session.frame_log_path());
        assert_eq!(&rows[0][1..], &["", "0", ""]);
    }

    #[test]
    fn test_rigid_body_row_matches_event() {
        let dir = tempfile::tempdir().unwrap();
        let session = CaptureSession::open(dir.path()).unwrap();

        session.on_rigid_body(BodyId::Number(1), [1.0, 2.0, 3.0], [0.1, 0.2, 0.3]);

        let rows = rows(session.rigid_body_log_path());
        assert_eq!(rows.len(), 1);
        assert!(rows[0][0].parse::<f64>().unwrap() >= 0.0);
        assert_eq!(
            &rows[0][1..],
            &["1", "1.0", "2.0", "3.0", "0.1", "0.2", "0.3"]
        );
        assert_eq!(session.stats().rigid_bodies_written, 1);
    }

    #[test]
    fn test_close_is_idempotent_and_adds_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let session = CaptureSession::open(dir.path()).unwrap();
        session.on_frame(&FrameSummary::default());

        session.close().unwrap();
        session.close().unwrap();
        assert!(session.is_closed());

        assert_eq!(rows(session.frame_log_path()).len(), 1);
        assert!(rows(session.rigid_body_log_path()).is_empty());
    }

    #[test]
    fn test_write_after_close_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let errors = Arc::new(CollectingErrorSink::default());
        let session = CaptureSession::open_with(
            dir.path(),
            Durability::Flush,
            errors.clone(),
            SessionClock::start(),
        )
        .unwrap();
        session.close().unwrap();

        session.on_frame(&FrameSummary::default());
        session.on_rigid_body(BodyId::Name("wand".into()), [0.0; 3], [0.0; 3]);

        let stats = session.stats();
        assert_eq!(stats.frame_failures, 1);
        assert_eq!(stats.rigid_body_failures, 1);
        assert_eq!(stats.frames_written, 0);

        let errors = errors.errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains(&AppendError::SinkClosed.to_string()));
    }

    #[test]
    fn test_write_failure_mid_stream_is_reported_once_and_skipped() {
        let frame_storage = LimitedStorage::default();
        let errors = Arc::new(CollectingErrorSink::default());
        let session = CaptureSession::from_writers(
            "recordings",
            SessionClock::start(),
            DurableLogWriter::with_storage(
                "recordings/frames.csv",
                Box::new(frame_storage.clone()),
                Durability::Flush,
            )
            .unwrap(),
            DurableLogWriter::with_storage(
                "recordings/bodies.csv",
                Box::new(LimitedStorage::default()),
                Durability::Flush,
            )
            .unwrap(),
            errors.clone(),
        );

        let frame = |n| FrameSummary {
            frame_number: Some(n),
            marker_count: Some(8),
            rigid_body_count: Some(2),
        };
        session.on_frame(&frame(1));
        frame_storage.limit(Some(4));
        session.on_frame(&frame(2));
        frame_storage.limit(None);
        session.on_frame(&frame(3));
        session.close().unwrap();

        let stats = session.stats();
        assert_eq!(stats.frames_written, 2);
        assert_eq!(stats.frame_failures, 1);

        let errors = errors.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("recordings/frames.csv"));
        assert!(errors[0].contains("frame_number: Some(2)"));

        let contents = frame_storage.contents();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(contents.as_bytes());
        let frame_numbers: Vec<String> = reader
            .records()
            .map(|r| r.unwrap()[1].to_string())
            .collect();
        assert_eq!(frame_numbers, ["1", "3"]);
    }

    #[test]
    fn test_concurrent_ingestion_keeps_timestamps_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let session = Arc::new(CaptureSession::open(dir.path()).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|thread: i64| {
                let session = session.clone();
                std::thread::spawn(move || {
                    for i in 0..250u64 {
                        session.on_frame(&FrameSummary {
                            frame_number: Some(i),
                            ..Default::default()
                        });
                        session.on_rigid_body(BodyId::Number(thread), [0.0; 3], [0.0; 3]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        session.close().unwrap();

        for path in [session.frame_log_path(), session.rigid_body_log_path()] {
            let timestamps: Vec<f64> = rows(path)
                .iter()
                .map(|row| row[0].parse().unwrap())
                .collect();
            assert_eq!(timestamps.len(), 1000);
            assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        }
        assert_eq!(session.stats().frames_written, 1000);
    }

    #[test]
    fn test_stats_display() {
        let stats = CaptureStats {
            frames_written: 10,
            rigid_bodies_written: 20,
            frame_failures: 1,
            rigid_body_failures: 0,
        };
        assert_eq!(
            stats.to_string(),
            "10 frames, 20 rigid-body poses (1 records failed to persist)"
        );
    }
}
