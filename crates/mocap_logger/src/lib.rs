//! Live motion-capture logger.
//!
//! Records the frame summaries and rigid-body poses pushed by a tracking
//! source into two CSV logs per session, timestamped against a shared
//! session clock.
//!
//! # Architecture
//!
//! ```text
//! StreamingSource ──► SinkGate ──► CaptureSession ──► DurableLogWriter ──► mocap_frames_<id>.csv
//!  (zenoh/synthetic)    │              │  SessionClock   DurableLogWriter ──► mocap_rigidbodies_<id>.csv
//!                       │              └─ ErrorSink (runtime persistence failures)
//!                       └─ closed by the Supervisor before the logs on shutdown
//! ```
//!
//! # Modules
//!
//! - [`clock`] — Session zero-point and session identity.
//! - [`config`] — YAML configuration for output, source and durability.
//! - [`error`] — Unified error type for the capture pipeline.
//! - [`records`] — Source events and the persisted row types.
//! - [`session`] — Capture session owning both logs.
//! - [`sink`] — Frame / rigid-body sink capabilities and the shutdown gate.
//! - [`source`] — Streaming source trait and its Zenoh and synthetic implementations.
//! - [`supervisor`] — Startup and shutdown state machine.
//! - [`writer`] — Durable append-only CSV writer.

pub mod clock;
pub mod config;
pub mod error;
pub mod records;
pub mod session;
pub mod sink;
pub mod source;
pub mod supervisor;
pub mod writer;

pub use clock::SessionClock;
pub use config::LoggerConfig;
pub use error::{CaptureError, Result};
pub use records::{BodyId, FrameSummary, RigidBodyPose};
pub use session::{CaptureSession, CaptureStats, ErrorSink};
pub use sink::{EventSinks, FrameSink, RigidBodySink, SinkGate};
pub use source::StreamingSource;
pub use supervisor::{CaptureSummary, Supervisor, SupervisorState};
