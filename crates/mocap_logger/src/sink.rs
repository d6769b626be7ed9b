//! Event sink capabilities handed to a streaming source.
//!
//! A source only ever sees these two traits, so it does not matter whether it
//! delivers from a background thread, an event loop or a poll-and-dispatch
//! loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::records::{BodyId, FrameSummary};

/// Receives whole-frame summaries. Must never fail back into the source.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: &FrameSummary);
}

/// Receives rigid-body poses. Must never fail back into the source.
pub trait RigidBodySink: Send + Sync {
    fn on_rigid_body(&self, body_id: BodyId, position: [f64; 3], rotation: [f64; 3]);
}

/// The pair of sinks a source delivers into.
#[derive(Clone)]
pub struct EventSinks {
    pub frames: Arc<dyn FrameSink>,
    pub rigid_bodies: Arc<dyn RigidBodySink>,
}

impl EventSinks {
    pub fn new(frames: Arc<dyn FrameSink>, rigid_bodies: Arc<dyn RigidBodySink>) -> Self {
        Self {
            frames,
            rigid_bodies,
        }
    }

    /// Both capabilities backed by one object.
    pub fn from_shared<S>(sink: Arc<S>) -> Self
    where
        S: FrameSink + RigidBodySink + 'static,
    {
        Self {
            frames: sink.clone(),
            rigid_bodies: sink,
        }
    }
}

/// Cut-off between a source and the sinks behind it.
///
/// Each delivery holds a shared lock while it runs. [`SinkGate::close`] takes
/// the exclusive lock, so it returns only once every in-flight delivery has
/// finished, and every delivery after that is dropped and counted.
pub struct SinkGate {
    inner: EventSinks,
    open: RwLock<bool>,
    dropped: AtomicU64,
}

impl SinkGate {
    pub fn new(inner: EventSinks) -> Arc<Self> {
        Arc::new(Self {
            inner,
            open: RwLock::new(true),
            dropped: AtomicU64::new(0),
        })
    }

    /// Sinks to register with the source, routed through this gate.
    pub fn sinks(self: &Arc<Self>) -> EventSinks {
        EventSinks::from_shared(self.clone())
    }

    /// Stop forwarding. Blocks until in-flight deliveries complete.
    pub fn close(&self) {
        let mut open = self.open.write().unwrap_or_else(PoisonError::into_inner);
        if *open {
            *open = false;
            log::debug!("Sink gate closed");
        }
    }

    pub fn is_open(&self) -> bool {
        *self.open.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Events that arrived after [`SinkGate::close`].
    pub fn dropped_after_close(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn deliver(&self, forward: impl FnOnce(&EventSinks)) {
        let open = self.open.read().unwrap_or_else(PoisonError::into_inner);
        if *open {
            forward(&self.inner);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl FrameSink for SinkGate {
    fn on_frame(&self, frame: &FrameSummary) {
        self.deliver(|sinks| sinks.frames.on_frame(frame));
    }
}

impl RigidBodySink for SinkGate {
    fn on_rigid_body(&self, body_id: BodyId, position: [f64; 3], rotation: [f64; 3]) {
        self.deliver(move |sinks| sinks.rigid_bodies.on_rigid_body(body_id, position, rotation));
    }
}
