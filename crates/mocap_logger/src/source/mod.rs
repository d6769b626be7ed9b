//! Streaming sources: the collaborators that push tracking events into a session.

pub mod synthetic;
pub mod zenoh_source;

pub use self::synthetic::SyntheticSource;
pub use self::zenoh_source::ZenohSource;

use crate::config::{SourceConfig, SourceKind, TransportMode};
use crate::error::Result;
use crate::sink::EventSinks;

/// Connection parameters handed to a source before it is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub client_address: String,
    pub server_address: String,
    pub transport: TransportMode,
}

impl From<&SourceConfig> for ConnectionParams {
    fn from(config: &SourceConfig) -> Self {
        Self {
            client_address: config.client_address.clone(),
            server_address: config.server_address.clone(),
            transport: config.transport,
        }
    }
}

/// Producer of frame-summary and rigid-body events.
///
/// After `start` succeeds the source delivers into the given sinks from its
/// own context until `shutdown` returns. Once `shutdown` has returned, no
/// further delivery may begin.
#[async_trait::async_trait]
pub trait StreamingSource: Send {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Connect and begin delivering. Errors are connection failures.
    async fn start(&mut self, sinks: EventSinks) -> Result<()>;

    /// Stop delivering and disconnect. Safe to call when never started.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Build the source selected by `config`.
pub fn from_config(config: &SourceConfig) -> Box<dyn StreamingSource> {
    let params = ConnectionParams::from(config);
    match config.kind {
        SourceKind::Zenoh => Box::new(ZenohSource::new(params, config.topic_prefix.clone())),
        SourceKind::Synthetic => Box::new(SyntheticSource::new(
            config.rate_hz,
            config.rigid_bodies,
        )),
    }
}
