//! Tracking samples received over Zenoh.
//!
//! A bridge next to the tracking server publishes JSON-encoded frame
//! summaries on `<prefix>/frame` and rigid-body poses on `<prefix>/rigid_body`.
//! Callbacks run on Zenoh's own delivery threads and forward straight into
//! the session sinks.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use zenoh::pubsub::Subscriber;
use zenoh::sample::Sample;

use super::{ConnectionParams, StreamingSource};
use crate::config::TransportMode;
use crate::error::{CaptureError, Result};
use crate::records::{FrameSummary, RigidBodyPose};
use crate::sink::EventSinks;

const DEFAULT_PORT: u16 = 7447;

pub struct ZenohSource {
    params: ConnectionParams,
    topic_prefix: String,
    decode_errors: Arc<AtomicU64>,
    active: Option<Active>,
}

struct Active {
    session: zenoh::Session,
    frames: Subscriber<()>,
    rigid_bodies: Subscriber<()>,
}

impl ZenohSource {
    pub fn new(params: ConnectionParams, topic_prefix: String) -> Self {
        Self {
            params,
            topic_prefix,
            decode_errors: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    pub fn frame_topic(&self) -> String {
        format!("{}/frame", self.topic_prefix)
    }

    pub fn rigid_body_topic(&self) -> String {
        format!("{}/rigid_body", self.topic_prefix)
    }

    /// Payloads that could not be decoded and were skipped.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }
}

/// Turn a bare host or `host:port` into a Zenoh TCP locator. Addresses that
/// already carry a protocol (`udp/...`, `tcp/...`) are used as-is.
pub fn locator(address: &str, default_port: u16) -> String {
    if address.contains('/') {
        return address.to_string();
    }
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(host)) => format!("tcp/[{host}]:{default_port}"),
        Ok(IpAddr::V4(host)) => format!("tcp/{host}:{default_port}"),
        // `host:port`, `[v6]:port` or a hostname
        Err(_) if address.contains(':') => format!("tcp/{address}"),
        Err(_) => format!("tcp/{address}:{default_port}"),
    }
}

fn zenoh_config(params: &ConnectionParams) -> Result<zenoh::Config> {
    let mut config = zenoh::Config::default();
    let connect = locator(&params.server_address, DEFAULT_PORT);

    let set = |config: &mut zenoh::Config, key: &str, value: &str| {
        config
            .insert_json5(key, value)
            .map_err(|e| CaptureError::connection("zenoh", format!("invalid {key}: {e}")))
    };

    match params.transport {
        TransportMode::Unicast => {
            // Client mode routes everything through the server's router
            set(&mut config, "mode", r#""client""#)?;
            set(&mut config, "scouting/multicast/enabled", "false")?;
        }
        TransportMode::Multicast => {
            set(&mut config, "mode", r#""peer""#)?;
            set(&mut config, "scouting/multicast/enabled", "true")?;
            let listen = locator(&params.client_address, 0);
            set(&mut config, "listen/endpoints", &format!(r#"["{listen}"]"#))?;
        }
    }
    set(&mut config, "connect/endpoints", &format!(r#"["{connect}"]"#))?;

    Ok(config)
}

#[async_trait::async_trait]
impl StreamingSource for ZenohSource {
    fn name(&self) -> &str {
        "zenoh"
    }

    async fn start(&mut self, sinks: EventSinks) -> Result<()> {
        if self.active.is_some() {
            return Err(CaptureError::connection(self.name(), "already started"));
        }

        let config = zenoh_config(&self.params)?;
        log::info!(
            "Connecting to tracking data at {} ({:?}, client {})",
            self.params.server_address,
            self.params.transport,
            self.params.client_address
        );
        let session = zenoh::open(config)
            .await
            .map_err(|e| CaptureError::connection("zenoh", e))?;

        let frame_topic = self.frame_topic();
        let frames = session
            .declare_subscriber(frame_topic.clone())
            .callback({
                let sink = sinks.frames.clone();
                let decode_errors = self.decode_errors.clone();
                move |sample: Sample| match decode::<FrameSummary>(&sample) {
                    Ok(frame) => sink.on_frame(&frame),
                    Err(e) => skip(&decode_errors, &sample, e),
                }
            })
            .await
            .map_err(|e| CaptureError::connection("zenoh", e))?;
        log::info!("Subscribed to: {frame_topic}");

        let rigid_body_topic = self.rigid_body_topic();
        let rigid_bodies = session
            .declare_subscriber(rigid_body_topic.clone())
            .callback({
                let sink = sinks.rigid_bodies.clone();
                let decode_errors = self.decode_errors.clone();
                move |sample: Sample| match decode::<RigidBodyPose>(&sample) {
                    Ok(pose) => sink.on_rigid_body(pose.body_id, pose.position, pose.rotation),
                    Err(e) => skip(&decode_errors, &sample, e),
                }
            })
            .await
            .map_err(|e| CaptureError::connection("zenoh", e))?;
        log::info!("Subscribed to: {rigid_body_topic}");

        self.active = Some(Active {
            session,
            frames,
            rigid_bodies,
        });
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        if let Err(e) = active.frames.undeclare().await {
            log::warn!("Failed to undeclare frame subscriber: {}", e);
        }
        if let Err(e) = active.rigid_bodies.undeclare().await {
            log::warn!("Failed to undeclare rigid body subscriber: {}", e);
        }
        active
            .session
            .close()
            .await
            .map_err(|e| CaptureError::connection("zenoh", format!("close failed: {e}")))?;

        let skipped = self.decode_errors();
        if skipped > 0 {
            log::warn!("Skipped {} undecodable samples", skipped);
        }
        log::info!("Zenoh source disconnected");
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(sample: &Sample) -> serde_json::Result<T> {
    serde_json::from_slice(&sample.payload().to_bytes())
}

fn skip(decode_errors: &AtomicU64, sample: &Sample, error: serde_json::Error) {
    decode_errors.fetch_add(1, Ordering::Relaxed);
    log::warn!(
        "Skipping undecodable sample on '{}': {}",
        sample.key_expr(),
        error
    );
}
