//! Events delivered by a streaming source and the rows persisted for them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-assigned rigid body identifier. Trackers use either numeric ids or names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BodyId {
    Number(i64),
    Name(String),
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for BodyId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for BodyId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for BodyId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Whole-frame summary, one per tracking cycle. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSummary {
    #[serde(default)]
    pub frame_number: Option<u64>,
    #[serde(default, rename = "markerSetCount")]
    pub marker_count: Option<u32>,
    #[serde(default)]
    pub rigid_body_count: Option<u32>,
}

/// Pose of one tracked rigid body within a cycle.
///
/// `rotation` is kept exactly as the source reports it; no rotation
/// convention is assumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyPose {
    pub body_id: BodyId,
    pub position: [f64; 3],
    pub rotation: [f64; 3],
}

/// A row type with a fixed column layout.
pub trait LogRecord: Serialize + fmt::Debug {
    /// Column names, written once as the first row of the log.
    const HEADER: &'static [&'static str];
}

/// One row of the frame log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
    pub timestamp: f64,
    pub frame_number: Option<u64>,
    pub marker_count: Option<u32>,
    pub rigid_body_count: Option<u32>,
}

impl FrameRecord {
    pub fn new(timestamp: f64, summary: &FrameSummary) -> Self {
        Self {
            timestamp,
            frame_number: summary.frame_number,
            marker_count: summary.marker_count,
            rigid_body_count: summary.rigid_body_count,
        }
    }
}

impl LogRecord for FrameRecord {
    const HEADER: &'static [&'static str] =
        &["timestamp", "frame_number", "marker_count", "rigid_body_count"];
}

/// One row of the rigid-body log. No key links it to a frame row; the two
/// logs are correlated by nearest timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RigidBodyRecord {
    pub timestamp: f64,
    pub body_id: BodyId,
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
}

impl RigidBodyRecord {
    pub fn new(timestamp: f64, body_id: BodyId, position: [f64; 3], rotation: [f64; 3]) -> Self {
        let [pos_x, pos_y, pos_z] = position;
        let [rot_x, rot_y, rot_z] = rotation;
        Self {
            timestamp,
            body_id,
            pos_x,
            pos_y,
            pos_z,
            rot_x,
            rot_y,
            rot_z,
        }
    }
}

impl LogRecord for RigidBodyRecord {
    const HEADER: &'static [&'static str] = &[
        "timestamp", "body_id", "pos_x", "pos_y", "pos_z", "rot_x", "rot_y", "rot_z",
    ];
}
