use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How the streaming source reaches the tracking server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Point-to-point connection to the server address
    Unicast,
    /// Multicast discovery plus the configured server address
    #[default]
    Multicast,
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unicast" => Ok(Self::Unicast),
            "multicast" => Ok(Self::Multicast),
            other => Err(ConfigError::ValidationError(format!(
                "unknown transport mode '{other}' (expected unicast or multicast)"
            ))),
        }
    }
}

/// Which streaming source implementation feeds the capture session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Tracking samples published on Zenoh topics
    #[default]
    Zenoh,
    /// Locally generated samples, for dry runs without tracking hardware
    Synthetic,
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zenoh" => Ok(Self::Zenoh),
            "synthetic" => Ok(Self::Synthetic),
            other => Err(ConfigError::ValidationError(format!(
                "unknown source '{other}' (expected zenoh or synthetic)"
            ))),
        }
    }
}

/// Whether each appended record is fsync'd or only flushed to the OS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    #[default]
    Flush,
    Fsync,
}

/// Connection parameters for the streaming source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// Local address the client binds to
    #[serde(default = "default_address")]
    pub client_address: String,
    /// Address of the tracking server
    #[serde(default = "default_address")]
    pub server_address: String,
    #[serde(default)]
    pub transport: TransportMode,
    /// Key prefix for the `frame` and `rigid_body` topics
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Synthetic source frame rate
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    /// Synthetic source bodies per frame
    #[serde(default = "default_rigid_bodies")]
    pub rigid_bodies: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            client_address: default_address(),
            server_address: default_address(),
            transport: TransportMode::default(),
            topic_prefix: default_topic_prefix(),
            rate_hz: default_rate_hz(),
            rigid_bodies: default_rigid_bodies(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_topic_prefix() -> String {
    "mocap".to_string()
}

fn default_rate_hz() -> f64 {
    120.0
}

fn default_rigid_bodies() -> u32 {
    2
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("mocap_recordings")
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Directory receiving the frame and rigid-body logs
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub durability: Durability,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            source: SourceConfig::default(),
            durability: Durability::default(),
        }
    }
}

impl LoggerConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "output_dir must not be empty".to_string(),
            ));
        }
        if frame_period(self.source.rate_hz).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "rate_hz must be positive with a representable frame period, got {}",
                self.source.rate_hz
            )));
        }
        Ok(())
    }
}

/// Time between two frames at `rate_hz`, or `None` when no such period exists.
pub fn frame_period(rate_hz: f64) -> Option<Duration> {
    if !(rate_hz.is_finite() && rate_hz > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / rate_hz).ok()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
