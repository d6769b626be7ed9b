use std::path::PathBuf;

/// Capture pipeline error types.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The streaming source could not be started. Fatal, startup only.
    #[error("Connection failure ({source_name}): {reason}")]
    Connection { source_name: String, reason: String },

    /// A log directory or file could not be created. Fatal, startup only.
    #[error("IO failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single record could not be appended. Non-fatal, reported at runtime.
    #[error("Persistence failure writing {record} to {}: {cause}", sink.display())]
    Persistence {
        sink: PathBuf,
        record: String,
        #[source]
        cause: AppendError,
    },

    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Underlying reason an append did not reach storage.
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error("sink already closed")]
    SinkClosed,

    /// An earlier partial row could not be removed, so the log takes no more rows.
    #[error("log abandoned after an unrecoverable write failure")]
    Abandoned,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn connection(source_name: &str, reason: impl ToString) -> Self {
        Self::Connection {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that end the capture (everything except a single failed append).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Persistence { .. })
    }

    /// One-line reason shown to the operator when a capture never started.
    pub fn startup_diagnostic(&self) -> String {
        match self {
            Self::Connection { .. } => "Could not start streaming client.".to_string(),
            Self::Io { path, .. } => {
                format!("Could not create the recording logs in {}.", path.display())
            }
            Self::Config(_) => "Invalid configuration.".to_string(),
            Self::Persistence { sink, .. } => format!("Could not write to {}.", sink.display()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
