//! Error types for the rendering pipeline

use crate::sync::Waypoint;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a chart
#[derive(Error, Debug)]
pub enum Error {
    /// The spec could not be serialized or compressed for transport
    #[error("Encoding failed: {0}")]
    EncodingFailure(String),

    /// The browser or its page could not be started
    #[error("Session launch failed: {0}")]
    LaunchFailure(String),

    /// The host page failed to load
    #[error("Navigation failed at {waypoint}: {reason}")]
    NavigationFailure { waypoint: Waypoint, reason: String },

    /// The host editor never exposed its scripting handle
    #[error("Host editor not ready at {waypoint} after {timeout_ms}ms")]
    HostNotReady { waypoint: Waypoint, timeout_ms: u64 },

    /// The rendered output container never appeared
    #[error("Render timed out at {waypoint} after {timeout_ms}ms")]
    RenderTimeout { waypoint: Waypoint, timeout_ms: u64 },

    /// The capture strategy produced no artifact
    #[error("Capture failed: {0}")]
    CaptureFailure(#[from] CaptureError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// A metadata source file could not be parsed
    #[error("Unreadable metadata file: {0}")]
    MetadataError(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Capture-specific failure conditions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// A UI control the strategy relies on is missing from the page
    #[error("control not found: {0}")]
    ControlNotFound(String),

    /// The export action was triggered but no download appeared
    #[error("download never started")]
    DownloadNotStarted,

    /// A download started but did not finish before the deadline
    #[error("download did not complete")]
    DownloadIncomplete,

    /// The screenshot region was missing or produced no pixels
    #[error("invalid screenshot region: {0}")]
    InvalidRegion(String),

    /// The produced file was empty
    #[error("artifact is empty")]
    EmptyArtifact,

    /// The captured bytes do not decode as a PNG image
    #[error("not a decodable PNG: {0}")]
    UndecodableImage(String),
}

impl Error {
    /// The waypoint the attempt had reached when it failed, if known
    pub fn waypoint(&self) -> Option<Waypoint> {
        match self {
            Error::NavigationFailure { waypoint, .. }
            | Error::HostNotReady { waypoint, .. }
            | Error::RenderTimeout { waypoint, .. } => Some(*waypoint),
            Error::CaptureFailure(_) => Some(Waypoint::Rendered),
            _ => None,
        }
    }

    /// True for the timeout-shaped failures of the readiness waits
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::HostNotReady { .. } | Error::RenderTimeout { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::EncodingFailure(err.to_string())
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waypoint_is_reported_for_readiness_failures() {
        let err = Error::RenderTimeout { waypoint: Waypoint::Rendering, timeout_ms: 10 };
        assert_eq!(err.waypoint(), Some(Waypoint::Rendering));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("10ms"));

        let err = Error::from(CaptureError::DownloadNotStarted);
        assert_eq!(err.waypoint(), Some(Waypoint::Rendered));
        assert!(!err.is_timeout());
    }

    #[test]
    fn capture_errors_are_distinct() {
        assert_ne!(CaptureError::DownloadNotStarted, CaptureError::DownloadIncomplete);
        let msg = Error::from(CaptureError::ControlNotFound("summary".into())).to_string();
        assert!(msg.contains("control not found: summary"));
    }
}
