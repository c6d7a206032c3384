use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum RuntimeError {
    InvalidVersionFormat(String),
    SourceNotFound(String),
    MissingSource(String),
    AlreadyPresent(String),
    BuildStreamError(String),
    BuildStreamIncomplete,
    HealthCheckTimeout(Duration),
    ContainerNotFound(String),
    ImageNotFound(String),
    ImageRemovalConflict(String),
    VersionMismatch { container: String, expected: String, actual: String },
    Authentication(String),
    ChecksumMismatch { expected: String, actual: String },
    Fetch(String),
    FileExists(String),
    FileSystemError(String),
    Engine { status: Option<u16>, message: String },
    Other(String),
}

impl RuntimeError {
    /// HTTP status reported by the engine, when the error came from it.
    pub(crate) fn status_code(&self) -> Option<u16> {
        match self {
            RuntimeError::Engine { status, .. } => *status,
            RuntimeError::ContainerNotFound(_) | RuntimeError::ImageNotFound(_) => Some(404),
            RuntimeError::ImageRemovalConflict(_) => Some(409),
            _ => None,
        }
    }

    pub(crate) fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::InvalidVersionFormat(value) => write!(f, "Invalid version format: {}", value),
            RuntimeError::SourceNotFound(path) => write!(f, "File not found: {}", path),
            RuntimeError::MissingSource(version) => {
                write!(f, "Version {} is not built and no artifact file or credentials were given", version)
            }
            RuntimeError::AlreadyPresent(version) => {
                write!(f, "Version {} is already present in the host", version)
            }
            RuntimeError::BuildStreamError(detail) => write!(f, "Build failed: {}", detail),
            RuntimeError::BuildStreamIncomplete => write!(f, "Build stream ended without an id"),
            RuntimeError::HealthCheckTimeout(timeout) => write!(
                f,
                "Timed out after waiting {}s for container to become healthy",
                timeout.as_secs()
            ),
            RuntimeError::ContainerNotFound(id) => write!(f, "Container not found: {}", id),
            RuntimeError::ImageNotFound(id) => write!(f, "Image not found: {}", id),
            RuntimeError::ImageRemovalConflict(id) => write!(f, "Image {} is still in use", id),
            RuntimeError::VersionMismatch { container, expected, actual } => write!(
                f,
                "Container {} runs image {} but {} was requested",
                container, actual, expected
            ),
            RuntimeError::Authentication(msg) => write!(f, "Authentication failed: {}", msg),
            RuntimeError::ChecksumMismatch { expected, actual } => {
                write!(f, "Checksum mismatch: expected {}, got {}", expected, actual)
            }
            RuntimeError::Fetch(msg) => write!(f, "Download failed: {}", msg),
            RuntimeError::FileExists(path) => {
                write!(f, "Cannot overwrite {} -- `overwrite` is not set", path)
            }
            RuntimeError::FileSystemError(msg) => write!(f, "File system error: {}", msg),
            RuntimeError::Engine { status: Some(status), message } => {
                write!(f, "Docker error ({}): {}", status, message)
            }
            RuntimeError::Engine { status: None, message } => write!(f, "Docker error: {}", message),
            RuntimeError::Other(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        RuntimeError::FileSystemError(format!("{}", err))
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::Other(format!("JSON parsing error: {}", err))
    }
}

impl From<reqwest::Error> for RuntimeError {
    fn from(err: reqwest::Error) -> Self {
        RuntimeError::Fetch(format!("{}", err))
    }
}
