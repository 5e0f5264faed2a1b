use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which remote storage backend an upload is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Blob,
    S3,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Blob => f.write_str("blob"),
            BackendKind::S3 => f.write_str("s3"),
        }
    }
}

/// Error returned when a backend name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backend {0:?}, expected \"blob\" or \"s3\"")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blob" => Ok(BackendKind::Blob),
            "s3" => Ok(BackendKind::S3),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

/// Final result for one uploaded file.
///
/// The orchestrator reports one of these per input, so a failed file never
/// hides the outcome of its siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UploadOutcome {
    #[serde(rename_all = "camelCase")]
    Completed { name: String, elapsed_secs: f64 },
    #[serde(rename_all = "camelCase")]
    Failed { name: String, error: String },
}

impl UploadOutcome {
    /// Target name this outcome belongs to.
    pub fn name(&self) -> &str {
        match self {
            UploadOutcome::Completed { name, .. } => name,
            UploadOutcome::Failed { name, .. } => name,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UploadOutcome::Failed { .. })
    }
}
