//! Backend connection settings.
//!
//! Settings are loaded from the environment once at startup and handed to
//! [`connect`](crate::connect) as plain structs; nothing below this module
//! reads environment variables.

use blockhaul_protocol::BackendKind;

pub const ENV_BLOB_ENDPOINT: &str = "BLOCKHAUL_BLOB_ENDPOINT";
pub const ENV_BLOB_CONTAINER: &str = "BLOCKHAUL_BLOB_CONTAINER";
pub const ENV_BLOB_SAS: &str = "BLOCKHAUL_BLOB_SAS";

/// Errors from backend configuration and selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error(
        "blob backend is not configured; set BLOCKHAUL_BLOB_ENDPOINT, \
         BLOCKHAUL_BLOB_CONTAINER and BLOCKHAUL_BLOB_SAS"
    )]
    BlobNotConfigured,

    #[error("invalid endpoint {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("backend \"{0}\" is not supported")]
    UnsupportedBackend(BackendKind),
}

/// Connection parameters for the blob backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobConfig {
    /// Account endpoint, e.g. `https://account.blob.example.net`.
    /// Stored without a trailing slash.
    pub endpoint: String,
    pub container: String,
    /// Shared-access query string, stored without the leading `?`. May be
    /// empty when the endpoint itself carries authentication.
    pub sas_token: String,
}

/// Settings for all available backends.
///
/// A backend section is `Some` only when its configuration is complete;
/// [`connect`](crate::connect) reports the selected backend as unconfigured
/// otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSettings {
    pub blob: Option<BlobConfig>,
}

impl BackendSettings {
    /// Loads settings from the process environment.
    ///
    /// A backend with none of its variables set is simply absent; a
    /// partially configured backend is an error naming the first missing
    /// variable, since that is always a mistake.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let endpoint = lookup(ENV_BLOB_ENDPOINT);
        let container = lookup(ENV_BLOB_CONTAINER);
        let sas_token = lookup(ENV_BLOB_SAS);

        let blob = match (endpoint, container, sas_token) {
            (Some(endpoint), Some(container), Some(sas_token)) => Some(BlobConfig {
                endpoint: normalize_endpoint(&endpoint)?,
                container,
                sas_token: sas_token.trim_start_matches('?').to_string(),
            }),
            (None, None, None) => None,
            (endpoint, container, _) => {
                let missing = if endpoint.is_none() {
                    ENV_BLOB_ENDPOINT
                } else if container.is_none() {
                    ENV_BLOB_CONTAINER
                } else {
                    ENV_BLOB_SAS
                };
                return Err(ConfigError::MissingEnv(missing));
            }
        };
        Ok(Self { blob })
    }
}

fn normalize_endpoint(url: &str) -> Result<String, ConfigError> {
    let trimmed = url.trim_end_matches('/');
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(ConfigError::InvalidEndpoint {
            url: url.to_string(),
            reason: "expected an http(s) URL".into(),
        });
    }
    Ok(trimmed.to_string())
}
