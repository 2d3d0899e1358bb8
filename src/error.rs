use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration problems. These are programmer or operator errors and are
/// the only failures that surface loudly from the probe.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{field}: invalid URL {url:?}: {source}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{field}: unsupported scheme {scheme:?} (expected http or https)")]
    UnsupportedScheme { field: &'static str, scheme: String },

    #[error("{field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Why a single network operation inside a phase did not complete.
///
/// Never escapes a phase: the phase logs it and reports `None` (or falls back).
#[derive(Debug, Error)]
pub(crate) enum PhaseError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded with {0}")]
    Status(reqwest::StatusCode),

    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("cancelled by caller")]
    Cancelled,
}
