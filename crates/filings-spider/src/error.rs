use crate::http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures that halt a spider process.
///
/// Per-file, per-field and per-row failures are logged and recovered where they happen, so
/// anything reaching the caller as an [`Error`] is structural: bad configuration, an identifier
/// that cannot be normalized, or the output tables becoming unwritable.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid CIK allowlist {path}, error({reason})")]
    InvalidAllowlist { path: String, reason: String },

    #[error("failed to normalize CIK {raw:?} in {file}")]
    CikNormalization { file: String, raw: String },

    #[error("malformed index file {path}: record {line} has {fields} fields, expected 6")]
    MalformedIndex {
        path: String,
        line: u64,
        fields: usize,
    },

    #[error("configuration error, {0}")]
    Config(String),

    #[error("failed to build http client, error({0})")]
    Client(#[source] reqwest::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Template(#[from] indicatif::style::TemplateError),
}

/// Failures of a single GET request, after the retry policy has been applied.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("GET {url} failed after {attempts} attempts, error({last})")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("GET {url} failed, error({source})")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
