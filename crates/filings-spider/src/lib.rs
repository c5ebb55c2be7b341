/// Company identifiers (CIKs); zero-padding and allowlists.
pub mod cik;

mod error;

/// Pattern extraction of classification fields from EDGAR markup.
pub mod extract;

/// The reusable HTTP client, with its retry policy.
pub mod fetch;

/// Filtering of the raw quarterly indices into one consolidated index table.
pub mod index;

/// Download of the [EDGAR full-index] master files, as pipe-delimited `.tsv` files.
///
/// [EDGAR full-index]: https://www.sec.gov/Archives/edgar/full-index/
pub mod indices;

/// Enrichment of the consolidated index table with company metadata.
pub mod metadata;

/// Append-only CSV tables.
pub mod table;

pub(crate) mod tui;

pub use error::{Error, FetchError, Result};

/// Shortcut for required HTTP elements.
pub(crate) mod http {
    pub(crate) use reqwest::Client as HttpClient;
    pub(crate) use reqwest::StatusCode;
}

pub(crate) fn time_elapsed(time: std::time::Instant) -> String {
    format!("time elapsed: {:?}", time.elapsed())
}
