use crate::cik::de_cik;
use crate::extract::{self, Classification, ExtractError};
use crate::fetch::Fetcher;
use crate::index::IndexRecord;
use crate::table::{Table, TableWriter};
use crate::{tui, Error, FetchError, Result};
use chrono::NaiveDate;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace};

/// Company profile page, the CIK is appended as the last query parameter.
pub const PROFILE_BASE: &str =
    "https://www.sec.gov/cgi-bin/browse-edgar?action=getcompany&owner=exclude&CIK=";

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Default name of the enriched metadata table.
pub const DATAFILE: &str = "SEC_datafile.csv";

// de
// ----------------------------------------------------------------------------

/// One row of the enriched metadata table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilingMetadataRecord {
    pub cik: String,
    #[serde(rename = "currName")]
    pub firm_name: String,
    #[serde(rename = "fDate")]
    pub report_date: Option<NaiveDate>,
    #[serde(rename = "fType")]
    pub file_type: String,
    #[serde(rename = "irsNum")]
    pub irs_number: String,
    #[serde(rename = "sicDesc")]
    pub sic_description: String,
    pub sic: String,
    #[serde(rename = "sInc")]
    pub state_of_incorporation: String,
    #[serde(rename = "sLoc")]
    pub state_of_location: String,
    #[serde(rename = "bAddress")]
    pub business_address: String,
    #[serde(rename = "mAddress")]
    pub mailing_address: String,
    #[serde(rename = "fUrl")]
    pub filing_url: String,
}

impl Table for FilingMetadataRecord {
    const HEADER: &'static [&'static str] = &[
        "cik", "currName", "fDate", "fType", "irsNum", "sicDesc", "sic", "sInc", "sLoc",
        "bAddress", "mAddress", "fUrl",
    ];
}

impl FilingMetadataRecord {
    /// The baseline record: identifying fields only, every classification field empty.
    pub fn identifying(row: &IndexRecord) -> Self {
        Self {
            cik: row.cik.clone(),
            firm_name: row.firm_name.clone(),
            report_date: row.report_date,
            file_type: row.file_type.clone(),
            filing_url: row.file_url_html.clone().unwrap_or_default(),
            ..Default::default()
        }
    }

    pub fn enriched(row: &IndexRecord, c: Classification) -> Self {
        Self {
            irs_number: c.irs_number,
            sic_description: c.sic_description,
            sic: c.sic,
            state_of_incorporation: c.state_of_incorporation,
            state_of_location: c.state_of_location,
            business_address: c.business_address,
            mailing_address: c.mailing_address,
            ..Self::identifying(row)
        }
    }
}

/// Outcome of enriching one index row; every variant carries exactly one record.
#[derive(Debug)]
pub enum Enrichment {
    Enriched(FilingMetadataRecord),

    /// `reason` is missing, either from the fetched pages or from the index row itself.
    Degraded {
        record: FilingMetadataRecord,
        reason: ExtractError,
    },

    /// A page could not be fetched, even after retrying.
    FetchFailed {
        record: FilingMetadataRecord,
        error: FetchError,
    },
}

impl Enrichment {
    pub fn into_record(self) -> FilingMetadataRecord {
        match self {
            Enrichment::Enriched(record)
            | Enrichment::Degraded { record, .. }
            | Enrichment::FetchFailed { record, .. } => record,
        }
    }

    pub fn is_enriched(&self) -> bool {
        matches!(self, Enrichment::Enriched(_))
    }
}

// process
// ----------------------------------------------------------------------------

/// Enrichment of a consolidated index table into the metadata table.
#[derive(Clone, Debug)]
pub struct MetadataJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub chunk_size: usize,

    /// Keep only rows whose exact `(cik, report year)` pair is listed.
    pub pairs: Option<HashSet<(String, i32)>>,

    pub profile_base: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataSummary {
    /// Records written; always `enriched + degraded + fetch_failed`.
    pub rows: usize,
    pub enriched: usize,
    pub degraded: usize,
    pub fetch_failed: usize,

    /// Rows of the source table that could not be read at all.
    pub skipped: usize,
}

impl MetadataJob {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            pairs: None,
            profile_base: PROFILE_BASE.to_string(),
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn pairs(mut self, pairs: Option<HashSet<(String, i32)>>) -> Self {
        self.pairs = pairs;
        self
    }

    pub fn profile_base(mut self, profile_base: impl Into<String>) -> Self {
        self.profile_base = profile_base.into();
        self
    }

    pub fn profile_url(&self, cik: &str) -> String {
        format!("{}{cik}", self.profile_base)
    }

    fn accepts(&self, row: &IndexRecord) -> bool {
        match (&self.pairs, row.report_year) {
            (None, _) => true,
            (Some(pairs), Some(year)) => pairs.contains(&(row.cik.clone(), year)),
            (Some(_), None) => false,
        }
    }

    /// Fetch the profile, then the filing index, and extract the classification from both.
    ///
    /// Never fails: whatever goes wrong is folded into the returned [`Enrichment`].
    pub async fn enrich(&self, fetcher: &Fetcher, row: &IndexRecord) -> Enrichment {
        let record = FilingMetadataRecord::identifying(row);
        let Some(filing_url) = row.file_url_html.as_deref() else {
            return Enrichment::Degraded {
                record,
                reason: ExtractError::NoFilingUrl,
            };
        };

        let profile = match fetcher.get_text(&self.profile_url(&row.cik)).await {
            Ok(html) => html,
            Err(error) => return Enrichment::FetchFailed { record, error },
        };
        let filing = match fetcher.get_text(filing_url).await {
            Ok(html) => html,
            Err(error) => return Enrichment::FetchFailed { record, error },
        };

        match extract::extract(&profile, &filing) {
            Ok(classification) => {
                Enrichment::Enriched(FilingMetadataRecord::enriched(row, classification))
            }
            Err(reason) => Enrichment::Degraded { record, reason },
        }
    }

    /// Enrich every (allowed) row of the source table, one chunk at a time.
    ///
    /// The destination is truncated first, so its header is in place before any row is read.
    pub async fn run(&self, fetcher: &Fetcher, tui: bool) -> Result<MetadataSummary> {
        let time = std::time::Instant::now();
        let chunk_size = self.chunk_size.max(1);

        let mut table = TableWriter::<FilingMetadataRecord>::create(&self.destination)?;
        let mut reader = csv::Reader::from_path(&self.source).map_err(|err| {
            error!(
                "failed to open index table {}, error({err})",
                self.source.display()
            );
            err
        })?;
        info!(
            "enriching {} into {}, {chunk_size} rows per chunk",
            self.source.display(),
            self.destination.display()
        );

        let bars = tui::multi_progress(0, tui)?;
        let mut summary = MetadataSummary::default();
        let mut rows = reader.deserialize::<IndexRecord>();
        let mut chunk_no = 0;

        loop {
            let mut chunk = Vec::with_capacity(chunk_size.min(DEFAULT_CHUNK_SIZE));
            for result in rows.by_ref().take(chunk_size) {
                match result {
                    Ok(row) => chunk.push(row),
                    Err(err) => {
                        error!("skipping unreadable index row, error({err})");
                        summary.skipped += 1;
                    }
                }
            }
            if chunk.is_empty() && rows.reader().is_done() {
                break;
            }
            chunk_no += 1;

            chunk.retain(|row| self.accepts(row));
            debug!("chunk {chunk_no}: {} rows to enrich", chunk.len());
            bars.total.inc_length(chunk.len() as u64);
            bars.success.inc_length(chunk.len() as u64);
            bars.fails.inc_length(chunk.len() as u64);

            let mut records = Vec::with_capacity(chunk.len());
            let mut stream = stream::iter(&chunk);
            while let Some(row) = stream.next().await {
                let enrichment = self.enrich(fetcher, row).await;
                match &enrichment {
                    Enrichment::Enriched(_) => {
                        trace!("[{}] {} enriched", row.cik, row.firm_name);
                        summary.enriched += 1;
                    }
                    Enrichment::Degraded { reason, .. } => {
                        error!("[{}] {} degraded, error({reason})", row.cik, row.firm_name);
                        summary.degraded += 1;
                    }
                    Enrichment::FetchFailed { error: err, .. } => {
                        error!("[{}] {} not fetched, error({err})", row.cik, row.firm_name);
                        summary.fetch_failed += 1;
                    }
                }
                bars.record(enrichment.is_enriched());
                records.push(enrichment.into_record());
            }

            table.write_chunk(&records)?;
        }
        summary.rows = table.rows();

        bars.finish();
        info!(
            "{} rows written to {} ({} enriched, {} degraded, {} not fetched, {} skipped), {}",
            summary.rows,
            table.path().display(),
            summary.enriched,
            summary.degraded,
            summary.fetch_failed,
            summary.skipped,
            crate::time_elapsed(time)
        );

        Ok(summary)
    }
}

#[derive(Deserialize)]
struct PairRow {
    #[serde(deserialize_with = "de_cik")]
    cik: String,
    year: i32,
}

/// Load a `cik,year` CSV of the filings to keep.
pub fn load_pairs(path: impl AsRef<Path>) -> Result<HashSet<(String, i32)>> {
    let path = path.as_ref();
    let invalid = |reason: String| {
        error!("invalid (cik, year) allowlist {}: {reason}", path.display());
        Error::InvalidAllowlist {
            path: path.display().to_string(),
            reason,
        }
    };

    let mut reader = csv::Reader::from_path(path).map_err(|err| invalid(err.to_string()))?;
    let mut pairs = HashSet::new();
    for row in reader.deserialize::<PairRow>() {
        let row = row.map_err(|err| invalid(err.to_string()))?;
        pairs.insert((row.cik, row.year));
    }

    debug!("{} (cik, year) pairs loaded from {}", pairs.len(), path.display());
    Ok(pairs)
}
