use crate::cik::{de_cik, try_normalize};
use crate::table::{Table, TableWriter};
use crate::{tui, Error, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace};

/// Prefix turning the relative document paths of the raw indices into absolute URLs.
pub const ARCHIVE_BASE: &str = "https://sec.gov/Archives/";

/// Fields per record of a raw index file: `cik|company|form|date|txt path|html path`.
const INDEX_FIELDS: usize = 6;

// process
// ----------------------------------------------------------------------------

/// Options for one filter pass over a directory of raw index files.
#[derive(Clone, Debug)]
pub struct IndexFilter {
    /// Directory holding the raw, pipe-delimited `.tsv` index files.
    pub source_dir: PathBuf,

    /// The consolidated index table; appended to.
    pub destination: PathBuf,

    /// Keep only these (normalized) CIKs; `None` keeps every filer.
    pub ciks: Option<HashSet<String>>,

    pub file_types: Vec<String>,

    /// A single year expands to "that year through the current year", see [`expand_years`].
    pub years: Vec<i32>,

    pub archive_base: String,
}

impl IndexFilter {
    /// Filter `10-K`s of 2000 & 2001 from `source_dir` into `destination`.
    pub fn new(source_dir: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            destination: destination.into(),
            ciks: None,
            file_types: vec!["10-K".to_string()],
            years: vec![2000, 2001],
            archive_base: ARCHIVE_BASE.to_string(),
        }
    }

    pub fn file_types(mut self, file_types: Vec<String>) -> Self {
        self.file_types = file_types;
        self
    }

    pub fn years(mut self, years: Vec<i32>) -> Self {
        self.years = years;
        self
    }

    pub fn ciks(mut self, ciks: Option<HashSet<String>>) -> Self {
        self.ciks = ciks;
        self
    }

    pub fn archive_base(mut self, archive_base: impl Into<String>) -> Self {
        self.archive_base = archive_base.into();
        self
    }

    /// Read every selected index file, appending the surviving rows to the destination table.
    ///
    /// Unreadable or malformed files are logged & skipped. A CIK that fails to normalize stops
    /// the whole pass, as it means the index itself is broken.
    pub fn run(&self, tui: bool) -> Result<IndexSummary> {
        let time = std::time::Instant::now();
        let years = expand_years(&self.years, chrono::Local::now().year());
        let files = select_files(&self.source_dir, &years).map_err(|err| {
            error!(
                "failed to list index files in {}, error({err})",
                self.source_dir.display()
            );
            err
        })?;
        info!(
            "filtering {} index files into {}; file types {:?}, years {:?}",
            files.len(),
            self.destination.display(),
            self.file_types,
            years
        );

        let pb = tui::progress_bar(files.len(), "filtering index files ...", tui)?;
        let mut summary = IndexSummary {
            files_selected: files.len(),
            ..Default::default()
        };

        // opened on the first non-empty file, so the header lands only once
        let mut writer: Option<TableWriter<IndexRecord>> = None;

        for path in files {
            pb.set_message(format!("reading {}", path.display()));
            pb.inc(1);

            let rows = match read_index_file(&path) {
                Ok(rows) => rows,
                Err(err) => {
                    error!("can't read index file {}, error({err})", path.display());
                    summary.files_skipped += 1;
                    continue;
                }
            };
            summary.files_read += 1;

            let mut kept = Vec::new();
            for row in rows {
                let record = row.into_record(&path)?;
                if self.accepts(&record, &years) {
                    kept.push(record);
                }
            }
            trace!("{} rows kept from {}", kept.len(), path.display());
            if kept.is_empty() {
                continue;
            }

            for column in [Column::Txt, Column::Html] {
                if let Err(err) = rewrite_urls(&mut kept, column, &self.archive_base) {
                    error!(
                        "failed to rewrite {} in {}, error({err})",
                        column.name(),
                        path.display()
                    );
                }
            }

            if writer.is_none() {
                writer = Some(TableWriter::append(&self.destination)?);
            }
            if let Some(table) = writer.as_mut() {
                summary.rows_written += table.write_chunk(&kept)?;
            }
            debug!(
                "{} rows from {} appended to {}",
                kept.len(),
                path.display(),
                self.destination.display()
            );
        }

        pb.finish_and_clear();
        info!(
            "index filtered: {} rows from {}/{} files, {}",
            summary.rows_written,
            summary.files_read,
            summary.files_selected,
            crate::time_elapsed(time)
        );

        Ok(summary)
    }

    /// The compound filter: file type, then report year, then (optionally) CIK.
    pub fn accepts(&self, record: &IndexRecord, years: &[i32]) -> bool {
        self.file_types.iter().any(|t| *t == record.file_type)
            && record.report_year.is_some_and(|year| years.contains(&year))
            && self
                .ciks
                .as_ref()
                .map_or(true, |ciks| ciks.contains(&record.cik))
    }
}

/// Counts of one filter pass; `rows_written` is the sum of the rows kept per file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub files_selected: usize,
    pub files_read: usize,
    pub files_skipped: usize,
    pub rows_written: usize,
}

/// Default name of the consolidated index, e.g. `10-K,10-Q_index.csv`.
pub fn table_name(file_types: &[String]) -> String {
    format!("{}_index.csv", file_types.join(","))
}

/// A single year means every year from it up to `current_year`; more years are taken as-is.
///
/// ```rust
/// use filings_spider::index::expand_years;
///
/// assert_eq!(expand_years(&[2021], 2024), vec![2021, 2022, 2023, 2024]);
/// assert_eq!(expand_years(&[2000, 2005], 2024), vec![2000, 2005]);
/// ```
pub fn expand_years(years: &[i32], current_year: i32) -> Vec<i32> {
    match years {
        [start] => (*start..=current_year).collect(),
        years => years.to_vec(),
    }
}

/// The `.tsv` files of `dir` whose name mentions one of `years`, in path order.
pub fn select_files(dir: &Path, years: &[i32]) -> std::io::Result<Vec<PathBuf>> {
    let years: Vec<String> = years.iter().map(|year| year.to_string()).collect();
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "tsv"))
        .filter(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy())
                .is_some_and(|name| years.iter().any(|year| name.contains(year.as_str())))
        })
        .collect();
    files.sort();
    Ok(files)
}

// urls
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Column {
    Txt,
    Html,
}

impl Column {
    fn name(self) -> &'static str {
        match self {
            Column::Txt => "file_url_txt",
            Column::Html => "file_url_html",
        }
    }

    fn field(self, record: &mut IndexRecord) -> &mut Option<String> {
        match self {
            Column::Txt => &mut record.file_url_txt,
            Column::Html => &mut record.file_url_html,
        }
    }
}

/// Prefix `base` to one column, for every record or none of them.
fn rewrite_urls(
    records: &mut [IndexRecord],
    column: Column,
    base: &str,
) -> std::result::Result<(), String> {
    if let Some(n) = records
        .iter_mut()
        .position(|record| column.field(record).is_none())
    {
        return Err(format!(
            "{} missing for CIK {}",
            column.name(),
            records[n].cik
        ));
    }
    for record in records.iter_mut() {
        if let Some(path) = column.field(record) {
            *path = format!("{base}{path}");
        }
    }
    Ok(())
}

// de
// ----------------------------------------------------------------------------

/// One filing reference of the EDGAR index.
///
/// Serialized, in this field order, as a row of the consolidated index table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(deserialize_with = "de_cik")]
    pub cik: String,
    pub firm_name: String,
    pub file_type: String,
    #[serde(deserialize_with = "de_date")]
    pub report_date: Option<NaiveDate>,
    pub file_url_txt: Option<String>,
    pub file_url_html: Option<String>,
    #[serde(deserialize_with = "de_year")]
    pub report_year: Option<i32>,
}

impl Table for IndexRecord {
    const HEADER: &'static [&'static str] = &[
        "cik",
        "firm_name",
        "file_type",
        "report_date",
        "file_url_txt",
        "file_url_html",
        "report_year",
    ];
}

// A record, exactly as read from a raw index file.
//
// `1000045|NICHOLAS FINANCIAL INC|10-Q|2019-02-14|edgar/data/1000045/0001193125-19-039489.txt|...`
#[derive(Debug)]
struct RawRecord {
    cik: String,
    firm_name: String,
    file_type: String,
    report_date: String,
    file_url_txt: Option<String>,
    file_url_html: Option<String>,
}

impl RawRecord {
    fn into_record(self, path: &Path) -> Result<IndexRecord> {
        let cik = try_normalize(&self.cik).ok_or_else(|| {
            error!(
                "failed to convert CIK {:?} in {}",
                self.cik,
                path.display()
            );
            Error::CikNormalization {
                file: path.display().to_string(),
                raw: self.cik.clone(),
            }
        })?;
        let report_date = parse_date(&self.report_date);

        Ok(IndexRecord {
            cik,
            firm_name: self.firm_name,
            file_type: self.file_type,
            report_date,
            file_url_txt: self.file_url_txt,
            file_url_html: self.file_url_html,
            report_year: report_date.map(|date| date.year()),
        })
    }
}

/// Read the raw records of one index file; more than six fields on any line fails the file.
fn read_index_file(path: &Path) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .quoting(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.len() > INDEX_FIELDS {
            return Err(Error::MalformedIndex {
                path: path.display().to_string(),
                line: record.position().map_or(0, |pos| pos.line()),
                fields: record.len(),
            });
        }

        let text = |i: usize| record.get(i).unwrap_or_default().to_string();
        let optional = |i: usize| record.get(i).filter(|s| !s.is_empty()).map(str::to_string);
        rows.push(RawRecord {
            cik: text(0),
            firm_name: text(1),
            file_type: text(2),
            report_date: text(3),
            file_url_txt: optional(4),
            file_url_html: optional(5),
        });
    }

    Ok(rows)
}

/// Parse a report date; anything unrecognised is `None`, never an error.
///
/// ```rust
/// use chrono::NaiveDate;
/// use filings_spider::index::parse_date;
///
/// let date = NaiveDate::from_ymd_opt(2019, 3, 1);
/// assert_eq!(parse_date("2019-03-01"), date);
/// assert_eq!(parse_date("20190301"), date);
/// assert_eq!(parse_date("2019-03-01 00:00:00"), date);
/// assert_eq!(parse_date("not a date"), None);
/// ```
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            // datetimes, as some tools write them: `2019-03-01 00:00:00`, `2019-03-01T00:00:00`
            raw.get(..10)
                .filter(|_| raw[10..].starts_with(|c| c == ' ' || c == 'T'))
                .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        })
}

fn de_date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_date))
}

// years written by dataframe tools can come back as floats, i.e. `2019.0`
fn de_year<'de, D>(deserializer: D) -> std::result::Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().map(str::trim).and_then(|year| {
        year.parse::<i32>()
            .ok()
            .or_else(|| year.parse::<f64>().ok().map(|year| year as i32))
    }))
}
