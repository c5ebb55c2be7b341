use crate::fetch::Fetcher;
use crate::{tui, Result};
use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Quarterly master indices, as `{FULL_INDEX_URL}/{year}/QTR{quarter}/master.idx`.
pub const FULL_INDEX_URL: &str = "https://www.sec.gov/Archives/edgar/full-index";

/// Time allowed per attempt; a `master.idx` runs to tens of MB.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Download of the quarterly EDGAR master indices into `.tsv` files the index filter reads.
#[derive(Clone, Debug)]
pub struct IndexDownload {
    pub dest_dir: PathBuf,
    pub start_year: i32,
    pub base_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub quarters: usize,
    pub downloaded: usize,
    /// Past quarters already on disk.
    pub kept: usize,
    pub failed: usize,
}

/// Download every quarter from `start_year` onwards into `dest_dir`.
pub async fn download(
    fetcher: &Fetcher,
    dest_dir: impl Into<PathBuf>,
    start_year: i32,
    tui: bool,
) -> Result<DownloadSummary> {
    IndexDownload::new(dest_dir, start_year)
        .run(fetcher, tui)
        .await
}

impl IndexDownload {
    pub fn new(dest_dir: impl Into<PathBuf>, start_year: i32) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            start_year,
            base_url: FULL_INDEX_URL.to_string(),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn url(&self, year: i32, quarter: u32) -> String {
        format!("{}/{year}/QTR{quarter}/master.idx", self.base_url)
    }

    pub fn path(&self, year: i32, quarter: u32) -> PathBuf {
        self.dest_dir.join(format!("{year}-QTR{quarter}.tsv"))
    }

    /// Fetch each missing quarter; past quarters already on disk are kept, the current one is
    /// always refreshed.
    pub async fn run(&self, fetcher: &Fetcher, tui: bool) -> Result<DownloadSummary> {
        let time = std::time::Instant::now();
        tokio::fs::create_dir_all(&self.dest_dir)
            .await
            .map_err(|err| {
                error!(
                    "failed to create directory {}, error({err})",
                    self.dest_dir.display()
                );
                err
            })?;

        let today = chrono::Local::now().date_naive();
        let quarters = quarters(self.start_year, today);
        let current = quarters.last().copied();
        info!(
            "downloading {} quarterly indices to {}",
            quarters.len(),
            self.dest_dir.display()
        );

        let pb = tui::progress_bar(quarters.len(), "downloading indices ...", tui)?;
        let mut summary = DownloadSummary {
            quarters: quarters.len(),
            ..Default::default()
        };

        for (year, quarter) in quarters {
            pb.set_message(format!("downloading {year} QTR{quarter} ..."));
            pb.inc(1);

            let path = self.path(year, quarter);
            if Some((year, quarter)) != current && exists(&path).await {
                trace!("{} already downloaded", path.display());
                summary.kept += 1;
                continue;
            }

            let url = self.url(year, quarter);
            let master = match fetcher.get_text_within(&url, DOWNLOAD_TIMEOUT).await {
                Ok(text) => text,
                Err(err) => {
                    error!("failed to download {year} QTR{quarter}, error({err})");
                    summary.failed += 1;
                    continue;
                }
            };

            tokio::fs::write(&path, master_to_tsv(&master))
                .await
                .map_err(|err| {
                    error!("failed to write {}, error({err})", path.display());
                    err
                })?;
            debug!("{url} written to {}", path.display());
            summary.downloaded += 1;
        }

        pb.finish_and_clear();
        info!(
            "indices downloaded: {} new, {} kept, {} failed, {}",
            summary.downloaded,
            summary.kept,
            summary.failed,
            crate::time_elapsed(time)
        );

        Ok(summary)
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Every `(year, quarter)` from the first quarter of `start_year` up to the quarter of `today`.
///
/// ```rust
/// use chrono::NaiveDate;
/// use filings_spider::indices::quarters;
///
/// let today = NaiveDate::from_ymd_opt(2020, 5, 17).unwrap();
/// assert_eq!(
///     quarters(2019, today),
///     vec![(2019, 1), (2019, 2), (2019, 3), (2019, 4), (2020, 1), (2020, 2)]
/// );
/// ```
pub fn quarters(start_year: i32, today: NaiveDate) -> Vec<(i32, u32)> {
    let current = (today.year(), (today.month() - 1) / 3 + 1);
    (start_year..=today.year())
        .flat_map(|year| (1..=4).map(move |quarter| (year, quarter)))
        .take_while(|&yq| yq <= current)
        .collect()
}

/// Strip the preamble of a `master.idx`, appending the html index path to every record.
///
/// `1000045|NICHOLAS FINANCIAL INC|10-Q|2019-02-14|edgar/data/1000045/0001193125-19-039489.txt`
/// becomes the same line followed by
/// `|edgar/data/1000045/0001193125-19-039489-index.html`.
pub fn master_to_tsv(master: &str) -> String {
    let mut lines = master.lines();
    // everything up to the dashed line is the description & column header
    for line in lines.by_ref() {
        if line.starts_with("---") {
            break;
        }
    }

    let mut tsv = String::with_capacity(master.len() * 2);
    for line in lines.map(str::trim_end).filter(|line| !line.is_empty()) {
        let html = line
            .rsplit('|')
            .next()
            .map(|file| file.replace(".txt", "-index.html"))
            .unwrap_or_default();
        tsv.push_str(line);
        tsv.push('|');
        tsv.push_str(&html);
        tsv.push('\n');
    }
    tsv
}
