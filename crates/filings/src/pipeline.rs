use crate::cli::{IndexArgs, MetadataArgs};
use filings_spider::{
    cik,
    fetch::{Fetcher, RetryPolicy},
    index::{self, IndexFilter, IndexSummary},
    indices,
    metadata::{self, MetadataJob, MetadataSummary},
};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{error, info};

/// Download the quarterly master indices.
pub(crate) async fn download(dest: PathBuf, start_year: i32, tui: bool) -> anyhow::Result<()> {
    let fetcher = Fetcher::from_env(RetryPolicy::default())?;
    let summary = indices::download(&fetcher, dest, start_year, tui).await?;

    if tui {
        println!(
            "indices downloaded ... {} new, {} kept, {} failed",
            summary.downloaded, summary.kept, summary.failed
        );
    }
    Ok(())
}

/// Filter the downloaded indices, returning the consolidated table's path.
pub(crate) fn index(args: IndexArgs, tui: bool) -> anyhow::Result<PathBuf> {
    // an unusable allowlist stops the run before any index file is read
    let ciks = args
        .ciks
        .as_ref()
        .map(cik::load_allowlist)
        .transpose()
        .map_err(|err| {
            error!("failed to load CIK allowlist, error({err})");
            err
        })?;

    let destination = args.dest.join(index::table_name(&args.types));
    let filter = IndexFilter::new(&args.source, &destination)
        .file_types(args.types)
        .years(args.years)
        .ciks(ciks);

    let IndexSummary {
        files_selected,
        files_read,
        files_skipped,
        rows_written,
    } = filter.run(tui)?;

    if tui {
        println!(
            "index filtered ... {rows_written} rows from {files_read}/{files_selected} files \
             ({files_skipped} skipped) to {}",
            destination.display()
        );
    }
    Ok(destination)
}

/// Enrich a consolidated index table into `SEC_datafile.csv`.
pub(crate) async fn metadata(args: MetadataArgs, tui: bool) -> anyhow::Result<()> {
    let pairs = load_pairs(&args)?;
    let fetcher = Fetcher::from_env(RetryPolicy::default())?;
    enrich(&args, pairs, &fetcher, tui).await
}

fn load_pairs(args: &MetadataArgs) -> anyhow::Result<Option<HashSet<(String, i32)>>> {
    let pairs = args
        .pairs
        .as_ref()
        .map(metadata::load_pairs)
        .transpose()?;
    Ok(pairs)
}

async fn enrich(
    args: &MetadataArgs,
    pairs: Option<HashSet<(String, i32)>>,
    fetcher: &Fetcher,
    tui: bool,
) -> anyhow::Result<()> {
    let job = MetadataJob::new(&args.source, args.dest.join(metadata::DATAFILE))
        .chunk_size(args.chunk_size)
        .pairs(pairs);

    let MetadataSummary {
        rows,
        enriched,
        degraded,
        fetch_failed,
        skipped,
    } = job.run(fetcher, tui).await?;

    if tui {
        println!(
            "metadata collected ... {rows} rows ({enriched} enriched, {degraded} degraded, \
             {fetch_failed} not fetched, {skipped} unreadable) to {}",
            job.destination.display()
        );
    }
    Ok(())
}

/// Filter the indices, then enrich the filtered table.
///
/// Every setting of the enrichment is checked before the index table is touched.
pub(crate) async fn run(
    args: IndexArgs,
    pairs: Option<PathBuf>,
    chunk_size: usize,
    tui: bool,
) -> anyhow::Result<()> {
    let time = std::time::Instant::now();
    let mut metadata_args = MetadataArgs {
        source: args.dest.join(index::table_name(&args.types)),
        dest: args.dest.clone(),
        pairs,
        chunk_size,
    };
    let pairs = load_pairs(&metadata_args)?;
    let fetcher = Fetcher::from_env(RetryPolicy::default())?;

    metadata_args.source = index(args, tui)?;
    enrich(&metadata_args, pairs, &fetcher, tui).await?;

    info!("pipeline finished, time elapsed: {:?}", time.elapsed());
    Ok(())
}
