use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Sets the level of tracing.
    ///
    /// Without it, progress bars are shown instead of logs.
    #[arg(short, long, global = true)]
    pub trace: Option<TraceLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the quarterly EDGAR master indices as pipe-delimited `.tsv` files.
    Download {
        /// Directory the `.tsv` files are written to.
        #[arg(short, long, default_value = "./buffer/indices")]
        dest: PathBuf,

        /// First year to download; every quarter up to today follows.
        #[arg(short, long)]
        start_year: i32,
    },

    /// Filter the downloaded indices into one consolidated index table.
    Index(IndexArgs),

    /// Enrich a consolidated index table with company metadata from EDGAR.
    Metadata(MetadataArgs),

    /// Filter the indices, then enrich the result into `SEC_datafile.csv`.
    Run {
        #[command(flatten)]
        index: IndexArgs,

        /// Only enrich these `(cik, year)` pairs; a CSV with columns `cik,year`.
        #[arg(long)]
        pairs: Option<PathBuf>,

        /// Rows read from the index table at a time.
        #[arg(long, default_value_t = filings_spider::metadata::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Directory holding the downloaded `.tsv` indices.
    #[arg(short, long, default_value = "./buffer/indices")]
    pub source: PathBuf,

    /// Directory the consolidated index table is written to.
    #[arg(short, long, default_value = "./buffer")]
    pub dest: PathBuf,

    /// Filing types to keep.
    #[arg(long, value_delimiter = ',', default_value = "10-K")]
    pub types: Vec<String>,

    /// Filing years to keep; a single year means that year up to the current one.
    #[arg(long, value_delimiter = ',', default_values_t = [2000, 2001])]
    pub years: Vec<i32>,

    /// Only keep these companies; a text file with one CIK per line.
    #[arg(long)]
    pub ciks: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MetadataArgs {
    /// The consolidated index table.
    #[arg(short, long)]
    pub source: PathBuf,

    /// Directory `SEC_datafile.csv` is written to.
    #[arg(short, long, default_value = "./buffer")]
    pub dest: PathBuf,

    /// Only enrich these `(cik, year)` pairs; a CSV with columns `cik,year`.
    #[arg(long)]
    pub pairs: Option<PathBuf>,

    /// Rows read from the index table at a time.
    #[arg(long, default_value_t = filings_spider::metadata::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
#[clap(rename_all = "UPPERCASE")]
pub enum TraceLevel {
    DEBUG,
    ERROR,
    INFO,
    TRACE,
    WARN,
}
