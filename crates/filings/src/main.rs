mod cli;
mod pipeline;

// remote imports
use clap::Parser;
use cli::{Cli, TraceLevel};
use tracing::{subscriber, trace, Level};
use tracing_subscriber::FmtSubscriber;

////////////////////////////////////////////////////////////////////////////

// preproccess the trace level
fn preprocess(trace_level: Level) -> anyhow::Result<()> {
    let my_subscriber = FmtSubscriber::builder()
        .with_max_level(trace_level)
        .finish();
    subscriber::set_global_default(my_subscriber)?;
    Ok(())
}

////////////////////////////////////////////////////////////////////////////

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // set the trace level
    if let Some(trace_level) = cli.trace {
        preprocess(match trace_level {
            TraceLevel::DEBUG => Level::DEBUG,
            TraceLevel::ERROR => Level::ERROR,
            TraceLevel::INFO => Level::INFO,
            TraceLevel::TRACE => Level::TRACE,
            TraceLevel::WARN => Level::WARN,
        })?;
    }
    trace!("command line input recorded: {cli:?}");

    // if no trace level provided, use tui
    let tui = cli.trace.is_none();

    // read cli inputs
    use cli::Commands::*;
    match cli.command {
        // `filings download --start-year <YEAR>`
        Download { dest, start_year } => pipeline::download(dest, start_year, tui).await?,

        // `filings index [--types ..] [--years ..] [--ciks <FILE>]`
        Index(args) => {
            pipeline::index(args, tui)?;
        }

        // `filings metadata --source <FILE> [--pairs <FILE>]`
        Metadata(args) => pipeline::metadata(args, tui).await?,

        // `filings run`: index, then metadata
        Run {
            index,
            pairs,
            chunk_size,
        } => pipeline::run(index, pairs, chunk_size, tui).await?,
    }

    Ok(())
}
