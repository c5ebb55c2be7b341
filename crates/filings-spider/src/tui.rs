use crate::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Total, success & failure bars of one enrichment run.
///
/// Every bar is hidden when the tui is disabled, so callers `inc` them unconditionally.
#[derive(Clone, Debug)]
pub(crate) struct MultiBars {
    pub total: ProgressBar,
    pub success: ProgressBar,
    pub fails: ProgressBar,
}

impl MultiBars {
    pub(crate) fn record(&self, ok: bool) {
        self.total.inc(1);
        if ok {
            self.success.inc(1);
        } else {
            self.fails.inc(1);
        }
    }

    pub(crate) fn finish(&self) {
        self.total.finish();
        self.success.finish();
        self.fails.finish();
    }
}

pub(crate) fn multi_progress(len: u64, tui: bool) -> Result<MultiBars> {
    if !tui {
        return Ok(MultiBars {
            total: ProgressBar::hidden(),
            success: ProgressBar::hidden(),
            fails: ProgressBar::hidden(),
        });
    }

    let multi = MultiProgress::new();

    // rows processed; the row count is unknown when reading in chunks, so `len` may be 0
    let total = multi.add(
        ProgressBar::new(len).with_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.magenta}\n \
                        {msg:>9.white} |{bar:57.white/grey}| {pos:<2} / {human_len} \
                        [Time: {elapsed}, Rate: {per_sec}]",
                )?
                .progress_chars("## "),
        ),
    );
    total.set_message("rows");
    total.enable_steady_tick(Duration::from_millis(100));

    // fully enriched rows
    let success = multi.insert_after(
        &total,
        ProgressBar::new(len).with_style(
            ProgressStyle::default_bar()
                .template(" {msg:>9.green} |{bar:57.green}| {pos:<2.green}")?
                .progress_chars("## "),
        ),
    );
    success.set_message("enriched");

    // degraded rows
    let fails = multi.insert_after(
        &success,
        ProgressBar::new(len).with_style(
            ProgressStyle::default_bar()
                .template(" {msg:>9.red} |{bar:57.red}| {pos:<2.red}")?
                .progress_chars("## "),
        ),
    );
    fails.set_message("degraded");

    Ok(MultiBars {
        total,
        success,
        fails,
    })
}

/// A single bar over `len` steps, e.g. index files or quarters.
pub(crate) fn progress_bar(len: usize, msg: &str, tui: bool) -> Result<ProgressBar> {
    if !tui {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new(len as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.magenta} {msg}\n |{bar:57.white/grey}| {pos} / {human_len} [{elapsed}]")?
            .progress_chars("##-"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}
