use crate::Result;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// A row type with a fixed CSV header.
///
/// `HEADER` must list the columns in the order the row serializes them.
pub trait Table: Serialize {
    const HEADER: &'static [&'static str];
}

/// Chunked, append-only writer for a [`Table`].
///
/// Every chunk is flushed to disk as soon as it is written, so a run never holds more than one
/// chunk of rows in memory; the header is written exactly once per file.
pub struct TableWriter<T: Table> {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: usize,
    _row: PhantomData<T>,
}

impl<T: Table> TableWriter<T> {
    /// Truncate (or create) the file at `path`, writing the header straight away.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_parent(path)?;
        let file = File::create(path)?;
        let mut table = Self::from_file(file, path);
        table.write_header()?;
        Ok(table)
    }

    /// Open the file at `path` for appending; the header is only written if the file is empty.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_parent(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let empty = file.metadata()?.len() == 0;
        let mut table = Self::from_file(file, path);
        if empty {
            table.write_header()?;
        } else {
            trace!("appending to {}, header already present", path.display());
        }
        Ok(table)
    }

    fn from_file(file: File, path: &Path) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file),
            path: path.to_path_buf(),
            rows: 0,
            _row: PhantomData,
        }
    }

    fn write_header(&mut self) -> Result<()> {
        self.writer.write_record(T::HEADER)?;
        self.writer.flush()?;
        debug!("header written to {}", self.path.display());
        Ok(())
    }

    /// Serialize `rows` and flush them to disk, returning the number of rows written.
    pub fn write_chunk(&mut self, rows: &[T]) -> Result<usize> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        self.rows += rows.len();
        trace!("{} rows flushed to {}", rows.len(), self.path.display());
        Ok(rows.len())
    }

    /// Rows written by this writer (not counting rows already in the file).
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}
