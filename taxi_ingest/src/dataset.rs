//! Reading a gzipped CSV dataset one chunk of rows at a time.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use csv::StringRecord;
use flate2::read::MultiGzDecoder;

use crate::common::*;

/// The most rows we allocate space for before we start reading a chunk.
/// Bigger chunks grow as needed.
const MAX_PREALLOCATED_ROWS: usize = 16 * 1024;

/// A run of consecutive rows from a dataset.
#[derive(Clone, Debug)]
pub struct Chunk {
    /// The zero-based position of our first row in the whole dataset.
    pub start_index: u64,
    /// The dataset's column names.
    pub headers: StringRecord,
    /// Our rows, in file order. Every row has as many cells as `headers`.
    pub rows: Vec<StringRecord>,
}

impl Chunk {
    /// How many rows are in this chunk?
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Is this chunk empty?
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads a gzipped CSV file as a sequence of [`Chunk`] values.
///
/// This is synchronous because it relies on `csv::Reader` and `flate2`, which
/// both wrap a synchronous `Read`. Async callers should run it using
/// `tokio::task::spawn_blocking`.
pub struct ChunkReader {
    path: PathBuf,
    rdr: csv::Reader<Box<dyn Read + Send>>,
    headers: StringRecord,
    chunk_size: usize,
    next_index: u64,
}

impl ChunkReader {
    /// Open `path` and read its header row. Returns an error if the file is
    /// missing, isn't gzipped, or has no header row.
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(format_err!("chunk size must be at least 1"));
        }
        let file = File::open(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        let decoder: Box<dyn Read + Send> =
            Box::new(MultiGzDecoder::new(BufReader::new(file)));
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(decoder);
        let headers = rdr
            .headers()
            .with_context(|| format!("cannot read CSV header from {}", path.display()))?
            .to_owned();
        if headers.is_empty() {
            return Err(format_err!("{} has no CSV header row", path.display()));
        }
        debug!(
            "opened {} with {} columns, chunk size {}",
            path.display(),
            headers.len(),
            chunk_size,
        );
        Ok(ChunkReader {
            path: path.to_owned(),
            rdr,
            headers,
            chunk_size,
            next_index: 0,
        })
    }

    /// The column names from our header row.
    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    /// Read up to `chunk_size` rows. Returns `None` once the dataset is
    /// exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        let start_index = self.next_index;
        let mut rows = Vec::with_capacity(self.chunk_size.min(MAX_PREALLOCATED_ROWS));
        let mut record = StringRecord::new();
        while rows.len() < self.chunk_size {
            let more = self.rdr.read_record(&mut record).with_context(|| {
                format!(
                    "error reading row {} of {}",
                    start_index + rows.len() as u64,
                    self.path.display(),
                )
            })?;
            if !more {
                break;
            }
            rows.push(record.clone());
        }
        if rows.is_empty() {
            trace!("no more rows in {}", self.path.display());
            return Ok(None);
        }
        self.next_index += rows.len() as u64;
        Ok(Some(Chunk {
            start_index,
            headers: self.headers.clone(),
            rows,
        }))
    }
}
