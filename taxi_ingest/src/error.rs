//! The ways an ingest run can fail.
//!
//! Inside each operation we use `anyhow` and attach context as we go. At the
//! boundary between operations we wrap the error in an [`IngestError`], which
//! records which stage of the run failed, and therefore what state the
//! destination table may have been left in.

use std::path::PathBuf;

use thiserror::Error;

/// An error which stopped an ingest run.
///
/// None of these are retried. Chunks which were appended before the error
/// stay in the destination table.
#[derive(Debug, Error)]
pub enum IngestError {
    /// We could not download the dataset, either because of a transport
    /// error or because the server returned a non-success status.
    #[error("download failed: {0:#}")]
    Download(anyhow::Error),

    /// We could not connect to the destination database.
    #[error("could not connect to destination database: {0:#}")]
    Connect(anyhow::Error),

    /// The dataset could not be opened as gzipped CSV.
    #[error("error reading CSV file: {0:#}")]
    Open(anyhow::Error),

    /// The dataset contained a header but no rows.
    #[error("dataset {} contains no rows", .path.display())]
    EmptyDataset {
        /// The dataset we tried to load.
        path: PathBuf,
    },

    /// We could not read, normalize or store the first chunk. The destination
    /// table may have been created, but it holds no rows from this run.
    #[error("error processing initial chunk: {0:#}")]
    FirstChunk(anyhow::Error),

    /// We could not read, normalize or store a later chunk. All chunks before
    /// `chunk` were already appended.
    #[error("error processing chunk {chunk}: {error:#}")]
    Chunk {
        /// The 1-based number of the failed chunk.
        chunk: usize,
        /// What went wrong.
        error: anyhow::Error,
    },
}

impl IngestError {
    /// Did this error happen before we touched the destination table?
    pub fn table_untouched(&self) -> bool {
        match self {
            IngestError::Download(_)
            | IngestError::Connect(_)
            | IngestError::Open(_)
            | IngestError::EmptyDataset { .. } => true,
            IngestError::FirstChunk(_) | IngestError::Chunk { .. } => false,
        }
    }
}

#[test]
fn download_errors_mention_the_cause() {
    let err = IngestError::Download(
        anyhow::format_err!("404 Not Found").context("could not GET example"),
    );
    assert_eq!(
        err.to_string(),
        "download failed: could not GET example: 404 Not Found"
    );
    assert!(err.table_untouched());
}

#[test]
fn chunk_errors_name_the_chunk() {
    let err = IngestError::Chunk {
        chunk: 3,
        error: anyhow::format_err!("bad row"),
    };
    assert_eq!(err.to_string(), "error processing chunk 3: bad row");
    assert!(!err.table_untouched());
}
