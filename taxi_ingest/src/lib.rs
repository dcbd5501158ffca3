//! Download a gzipped CSV dataset over HTTP and load it into a PostgreSQL
//! table, one chunk of rows at a time.
//!
//! The two halves can be used separately:
//!
//! - [`fetch::download_file`] streams a URL to a local file.
//! - [`load::load_dataset`] reads that file in chunks, fixes up the timestamp
//!   columns, and appends each chunk to a [`sink::TableSink`].
//!
//! [`postgres::PostgresSink`] is the sink we use in production.

#![warn(missing_docs, unused_extern_crates, clippy::all)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod fetch;
mod from_csv_cell;
pub mod load;
pub mod normalize;
pub mod postgres;
pub mod schema;
pub mod sink;
mod tls;
pub mod url_with_hidden_password;
pub mod value;

pub use self::error::IngestError;
pub use self::load::{load_dataset, ChunkReport, LoadOptions, LoadSummary};

/// Definitions included by all the files in this crate.
///
/// This forms the dialect of Rust we use for implementing our loader, with an
/// emphasis on `tokio`, `anyhow` and `tracing`.
#[allow(unused_imports)]
pub(crate) mod common {
    pub(crate) use anyhow::{format_err, Context as _, Error, Result};
    pub(crate) use futures::{StreamExt, TryStreamExt};
    pub(crate) use tracing::{
        debug, debug_span, error, info, instrument, trace, warn, Instrument,
    };
    pub(crate) use url::Url;

    pub(crate) use crate::{
        dataset::{Chunk, ChunkReader},
        error::IngestError,
        normalize::{Batch, Row},
        schema::{Column, ColumnChange, ColumnType, InferredSchema, TableSchema},
        sink::TableSink,
        url_with_hidden_password::UrlWithHiddenPassword,
        value::Value,
    };
}
