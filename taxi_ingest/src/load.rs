//! Loading a dataset into a destination table, one chunk at a time.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use tokio::task::spawn_blocking;

use crate::common::*;
use crate::normalize::normalize_chunk;

/// How many rows we read at once, unless told otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// The timestamp columns in the NYC taxi trip datasets.
pub const DEFAULT_TIMESTAMP_COLUMNS: &[&str] =
    &["tpep_pickup_datetime", "tpep_dropoff_datetime"];

/// Options for [`load_dataset`].
#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// The maximum number of rows to hold in memory at once.
    pub chunk_size: usize,
    /// Columns to parse as timestamps. Values that can't be parsed become
    /// `NULL`.
    pub timestamp_columns: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timestamp_columns: DEFAULT_TIMESTAMP_COLUMNS
                .iter()
                .map(|&c| c.to_owned())
                .collect(),
        }
    }
}

/// Progress information about one chunk.
#[derive(Clone, Debug)]
pub struct ChunkReport {
    /// The 1-based number of this chunk.
    pub number: usize,
    /// How many rows we appended.
    pub rows: u64,
    /// How long it took to read, normalize and append this chunk.
    pub elapsed: Duration,
}

/// What we loaded.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LoadSummary {
    /// How many chunks we appended on our final pass through the dataset.
    pub chunks: usize,
    /// How many rows we appended on our final pass through the dataset.
    pub rows: u64,
    /// How many times we had to start over with a wider schema.
    pub restarts: usize,
}

/// Load the gzipped CSV file at `path` into `sink`.
///
/// The first chunk determines the initial table schema. We replace any
/// existing table using that schema, then append every chunk in file order,
/// calling `on_chunk` after each one.
///
/// If a later chunk needs a wider column type, we widen the column in place
/// when the stored values can be converted exactly (integers to doubles, or
/// columns which only hold `NULL`). Otherwise we replace the table with the
/// wider schema and start again from the first chunk. Either way, the final
/// table doesn't depend on the chunk size.
///
/// We stop at the first error. Chunks appended before the error are left in
/// place.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn load_dataset<S, F>(
    path: &Path,
    sink: &mut S,
    options: &LoadOptions,
    mut on_chunk: F,
) -> Result<LoadSummary, IngestError>
where
    S: TableSink + ?Sized,
    F: FnMut(&ChunkReport),
{
    let reader = open_reader(path.to_owned(), options.chunk_size)
        .await
        .map_err(IngestError::Open)?;

    // Use our first chunk to set up the table.
    let mut started = Instant::now();
    let (mut reader, first) = read_chunk(reader).await.map_err(IngestError::FirstChunk)?;
    let mut chunk = match first {
        Some(first) => first,
        None => {
            return Err(IngestError::EmptyDataset {
                path: path.to_owned(),
            })
        }
    };
    let mut inferred = InferredSchema::from_first_chunk(&chunk, &options.timestamp_columns)
        .map_err(IngestError::FirstChunk)?;
    sink.replace_table(inferred.schema())
        .await
        .map_err(IngestError::FirstChunk)?;

    let mut summary = LoadSummary::default();
    let mut number = 1;
    loop {
        let on_err = chunk_error(number, summary.restarts);
        let changes = inferred.widen_to_fit(&chunk).map_err(&on_err)?;
        if changes.iter().any(|c| !c.converts_stored_values()) {
            let changed = changes
                .iter()
                .map(|c| format!("{:?} to {}", c.name, c.to))
                .collect::<Vec<_>>()
                .join(", ");
            info!("chunk {} needs {}, reloading from the start", number, changed);
            summary = LoadSummary {
                restarts: summary.restarts + 1,
                ..LoadSummary::default()
            };
            number = 1;
            started = Instant::now();
            let on_err = chunk_error(number, summary.restarts);
            sink.replace_table(inferred.schema())
                .await
                .map_err(&on_err)?;
            let fresh = open_reader(path.to_owned(), options.chunk_size)
                .await
                .map_err(&on_err)?;
            let (fresh, first) = read_chunk(fresh).await.map_err(&on_err)?;
            reader = fresh;
            chunk = first.ok_or_else(|| {
                on_err(format_err!("{} has no rows on second read", path.display()))
            })?;
            continue;
        }
        if !changes.is_empty() {
            sink.widen_columns(inferred.schema(), &changes)
                .await
                .map_err(&on_err)?;
        }

        let batch = normalize_chunk(chunk, inferred.schema()).map_err(&on_err)?;
        let rows = append_batch(sink, inferred.schema(), &batch)
            .await
            .map_err(&on_err)?;
        drop(batch);
        summary.chunks = number;
        summary.rows += rows;
        report_chunk(&mut on_chunk, number, rows, started);

        started = Instant::now();
        number += 1;
        let (next_reader, next) = read_chunk(reader)
            .await
            .map_err(chunk_error(number, summary.restarts))?;
        reader = next_reader;
        chunk = match next {
            Some(next) => next,
            None => break,
        };
    }

    info!(
        "loaded {} rows in {} chunks from {} ({} restarts)",
        summary.rows,
        summary.chunks,
        path.display(),
        summary.restarts,
    );
    Ok(summary)
}

/// Classify an error which happened while loading chunk `number`. Only the
/// first chunk of our first pass counts as [`IngestError::FirstChunk`].
fn chunk_error(number: usize, restarts: usize) -> impl Fn(Error) -> IngestError {
    move |error| {
        if number == 1 && restarts == 0 {
            IngestError::FirstChunk(error)
        } else {
            IngestError::Chunk {
                chunk: number,
                error,
            }
        }
    }
}

/// Open `path` on a background thread.
async fn open_reader(path: PathBuf, chunk_size: usize) -> Result<ChunkReader> {
    spawn_blocking(move || ChunkReader::open(&path, chunk_size))
        .await
        .context("error joining background task")?
}

/// Read the next chunk on a background thread, handing `reader` back to our
/// caller along with the chunk.
async fn read_chunk(mut reader: ChunkReader) -> Result<(ChunkReader, Option<Chunk>)> {
    spawn_blocking(move || -> Result<(ChunkReader, Option<Chunk>)> {
        let chunk = reader.next_chunk()?;
        Ok((reader, chunk))
    })
    .await
    .context("error joining background task")?
}

/// Append `batch` and make sure the sink wrote every row.
async fn append_batch<S>(sink: &mut S, schema: &TableSchema, batch: &Batch) -> Result<u64>
where
    S: TableSink + ?Sized,
{
    let written = sink.append(schema, batch).await?;
    if written != batch.len() as u64 {
        return Err(format_err!(
            "expected to append {} rows, but destination reported {}",
            batch.len(),
            written,
        ));
    }
    Ok(written)
}

/// Log a finished chunk and pass it on to our caller.
fn report_chunk<F>(on_chunk: &mut F, number: usize, rows: u64, started: Instant)
where
    F: FnMut(&ChunkReport),
{
    let report = ChunkReport {
        number,
        rows,
        elapsed: started.elapsed(),
    };
    debug!(
        "appended chunk {} ({} rows) in {:.3}s",
        report.number,
        report.rows,
        report.elapsed.as_secs_f64(),
    );
    on_chunk(&report);
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::dataset::test_util::write_gz;
    use crate::sink::memory::MemorySink;

    const TRIPS: &str = "\
VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,passenger_count,trip_distance,store_and_fwd_flag
1,2021-01-01 00:30:10,2021-01-01 00:36:12,1,2.10,N
2,2021-01-01 00:51:20,2021-01-01 00:52:19,1,0.20,N
1,not a time,2021-01-01 01:01:00,,14.70,Y
2,2021-01-01 00:31:49,2021-01-01 00:48:21,3,10.60,N
2,2021-01-01 00:16:29,bogus,1,4.94,N
";

    fn options(chunk_size: usize) -> LoadOptions {
        LoadOptions {
            chunk_size,
            ..LoadOptions::default()
        }
    }

    /// Load `csv` with `chunk_size`, returning the sink and chunk reports.
    async fn load(
        csv: &str,
        chunk_size: usize,
    ) -> (Result<LoadSummary, IngestError>, MemorySink, Vec<ChunkReport>) {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, "output.csv.gz", csv);
        let mut sink = MemorySink::default();
        let mut reports = vec![];
        let result = load_dataset(&path, &mut sink, &options(chunk_size), |r| {
            reports.push(r.to_owned())
        })
        .await;
        (result, sink, reports)
    }

    #[tokio::test]
    async fn loads_every_row_in_order() {
        let (result, sink, reports) = load(TRIPS, 2).await;
        assert_eq!(
            result.unwrap(),
            LoadSummary {
                chunks: 3,
                rows: 5,
                restarts: 0,
            }
        );
        assert_eq!(sink.replace_count, 1);
        assert_eq!(sink.append_count, 3);
        let indices = sink.rows.iter().map(|r| r[0].clone()).collect::<Vec<_>>();
        assert_eq!(indices, (0..5).map(Value::BigInt).collect::<Vec<_>>());
        let vendors = sink.rows.iter().map(|r| r[1].clone()).collect::<Vec<_>>();
        assert_eq!(
            vendors,
            [1, 2, 1, 2, 2].iter().map(|&v| Value::BigInt(v)).collect::<Vec<_>>()
        );
        assert_eq!(
            reports.iter().map(|r| (r.number, r.rows)).collect::<Vec<_>>(),
            vec![(1, 2), (2, 2), (3, 1)]
        );
    }

    #[tokio::test]
    async fn bad_timestamps_become_null_without_dropping_rows() {
        let (result, sink, _) = load(TRIPS, 100).await;
        result.unwrap();
        assert_eq!(sink.rows.len(), 5);
        // Row 2 has a bad pickup time, row 4 a bad dropoff time.
        assert_eq!(sink.rows[2][2], Value::Null);
        assert!(matches!(sink.rows[2][3], Value::Timestamp(_)));
        assert!(matches!(sink.rows[4][2], Value::Timestamp(_)));
        assert_eq!(sink.rows[4][3], Value::Null);
        // Ordinary empty cells are NULL, too.
        assert_eq!(sink.rows[2][4], Value::Null);
    }

    #[tokio::test]
    async fn chunk_size_does_not_change_the_table() {
        let (result, expected, _) = load(TRIPS, 100).await;
        result.unwrap();
        for chunk_size in &[1, 2, 3, 5] {
            let (result, sink, reports) = load(TRIPS, *chunk_size).await;
            result.unwrap();
            assert_eq!(sink.schema, expected.schema);
            assert_eq!(sink.rows, expected.rows);
            assert_eq!(reports.len(), (5 + chunk_size - 1) / chunk_size);
        }
    }

    #[tokio::test]
    async fn reloading_replaces_previous_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, "output.csv.gz", TRIPS);
        let mut sink = MemorySink::default();
        for _ in 0..2 {
            load_dataset(&path, &mut sink, &options(2), |_| {})
                .await
                .unwrap();
        }
        assert_eq!(sink.replace_count, 2);
        assert_eq!(sink.rows.len(), 5);
    }

    #[tokio::test]
    async fn empty_dataset_leaves_table_alone() {
        let header = TRIPS.lines().next().unwrap().to_owned() + "\n";
        let (result, sink, reports) = load(&header, 2).await;
        let err = result.unwrap_err();
        assert!(matches!(err, IngestError::EmptyDataset { .. }));
        assert!(err.table_untouched());
        assert!(sink.untouched());
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn unreadable_dataset_leaves_table_alone() {
        let dir = TempDir::new().unwrap();
        let mut sink = MemorySink::default();

        let missing = dir.path().join("missing.csv.gz");
        let err = load_dataset(&missing, &mut sink, &options(2), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Open(_)));

        let plain = dir.path().join("plain.csv");
        fs::write(&plain, TRIPS).unwrap();
        let err = load_dataset(&plain, &mut sink, &options(2), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Open(_)));

        assert!(sink.untouched());
    }

    #[tokio::test]
    async fn missing_timestamp_column_fails_first_chunk() {
        let (result, sink, _) = load("a,b\n1,2\n", 2).await;
        assert!(matches!(result.unwrap_err(), IngestError::FirstChunk(_)));
        assert!(sink.untouched());
    }

    /// Fares start out looking like integers, tips start out empty, and
    /// `RatecodeID` turns from numbers into text halfway through.
    const DRIFTING: &str = "\
VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,fare_amount,tip_amount,RatecodeID
1,2021-01-01 00:30:10,2021-01-01 00:36:12,8,,1
2,2021-01-01 00:51:20,2021-01-01 00:52:19,1.5,2.5,1
1,2021-01-01 00:43:30,2021-01-01 01:11:06,42,,2.0
2,2021-01-01 00:31:49,2021-01-01 00:48:21,11,0,N/A
1,2021-01-01 00:16:29,2021-01-01 00:24:30,9007199254740993,1,5
";

    #[tokio::test]
    async fn type_drift_does_not_depend_on_chunk_size() {
        let (result, expected, _) = load(DRIFTING, usize::MAX).await;
        assert_eq!(
            result.unwrap(),
            LoadSummary {
                chunks: 1,
                rows: 5,
                restarts: 0,
            }
        );
        let types = expected
            .schema
            .as_ref()
            .unwrap()
            .columns
            .iter()
            .map(|c| c.ty)
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![
                ColumnType::BigInt,
                ColumnType::BigInt,
                ColumnType::Timestamp,
                ColumnType::Timestamp,
                ColumnType::DoublePrecision,
                ColumnType::DoublePrecision,
                ColumnType::Text,
            ]
        );

        for &chunk_size in &[1, 2, 3, 100] {
            let (result, sink, _) = load(DRIFTING, chunk_size).await;
            let summary = result.unwrap();
            assert_eq!(summary.rows, 5, "chunk size {}", chunk_size);
            assert_eq!(sink.schema, expected.schema, "chunk size {}", chunk_size);
            assert_eq!(sink.rows, expected.rows, "chunk size {}", chunk_size);
        }
    }

    #[tokio::test]
    async fn numeric_widening_happens_in_place() {
        let (result, sink, reports) = load(DRIFTING, 1).await;
        let summary = result.unwrap();
        // `RatecodeID` goes from numbers to text on row 3, forcing exactly one
        // reload. Every other change converts the stored rows.
        assert_eq!(summary.restarts, 1);
        assert_eq!(summary.chunks, 5);
        assert!(sink.widen_count >= 2);
        assert_eq!(sink.replace_count, 2);
        // The reload reports its chunks from 1 again.
        let numbers = reports.iter().map(|r| r.number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2, 3, 1, 2, 3, 4, 5]);
        // Stored text is exactly what the file said.
        let codes = sink.rows.iter().map(|r| r[6].clone()).collect::<Vec<_>>();
        assert_eq!(
            codes,
            ["1", "1", "2.0", "N/A", "5"]
                .iter()
                .map(|&c| Value::Text(c.to_owned()))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn widening_failure_stops_the_load() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, "output.csv.gz", DRIFTING);
        let mut sink = MemorySink {
            fail_widen: true,
            ..MemorySink::default()
        };
        let err = load_dataset(&path, &mut sink, &options(1), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Chunk { chunk: 2, .. }));
        assert_eq!(sink.rows.len(), 1);
    }

    #[tokio::test]
    async fn malformed_later_row_stops_the_load() {
        let csv = TRIPS.to_owned() + "1,2021-01-01 00:00:00\n";
        let (result, sink, _) = load(&csv, 2).await;
        match result.unwrap_err() {
            IngestError::Chunk { chunk, .. } => assert_eq!(chunk, 3),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(sink.rows.len(), 4);
    }

    #[tokio::test]
    async fn append_failure_stops_the_load() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, "output.csv.gz", TRIPS);
        let mut sink = MemorySink {
            fail_append: Some(2),
            ..MemorySink::default()
        };
        let err = load_dataset(&path, &mut sink, &options(2), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Chunk { chunk: 2, .. }));
        assert_eq!(sink.append_count, 2);
        assert_eq!(sink.rows.len(), 2);
    }

    #[tokio::test]
    async fn first_append_failure_is_first_chunk_error() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, "output.csv.gz", TRIPS);
        let mut sink = MemorySink {
            fail_append: Some(1),
            ..MemorySink::default()
        };
        let err = load_dataset(&path, &mut sink, &options(2), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::FirstChunk(_)));
        assert!(!err.table_untouched());
        assert_eq!(sink.replace_count, 1);
        assert!(sink.rows.is_empty());
    }
}
