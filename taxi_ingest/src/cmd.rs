//! Command-line parsing and the top-level ingest sequence.

use std::path::Path;

use clap::Parser;
use taxi_ingest::{
    config::DatabaseConfig,
    fetch::{download_file, http_client},
    load_dataset,
    postgres::PostgresSink,
    IngestError, LoadOptions, LoadSummary,
};
use tracing::{debug, instrument};
use url::Url;

/// Where we save the downloaded dataset, relative to the current directory.
const DOWNLOAD_PATH: &str = "output.csv.gz";

/// Command-line options, parsed using `clap`.
#[derive(Debug, Parser)]
#[clap(
    name = "taxi_ingest",
    version,
    about = "Ingest CSV data to PostgreSQL.",
    after_help = r#"EXAMPLE:
    taxi_ingest --user root --password root --host localhost --port 5432 \
        --database ny_taxi --table yellow_taxi_data \
        --url https://example.com/yellow_tripdata_2021-01.csv.gz
"#
)]
pub(crate) struct Opt {
    #[clap(flatten)]
    database: DatabaseConfig,

    /// Name of the table where we will write the results.
    #[clap(long = "table")]
    table: String,

    /// URL of the gzipped CSV file.
    #[clap(long = "url")]
    url: Url,
}

/// Download the dataset and load it into PostgreSQL.
#[instrument(level = "info", name = "taxi_ingest", skip_all, fields(table = %opt.table))]
pub(crate) async fn run(opt: Opt) -> Result<LoadSummary, IngestError> {
    println!("Downloading data...");
    let client = http_client().map_err(IngestError::Download)?;
    let path = Path::new(DOWNLOAD_PATH);
    let bytes = download_file(&client, &opt.url, path).await?;
    debug!("saved {} bytes to {}", bytes, path.display());

    let url = opt.database.url().map_err(IngestError::Connect)?;
    let mut sink = PostgresSink::connect(&url, &opt.table)
        .await
        .map_err(IngestError::Connect)?;

    let summary = load_dataset(path, &mut sink, &LoadOptions::default(), |report| {
        // The first chunk creates the table, so we only report later ones.
        if report.number > 1 {
            println!(
                "Inserted another chunk, took {:.3} seconds",
                report.elapsed.as_secs_f64(),
            );
        }
    })
    .await?;
    println!("All chunks processed.");
    Ok(summary)
}
