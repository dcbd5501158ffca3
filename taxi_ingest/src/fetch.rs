//! Downloading a dataset to a local file.

use std::path::Path;

use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
};

use crate::common::*;
use crate::tls::rustls_client_config;

/// How many bytes we buffer before writing to disk.
pub const BLOCK_SIZE: usize = 8 * 1024;

/// Build the HTTP client we use for downloads.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .use_preconfigured_tls(rustls_client_config()?)
        .build()
        .context("could not build HTTP client")
}

/// Download `url` to `dest`, streaming the body to disk as it arrives.
///
/// Returns the number of bytes written. If this fails, anything left at `dest`
/// is incomplete, and we make no attempt to clean it up.
#[instrument(level = "debug", skip(client, dest), fields(dest = %dest.display()))]
pub async fn download_file(
    client: &reqwest::Client,
    url: &Url,
    dest: &Path,
) -> Result<u64, IngestError> {
    download_file_helper(client, url, dest)
        .await
        .map_err(IngestError::Download)
}

/// Implementation of `download_file`, using our regular error type.
async fn download_file_helper(
    client: &reqwest::Client,
    url: &Url,
    dest: &Path,
) -> Result<u64> {
    debug!("streaming from {}", url);
    let response = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("could not GET {}", url))?;
    debug!("received {} from {}", response.status(), url);
    let response = response
        .error_for_status()
        .with_context(|| format!("server refused to send {}", url))?;

    let file = File::create(dest)
        .await
        .with_context(|| format!("cannot create {}", dest.display()))?;
    let mut wtr = BufWriter::with_capacity(BLOCK_SIZE, file);
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(bytes) = stream.next().await {
        let bytes = bytes.with_context(|| format!("error reading body of {}", url))?;
        trace!("received {} bytes", bytes.len());
        wtr.write_all(&bytes)
            .await
            .with_context(|| format!("error writing to {}", dest.display()))?;
        written += bytes.len() as u64;
    }
    wtr.flush()
        .await
        .with_context(|| format!("error writing to {}", dest.display()))?;
    debug!("downloaded {} bytes to {}", written, dest.display());
    Ok(written)
}
