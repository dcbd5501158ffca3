//! A CLI tool for loading NYC taxi trip data into PostgreSQL.

#![warn(rust_2018_idioms, unused_extern_crates, clippy::all)]

use std::process;

use clap::Parser;
use tracing::debug;

mod cmd;
mod logging;

#[tokio::main]
async fn main() {
    if let Err(err) = logging::init_logging() {
        eprintln!("{:#}", err);
    }

    let opt = cmd::Opt::parse();
    debug!("{:?}", opt);
    if let Err(err) = cmd::run(opt).await {
        println!("{}", err);
        process::exit(1);
    }
}
