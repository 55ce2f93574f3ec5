#![warn(missing_docs)]

//! namestat command line entry point.

use anyhow::Result;
use clap::Parser;
use namestat::cli::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    tracing::debug!("namestat starting");

    Cli::parse().run().await
}
