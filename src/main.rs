//! iptc-annotate: recursively annotate JPEG images with IPTC keywords and
//! captions/abstracts generated by a local vision model (Ollama + LLaVA).

mod annotate;
mod config;
mod error;
mod iptc;
mod vision;
mod walker;

#[cfg(test)]
mod test_support;

use crate::annotate::Annotator;
use crate::config::{Cli, Configuration};
use crate::vision::client::OllamaClient;
use anyhow::Context;
use clap::Parser;
use log::{debug, error, info};
use std::io::Write;
use std::process::ExitCode;
use std::time::Instant;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let start = Instant::now();

    match run(Cli::parse()).await {
        Ok(()) => {
            info!(
                "Completed annotating images in {:.2} seconds.",
                start.elapsed().as_secs_f64()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let configuration = Configuration::from_cli(cli).context("No usable configuration")?;
    debug!("{:?}", configuration);

    let client = OllamaClient::new(&configuration).context("Failed to build inference client")?;
    let annotator = Annotator::new(&configuration, client);

    walker::annotate_tree(&annotator, &configuration.directory).await;
    Ok(())
}

/// Timestamped log lines; default level is info, RUST_LOG overrides
fn init_logging() {
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
