//! VKYC Assistant - console entry point
//!
//! Loads the configuration, runs one narrated session in the terminal and
//! submits the results.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use vkyc_assistant_lib::config::AppConfig;

/// Command-line arguments for vkyc-assistant
#[derive(Parser, Debug)]
#[command(name = "vkyc-assistant")]
#[command(about = "Guided, narrated Video KYC recording sessions")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "VKYC_CONFIG")]
    config: Option<PathBuf>,

    /// Read the script from a local JSON file instead of the server
    #[arg(short, long, env = "VKYC_SCRIPT")]
    script: Option<PathBuf>,

    /// Base URL of the script and persistence server
    #[arg(long, env = "VKYC_BASE_URL")]
    base_url: Option<String>,

    /// Keep all artifacts local; post nothing to the server
    #[arg(long)]
    no_submit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(script) = args.script {
        config.script.path = Some(script);
    }
    if let Some(base_url) = args.base_url {
        config.server.base_url = base_url;
    }

    vkyc_assistant_lib::init_tracing(&config.logging.filter);

    let report = vkyc_assistant_lib::run(config, !args.no_submit)
        .await
        .context("Session failed")?;

    for delivery in &report.deliveries {
        println!("Recording saved to {}", delivery.location);
    }
    if let Some(file) = &report.metadata_file {
        println!("Metadata saved as {}", file);
    }
    if !report.is_complete() {
        println!(
            "{} submission step(s) failed; the recording was kept locally.",
            report.errors.len()
        );
    }

    Ok(())
}
