//! VKYC Assistant - guided, narrated Video KYC recording sessions.
//!
//! This is the main library crate. It provides the session engine and the
//! console capabilities used by the `vkyc-assistant` binary.

pub mod capture;
pub mod config;
pub mod console;
pub mod narration;
pub mod persistence;
pub mod recorder;
pub mod script;
pub mod session;
pub mod utils;

use std::time::Duration;

use capture::WindowedDisplay;
use config::AppConfig;
use console::{ConsoleSynthesizer, TestPatternDevice};
use persistence::{
    ArtifactPersistence, ArtifactSink, FileArtifactSink, HttpArtifactPersistence,
    HttpConversionSink,
};
use script::{FileScriptStore, HttpScriptStore, ScriptStore};
use session::{submit_outcome, SessionRunner, SubmissionDetails, SubmissionReport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::AppResult;

/// Initialize logging. `RUST_LOG` takes precedence over `default_filter`.
///
/// Logs go to stderr so they don't interleave with the console prompts.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn script_store(config: &AppConfig) -> AppResult<Box<dyn ScriptStore>> {
    Ok(match &config.script.path {
        Some(path) => Box::new(FileScriptStore::new(path.clone())),
        None => Box::new(HttpScriptStore::new(&config.server.base_url, config.server.timeout())?),
    })
}

/// Run one console session, then hand its artifacts to the sinks.
///
/// The recording is always written locally. With `submit` set it is also
/// uploaded for mp4 conversion, and captures and metadata are posted.
pub async fn run(config: AppConfig, submit: bool) -> AppResult<SubmissionReport> {
    tracing::info!("Starting VKYC Assistant v{}", env!("CARGO_PKG_VERSION"));

    let store = script_store(&config)?;
    let mut runner = SessionRunner::load(
        store.as_ref(),
        Box::new(ConsoleSynthesizer::new(config.narration.words_per_minute)),
        Box::new(TestPatternDevice::new(Duration::from_millis(
            config.recording.chunk_interval_ms,
        ))),
        Box::new(WindowedDisplay::default()),
        &config.narration,
    )
    .await?;

    let printer = tokio::spawn(console::print_notifications(runner.subscribe()));
    runner.begin()?;
    console::spawn_command_reader(runner.handle())?;

    let outcome = runner.run().await;
    let _ = printer.await;
    tracing::info!(
        "Session ended ({:?}) with {} captured images",
        outcome.reason,
        outcome.images.len()
    );

    let local = FileArtifactSink::new(config.recording.output_dir.clone());
    let (conversion, persistence) = if submit {
        (
            Some(HttpConversionSink::new(&config.server.base_url, config.server.timeout())?),
            Some(HttpArtifactPersistence::new(&config.server.base_url, config.server.timeout())?),
        )
    } else {
        tracing::info!("Submission disabled, keeping artifacts local");
        (None, None)
    };

    let mut sinks: Vec<&dyn ArtifactSink> = vec![&local];
    if let Some(conversion) = &conversion {
        sinks.push(conversion);
    }

    let report = submit_outcome(
        &outcome,
        &SubmissionDetails::from(&config),
        &sinks,
        persistence.as_ref().map(|p| p as &dyn ArtifactPersistence),
    )
    .await;

    for error in &report.errors {
        tracing::warn!("{}: {}", error.code, error.message);
    }
    Ok(report)
}
