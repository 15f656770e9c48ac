mod utils;

pub mod aggregate;
pub mod alignment;
pub mod batch;
pub mod error;
pub mod extraction;
pub mod ground_truth;
pub mod models;
pub mod session;
pub mod settings;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use batch::{BatchRunner, EvalContext};
use settings::SettingsStore;

/// Entry point for the `replay-eval` binary: `replay-eval <settings.json>`.
pub fn run() -> Result<()> {
    let debug_mode = std::env::var("REPLAY_EVAL_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // RUST_LOG still overrides the default level
    env_logger::Builder::new()
        .filter_level(if debug_mode {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("usage: replay-eval <settings.json>"))?;

    log::info!("replay-eval starting with {}", settings_path.display());

    let store = SettingsStore::load(&settings_path)?;
    if store.settings().videos.is_empty() {
        log::warn!("No videos configured in {}", store.path().display());
    }
    let settings = store.into_settings();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let report = runtime.block_on(async {
        let context = EvalContext::from_settings(settings)?;
        let mut runner = BatchRunner::new(context);
        Ok::<_, anyhow::Error>(runner.run().await)
    })?;

    match &report.results_path {
        Some(path) => println!("{}", path.display()),
        None => return Err(anyhow!("evaluation finished but results could not be written")),
    }
    Ok(())
}
