pub mod challenge;
#[doc(hidden)]
pub mod demo;
pub mod error;
pub mod events;
pub mod metrics;
pub mod models;
pub mod perception;
pub mod scoring;
pub mod sensing;
pub mod settings;
pub mod utils;
pub mod verification;

use std::path::PathBuf;

use anyhow::Context;
use log::info;

use settings::SettingsStore;

pub use error::{VerificationError, VerificationResult};
pub use events::{dispatch_events, EventEnvelope, EventReceiver, VerificationEvent, VerificationObserver};
pub use verification::{SessionVerificationState, VerificationController, VerificationSnapshot};

pub fn run() -> anyhow::Result<()> {
    // Initialize logger (respects RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("FocusGuard starting up...");

    let settings_path = std::env::var("FOCUSGUARD_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("focusguard.json"));
    let settings_store = SettingsStore::new(settings_path)?;
    let settings = settings_store.verification().with_env_overrides();

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(demo::run_demo_session(settings))
}
