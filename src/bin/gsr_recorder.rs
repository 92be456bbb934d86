//! GSR Recorder - demo entry point
//!
//! Runs a simulated recording session and prints its summary.
//!
//! Usage: `gsr-recorder [SECONDS] [CONFIG.toml]`

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gsr_core::config::{ConfigLoader, SystemConfig};
use gsr_core::error::GsrError;
use gsr_core::session::{GsrSample, RecordingListener, RecordingSession, SessionInfo, SyncMark};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DURATION_SECS: u64 = 5;
const SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Logs session progress
struct ConsoleListener;

impl RecordingListener for ConsoleListener {
    fn on_recording_started(&self, session: &SessionInfo) {
        tracing::info!("Recording {} started", session.session_id);
    }

    fn on_recording_stopped(&self, session: &SessionInfo) {
        tracing::info!("Recording {} stopped", session.session_id);
    }

    fn on_sample_recorded(&self, sample: &GsrSample) {
        tracing::trace!(
            index = sample.sample_index,
            conductance_us = sample.conductance,
            valid = sample.is_valid,
            "sample"
        );
    }

    fn on_sync_mark_recorded(&self, mark: &SyncMark) {
        tracing::info!("Sync mark {} at {}", mark.event_type, mark.timestamp);
    }

    fn on_error(&self, error: &GsrError) {
        tracing::error!("Session error: {}", error);
    }

    fn on_device_connected(&self) {
        tracing::info!("Device connected");
    }

    fn on_device_disconnected(&self) {
        tracing::info!("Device disconnected");
    }
}

fn load_config(path: Option<PathBuf>) -> SystemConfig {
    let mut loader = match path {
        Some(path) => ConfigLoader::with_paths(vec![path]),
        None => ConfigLoader::new(),
    };
    match loader.load_system_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load configuration, using defaults: {}", e);
            SystemConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gsr_core=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let duration_secs = match args.next() {
        Some(arg) => arg.parse()?,
        None => DEFAULT_DURATION_SECS,
    };
    let config = load_config(args.next().map(PathBuf::from));

    tracing::info!("Starting GSR recorder v{}", gsr_core::VERSION);
    tracing::info!("Configuration: {:?}", config.get_summary());

    let session = RecordingSession::new(config);
    session.add_listener(Arc::new(ConsoleListener));

    session.initialize_device(None).await?;
    session.start_recording("")?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration_secs);
    let mut ticker = tokio::time::interval(SYNC_INTERVAL);
    ticker.tick().await;
    let mut marks = 0u32;
    while tokio::time::Instant::now() < deadline {
        ticker.tick().await;
        marks += 1;
        let mut metadata = BTreeMap::new();
        metadata.insert("sequence".to_string(), marks.to_string());
        session.trigger_sync_event("HEARTBEAT", metadata)?;
    }

    let info = session.stop_recording()?;
    let stats = session.statistics();
    let now = session.clock().now_millis();

    println!("Session:     {}", info.session_id);
    println!("Duration:    {}", info.duration_formatted(now));
    println!("Data:        {}", info.data_type_summary());
    println!(
        "Samples:     {} accepted, {} flagged, {} rejected",
        info.sample_count, info.flagged_count, info.rejected_count
    );
    println!("Sync marks:  {}", info.sync_marks.len());
    println!(
        "Conductance: mean {:.3} uS, tonic {:.3} uS, phasic {:.3} uS",
        stats.mean, stats.tonic, stats.phasic
    );
    println!("{}", serde_json::to_string_pretty(&info.stats(now))?);

    session.disconnect_device()?;
    Ok(())
}
