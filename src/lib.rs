pub mod accumulation;
pub mod detection;
pub mod device;
pub mod heatmap;
pub mod pipeline;
pub mod remote;
pub mod serial;
pub mod settings;
pub mod sync;
pub mod utils;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use accumulation::DayCacheStore;
use detection::{ModelFileClassifier, PostureClassifierAdapter};
use device::DeviceManager;
use heatmap::{HeatmapBroadcaster, HeatmapCompositor};
use pipeline::DetectionPipeline;
use remote::{AlertSender, LogAlertSender, MemoryStore, RemoteStore, RestStore, WebhookAlertSender};
use serial::{BoardStream, SerialIngestor, SharedBoardState};
use settings::{
    CacheSettings, ConfigProvider, PipelineSettings, RemoteSettings, SerialSettings, SettingsStore,
    StreamSettings,
};
use sync::PressureLogger;
use utils::threads::join_with_timeout;

const CONFIG_ENV: &str = "BEDWATCH_CONFIG";
const DEFAULT_CONFIG: &str = "bedwatch.json";
const DEFAULT_MODEL: &str = "posture_model.json";
const RESULT_POLL: Duration = Duration::from_millis(500);
const REGISTER_RETRY: Duration = Duration::from_secs(10);

fn build_store(remote: &RemoteSettings) -> Result<Arc<dyn RemoteStore>> {
    match &remote.url {
        Some(url) => {
            let api_key = remote.api_key.as_deref().unwrap_or_default();
            let store = RestStore::new(url, api_key, remote.timeout)?;
            info!("Syncing to {url}");
            Ok(Arc::new(store))
        }
        None => {
            warn!("No remote url configured; keeping records in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn build_alerts(remote: &RemoteSettings) -> Result<Arc<dyn AlertSender>> {
    match &remote.webhook_url {
        Some(url) => Ok(Arc::new(WebhookAlertSender::new(url, remote.timeout)?)),
        None => Ok(Arc::new(LogAlertSender)),
    }
}

/// Turns board snapshots into heatmaps and feeds them to the pipeline.
fn spawn_producer(
    state: Arc<SharedBoardState>,
    settings: StreamSettings,
    compositor: HeatmapCompositor,
    pipeline: Arc<DetectionPipeline>,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("heatmap-producer".into())
        .spawn(move || {
            let mut stream = BoardStream::new(state, settings);
            while let Some(frame) = stream.next_frame(&stop) {
                let heatmap = match compositor.compose(frame.head.view(), frame.body.view()) {
                    Ok(heatmap) => heatmap,
                    Err(err) => {
                        warn!("Skipping frame {}: {err}", frame.revision);
                        continue;
                    }
                };
                pipeline.publish_realtime(heatmap.clone());
                if !pipeline.submit(heatmap, frame.captured_at) {
                    break;
                }
            }
            info!("Heatmap producer stopped");
        })
        .context("failed to spawn heatmap producer")
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Bedwatch starting up...");

    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = Arc::new(SettingsStore::new(config_path)?);

    let remote = RemoteSettings::from_config(config.as_ref());
    let store = build_store(&remote)?;
    let alerts = build_alerts(&remote)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .context("failed to install Ctrl-C handler")?;
    }

    let pipeline_settings = PipelineSettings::from_config(config.as_ref());
    let state = Arc::new(SharedBoardState::new());
    let mut ingestor = SerialIngestor::new(
        Arc::clone(&state),
        SerialSettings::from_config(config.as_ref()),
    );
    let ports = ingestor.start().context("Failed to start serial ingestion")?;
    info!("Reading from {ports} serial port(s)");

    // Registration only needs the network on first run; keep retrying
    // rather than exiting while it is unreachable.
    let Some(device_id) = DeviceManager::new(config.clone(), Arc::clone(&store))
        .register_with_retry(REGISTER_RETRY, || stop.load(Ordering::Relaxed))
    else {
        info!("Stopped before the device was registered");
        ingestor.stop(pipeline_settings.join_timeout);
        return Ok(());
    };
    info!("Running as device {device_id}");

    let cache = CacheSettings::from_config(config.as_ref());
    let model_path = config
        .get("classifier", "model_path")
        .filter(|raw| !raw.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let logger = PressureLogger::new(
        DayCacheStore::new(&cache.dir),
        Arc::clone(&store),
        device_id,
        alerts,
    );
    let adapter = PostureClassifierAdapter::new(Box::new(ModelFileClassifier::new(model_path)));
    let pipeline = Arc::new(DetectionPipeline::start(
        &pipeline_settings,
        adapter,
        Box::new(logger),
    )?);

    let mut broadcaster =
        HeatmapBroadcaster::start(Arc::clone(&store), device_id, pipeline.realtime_slot())?;

    let producer = spawn_producer(
        state,
        StreamSettings::from_config(config.as_ref()),
        HeatmapCompositor::new(pipeline_settings.interpolation),
        Arc::clone(&pipeline),
        Arc::clone(&stop),
    )?;

    while !stop.load(Ordering::Relaxed) {
        if let Some(result) = pipeline.next_result(RESULT_POLL) {
            info!(
                "{} posture={} regions={:?} synced={}",
                result.timestamp.format("%H:%M:%S"),
                result.detection.posture,
                result.detection.flags.regions().map(|r| r.label()).collect::<Vec<_>>(),
                result.synced
            );
        }
    }

    info!("Shutting down...");
    let join_timeout = pipeline_settings.join_timeout;
    pipeline.stop(join_timeout);
    join_with_timeout(producer, join_timeout);
    broadcaster.stop(join_timeout);
    ingestor.stop(join_timeout);
    Ok(())
}
