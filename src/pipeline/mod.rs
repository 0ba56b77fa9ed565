//! Single-worker detection pipeline.
//!
//! Heatmaps are submitted into a bounded task queue and handled by exactly one
//! worker thread, which classifies them, hands them to a [`Recorder`] and
//! pushes a [`DetectionResult`]. One worker keeps results in submission
//! order. A separate [`LatestSlot`] carries heatmaps for live broadcast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::detection::{PostureClassifierAdapter, PostureDetectionResult};
use crate::heatmap::{Heatmap, LatestSlot};
use crate::settings::PipelineSettings;
use crate::utils::threads::join_with_timeout;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const QUEUE_POLL: Duration = Duration::from_millis(100);

/// Accumulation and sync step run by the worker for every classified frame.
/// Returns whether the remote sync succeeded.
pub trait Recorder: Send {
    fn record(
        &mut self,
        timestamp: NaiveDateTime,
        heatmap: &Heatmap,
        detection: &PostureDetectionResult,
    ) -> bool;
}

#[derive(Debug, Clone)]
pub struct DetectionTask {
    pub heatmap: Heatmap,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub heatmap: Heatmap,
    pub detection: PostureDetectionResult,
    pub timestamp: NaiveDateTime,
    pub synced: bool,
}

/// Items dropped unprocessed by [`DetectionPipeline::stop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Discarded {
    pub tasks: usize,
    pub results: usize,
    pub realtime: usize,
}

pub struct DetectionPipeline {
    task_tx: Sender<DetectionTask>,
    task_rx: Receiver<DetectionTask>,
    result_rx: Receiver<DetectionResult>,
    realtime: LatestSlot<Heatmap>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    join_timeout: Duration,
}

fn worker_loop(
    adapter: PostureClassifierAdapter,
    mut recorder: Box<dyn Recorder>,
    tasks: Receiver<DetectionTask>,
    results: Sender<DetectionResult>,
    stop: Arc<AtomicBool>,
) {
    log_info!("Detection worker started");

    while !stop.load(Ordering::Relaxed) {
        let task = match tasks.recv_timeout(QUEUE_POLL) {
            Ok(task) => task,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let detection = adapter.detect(&task.heatmap);
        let synced = recorder.record(task.timestamp, &task.heatmap, &detection);
        log_debug!(
            "Processed frame at {}: {} (synced: {synced})",
            task.timestamp,
            detection.posture
        );

        let mut result = DetectionResult {
            heatmap: task.heatmap,
            detection,
            timestamp: task.timestamp,
            synced,
        };
        loop {
            match results.send_timeout(result, QUEUE_POLL) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(pending)) => {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    result = pending;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    log_error!("Result queue closed; stopping detection worker");
                    return;
                }
            }
        }
    }

    log_info!("Detection worker stopped");
}

impl DetectionPipeline {
    pub fn start(
        settings: &PipelineSettings,
        adapter: PostureClassifierAdapter,
        recorder: Box<dyn Recorder>,
    ) -> Result<Self> {
        let (task_tx, task_rx) = channel::bounded(settings.task_capacity);
        let (result_tx, result_rx) = channel::bounded(settings.result_capacity);
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let tasks = task_rx.clone();
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("detection-worker".into())
                .spawn(move || worker_loop(adapter, recorder, tasks, result_tx, stop))
                .context("failed to spawn detection worker")?
        };

        Ok(Self {
            task_tx,
            task_rx,
            result_rx,
            realtime: LatestSlot::new(settings.realtime_capacity),
            stop,
            worker: Mutex::new(Some(worker)),
            join_timeout: settings.join_timeout,
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Queues a heatmap for classification, waiting while the queue is full.
    /// Returns false once the pipeline is stopped.
    pub fn submit(&self, heatmap: Heatmap, timestamp: NaiveDateTime) -> bool {
        let mut task = DetectionTask { heatmap, timestamp };
        loop {
            if self.is_stopped() {
                log_debug!("Pipeline stopped; refusing task at {timestamp}");
                return false;
            }
            match self.task_tx.send_timeout(task, QUEUE_POLL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(pending)) => task = pending,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    /// Offers a heatmap to the live broadcast slot.
    pub fn publish_realtime(&self, heatmap: Heatmap) {
        let dropped = self.realtime.push(heatmap);
        if dropped > 0 {
            log_debug!("Dropped {dropped} stale realtime heatmap(s)");
        }
    }

    pub fn realtime_slot(&self) -> LatestSlot<Heatmap> {
        self.realtime.clone()
    }

    pub fn next_result(&self, timeout: Duration) -> Option<DetectionResult> {
        self.result_rx.recv_timeout(timeout).ok()
    }

    /// Stops admission, waits up to `timeout` for the worker, then empties
    /// every queue without processing what is left.
    pub fn stop(&self, timeout: Duration) -> Discarded {
        self.stop.store(true, Ordering::Relaxed);

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(handle) = handle else {
            return Discarded::default();
        };
        if !join_with_timeout(handle, timeout) {
            log_warn!("Detection worker still busy after {timeout:?}");
        }

        let discarded = Discarded {
            tasks: self.task_rx.try_iter().count(),
            results: self.result_rx.try_iter().count(),
            realtime: self.realtime.clear(),
        };
        log_info!(
            "Pipeline stopped; discarded {} task(s), {} result(s), {} realtime heatmap(s)",
            discarded.tasks,
            discarded.results,
            discarded.realtime
        );
        discarded
    }
}

impl Drop for DetectionPipeline {
    fn drop(&mut self) {
        self.stop(self.join_timeout);
    }
}
