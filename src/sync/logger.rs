use std::sync::Arc;

use chrono::NaiveDateTime;
use log::{debug, error, info};

use crate::accumulation::{Accumulator, DayCacheStore};
use crate::detection::{PostureDetectionResult, RegionFlags};
use crate::heatmap::Heatmap;
use crate::pipeline::Recorder;
use crate::remote::{AlertSender, DeviceId, PressureLog, RemoteStore};

use super::engine::{SyncEngine, SyncReport};
use super::last_log::LastLogFile;
use super::threshold::ThresholdMonitor;

/// Accumulates each classified frame, mirrors it remotely and raises
/// threshold alerts. Runs on the detection worker.
pub struct PressureLogger {
    accumulator: Accumulator,
    engine: SyncEngine,
    monitor: ThresholdMonitor,
    alerts: Arc<dyn AlertSender>,
    last_log: LastLogFile,
    last_synced: Option<PressureLog>,
}

impl PressureLogger {
    pub fn new(
        cache: DayCacheStore,
        store: Arc<dyn RemoteStore>,
        device_id: DeviceId,
        alerts: Arc<dyn AlertSender>,
    ) -> Self {
        let last_log = LastLogFile::in_dir(cache.dir());
        let last_synced = last_log.load();
        if let Some(log) = &last_synced {
            info!("Resuming after pressure log {} ({})", log.id, log.posture);
        }
        Self {
            accumulator: Accumulator::new(cache),
            engine: SyncEngine::new(store, device_id),
            monitor: ThresholdMonitor::new(),
            alerts,
            last_log,
            last_synced,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.engine.device_id()
    }

    pub fn last_synced(&self) -> Option<&PressureLog> {
        self.last_synced.as_ref()
    }

    pub fn monitor(&self) -> &ThresholdMonitor {
        &self.monitor
    }

    fn remember(&mut self, report: &SyncReport) {
        let Some(log) = &report.pressure_log else {
            return;
        };
        if let Err(err) = self.last_log.save(log) {
            error!("{err:#}");
        }
        self.last_synced = Some(log.clone());
    }

    /// Runs one frame through accumulation, sync and alerting. Returns the
    /// regions alerted on, if any, alongside the sync report.
    pub fn log(
        &mut self,
        now: NaiveDateTime,
        detection: &PostureDetectionResult,
    ) -> (SyncReport, Option<RegionFlags>) {
        let observation = self.accumulator.observe(now, detection);
        if observation.day_changed {
            self.monitor.start_new_day();
        }

        let device_id = self.engine.device_id();
        self.monitor.refresh(self.engine.store(), device_id, now);

        let report = self.engine.sync(&observation.day, observation.new_session);
        if report.day_created {
            self.accumulator.mark_day_created(observation.day.date);
        }
        self.remember(&report);

        let alerted = observation
            .session()
            .and_then(|session| self.monitor.check(self.alerts.as_ref(), device_id, &session.seconds));
        if let Some(flags) = &alerted {
            debug!(
                "Alerted on {} region(s) for device {device_id}",
                flags.regions().count()
            );
        }

        (report, alerted)
    }
}

impl Recorder for PressureLogger {
    fn record(&mut self, timestamp: NaiveDateTime, _heatmap: &Heatmap, detection: &PostureDetectionResult) -> bool {
        self.log(timestamp, detection).0.ok
    }
}
