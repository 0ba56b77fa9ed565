use std::sync::Arc;

use anyhow::{bail, Result};
use log::{debug, info, warn};

use crate::accumulation::{DayCache, PressureCache};
use crate::remote::{DayLog, DeviceId, PressureLog, RemoteStore, WriteOutcome};

/// Outcome of pushing one observation's cache state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// The day row was created remotely during this push.
    pub day_created: bool,
    /// The pressure log as the store returned it, when that step succeeded.
    pub pressure_log: Option<PressureLog>,
    /// Every step succeeded.
    pub ok: bool,
}

pub fn to_day_log(day: &DayCache, device_id: DeviceId) -> DayLog {
    let totals = &day.totals;
    DayLog {
        id: day.id,
        day: day.date,
        device_id,
        accumulated_occiput: totals.occiput as i64,
        accumulated_scapula: totals.scapula as i64,
        accumulated_elbow: totals.left_elbow.max(totals.right_elbow) as i64,
        accumulated_heel: totals.left_heel.max(totals.right_heel) as i64,
        accumulated_hip: totals.hip as i64,
    }
}

pub fn to_pressure_log(entry: &PressureCache, day_id: i64) -> PressureLog {
    let seconds = &entry.seconds;
    PressureLog {
        id: entry.id,
        day_id,
        created_at: entry.started_at,
        updated_at: entry.updated_at,
        posture: entry.posture,
        caution_occiput: seconds.occiput as i64,
        caution_scapula: seconds.scapula as i64,
        caution_elbow: seconds.left_elbow.max(seconds.right_elbow) as i64,
        caution_heel: seconds.left_heel.max(seconds.right_heel) as i64,
        caution_hip: seconds.hip as i64,
    }
}

/// Mirrors local cache state into the remote store. Updates that find no
/// row fall back to a create; nothing is retried beyond that.
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    device_id: DeviceId,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn RemoteStore>, device_id: DeviceId) -> Self {
        Self { store, device_id }
    }

    pub fn store(&self) -> &dyn RemoteStore {
        self.store.as_ref()
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Returns whether the row had to be created.
    fn push_day(&self, day: &DayCache) -> Result<bool> {
        let log = to_day_log(day, self.device_id);
        if day.is_new {
            return match self.store.create_day_log(&log)? {
                WriteOutcome::NotFound => bail!("store returned no row creating day log {}", log.id),
                _ => {
                    info!("Created day log {}", log.id);
                    Ok(true)
                }
            };
        }

        match self.store.update_day_log(&log)? {
            WriteOutcome::NotFound => {
                debug!("Day log {} missing remotely; creating it", log.id);
                match self.store.create_day_log(&log)? {
                    WriteOutcome::NotFound => bail!("store returned no row creating day log {}", log.id),
                    _ => Ok(true),
                }
            }
            _ => Ok(false),
        }
    }

    fn push_session(&self, entry: &PressureCache, day_id: i64, new_session: bool) -> Result<PressureLog> {
        let log = to_pressure_log(entry, day_id);
        let outcome = if new_session {
            self.store.create_pressure_log(&log)?
        } else {
            match self.store.update_pressure_log(&log)? {
                WriteOutcome::NotFound => {
                    debug!("Pressure log {} missing remotely; creating it", log.id);
                    self.store.create_pressure_log(&log)?
                }
                found => found,
            }
        };
        match outcome.into_record() {
            Some(record) => Ok(record),
            None => bail!("store returned no row for pressure log {}", log.id),
        }
    }

    /// Pushes the day totals and its newest session.
    pub fn sync(&self, day: &DayCache, new_session: bool) -> SyncReport {
        let mut report = SyncReport::default();

        match self.push_day(day) {
            Ok(created) => report.day_created = created,
            Err(err) => {
                warn!("Failed to sync day log {}: {err:#}", day.id);
                return report;
            }
        }

        let Some(entry) = day.last_entry() else {
            report.ok = true;
            return report;
        };
        match self.push_session(entry, day.id, new_session) {
            Ok(record) => {
                report.pressure_log = Some(record);
                report.ok = true;
            }
            Err(err) => warn!("Failed to sync pressure log {}: {err:#}", entry.id),
        }
        report
    }
}
