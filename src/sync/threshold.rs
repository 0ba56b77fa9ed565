use chrono::{Duration, NaiveDateTime};
use log::{info, warn};

use crate::accumulation::RegionSeconds;
use crate::detection::{Region, RegionFlags};
use crate::remote::{AlertSender, DeviceId, PatientRecord, RemoteStore};

pub const DEFAULT_THRESHOLD_MINUTES: u32 = 120;
const DEFAULT_COOLDOWN_SECS: i64 = 60;
const PATIENT_COOLDOWN_SECS: i64 = 600;

/// Seconds a region may stay under pressure in one session before alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartThreshold {
    pub seconds: RegionSeconds,
}

impl Default for PartThreshold {
    fn default() -> Self {
        let secs = u64::from(DEFAULT_THRESHOLD_MINUTES) * 60;
        Self {
            seconds: RegionSeconds {
                occiput: secs,
                scapula: secs,
                left_elbow: secs,
                right_elbow: secs,
                left_heel: secs,
                right_heel: secs,
                hip: secs,
            },
        }
    }
}

impl PartThreshold {
    /// Patient thresholds are minutes; elbow and heel apply to both sides.
    pub fn from_patient(patient: &PatientRecord) -> Self {
        let secs = |minutes: Option<u32>| {
            u64::from(minutes.unwrap_or(DEFAULT_THRESHOLD_MINUTES)) * 60
        };
        let elbow = secs(patient.threshold_elbow);
        let heel = secs(patient.threshold_heel);
        Self {
            seconds: RegionSeconds {
                occiput: secs(patient.threshold_occiput),
                scapula: secs(patient.threshold_scapula),
                left_elbow: elbow,
                right_elbow: elbow,
                left_heel: heel,
                right_heel: heel,
                hip: secs(patient.threshold_hip),
            },
        }
    }

    pub fn get(&self, region: Region) -> u64 {
        self.seconds.get(region)
    }
}

/// Keeps thresholds fresh and makes sure each region alerts once until the
/// thresholds change or the day rolls over.
pub struct ThresholdMonitor {
    threshold: PartThreshold,
    sent: RegionFlags,
    last_refresh: Option<NaiveDateTime>,
    force_refresh: bool,
    patient_seen: bool,
}

impl Default for ThresholdMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ThresholdMonitor {
    pub fn new() -> Self {
        Self {
            threshold: PartThreshold::default(),
            sent: RegionFlags::default(),
            last_refresh: None,
            force_refresh: true,
            patient_seen: false,
        }
    }

    pub fn threshold(&self) -> &PartThreshold {
        &self.threshold
    }

    pub fn sent(&self) -> &RegionFlags {
        &self.sent
    }

    fn cooldown(&self) -> Duration {
        if self.patient_seen {
            Duration::seconds(PATIENT_COOLDOWN_SECS)
        } else {
            Duration::seconds(DEFAULT_COOLDOWN_SECS)
        }
    }

    /// Clears every sent flag and refreshes thresholds on the next call.
    pub fn start_new_day(&mut self) {
        self.sent = RegionFlags::default();
        self.force_refresh = true;
    }

    fn refresh_due(&self, now: NaiveDateTime) -> bool {
        if self.force_refresh {
            return true;
        }
        match self.last_refresh {
            Some(last) => now - last >= self.cooldown() || now < last,
            None => true,
        }
    }

    /// Fetches the patient thresholds when the cooldown has passed. Returns
    /// whether a fetch was attempted.
    pub fn refresh(&mut self, store: &dyn RemoteStore, device_id: DeviceId, now: NaiveDateTime) -> bool {
        if !self.refresh_due(now) {
            return false;
        }
        self.last_refresh = Some(now);
        self.force_refresh = false;

        let threshold = match store.fetch_patient_by_device(device_id) {
            Ok(Some(patient)) => {
                if patient.has_thresholds() {
                    self.patient_seen = true;
                }
                PartThreshold::from_patient(&patient)
            }
            Ok(None) => PartThreshold::default(),
            Err(err) => {
                warn!("Failed to refresh thresholds for device {device_id}: {err:#}");
                return true;
            }
        };

        if threshold != self.threshold {
            info!("Thresholds changed for device {device_id}; clearing sent alerts");
            self.threshold = threshold;
            self.sent = RegionFlags::default();
        }
        true
    }

    /// Regions at or over threshold in `session` that have not alerted yet.
    pub fn pending(&self, session: &RegionSeconds) -> RegionFlags {
        let mut exceeded = RegionFlags::default();
        for region in Region::ALL {
            if !self.sent.get(region) && session.get(region) >= self.threshold.get(region) {
                exceeded.set(region, true);
            }
        }
        exceeded
    }

    /// Sends one alert for the pending regions. Regions are only marked as
    /// sent when delivery succeeds, so a failure is retried next time.
    pub fn check(
        &mut self,
        alerts: &dyn AlertSender,
        device_id: DeviceId,
        session: &RegionSeconds,
    ) -> Option<RegionFlags> {
        let exceeded = self.pending(session);
        if !exceeded.any() {
            return None;
        }
        if !alerts.notify(device_id, &exceeded) {
            return None;
        }
        for region in exceeded.regions() {
            self.sent.set(region, true);
        }
        Some(exceeded)
    }
}
