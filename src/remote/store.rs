use anyhow::Result;

use crate::detection::RegionFlags;

use super::models::{DayLog, DeviceId, DeviceRecord, PatientRecord, PressureLog, WriteOutcome};

/// Remote persistence backend. Reads return `None`/empty for missing rows;
/// writes report missing rows as [`WriteOutcome::NotFound`]. `Err` is kept
/// for transport and decoding failures.
pub trait RemoteStore: Send + Sync {
    fn fetch_device(&self, id: DeviceId) -> Result<Option<DeviceRecord>>;
    fn create_device(&self, device: &DeviceRecord) -> Result<WriteOutcome<DeviceRecord>>;
    /// Returns the removed row, if there was one.
    fn remove_device(&self, id: DeviceId) -> Result<Option<DeviceRecord>>;
    fn fetch_patient_by_device(&self, device_id: DeviceId) -> Result<Option<PatientRecord>>;

    fn create_day_log(&self, log: &DayLog) -> Result<WriteOutcome<DayLog>>;
    fn update_day_log(&self, log: &DayLog) -> Result<WriteOutcome<DayLog>>;
    fn fetch_day_logs(&self) -> Result<Vec<DayLog>>;

    fn create_pressure_log(&self, log: &PressureLog) -> Result<WriteOutcome<PressureLog>>;
    fn update_pressure_log(&self, log: &PressureLog) -> Result<WriteOutcome<PressureLog>>;
    fn fetch_pressure_logs(&self, day_id: i64) -> Result<Vec<PressureLog>>;

    /// Publishes the latest heatmap, flattened row-major.
    fn broadcast_heatmap(&self, device_id: DeviceId, values: &[f64]) -> Result<()>;
}

/// Push channel for pressure alerts. Returns whether delivery succeeded.
pub trait AlertSender: Send + Sync {
    fn notify(&self, device_id: DeviceId, exceeded: &RegionFlags) -> bool;
}

/// Human-readable alert text listing the exceeded regions.
pub fn alert_body(exceeded: &RegionFlags) -> String {
    let regions: Vec<&str> = exceeded.regions().map(|region| region.label()).collect();
    if regions.is_empty() {
        "No pressure issues detected.".to_string()
    } else {
        format!("Pressure limit exceeded: {}", regions.join(", "))
    }
}
