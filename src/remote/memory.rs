use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};

use super::models::{DayLog, DeviceId, DeviceRecord, PatientRecord, PressureLog, WriteOutcome};
use super::store::RemoteStore;

#[derive(Default)]
struct Tables {
    devices: BTreeMap<DeviceId, DeviceRecord>,
    patients: BTreeMap<DeviceId, PatientRecord>,
    day_logs: BTreeMap<i64, DayLog>,
    pressure_logs: BTreeMap<i64, PressureLog>,
    heatmaps: BTreeMap<DeviceId, Vec<f64>>,
    offline: bool,
    /// Only filled by stores built with [`MemoryStore::recording`].
    calls: Option<Vec<&'static str>>,
}

/// Process-local [`RemoteStore`]. Used when no remote url is configured,
/// and as the store double in tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that also remembers the name of every call made on it.
    pub fn recording() -> Self {
        let store = Self::default();
        store.lock().calls = Some(Vec::new());
        store
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records the call and fails it while offline.
    fn begin(&self, call: &'static str) -> Result<MutexGuard<'_, Tables>> {
        let mut tables = self.lock();
        if let Some(calls) = tables.calls.as_mut() {
            calls.push(call);
        }
        if tables.offline {
            bail!("{call}: store offline");
        }
        Ok(tables)
    }

    /// While offline every call fails with a transport-style error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn put_patient(&self, patient: PatientRecord) {
        self.lock().patients.insert(patient.device_id, patient);
    }

    /// Names of the operations invoked so far, in order. Always empty
    /// unless the store was built with [`MemoryStore::recording`].
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone().unwrap_or_default()
    }

    pub fn day_log(&self, id: i64) -> Option<DayLog> {
        self.lock().day_logs.get(&id).cloned()
    }

    pub fn forget_day_log(&self, id: i64) {
        self.lock().day_logs.remove(&id);
    }

    pub fn forget_pressure_log(&self, id: i64) {
        self.lock().pressure_logs.remove(&id);
    }

    pub fn pressure_log(&self, id: i64) -> Option<PressureLog> {
        self.lock().pressure_logs.get(&id).cloned()
    }

    pub fn heatmap(&self, device_id: DeviceId) -> Option<Vec<f64>> {
        self.lock().heatmaps.get(&device_id).cloned()
    }
}

impl RemoteStore for MemoryStore {
    fn fetch_device(&self, id: DeviceId) -> Result<Option<DeviceRecord>> {
        Ok(self.begin("fetch_device")?.devices.get(&id).cloned())
    }

    fn create_device(&self, device: &DeviceRecord) -> Result<WriteOutcome<DeviceRecord>> {
        let mut tables = self.begin("create_device")?;
        tables.devices.insert(device.id, device.clone());
        Ok(WriteOutcome::Created(device.clone()))
    }

    fn remove_device(&self, id: DeviceId) -> Result<Option<DeviceRecord>> {
        Ok(self.begin("remove_device")?.devices.remove(&id))
    }

    fn fetch_patient_by_device(&self, device_id: DeviceId) -> Result<Option<PatientRecord>> {
        Ok(self.begin("fetch_patient_by_device")?.patients.get(&device_id).cloned())
    }

    fn create_day_log(&self, log: &DayLog) -> Result<WriteOutcome<DayLog>> {
        let mut tables = self.begin("create_day_log")?;
        tables.day_logs.insert(log.id, log.clone());
        Ok(WriteOutcome::Created(log.clone()))
    }

    fn update_day_log(&self, log: &DayLog) -> Result<WriteOutcome<DayLog>> {
        let mut tables = self.begin("update_day_log")?;
        Ok(match tables.day_logs.get_mut(&log.id) {
            Some(row) => {
                *row = log.clone();
                WriteOutcome::Updated(log.clone())
            }
            None => WriteOutcome::NotFound,
        })
    }

    fn fetch_day_logs(&self) -> Result<Vec<DayLog>> {
        Ok(self.begin("fetch_day_logs")?.day_logs.values().cloned().collect())
    }

    fn create_pressure_log(&self, log: &PressureLog) -> Result<WriteOutcome<PressureLog>> {
        let mut tables = self.begin("create_pressure_log")?;
        tables.pressure_logs.insert(log.id, log.clone());
        Ok(WriteOutcome::Created(log.clone()))
    }

    fn update_pressure_log(&self, log: &PressureLog) -> Result<WriteOutcome<PressureLog>> {
        let mut tables = self.begin("update_pressure_log")?;
        Ok(match tables.pressure_logs.get_mut(&log.id) {
            Some(row) => {
                *row = log.clone();
                WriteOutcome::Updated(log.clone())
            }
            None => WriteOutcome::NotFound,
        })
    }

    fn fetch_pressure_logs(&self, day_id: i64) -> Result<Vec<PressureLog>> {
        Ok(self
            .begin("fetch_pressure_logs")?
            .pressure_logs
            .values()
            .filter(|log| log.day_id == day_id)
            .cloned()
            .collect())
    }

    fn broadcast_heatmap(&self, device_id: DeviceId, values: &[f64]) -> Result<()> {
        self.begin("broadcast_heatmap")?
            .heatmaps
            .insert(device_id, values.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day_log(id: i64) -> DayLog {
        DayLog {
            id,
            day: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            device_id: 7,
            accumulated_occiput: 0,
            accumulated_scapula: 0,
            accumulated_elbow: 0,
            accumulated_heel: 0,
            accumulated_hip: 0,
        }
    }

    #[test]
    fn update_of_a_missing_row_is_not_found() {
        let store = MemoryStore::new();
        assert_eq!(store.update_day_log(&day_log(1)).unwrap(), WriteOutcome::NotFound);
        store.create_day_log(&day_log(1)).unwrap();
        assert!(store.update_day_log(&day_log(1)).unwrap().is_found());
        assert_eq!(store.fetch_day_logs().unwrap().len(), 1);
    }

    #[test]
    fn offline_store_fails_but_records_the_call() {
        let store = MemoryStore::recording();
        store.set_offline(true);
        assert!(store.fetch_day_logs().is_err());
        assert_eq!(store.calls(), ["fetch_day_logs"]);
    }

    #[test]
    fn plain_store_keeps_no_call_history() {
        let store = MemoryStore::new();
        for _ in 0..1000 {
            store.update_day_log(&day_log(1)).unwrap();
        }
        assert!(store.calls().is_empty());
        assert!(store.lock().calls.is_none());
    }
}
