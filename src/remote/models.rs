use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::detection::PostureClass;

pub type DeviceId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub created_at: NaiveDateTime,
}

/// Patient assigned to a device. Thresholds are in minutes; a missing value
/// means the patient has no override for that region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: i64,
    pub device_id: DeviceId,
    #[serde(default)]
    pub threshold_occiput: Option<u32>,
    #[serde(default)]
    pub threshold_scapula: Option<u32>,
    #[serde(default)]
    pub threshold_elbow: Option<u32>,
    #[serde(default)]
    pub threshold_heel: Option<u32>,
    #[serde(default)]
    pub threshold_hip: Option<u32>,
}

impl PatientRecord {
    pub fn has_thresholds(&self) -> bool {
        [
            self.threshold_occiput,
            self.threshold_scapula,
            self.threshold_elbow,
            self.threshold_heel,
            self.threshold_hip,
        ]
        .iter()
        .any(Option::is_some)
    }
}

/// Daily totals row. Left and right sides share one remote column each
/// for elbows and heels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayLog {
    pub id: i64,
    pub day: NaiveDate,
    pub device_id: DeviceId,
    pub accumulated_occiput: i64,
    pub accumulated_scapula: i64,
    pub accumulated_elbow: i64,
    pub accumulated_heel: i64,
    pub accumulated_hip: i64,
}

/// One posture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureLog {
    pub id: i64,
    pub day_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub posture: PostureClass,
    pub caution_occiput: i64,
    pub caution_scapula: i64,
    pub caution_elbow: i64,
    pub caution_heel: i64,
    pub caution_hip: i64,
}

/// Result of a remote write. `NotFound` means the store had no row to act
/// on (or returned nothing), which is distinct from a transport error.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    Created(T),
    Updated(T),
    NotFound,
}

impl<T> WriteOutcome<T> {
    pub fn is_found(&self) -> bool {
        !matches!(self, WriteOutcome::NotFound)
    }

    pub fn into_record(self) -> Option<T> {
        match self {
            WriteOutcome::Created(record) | WriteOutcome::Updated(record) => Some(record),
            WriteOutcome::NotFound => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patient_without_threshold_columns_deserializes() {
        let patient: PatientRecord =
            serde_json::from_str(r#"{"id": 3, "device_id": 4242, "threshold_hip": 90}"#).unwrap();
        assert_eq!(patient.threshold_hip, Some(90));
        assert_eq!(patient.threshold_occiput, None);
        assert!(patient.has_thresholds());

        let bare: PatientRecord = serde_json::from_str(r#"{"id": 3, "device_id": 4242}"#).unwrap();
        assert!(!bare.has_thresholds());
    }

    #[test]
    fn write_outcome_exposes_the_record() {
        assert_eq!(WriteOutcome::Created(1).into_record(), Some(1));
        assert_eq!(WriteOutcome::Updated(2).into_record(), Some(2));
        assert!(!WriteOutcome::<i32>::NotFound.is_found());
    }
}
