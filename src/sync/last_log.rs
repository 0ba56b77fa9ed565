use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;

use crate::remote::PressureLog;

pub const LAST_LOG_FILE: &str = "last_pressure_log.json";

/// The last pressure log the store accepted, kept on disk for warm restarts.
#[derive(Debug, Clone)]
pub struct LastLogFile {
    path: PathBuf,
}

impl LastLogFile {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(LAST_LOG_FILE),
        }
    }

    pub fn load(&self) -> Option<PressureLog> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return None,
        };
        match serde_json::from_str(&raw) {
            Ok(log) => Some(log),
            Err(err) => {
                warn!("Ignoring unreadable {}: {err}", self.path.display());
                None
            }
        }
    }

    pub fn save(&self, log: &PressureLog) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, serde_json::to_string(log)?)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::PostureClass;
    use chrono::NaiveDate;

    #[test]
    fn missing_or_corrupt_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = LastLogFile::in_dir(dir.path());
        assert!(file.load().is_none());
        fs::write(dir.path().join(LAST_LOG_FILE), "[").unwrap();
        assert!(file.load().is_none());
    }

    #[test]
    fn saved_log_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let file = LastLogFile::in_dir(&dir.path().join("cache"));
        let at = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let log = PressureLog {
            id: 20240601080000,
            day_id: 20240601,
            created_at: at,
            updated_at: at,
            posture: PostureClass::Sitting,
            caution_occiput: 0,
            caution_scapula: 0,
            caution_elbow: 0,
            caution_heel: 0,
            caution_hip: 12,
        };
        file.save(&log).unwrap();
        assert_eq!(file.load(), Some(log));
    }
}
