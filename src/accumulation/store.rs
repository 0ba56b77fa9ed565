use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, warn};

use super::models::DayCache;

const FILE_PREFIX: &str = "daycache_";
const FILE_SUFFIX: &str = ".json";

/// Day caches persisted as `daycache_YYYYMMDD.json` under one directory.
#[derive(Debug, Clone)]
pub struct DayCacheStore {
    dir: PathBuf,
}

impl DayCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(date: NaiveDate) -> String {
        format!("{FILE_PREFIX}{}{FILE_SUFFIX}", date.format("%Y%m%d"))
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(Self::file_name(date))
    }

    pub fn exists(&self, date: NaiveDate) -> bool {
        self.path_for(date).is_file()
    }

    /// Loads the cache for `date`. A missing or unreadable file yields a
    /// fresh cache that still has to be created remotely.
    pub fn open(&self, date: NaiveDate) -> DayCache {
        let path = self.path_for(date);
        if !path.exists() {
            return DayCache::new(date);
        }

        let loaded = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .and_then(|raw| {
                serde_json::from_str::<DayCache>(&raw)
                    .with_context(|| format!("Failed to parse {}", path.display()))
            });
        match loaded {
            Ok(day) => day,
            Err(err) => {
                warn!("{err:#}; starting a fresh day cache");
                DayCache::new(date)
            }
        }
    }

    pub fn save(&self, day: &DayCache) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {}", self.dir.display()))?;
        let path = self.path_for(day.date);
        let serialized = serde_json::to_string(day)?;
        fs::write(&path, serialized)
            .with_context(|| format!("Failed to write day cache {}", path.display()))?;
        debug!("Saved day cache {} ({} sessions)", day.id, day.logs.len());
        Ok(())
    }

    /// Dates with a cache file, newest first.
    pub fn cached_dates(&self) -> Vec<NaiveDate> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                if self.dir.exists() {
                    warn!("Failed to list cache directory {}: {err}", self.dir.display());
                }
                return Vec::new();
            }
        };

        let mut dates: Vec<NaiveDate> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let stamp = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
                NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()
            })
            .collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        dates
    }

    /// Newest day cache dated on or before `date` that has at least one
    /// session.
    pub fn latest_with_entries(&self, date: NaiveDate) -> Option<DayCache> {
        self.cached_dates()
            .into_iter()
            .filter(|&cached| cached <= date)
            .map(|cached| self.open(cached))
            .find(|day| !day.logs.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulation::models::PressureCache;
    use crate::detection::PostureClass;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn day_with_session(d: u32) -> DayCache {
        let mut day = DayCache::new(date(d));
        let at = date(d).and_hms_opt(9, 0, 0).unwrap();
        day.logs.push(PressureCache::start(at, at, PostureClass::Prone));
        day
    }

    #[test]
    fn file_names_follow_the_date() {
        assert_eq!(DayCacheStore::file_name(date(7)), "daycache_20240507.json");
    }

    #[test]
    fn missing_file_opens_as_new_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = DayCacheStore::new(dir.path());
        let day = store.open(date(1));
        assert!(day.is_new);
        assert_eq!(day.id, 20240501);
        assert!(day.logs.is_empty());
    }

    #[test]
    fn corrupt_file_opens_as_new_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = DayCacheStore::new(dir.path());
        fs::write(store.path_for(date(1)), "{oops").unwrap();
        assert!(store.open(date(1)).is_new);
    }

    #[test]
    fn save_then_open_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = DayCacheStore::new(dir.path().join("nested"));
        let mut day = day_with_session(2);
        day.is_new = false;
        store.save(&day).unwrap();
        assert!(store.exists(date(2)));
        assert_eq!(store.open(date(2)), day);
    }

    #[test]
    fn backward_scan_skips_future_and_empty_days() {
        let dir = tempfile::tempdir().unwrap();
        let store = DayCacheStore::new(dir.path());
        store.save(&day_with_session(3)).unwrap();
        store.save(&DayCache::new(date(5))).unwrap();
        store.save(&day_with_session(9)).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(store.cached_dates(), vec![date(9), date(5), date(3)]);
        let found = store.latest_with_entries(date(6)).unwrap();
        assert_eq!(found.date, date(3));
        assert!(store.latest_with_entries(date(2)).is_none());
    }
}
