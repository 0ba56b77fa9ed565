use chrono::{NaiveDate, NaiveDateTime};
use log::{error, info};

use crate::detection::PostureDetectionResult;

use super::models::{DayCache, PressureCache};
use super::store::DayCacheStore;

/// What one observation did to the local cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Today's cache after the update (already persisted).
    pub day: DayCache,
    /// A new session entry was appended.
    pub new_session: bool,
    /// The previous session belonged to an earlier day.
    pub day_changed: bool,
    /// Seconds credited to the flagged regions.
    pub credited: u64,
}

impl Observation {
    pub fn session(&self) -> Option<&PressureCache> {
        self.day.last_entry()
    }
}

/// Folds classified observations into per-day session records.
pub struct Accumulator {
    store: DayCacheStore,
    /// Today's cache, kept to avoid re-reading the file on every frame.
    last_day: Option<DayCache>,
}

impl Accumulator {
    pub fn new(store: DayCacheStore) -> Self {
        Self {
            store,
            last_day: None,
        }
    }

    pub fn store(&self) -> &DayCacheStore {
        &self.store
    }

    fn cached_day(&self, date: NaiveDate) -> Option<&DayCache> {
        self.last_day.as_ref().filter(|day| day.date == date)
    }

    /// Most recent session at or before `today`: in-memory cache, then
    /// today's file, then the newest earlier file with sessions.
    fn last_session(&mut self, today: NaiveDate) -> Option<PressureCache> {
        if let Some(entry) = self.cached_day(today).and_then(|day| day.last_entry()) {
            return Some(entry.clone());
        }

        if self.store.exists(today) {
            let day = self.store.open(today);
            if let Some(entry) = day.last_entry().cloned() {
                self.last_day = Some(day);
                return Some(entry);
            }
        }

        self.store
            .latest_with_entries(today)
            .and_then(|day| day.last_entry().cloned())
    }

    fn today(&self, today: NaiveDate) -> DayCache {
        self.cached_day(today)
            .cloned()
            .unwrap_or_else(|| self.store.open(today))
    }

    /// Records one classified frame observed at `now`.
    ///
    /// The current session is extended when it is from today and has the
    /// same posture; otherwise a new session with zero seconds is appended.
    /// Extending credits the time since the session was last observed to
    /// every flagged region of both the session and the day totals.
    pub fn observe(&mut self, now: NaiveDateTime, detection: &PostureDetectionResult) -> Observation {
        let today = now.date();
        let last = self.last_session(today);

        let day_changed = last
            .as_ref()
            .is_some_and(|entry| entry.updated_at.date() != today);
        let continues = last
            .as_ref()
            .is_some_and(|entry| entry.updated_at.date() == today && entry.posture == detection.posture);

        let mut day = self.today(today);
        let mut credited = 0;

        match last.filter(|_| continues) {
            Some(mut entry) => {
                credited = (now - entry.updated_at).num_seconds().max(0) as u64;
                entry.seconds.credit(&detection.flags, credited);
                entry.updated_at = now;
                day.totals.credit(&detection.flags, credited);
                match day.logs.last_mut() {
                    Some(slot) => *slot = entry,
                    None => day.logs.push(entry),
                }
            }
            None => {
                if day_changed {
                    info!("Day rolled over to {today}; starting a new session");
                }
                let mut entry = PressureCache::start(now, now, detection.posture);
                // Sessions starting within the same second still need distinct ids.
                if let Some(previous) = day.logs.last() {
                    if entry.id <= previous.id {
                        entry.id = previous.id + 1;
                    }
                }
                day.logs.push(entry);
            }
        }

        if let Err(err) = self.store.save(&day) {
            error!("{err:#}");
        }
        self.last_day = Some(day.clone());

        Observation {
            day,
            new_session: !continues,
            day_changed,
            credited,
        }
    }

    /// Marks the day as created remotely and persists that.
    pub fn mark_day_created(&mut self, date: NaiveDate) {
        let mut day = self.today(date);
        if !day.is_new {
            return;
        }
        day.is_new = false;
        if let Err(err) = self.store.save(&day) {
            error!("{err:#}");
        }
        self.last_day = Some(day);
    }
}
