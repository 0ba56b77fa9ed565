use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::detection::{PostureClass, Region, RegionFlags};

/// Whole seconds per region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSeconds {
    pub occiput: u64,
    pub scapula: u64,
    pub left_elbow: u64,
    pub right_elbow: u64,
    pub left_heel: u64,
    pub right_heel: u64,
    pub hip: u64,
}

impl RegionSeconds {
    pub fn get(&self, region: Region) -> u64 {
        match region {
            Region::Occiput => self.occiput,
            Region::Scapula => self.scapula,
            Region::LeftElbow => self.left_elbow,
            Region::RightElbow => self.right_elbow,
            Region::LeftHeel => self.left_heel,
            Region::RightHeel => self.right_heel,
            Region::Hip => self.hip,
        }
    }

    fn slot(&mut self, region: Region) -> &mut u64 {
        match region {
            Region::Occiput => &mut self.occiput,
            Region::Scapula => &mut self.scapula,
            Region::LeftElbow => &mut self.left_elbow,
            Region::RightElbow => &mut self.right_elbow,
            Region::LeftHeel => &mut self.left_heel,
            Region::RightHeel => &mut self.right_heel,
            Region::Hip => &mut self.hip,
        }
    }

    /// Adds `seconds` to every region set in `flags`.
    pub fn credit(&mut self, flags: &RegionFlags, seconds: u64) {
        for region in flags.regions() {
            let slot = self.slot(region);
            *slot = slot.saturating_add(seconds);
        }
    }
}

/// One posture session within a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureCache {
    /// Session start as `YYYYMMDDHHMMSS`, bumped past the previous session's
    /// id when two sessions start within the same second.
    pub id: i64,
    pub started_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    /// Time of the most recent observation credited to this session.
    pub updated_at: NaiveDateTime,
    pub seconds: RegionSeconds,
    pub posture: PostureClass,
}

impl PressureCache {
    pub fn start(at: NaiveDateTime, created_at: NaiveDateTime, posture: PostureClass) -> Self {
        Self {
            id: session_id(at),
            started_at: at,
            created_at,
            updated_at: at,
            seconds: RegionSeconds::default(),
            posture,
        }
    }
}

pub fn session_id(at: NaiveDateTime) -> i64 {
    day_id(at.date()) * 1_000_000
        + i64::from(at.hour()) * 10_000
        + i64::from(at.minute()) * 100
        + i64::from(at.second())
}

pub fn day_id(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day())
}

/// Local accumulation record for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayCache {
    /// `YYYYMMDD`.
    pub id: i64,
    pub date: NaiveDate,
    pub totals: RegionSeconds,
    /// Not yet created in the remote store.
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub logs: Vec<PressureCache>,
}

impl DayCache {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: day_id(date),
            date,
            totals: RegionSeconds::default(),
            is_new: true,
            logs: Vec::new(),
        }
    }

    pub fn last_entry(&self) -> Option<&PressureCache> {
        self.logs.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn ids_encode_calendar_fields() {
        let start = at(2024, 3, 9, 7, 5, 4);
        assert_eq!(session_id(start), 20240309070504);
        assert_eq!(day_id(start.date()), 20240309);
    }

    #[test]
    fn credit_only_touches_flagged_regions() {
        let mut seconds = RegionSeconds::default();
        let flags = RegionFlags {
            occiput: true,
            left_heel: true,
            ..RegionFlags::default()
        };
        seconds.credit(&flags, 30);
        seconds.credit(&flags, 15);
        assert_eq!(seconds.get(Region::Occiput), 45);
        assert_eq!(seconds.get(Region::LeftHeel), 45);
        assert_eq!(seconds.get(Region::RightHeel), 0);
        assert_eq!(seconds.hip, 0);
    }

    #[test]
    fn day_cache_round_trips_through_json() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let mut day = DayCache::new(date);
        day.logs.push(PressureCache::start(
            at(2024, 3, 9, 8, 0, 0),
            at(2024, 3, 9, 8, 0, 0),
            PostureClass::SupineBoth,
        ));
        let json = serde_json::to_string(&day).unwrap();
        assert!(json.contains("\"posture\":\"supine_both\""));
        let back: DayCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back, day);
    }
}
