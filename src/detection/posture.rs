use std::fmt;

use serde::{Deserialize, Serialize};

/// Anatomical pressure zones tracked for risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Occiput,
    Scapula,
    LeftElbow,
    RightElbow,
    LeftHeel,
    RightHeel,
    Hip,
}

impl Region {
    pub const ALL: [Region; 7] = [
        Region::Occiput,
        Region::Scapula,
        Region::LeftElbow,
        Region::RightElbow,
        Region::LeftHeel,
        Region::RightHeel,
        Region::Hip,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Region::Occiput => "occiput",
            Region::Scapula => "scapula",
            Region::LeftElbow => "left elbow",
            Region::RightElbow => "right elbow",
            Region::LeftHeel => "left heel",
            Region::RightHeel => "right heel",
            Region::Hip => "hip",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One boolean per [`Region`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionFlags {
    pub occiput: bool,
    pub scapula: bool,
    pub left_elbow: bool,
    pub right_elbow: bool,
    pub left_heel: bool,
    pub right_heel: bool,
    pub hip: bool,
}

impl RegionFlags {
    pub fn get(&self, region: Region) -> bool {
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

    pub fn set(&mut self, region: Region, value: bool) {
        let slot = match region {
            Region::Occiput => &mut self.occiput,
            Region::Scapula => &mut self.scapula,
            Region::LeftElbow => &mut self.left_elbow,
            Region::RightElbow => &mut self.right_elbow,
            Region::LeftHeel => &mut self.left_heel,
            Region::RightHeel => &mut self.right_heel,
            Region::Hip => &mut self.hip,
        };
        *slot = value;
    }

    pub fn any(&self) -> bool {
        Region::ALL.iter().any(|&region| self.get(region))
    }

    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        Region::ALL.into_iter().filter(|&region| self.get(region))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureClass {
    Supine,
    /// Supine with the left heel cleared.
    SupineLeft,
    /// Supine with the right heel cleared.
    SupineRight,
    /// Supine with both heels cleared.
    SupineBoth,
    LeftSide,
    RightSide,
    Prone,
    Sitting,
    Unknown,
}

impl PostureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            PostureClass::Supine => "supine",
            PostureClass::SupineLeft => "supine_left",
            PostureClass::SupineRight => "supine_right",
            PostureClass::SupineBoth => "supine_both",
            PostureClass::LeftSide => "left_side",
            PostureClass::RightSide => "right_side",
            PostureClass::Prone => "prone",
            PostureClass::Sitting => "sitting",
            PostureClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PostureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output before the region policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawPrediction {
    pub class_index: i64,
    pub upper_body: bool,
    pub right_leg: bool,
    pub left_leg: bool,
    pub feet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostureDetectionResult {
    pub posture: PostureClass,
    pub flags: RegionFlags,
}

impl PostureDetectionResult {
    pub fn unknown() -> Self {
        Self {
            posture: PostureClass::Unknown,
            flags: RegionFlags::default(),
        }
    }
}

/// Base row of the policy table, keyed by the classifier's class index.
struct PolicyRow {
    class_index: i64,
    posture: PostureClass,
    flags: RegionFlags,
}

const fn flags(occiput: bool, scapula: bool, elbows: (bool, bool), heels: (bool, bool), hip: bool) -> RegionFlags {
    RegionFlags {
        occiput,
        scapula,
        left_elbow: elbows.0,
        right_elbow: elbows.1,
        left_heel: heels.0,
        right_heel: heels.1,
        hip,
    }
}

const POLICY: [PolicyRow; 5] = [
    PolicyRow {
        class_index: 0,
        posture: PostureClass::Supine,
        flags: flags(true, true, (true, true), (true, true), true),
    },
    PolicyRow {
        class_index: 1,
        posture: PostureClass::LeftSide,
        flags: flags(false, false, (true, false), (true, false), false),
    },
    PolicyRow {
        class_index: 2,
        posture: PostureClass::RightSide,
        flags: flags(false, false, (false, true), (false, true), false),
    },
    PolicyRow {
        class_index: 3,
        posture: PostureClass::Prone,
        flags: flags(false, false, (false, false), (false, false), false),
    },
    PolicyRow {
        class_index: 5,
        posture: PostureClass::Sitting,
        flags: flags(false, false, (false, false), (false, false), true),
    },
];

/// Maps a raw prediction onto posture and region flags.
///
/// Supine is refined by the leg flags: a heel whose leg flag is clear is
/// treated as off the surface, and the variant is named after the cleared
/// side. Unlisted class indices map to [`PostureClass::Unknown`].
pub fn apply_policy(raw: &RawPrediction) -> PostureDetectionResult {
    let Some(row) = POLICY.iter().find(|row| row.class_index == raw.class_index) else {
        return PostureDetectionResult::unknown();
    };

    let mut result = PostureDetectionResult {
        posture: row.posture,
        flags: row.flags,
    };

    if row.posture == PostureClass::Supine {
        result.flags.left_heel = raw.left_leg;
        result.flags.right_heel = raw.right_leg;
        result.posture = match (raw.left_leg, raw.right_leg) {
            (true, true) => PostureClass::Supine,
            (false, true) => PostureClass::SupineLeft,
            (true, false) => PostureClass::SupineRight,
            (false, false) => PostureClass::SupineBoth,
        };
    }

    result
}
