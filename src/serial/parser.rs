use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::{anyhow, Error};
use chrono::{Local, NaiveDateTime};
use regex::Regex;

/// Physical sensor boards on the harness. `Uno0` sits under the head and
/// only wires six channels; the others each cover two body rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoardId {
    Uno0,
    Uno1,
    Uno2,
    Uno3,
    Uno4,
    Uno5,
    Uno6,
}

impl BoardId {
    pub const ALL: [BoardId; 7] = [
        BoardId::Uno0,
        BoardId::Uno1,
        BoardId::Uno2,
        BoardId::Uno3,
        BoardId::Uno4,
        BoardId::Uno5,
        BoardId::Uno6,
    ];

    pub const HEAD: BoardId = BoardId::Uno0;

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    pub fn is_head(self) -> bool {
        self == Self::HEAD
    }

    /// Wire tag including the trailing underscore, e.g. `UNO3_`.
    pub fn tag(self) -> &'static str {
        match self {
            BoardId::Uno0 => "UNO0_",
            BoardId::Uno1 => "UNO1_",
            BoardId::Uno2 => "UNO2_",
            BoardId::Uno3 => "UNO3_",
            BoardId::Uno4 => "UNO4_",
            BoardId::Uno5 => "UNO5_",
            BoardId::Uno6 => "UNO6_",
        }
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for BoardId {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let upper = value.trim().to_ascii_uppercase();
        let digits = upper
            .strip_prefix("UNO")
            .map(|rest| rest.trim_end_matches('_'))
            .ok_or_else(|| anyhow!("unknown board tag '{value}'"))?;
        digits
            .parse::<usize>()
            .ok()
            .and_then(Self::from_ordinal)
            .ok_or_else(|| anyhow!("unknown board tag '{value}'"))
    }
}

/// All channel values one line carried for one board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardReading {
    pub board: BoardId,
    pub observed_at: NaiveDateTime,
    pub channels: BTreeMap<u32, i64>,
}

impl BoardReading {
    /// Value for `channel`, zero when the line did not carry it.
    pub fn channel(&self, channel: u32) -> i64 {
        self.channels.get(&channel).copied().unwrap_or(0)
    }
}

fn tagged_pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // UNO3_C12 : -40   or   uno3_c12=-40
        Regex::new(r"(?i)\b(UNO[0-6]_)C\d+\s*[:=]\s*-?\d+\b").expect("valid tagged pair pattern")
    })
}

fn tagged_pairs_for(board: BoardId) -> &'static Regex {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        BoardId::ALL
            .iter()
            .map(|board| {
                Regex::new(&format!(r"(?i){}C(\d+)\s*[:=]\s*(-?\d+)", board.tag()))
                    .expect("valid board pair pattern")
            })
            .collect()
    });
    &patterns[board.ordinal()]
}

fn bracket_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\[\s*(UNO[0-6])\s*\]").expect("valid bracket pattern"))
}

fn bracket_prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*\[\s*UNO[0-6]\s*\]\s*").expect("valid bracket prefix pattern")
    })
}

fn bare_pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bC\s*(\d+)\s*[:=]\s*(-?\d+)\b").expect("valid channel pair pattern")
    })
}

fn collect_pairs(pattern: &Regex, text: &str, channels: &mut BTreeMap<u32, i64>) {
    for caps in pattern.captures_iter(text) {
        let channel = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
        let value = caps.get(2).and_then(|m| m.as_str().parse::<i64>().ok());
        if let (Some(channel), Some(value)) = (channel, value) {
            channels.insert(channel, value);
        }
    }
}

/// Parses one line from a board using the current wall clock as the
/// observation time.
pub fn parse_line(line: &str) -> Option<BoardReading> {
    parse_line_at(line, Local::now().naive_local())
}

/// Parses one serial line.
///
/// Two encodings are accepted:
/// * `UNO1_C0: 200 UNO1_C1 = 50`: every token carries the board tag; the
///   first tag on the line picks the board and only its pairs are kept.
/// * `[UNO0] C0=10 C3: 20`: a bracketed tag followed by bare channel pairs.
///
/// Anything else yields `None`.
pub fn parse_line_at(line: &str, observed_at: NaiveDateTime) -> Option<BoardReading> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(caps) = tagged_pair_pattern().captures(line) {
        let board: BoardId = caps.get(1)?.as_str().parse().ok()?;
        let mut channels = BTreeMap::new();
        collect_pairs(tagged_pairs_for(board), line, &mut channels);
        return Some(BoardReading {
            board,
            observed_at,
            channels,
        });
    }

    if let Some(caps) = bracket_tag_pattern().captures(line) {
        let board: BoardId = caps.get(1)?.as_str().parse().ok()?;
        let rest = bracket_prefix_pattern().replace(line, "");
        let mut channels = BTreeMap::new();
        collect_pairs(bare_pair_pattern(), &rest, &mut channels);
        return Some(BoardReading {
            board,
            observed_at,
            channels,
        });
    }

    None
}
