//! Stages, levels and the course fee table

use crate::fees::FeeError;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static LEVEL_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([BbIiAa])\s*-?\s*([1-3])\s*$").expect("level code pattern"));

/// Course stage a student or batch belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Beginner,
    Intermediate,
    Advanced,
}

impl Stage {
    /// Single-letter code used in spreadsheet level columns (`B`, `I`, `A`)
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Stage::Beginner => 'B',
            Stage::Intermediate => 'I',
            Stage::Advanced => 'A',
        }
    }

    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_uppercase() {
            'B' => Some(Stage::Beginner),
            'I' => Some(Stage::Intermediate),
            'A' => Some(Stage::Advanced),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Beginner => "beginner",
            Stage::Intermediate => "intermediate",
            Stage::Advanced => "advanced",
        };
        f.write_str(name)
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" | "b" => Ok(Stage::Beginner),
            "intermediate" | "i" => Ok(Stage::Intermediate),
            "advanced" | "a" => Ok(Stage::Advanced),
            other => Err(format!("unknown stage '{other}'")),
        }
    }
}

/// Level within a stage, always in `1..=3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 3;

    #[must_use]
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Level::new(value).ok_or_else(|| format!("level {value} is outside 1-3"))
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a spreadsheet level code such as `B2` or `a-3` into stage and level
#[must_use]
pub fn parse_level_code(raw: &str) -> Option<(Stage, Level)> {
    let caps = LEVEL_CODE.captures(raw)?;
    let stage = caps.get(1)?.as_str().chars().next().and_then(Stage::from_code)?;
    let level = caps.get(2)?.as_str().parse::<u8>().ok().and_then(Level::new)?;
    Some((stage, level))
}

/// One row of the course fee table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseFee {
    pub stage: Stage,
    pub level: Level,
    pub fee_amount: Decimal,
    /// Total course length in months, when known
    #[serde(default)]
    pub duration_months: Option<u32>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Monthly fee amounts keyed by `(stage, level)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseFeeTable {
    entries: Vec<CourseFee>,
}

impl CourseFeeTable {
    #[must_use]
    pub fn new(entries: Vec<CourseFee>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[CourseFee] {
        &self.entries
    }

    /// Find the active fee entry for a stage and level
    ///
    /// # Errors
    ///
    /// `CourseNotConfigured` when the stage has no active entry at all,
    /// `LevelNotConfigured` when the stage is configured but the level is not.
    pub fn lookup(&self, stage: Stage, level: Level) -> Result<&CourseFee, FeeError> {
        let mut stage_entries = self
            .entries
            .iter()
            .filter(|entry| entry.active && entry.stage == stage)
            .peekable();

        if stage_entries.peek().is_none() {
            return Err(FeeError::CourseNotConfigured { stage });
        }

        stage_entries
            .find(|entry| entry.level == level)
            .ok_or(FeeError::LevelNotConfigured { stage, level })
    }
}

impl From<Vec<CourseFee>> for CourseFeeTable {
    fn from(entries: Vec<CourseFee>) -> Self {
        Self::new(entries)
    }
}
