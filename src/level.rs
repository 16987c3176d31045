use crate::error::GameError;
use serde::{Deserialize, Serialize};

/// Difficulty tier of a level. The ordinal mapping (1..=4, with 5 tolerated
/// as expert) matches the integer column the original level data used.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    /// Score multiplier applied to every hit on a level of this tier.
    pub fn multiplier(&self) -> f64 {
        match self {
            Difficulty::Easy => 1.0,
            Difficulty::Medium => 1.5,
            Difficulty::Hard => 2.0,
            Difficulty::Expert => 3.0,
        }
    }

    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            1 => Some(Difficulty::Easy),
            2 => Some(Difficulty::Medium),
            3 => Some(Difficulty::Hard),
            4 | 5 => Some(Difficulty::Expert),
            _ => None,
        }
    }

    pub fn ordinal(&self) -> u8 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 3,
            Difficulty::Expert => 4,
        }
    }
}

/// Static difficulty knobs for one level. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDefinition {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub max_simultaneous_targets: usize,
    pub target_spawn_interval_ms: u64,
    pub target_lifetime_ms: u64,
    pub time_limit_seconds: u32,
    pub target_score: u32,
    pub character_set: Vec<char>,
}

impl LevelDefinition {
    /// Invariants checked when a level is loaded, before any session may
    /// reference it.
    pub fn validate(&self) -> Result<(), GameError> {
        let fail = |reason: &str| {
            Err(GameError::InvalidLevel {
                level_id: self.id,
                reason: reason.to_string(),
            })
        };
        if self.character_set.is_empty() {
            return fail("character set is empty");
        }
        if self.target_lifetime_ms == 0 {
            return fail("target lifetime must be positive");
        }
        if self.max_simultaneous_targets == 0 {
            return fail("must allow at least one simultaneous target");
        }
        if self.target_spawn_interval_ms == 0 {
            return fail("spawn interval must be positive");
        }
        if self.time_limit_seconds == 0 {
            return fail("time limit must be positive");
        }
        Ok(())
    }
}

/// Read-only lookup of level definitions.
pub trait LevelRepository {
    fn get(&self, level_id: u32) -> Result<LevelDefinition, GameError>;
    fn all(&self) -> Vec<LevelDefinition>;
}

/// The built-in level table. Mirrors the original seed data: widening
/// character sets, shrinking time limits and lifetimes as the tiers climb.
#[derive(Debug, Clone)]
pub struct BuiltinLevels {
    levels: Vec<LevelDefinition>,
}

fn letters(range: std::ops::RangeInclusive<char>) -> Vec<char> {
    range.collect()
}

impl BuiltinLevels {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let levels = vec![
            LevelDefinition {
                id: 1,
                name: "Warmup Burrow".to_string(),
                description: "Slow moles and a narrow letter range. Take your time.".to_string(),
                difficulty: Difficulty::Easy,
                max_simultaneous_targets: 2,
                target_spawn_interval_ms: 2000,
                target_lifetime_ms: 3000,
                time_limit_seconds: 120,
                target_score: 500,
                character_set: letters('a'..='h'),
            },
            LevelDefinition {
                id: 2,
                name: "Garden Patrol".to_string(),
                description: "A third mole joins in and the letters spread out.".to_string(),
                difficulty: Difficulty::Easy,
                max_simultaneous_targets: 3,
                target_spawn_interval_ms: 2000,
                target_lifetime_ms: 2500,
                time_limit_seconds: 90,
                target_score: 800,
                character_set: letters('a'..='j'),
            },
            LevelDefinition {
                id: 3,
                name: "Speed Harvest".to_string(),
                description: "Faster spawns across half the alphabet.".to_string(),
                difficulty: Difficulty::Medium,
                max_simultaneous_targets: 4,
                target_spawn_interval_ms: 1500,
                target_lifetime_ms: 2000,
                time_limit_seconds: 75,
                target_score: 1200,
                character_set: letters('a'..='p'),
            },
            LevelDefinition {
                id: 4,
                name: "Night Shift".to_string(),
                description: "The full alphabet with little time to react.".to_string(),
                difficulty: Difficulty::Hard,
                max_simultaneous_targets: 5,
                target_spawn_interval_ms: 1000,
                target_lifetime_ms: 1500,
                time_limit_seconds: 60,
                target_score: 2000,
                character_set: letters('a'..='z'),
            },
            LevelDefinition {
                id: 5,
                name: "Molestorm".to_string(),
                description: "Six moles, one-second lifetimes. Good luck.".to_string(),
                difficulty: Difficulty::Expert,
                max_simultaneous_targets: 6,
                target_spawn_interval_ms: 800,
                target_lifetime_ms: 1000,
                time_limit_seconds: 45,
                target_score: 3000,
                character_set: letters('a'..='z'),
            },
        ];
        Self { levels }
    }
}

impl LevelRepository for BuiltinLevels {
    fn get(&self, level_id: u32) -> Result<LevelDefinition, GameError> {
        let level = self
            .levels
            .iter()
            .find(|l| l.id == level_id)
            .cloned()
            .ok_or(GameError::LevelNotFound(level_id))?;
        level.validate()?;
        Ok(level)
    }

    fn all(&self) -> Vec<LevelDefinition> {
        self.levels.clone()
    }
}
