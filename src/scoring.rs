use crate::level::LevelDefinition;
use crate::target::Target;
use serde::Serialize;

/// Consecutive hits closer together than this keep the combo alive; a gap
/// at or above it restarts the combo at 1.
pub const COMBO_WINDOW_MS: u64 = 2000;

const BASE_POINTS: f64 = 10.0;
const COMBO_BONUS_STEP: f64 = 0.1;
const MAX_COMBO_BONUS: f64 = 2.0;

/// The outcome of one scored hit, handed to event consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitScore {
    pub target_id: u64,
    pub points: u32,
    pub reaction_time_ms: u64,
    pub combo: u32,
}

/// Running score state for one session.
///
/// The points formula is the scoring contract: the same sequence of
/// (reaction time, combo) pairs must always produce identical totals.
#[derive(Debug, Clone, Default)]
pub struct ScoreBoard {
    pub score: u32,
    pub combo_count: u32,
    pub max_combo: u32,
    pub hit_count: u32,
    pub miss_count: u32,
    pub last_hit_at_ms: Option<u64>,
    pub accuracy: f64,
    pub wpm: f64,
    reaction_samples_ms: Vec<u64>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores a confirmed hit.
    ///
    /// `points = round(base * (1 + time_bonus + combo_bonus))` where
    /// `base = 10 * difficulty multiplier`, `time_bonus` is the unexpired
    /// fraction of the target lifetime, and `combo_bonus` is 10% per combo
    /// step capped at 200%.
    pub fn register_hit(
        &mut self,
        target: &Target,
        now_ms: u64,
        level: &LevelDefinition,
        elapsed_ms: u64,
    ) -> HitScore {
        let reaction_time_ms = now_ms.saturating_sub(target.spawn_time_ms);

        self.combo_count = match self.last_hit_at_ms {
            Some(last) if now_ms.saturating_sub(last) < COMBO_WINDOW_MS => self.combo_count + 1,
            _ => 1,
        };
        self.last_hit_at_ms = Some(now_ms);
        self.max_combo = self.max_combo.max(self.combo_count);

        let lifetime = level.target_lifetime_ms as f64;
        let base = BASE_POINTS * level.difficulty.multiplier();
        let time_bonus = (lifetime - reaction_time_ms as f64).max(0.0) / lifetime;
        let combo_bonus = (self.combo_count as f64 * COMBO_BONUS_STEP).min(MAX_COMBO_BONUS);
        let points = (base * (1.0 + time_bonus + combo_bonus)).round() as u32;

        self.score += points;
        self.hit_count += 1;
        self.reaction_samples_ms.push(reaction_time_ms);
        self.recompute_accuracy();
        self.recompute_wpm(elapsed_ms);

        HitScore {
            target_id: target.id,
            points,
            reaction_time_ms,
            combo: self.combo_count,
        }
    }

    /// Records one expired target. Wrong keystrokes never come through
    /// here; they only reset the combo via [`ScoreBoard::register_stray`].
    pub fn register_miss(&mut self) {
        self.miss_count += 1;
        self.combo_count = 0;
        self.recompute_accuracy();
    }

    /// A keystroke that matched nothing. Breaks the combo but is not an
    /// attempt for accuracy purposes.
    pub fn register_stray(&mut self) {
        self.combo_count = 0;
    }

    /// Refreshes the time-derived stat; the countdown tick calls this so
    /// the displayed WPM decays between hits.
    pub fn refresh_wpm(&mut self, elapsed_ms: u64) {
        self.recompute_wpm(elapsed_ms);
    }

    pub fn reaction_samples(&self) -> &[u64] {
        &self.reaction_samples_ms
    }

    fn recompute_accuracy(&mut self) {
        let attempts = self.hit_count + self.miss_count;
        self.accuracy = if attempts == 0 {
            0.0
        } else {
            self.hit_count as f64 / attempts as f64 * 100.0
        };
    }

    fn recompute_wpm(&mut self, elapsed_ms: u64) {
        let minutes = elapsed_ms as f64 / 60_000.0;
        self.wpm = if minutes > 0.0 {
            (self.hit_count as f64 / 5.0) / minutes
        } else {
            0.0
        };
    }
}
