use crate::level::LevelDefinition;
use itertools::Itertools;
use rand::Rng;
use serde::Serialize;

/// How long a hit target stays on the board for its hit animation before
/// the next tick sweeps it away.
pub const HIT_HOLD_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    Visible,
    Hit,
    Expired,
}

/// Presentation-only placement, as percentages of the play area. Never
/// enters the scoring math.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One on-screen character the player must type before its deadline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: u64,
    pub character: char,
    pub position: Position,
    pub spawn_time_ms: u64,
    pub deadline_ms: u64,
    pub state: TargetState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_at_ms: Option<u64>,
}

/// Owns every live target of a session. A pure state container: spawn
/// cadence and expiry sweeps are driven by the session tick, never by
/// internal timers.
#[derive(Debug)]
pub struct TargetBoard {
    targets: Vec<Target>,
    next_id: u64,
    spawned_total: u64,
}

impl TargetBoard {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            next_id: 1,
            spawned_total: 0,
        }
    }

    /// Spawns a fresh target: uniform random character from the level set,
    /// random presentation position, deadline at `now + lifetime`. The
    /// caller is responsible for checking the max-simultaneous bound first;
    /// that policy lives in the session, not here.
    pub fn spawn<R: Rng>(&mut self, level: &LevelDefinition, now_ms: u64, rng: &mut R) -> Target {
        let character = level.character_set[rng.gen_range(0..level.character_set.len())];
        let position = Position {
            x: rng.gen_range(10.0..90.0),
            y: rng.gen_range(20.0..80.0),
        };
        let target = Target {
            id: self.next_id,
            character,
            position,
            spawn_time_ms: now_ms,
            deadline_ms: now_ms + level.target_lifetime_ms,
            state: TargetState::Visible,
            hit_at_ms: None,
        };
        self.next_id += 1;
        self.spawned_total += 1;
        self.targets.push(target.clone());
        target
    }

    /// Expires every visible target whose deadline has passed and removes
    /// it from the board. Returns the expired ids so the caller can record
    /// one miss each. Idempotent: a second sweep at the same instant finds
    /// nothing left to expire.
    pub fn expire_due(&mut self, now_ms: u64) -> Vec<u64> {
        let mut expired = Vec::new();
        for target in &mut self.targets {
            if target.state == TargetState::Visible && target.deadline_ms <= now_ms {
                target.state = TargetState::Expired;
                expired.push(target.id);
            }
        }
        self.targets.retain(|t| t.state != TargetState::Expired);
        expired
    }

    /// Visible → Hit, the only permitted terminal transition besides
    /// expiry. Returns the updated target, or `None` when the id is gone
    /// or already terminal.
    pub fn mark_hit(&mut self, id: u64, now_ms: u64) -> Option<Target> {
        let target = self
            .targets
            .iter_mut()
            .find(|t| t.id == id && t.state == TargetState::Visible)?;
        target.state = TargetState::Hit;
        target.hit_at_ms = Some(now_ms);
        Some(target.clone())
    }

    /// Removes hit targets whose display-hold has elapsed.
    pub fn release_held(&mut self, now_ms: u64) -> Vec<u64> {
        let released: Vec<u64> = self
            .targets
            .iter()
            .filter(|t| {
                t.state == TargetState::Hit
                    && t.hit_at_ms.is_some_and(|at| at + HIT_HOLD_MS <= now_ms)
            })
            .map(|t| t.id)
            .collect();
        self.targets.retain(|t| !released.contains(&t.id));
        released
    }

    /// Unconditional removal, regardless of state.
    pub fn remove(&mut self, id: u64) {
        self.targets.retain(|t| t.id != id);
    }

    pub fn get(&self, id: u64) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// Snapshot of visible targets, oldest spawn first, so ties on a
    /// character resolve to the target closest to expiring.
    pub fn visible_targets(&self) -> Vec<&Target> {
        self.targets
            .iter()
            .filter(|t| t.state == TargetState::Visible)
            .sorted_by_key(|t| t.spawn_time_ms)
            .collect()
    }

    pub fn visible_count(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| t.state == TargetState::Visible)
            .count()
    }

    /// Total targets ever spawned this session, including ones long gone.
    pub fn spawned_total(&self) -> u64 {
        self.spawned_total
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Default for TargetBoard {
    fn default() -> Self {
        Self::new()
    }
}
