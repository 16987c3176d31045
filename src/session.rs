use crate::error::GameError;
use crate::events::SessionEvent;
use crate::identity::UserId;
use crate::level::{LevelDefinition, LevelRepository};
use crate::matcher;
use crate::reconcile::{self, CompletedSession};
use crate::scoring::{HitScore, ScoreBoard};
use crate::stats::ReactionSummary;
use crate::store::{ActiveSession, SessionStore};
use crate::target::{Target, TargetBoard};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use uuid::Uuid;

/// Where a session is in its life. `Ended` is terminal until `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Playing,
    Paused,
    Ended,
}

/// Read-only view of the running state, for UIs and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub level_id: u32,
    pub phase: SessionPhase,
    pub score: u32,
    pub combo_count: u32,
    pub max_combo: u32,
    pub hit_count: u32,
    pub miss_count: u32,
    pub accuracy: f64,
    pub wpm: f64,
    pub time_remaining_ms: u64,
}

/// The live, mutable half of a session. Exists from `start` until `reset`.
#[derive(Debug)]
struct ActiveState {
    session_id: Uuid,
    user_id: Option<UserId>,
    level: LevelDefinition,
    board: TargetBoard,
    score: ScoreBoard,
    rng: StdRng,
    /// Engine clock in ms since start; advances only while playing, so
    /// target deadlines freeze across pauses.
    clock_ms: u64,
    played_ms: u64,
    time_remaining_ms: u64,
    last_spawn_ms: u64,
}

/// Per-game session controller: owns the state machine, the target board,
/// and the score, and serializes every mutation through `&mut self`.
///
/// Driven entirely by `tick(delta_ms)` from an external scheduler (timer,
/// event loop, or test harness); there are no internal timers, which is
/// what lets a late-firing timer be rejected by a phase check instead of
/// corrupting a session that already ended.
pub struct GameSession<L: LevelRepository> {
    levels: L,
    store: Option<Box<dyn SessionStore>>,
    seed: Option<u64>,
    phase: SessionPhase,
    active: Option<ActiveState>,
    completed: Option<CompletedSession>,
    events: Vec<SessionEvent>,
}

impl<L: LevelRepository> GameSession<L> {
    pub fn new(levels: L) -> Self {
        Self {
            levels,
            store: None,
            seed: None,
            phase: SessionPhase::Idle,
            active: None,
            completed: None,
            events: Vec::new(),
        }
    }

    /// Attaches the persistence collaborator finished sessions are saved
    /// through.
    pub fn with_store(mut self, store: Box<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Fixes the RNG seed so target characters and positions replay
    /// identically. Sessions started after the first derive their seed
    /// from it.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Starts a fresh session on the given level. Valid from `Idle` or
    /// `Ended`; every counter starts from zero.
    pub fn start(&mut self, level_id: u32, user_id: Option<UserId>) -> Result<Uuid, GameError> {
        match self.phase {
            SessionPhase::Idle | SessionPhase::Ended => {}
            phase => {
                return Err(GameError::InvalidTransition {
                    phase,
                    command: "start",
                })
            }
        }

        let level = self.levels.get(level_id)?;
        let session_id = Uuid::new_v4();
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        // Derive the next session's seed so repeated runs stay reproducible
        // without replaying the same board.
        self.seed = self.seed.map(|s| s.wrapping_add(1));

        let time_remaining_ms = level.time_limit_seconds as u64 * 1000;
        self.active = Some(ActiveState {
            session_id,
            user_id,
            level,
            board: TargetBoard::new(),
            score: ScoreBoard::new(),
            rng,
            clock_ms: 0,
            played_ms: 0,
            time_remaining_ms,
            last_spawn_ms: 0,
        });
        self.completed = None;
        self.events.clear();
        self.phase = SessionPhase::Playing;
        self.events.push(SessionEvent::TimeUpdated {
            time_remaining_ms,
        });

        // Best-effort bookkeeping: losing the start row only costs resume
        // support, never the session itself.
        if let Some(store) = &self.store {
            if let Err(err) = store.record_start(session_id, user_id, level_id) {
                warn!("failed to record session start {session_id}: {err}");
            }
        }

        info!(
            "started session {session_id} on level {level_id} ({})",
            user_id.map_or_else(|| "guest".to_string(), |u| u.to_string())
        );
        Ok(session_id)
    }

    /// Suspends the countdown and spawn cadence without touching any
    /// counter. Deadlines freeze with the engine clock.
    pub fn pause(&mut self) -> Result<(), GameError> {
        match self.phase {
            SessionPhase::Playing => {
                self.phase = SessionPhase::Paused;
                Ok(())
            }
            phase => Err(GameError::InvalidTransition {
                phase,
                command: "pause",
            }),
        }
    }

    pub fn resume(&mut self) -> Result<(), GameError> {
        match self.phase {
            SessionPhase::Paused => {
                self.phase = SessionPhase::Playing;
                Ok(())
            }
            phase => Err(GameError::InvalidTransition {
                phase,
                command: "resume",
            }),
        }
    }

    /// Advances the session by `delta_ms`: counts down, sweeps expired
    /// targets into misses, spawns on cadence, and auto-ends at zero.
    ///
    /// Only effective while playing. A tick landing during a pause is an
    /// accepted no-op (pausing legitimately races an in-flight timer);
    /// one landing on an idle or ended session is rejected so a timer
    /// that outlived `end`/`reset` is surfaced to the caller.
    pub fn tick(&mut self, delta_ms: u64) -> Result<(), GameError> {
        match self.phase {
            SessionPhase::Playing => {}
            SessionPhase::Paused => return Ok(()),
            phase => {
                return Err(GameError::InvalidTransition {
                    phase,
                    command: "tick",
                })
            }
        }
        let Some(st) = self.active.as_mut() else {
            return Err(GameError::InvalidTransition {
                phase: self.phase,
                command: "tick",
            });
        };

        st.clock_ms += delta_ms;
        st.played_ms += delta_ms;
        st.time_remaining_ms = st.time_remaining_ms.saturating_sub(delta_ms);
        let now = st.clock_ms;

        st.board.release_held(now);

        for target_id in st.board.expire_due(now) {
            st.score.register_miss();
            self.events.push(SessionEvent::TargetExpired { target_id });
        }

        if now.saturating_sub(st.last_spawn_ms) >= st.level.target_spawn_interval_ms
            && st.board.visible_count() < st.level.max_simultaneous_targets
        {
            let target = st.board.spawn(&st.level, now, &mut st.rng);
            st.last_spawn_ms = now;
            self.events.push(SessionEvent::TargetSpawned { target });
        }

        st.score.refresh_wpm(st.played_ms);
        self.events.push(SessionEvent::TimeUpdated {
            time_remaining_ms: st.time_remaining_ms,
        });

        if st.time_remaining_ms == 0 {
            self.end(true)?;
        }
        Ok(())
    }

    /// Routes one keystroke. A hit scores and emits `TargetHit`; a stray
    /// key breaks the combo but counts no miss.
    pub fn handle_key_press(&mut self, key: char) -> Result<Option<HitScore>, GameError> {
        if self.phase != SessionPhase::Playing {
            return Err(GameError::InvalidTransition {
                phase: self.phase,
                command: "keypress",
            });
        }
        let Some(st) = self.active.as_mut() else {
            return Err(GameError::InvalidTransition {
                phase: self.phase,
                command: "keypress",
            });
        };

        let now = st.clock_ms;
        let matched = {
            let visible = st.board.visible_targets();
            matcher::match_key(key, &visible, now)
        };

        let Some(target_id) = matched else {
            st.score.register_stray();
            return Ok(None);
        };
        let Some(target) = st.board.mark_hit(target_id, now) else {
            st.score.register_stray();
            return Ok(None);
        };

        let hit = st.score.register_hit(&target, now, &st.level, st.played_ms);
        self.events.push(SessionEvent::TargetHit {
            target_id: hit.target_id,
            points: hit.points,
            combo: hit.combo,
            reaction_time_ms: hit.reaction_time_ms,
        });
        Ok(Some(hit))
    }

    /// Finishes the session: clears live targets, derives the terminal
    /// record, validates and persists it. The phase flips to `Ended`
    /// before the store is touched, so no spawn/expire/score mutation can
    /// land afterwards; on storage failure the completed record stays
    /// available for a manual retry via [`GameSession::resubmit`].
    pub fn end(&mut self, is_completed: bool) -> Result<CompletedSession, GameError> {
        match self.phase {
            SessionPhase::Playing | SessionPhase::Paused => {}
            SessionPhase::Ended => return Err(GameError::AlreadyEnded),
            phase => {
                return Err(GameError::InvalidTransition {
                    phase,
                    command: "end",
                })
            }
        }
        let Some(st) = self.active.as_mut() else {
            return Err(GameError::InvalidTransition {
                phase: self.phase,
                command: "end",
            });
        };

        st.board.clear();

        let duration_seconds = if st.time_remaining_ms == 0 {
            // Ran out the clock: the whole configured limit was played.
            st.level.time_limit_seconds - (st.time_remaining_ms / 1000) as u32
        } else {
            // Ended early: actual play time, paused spans excluded.
            (st.played_ms / 1000) as u32
        };

        let record = CompletedSession {
            session_id: st.session_id,
            user_id: st.user_id,
            level_id: st.level.id,
            final_score: st.score.score as i64,
            accuracy_percent: st.score.accuracy,
            wpm: st.score.wpm,
            max_combo: st.score.max_combo,
            hits_count: st.score.hit_count,
            misses_count: st.score.miss_count,
            duration_seconds,
            is_completed,
        };

        self.phase = SessionPhase::Ended;
        self.completed = Some(record.clone());
        self.events.push(SessionEvent::SessionEnded {
            completed: record.clone(),
        });

        info!(
            "ended session {} with score {} ({} hits, {} misses)",
            record.session_id, record.final_score, record.hits_count, record.misses_count
        );

        reconcile::finalize(&record, self.store.as_deref())?;
        Ok(record)
    }

    /// Clears everything back to `Idle`. Valid only when nothing is in
    /// flight.
    pub fn reset(&mut self) -> Result<(), GameError> {
        match self.phase {
            SessionPhase::Idle | SessionPhase::Ended => {}
            phase => {
                return Err(GameError::InvalidTransition {
                    phase,
                    command: "reset",
                })
            }
        }
        self.active = None;
        self.completed = None;
        self.events.clear();
        self.phase = SessionPhase::Idle;
        Ok(())
    }

    /// Retries persisting an ended session after a storage failure.
    pub fn resubmit(&mut self) -> Result<(), GameError> {
        let Some(record) = self.completed.as_ref() else {
            return Err(GameError::InvalidTransition {
                phase: self.phase,
                command: "resubmit",
            });
        };
        reconcile::finalize(record, self.store.as_deref())
    }

    /// Events accumulated since the last drain, in emission order.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn completed(&self) -> Option<&CompletedSession> {
        self.completed.as_ref()
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.active.as_ref().map(|st| SessionSnapshot {
            session_id: st.session_id,
            user_id: st.user_id,
            level_id: st.level.id,
            phase: self.phase,
            score: st.score.score,
            combo_count: st.score.combo_count,
            max_combo: st.score.max_combo,
            hit_count: st.score.hit_count,
            miss_count: st.score.miss_count,
            accuracy: st.score.accuracy,
            wpm: st.score.wpm,
            time_remaining_ms: st.time_remaining_ms,
        })
    }

    pub fn visible_targets(&self) -> Vec<Target> {
        self.active
            .as_ref()
            .map(|st| st.board.visible_targets().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn reaction_summary(&self) -> Option<ReactionSummary> {
        self.active
            .as_ref()
            .and_then(|st| ReactionSummary::from_samples(st.score.reaction_samples()))
    }

    /// Most recent unfinished session in the attached store, if any; a
    /// missing store or no row both mean "none".
    pub fn find_active(&self, user: Option<UserId>) -> Result<Option<ActiveSession>, GameError> {
        match &self.store {
            None => Ok(None),
            Some(store) => store.find_active(user).map_err(GameError::Storage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{BuiltinLevels, Difficulty};
    use crate::target::TargetState;
    use assert_matches::assert_matches;

    /// One tiny deterministic level: single-character set, tight limits.
    #[derive(Clone)]
    struct OneLevel(LevelDefinition);

    impl OneLevel {
        fn easy() -> Self {
            Self(LevelDefinition {
                id: 1,
                name: "test".to_string(),
                description: String::new(),
                difficulty: Difficulty::Easy,
                max_simultaneous_targets: 1,
                target_spawn_interval_ms: 1000,
                target_lifetime_ms: 3000,
                time_limit_seconds: 60,
                target_score: 100,
                character_set: vec!['a'],
            })
        }
    }

    impl LevelRepository for OneLevel {
        fn get(&self, level_id: u32) -> Result<LevelDefinition, GameError> {
            if level_id == self.0.id {
                Ok(self.0.clone())
            } else {
                Err(GameError::LevelNotFound(level_id))
            }
        }

        fn all(&self) -> Vec<LevelDefinition> {
            vec![self.0.clone()]
        }
    }

    fn playing_session() -> GameSession<OneLevel> {
        let mut game = GameSession::new(OneLevel::easy()).with_seed(11);
        game.start(1, None).unwrap();
        game
    }

    #[test]
    fn start_requires_idle_or_ended() {
        let mut game = playing_session();
        assert_matches!(
            game.start(1, None),
            Err(GameError::InvalidTransition { command: "start", .. })
        );

        game.end(false).unwrap();
        assert!(game.start(1, None).is_ok());
    }

    #[test]
    fn start_unknown_level_fails() {
        let mut game = GameSession::new(OneLevel::easy());
        assert_matches!(game.start(9, None), Err(GameError::LevelNotFound(9)));
        assert_eq!(game.phase(), SessionPhase::Idle);
    }

    #[test]
    fn pause_resume_cycle() {
        let mut game = playing_session();
        game.pause().unwrap();
        assert_eq!(game.phase(), SessionPhase::Paused);
        assert_matches!(game.pause(), Err(GameError::InvalidTransition { .. }));
        game.resume().unwrap();
        assert_eq!(game.phase(), SessionPhase::Playing);
        assert_matches!(game.resume(), Err(GameError::InvalidTransition { .. }));
    }

    #[test]
    fn pause_while_idle_is_rejected() {
        let mut game = GameSession::new(OneLevel::easy());
        assert_matches!(
            game.pause(),
            Err(GameError::InvalidTransition { command: "pause", .. })
        );
        assert_eq!(game.phase(), SessionPhase::Idle);
    }

    #[test]
    fn tick_counts_down_and_spawns_on_cadence() {
        let mut game = playing_session();
        game.tick(1000).unwrap();

        let snapshot = game.snapshot().unwrap();
        assert_eq!(snapshot.time_remaining_ms, 59_000);
        assert_eq!(game.visible_targets().len(), 1);

        let events = game.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::TargetSpawned { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::TimeUpdated { .. })));
    }

    #[test]
    fn spawn_respects_max_simultaneous_targets() {
        let mut game = playing_session();
        // Level allows one target; cadence would spawn at 1s, 2s, 3s.
        game.tick(1000).unwrap();
        game.tick(1000).unwrap();
        assert_eq!(game.visible_targets().len(), 1);
    }

    #[test]
    fn expired_target_counts_a_miss_and_resets_combo() {
        let mut game = playing_session();
        game.tick(1000).unwrap(); // spawn at t=1000, deadline t=4000
        game.tick(3000).unwrap(); // t=4000: expired

        let snapshot = game.snapshot().unwrap();
        assert_eq!(snapshot.miss_count, 1);
        assert_eq!(snapshot.combo_count, 0);
        // The expired target is gone; the same tick spawned a fresh one.
        assert!(game.visible_targets().iter().all(|t| t.id != 1));
        assert!(game
            .drain_events()
            .iter()
            .any(|e| matches!(e, SessionEvent::TargetExpired { target_id: 1 })));
    }

    #[test]
    fn matched_keystroke_scores_a_hit() {
        let mut game = playing_session();
        game.tick(1000).unwrap(); // spawn 'a' at t=1000
        game.tick(500).unwrap(); // t=1500

        let hit = game.handle_key_press('a').unwrap().unwrap();
        assert_eq!(hit.reaction_time_ms, 500);
        assert_eq!(hit.combo, 1);
        assert_eq!(hit.points, 19);

        let snapshot = game.snapshot().unwrap();
        assert_eq!(snapshot.score, 19);
        assert_eq!(snapshot.hit_count, 1);
        assert_eq!(snapshot.accuracy, 100.0);
    }

    #[test]
    fn hit_target_is_held_then_swept() {
        let mut game = playing_session();
        game.tick(1000).unwrap();
        game.handle_key_press('a').unwrap().unwrap();

        // Still on the board for its hold window, but not matchable.
        assert!(game.visible_targets().is_empty());
        let st = game.active.as_ref().unwrap();
        assert_eq!(st.board.get(1).map(|t| t.state), Some(TargetState::Hit));

        game.tick(1000).unwrap();
        let st = game.active.as_ref().unwrap();
        assert!(st.board.get(1).is_none());
    }

    #[test]
    fn stray_keystroke_resets_combo_without_a_miss() {
        let mut game = playing_session();
        game.tick(1000).unwrap();
        game.handle_key_press('a').unwrap().unwrap();

        let outcome = game.handle_key_press('z').unwrap();
        assert_eq!(outcome, None);

        let snapshot = game.snapshot().unwrap();
        assert_eq!(snapshot.combo_count, 0);
        assert_eq!(snapshot.miss_count, 0);
        assert_eq!(snapshot.accuracy, 100.0);
    }

    #[test]
    fn keystroke_outside_playing_is_rejected() {
        let mut game = playing_session();
        game.pause().unwrap();
        assert_matches!(
            game.handle_key_press('a'),
            Err(GameError::InvalidTransition { command: "keypress", .. })
        );
    }

    #[test]
    fn timeout_auto_ends_completed() {
        let mut game = playing_session();
        // Drain down to 500ms remaining, then overshoot.
        game.tick(59_500).unwrap();
        assert_eq!(game.phase(), SessionPhase::Playing);

        game.tick(600).unwrap();
        assert_eq!(game.phase(), SessionPhase::Ended);

        let completed = game.completed().unwrap();
        assert!(completed.is_completed);
        assert_eq!(completed.duration_seconds, 60);
        assert!(game
            .drain_events()
            .iter()
            .any(|e| matches!(e, SessionEvent::SessionEnded { .. })));
    }

    #[test]
    fn early_end_uses_played_time() {
        let mut game = playing_session();
        game.tick(5000).unwrap();
        let completed = game.end(false).unwrap();
        assert!(!completed.is_completed);
        assert_eq!(completed.duration_seconds, 5);
    }

    #[test]
    fn pause_excludes_time_from_duration_and_countdown() {
        let mut game = playing_session();
        game.tick(2000).unwrap();
        game.pause().unwrap();
        // Ticks during pause are tolerated no-ops.
        game.tick(10_000).unwrap();
        game.resume().unwrap();
        game.tick(1000).unwrap();

        let snapshot = game.snapshot().unwrap();
        assert_eq!(snapshot.time_remaining_ms, 57_000);
        let completed = game.end(false).unwrap();
        assert_eq!(completed.duration_seconds, 3);
    }

    #[test]
    fn end_twice_reports_already_ended() {
        let mut game = playing_session();
        game.end(true).unwrap();
        assert_matches!(game.end(true), Err(GameError::AlreadyEnded));
    }

    #[test]
    fn end_clears_live_targets() {
        let mut game = playing_session();
        game.tick(1000).unwrap();
        assert_eq!(game.visible_targets().len(), 1);
        game.end(false).unwrap();
        assert!(game.visible_targets().is_empty());
    }

    #[test]
    fn tick_after_end_is_rejected() {
        let mut game = playing_session();
        game.end(false).unwrap();
        assert_matches!(
            game.tick(100),
            Err(GameError::InvalidTransition { command: "tick", .. })
        );
    }

    #[test]
    fn tick_after_reset_is_rejected() {
        let mut game = playing_session();
        game.end(false).unwrap();
        game.reset().unwrap();
        assert_eq!(game.phase(), SessionPhase::Idle);
        assert_matches!(game.tick(100), Err(GameError::InvalidTransition { .. }));
        assert!(game.snapshot().is_none());
    }

    #[test]
    fn reset_requires_idle_or_ended() {
        let mut game = playing_session();
        assert_matches!(
            game.reset(),
            Err(GameError::InvalidTransition { command: "reset", .. })
        );
        game.pause().unwrap();
        assert_matches!(game.reset(), Err(GameError::InvalidTransition { .. }));
    }

    #[test]
    fn end_from_paused_is_allowed() {
        let mut game = playing_session();
        game.pause().unwrap();
        let completed = game.end(false).unwrap();
        assert!(!completed.is_completed);
    }

    #[test]
    fn hits_and_misses_never_exceed_spawned_targets() {
        let mut game = playing_session();
        for _ in 0..40 {
            game.tick(500).unwrap();
            let _ = game.handle_key_press('a');
        }
        let st = game.active.as_ref().unwrap();
        let snapshot = game.snapshot().unwrap();
        assert!(
            (snapshot.hit_count + snapshot.miss_count) as u64 <= st.board.spawned_total()
        );
    }

    #[test]
    fn seeded_sessions_replay_identically() {
        let run = || {
            let mut game = GameSession::new(OneLevel::easy()).with_seed(42);
            game.start(1, None).unwrap();
            for _ in 0..20 {
                game.tick(500).unwrap();
                let _ = game.handle_key_press('a');
            }
            game.end(false).unwrap().final_score
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn find_active_without_store_is_none() {
        let game = playing_session();
        assert_eq!(game.find_active(None).unwrap(), None);
    }

    #[test]
    fn full_session_on_builtin_levels() {
        let mut game = GameSession::new(BuiltinLevels::new()).with_seed(3);
        game.start(1, None).unwrap();
        let mut ticks = 0u32;
        while game.phase() == SessionPhase::Playing {
            game.tick(1000).unwrap();
            for target in game.visible_targets() {
                game.handle_key_press(target.character).unwrap();
            }
            ticks += 1;
            assert!(ticks <= 121, "session failed to time out");
        }
        let completed = game.completed().unwrap();
        assert!(completed.is_completed);
        assert_eq!(completed.misses_count, 0);
        assert!(completed.final_score > 0);
        assert_eq!(completed.accuracy_percent, 100.0);
    }
}
