use clap::{error::ErrorKind, CommandFactory, Parser};
use keywhack::config::{ConfigStore, FileConfigStore};
use keywhack::error::GameError;
use keywhack::events::SessionEvent;
use keywhack::history::HistoryLog;
use keywhack::identity::{FixedIdentity, GuestIdentity, IdentityContext, UserId};
use keywhack::level::{BuiltinLevels, LevelDefinition, LevelRepository};
use keywhack::reconcile::CompletedSession;
use keywhack::runtime::{ChannelEventSource, EngineEvent, FixedTicker, Runner};
use keywhack::session::{GameSession, SessionPhase};
use keywhack::stats::ReactionSummary;
use keywhack::store::SessionDb;
use log::{error, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// headless whack-a-mole typing sessions with combo scoring
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Runs whack-a-mole typing sessions against the keywhack engine with a deterministic auto-player, printing one JSON result line per session plus a run summary. Results are persisted to the local SQLite store and CSV log unless --no-store is given."
)]
pub struct Cli {
    /// level id to play (defaults to the configured level)
    #[clap(short = 'l', long)]
    level: Option<u32>,

    /// number of sessions to simulate
    #[clap(short = 'n', long, default_value_t = 1)]
    sessions: usize,

    /// rng seed for reproducible runs
    #[clap(long)]
    seed: Option<u64>,

    /// milliseconds per engine tick
    #[clap(long)]
    tick_ms: Option<u64>,

    /// auto-player probability of attempting each target
    #[clap(long, default_value_t = 0.85)]
    skill: f64,

    /// auto-player reaction delay in milliseconds
    #[clap(long, default_value_t = 450)]
    reaction_ms: u64,

    /// stable player id (uuid) to attribute sessions to; omit to play as guest
    #[clap(short = 'p', long)]
    player: Option<String>,

    /// write the run summary json to this path as well as stdout
    #[clap(long)]
    summary_out: Option<PathBuf>,

    /// list available levels and exit
    #[clap(long)]
    list_levels: bool,

    /// skip sqlite and csv persistence
    #[clap(long)]
    no_store: bool,

    /// drive one session in real time through the runner instead of
    /// fixed-step simulation, emitting session events as json lines
    #[clap(long)]
    realtime: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionReport {
    #[serde(flatten)]
    result: CompletedSession,
    level_name: String,
    seed: u64,
    expired_targets: u32,
    stray_presses: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reaction: Option<ReactionSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    sessions: usize,
    total_score: i64,
    best_score: i64,
    avg_accuracy: f64,
    avg_wpm: f64,
    reached_target_score: usize,
    store_failures: usize,
}

/// Scripted opponent of the engine: reacts to spawn events after a fixed
/// delay plus jitter, with a configurable probability of bothering at all.
struct AutoPlayer {
    rng: StdRng,
    skill: f64,
    reaction_ms: u64,
    queued: Vec<QueuedPress>,
}

struct QueuedPress {
    due_ms: u64,
    key: char,
}

impl AutoPlayer {
    fn new(seed: u64, skill: f64, reaction_ms: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            skill,
            reaction_ms,
            queued: Vec::new(),
        }
    }

    fn observe(&mut self, events: &[SessionEvent], now_ms: u64) {
        for event in events {
            if let SessionEvent::TargetSpawned { target } = event {
                if self.rng.gen_bool(self.skill) {
                    let jitter = self.rng.gen_range(0..150);
                    self.queued.push(QueuedPress {
                        due_ms: now_ms + self.reaction_ms + jitter,
                        key: target.character,
                    });
                }
            }
        }
    }

    fn due_presses(&mut self, now_ms: u64) -> Vec<char> {
        let mut due = Vec::new();
        self.queued.retain(|press| {
            if press.due_ms <= now_ms {
                due.push(press.key);
                false
            } else {
                true
            }
        });
        due
    }
}

struct SessionOutcome {
    completed: CompletedSession,
    reaction: Option<ReactionSummary>,
    expired_targets: u32,
    stray_presses: u32,
    store_failed: bool,
}

fn run_session(
    game: &mut GameSession<BuiltinLevels>,
    level_id: u32,
    user: Option<UserId>,
    tick_ms: u64,
    player: &mut AutoPlayer,
) -> Result<SessionOutcome, GameError> {
    game.start(level_id, user)?;

    let mut clock_ms = 0u64;
    let mut expired_targets = 0u32;
    let mut stray_presses = 0u32;
    let mut store_failed = false;

    while game.phase() == SessionPhase::Playing {
        match game.tick(tick_ms) {
            Ok(()) => {}
            // The session still ended; keep the record for the report.
            Err(GameError::Storage(err)) => {
                warn!("saving session failed: {err}");
                store_failed = true;
            }
            Err(other) => return Err(other),
        }
        clock_ms += tick_ms;

        let events = game.drain_events();
        expired_targets += events
            .iter()
            .filter(|e| matches!(e, SessionEvent::TargetExpired { .. }))
            .count() as u32;
        player.observe(&events, clock_ms);

        if game.phase() != SessionPhase::Playing {
            break;
        }
        for key in player.due_presses(clock_ms) {
            if game.handle_key_press(key)?.is_none() {
                stray_presses += 1;
            }
        }
    }

    let reaction = game.reaction_summary();
    let completed = game
        .completed()
        .cloned()
        .expect("an ended session always has a completed record");
    Ok(SessionOutcome {
        completed,
        reaction,
        expired_targets,
        stray_presses,
        store_failed,
    })
}

fn run_realtime(
    game: &mut GameSession<BuiltinLevels>,
    level: &LevelDefinition,
    user: Option<UserId>,
    tick_ms: u64,
    reaction_ms: u64,
    seed: u64,
) -> Result<(), GameError> {
    game.start(level.id, user)?;

    let source = ChannelEventSource::new();
    let tx = source.sender();
    let characters = level.character_set.clone();
    let mut rng = StdRng::seed_from_u64(seed);
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_millis(reaction_ms.max(50)));
        let key = characters[rng.gen_range(0..characters.len())];
        if tx.send(EngineEvent::Key(key)).is_err() {
            break;
        }
    });

    let runner = Runner::new(source, FixedTicker::new(Duration::from_millis(tick_ms.max(1))));
    while game.phase() != SessionPhase::Ended {
        match runner.step() {
            EngineEvent::Tick => match game.tick(tick_ms) {
                Ok(()) => {}
                Err(GameError::Storage(err)) => warn!("saving session failed: {err}"),
                Err(other) => return Err(other),
            },
            EngineEvent::Key(key) => {
                if game.phase() == SessionPhase::Playing {
                    game.handle_key_press(key)?;
                }
            }
            EngineEvent::Quit => {
                game.end(false)?;
            }
        }
        for event in game.drain_events() {
            println!(
                "{}",
                serde_json::to_string(&event).expect("session event should serialize")
            );
        }
    }
    Ok(())
}

fn print_levels(levels: &BuiltinLevels) {
    for level in levels.all() {
        println!(
            "{:>2}  {:<14} {:<7} {} targets, {}ms lifetime, {}s, {} pts to beat",
            level.id,
            level.name,
            level.difficulty.to_string(),
            level.max_simultaneous_targets,
            level.target_lifetime_ms,
            level.time_limit_seconds,
            level.target_score,
        );
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = FileConfigStore::new().load();
    let level_id = cli.level.unwrap_or(config.default_level);
    let tick_ms = cli.tick_ms.unwrap_or(config.tick_ms).max(1);
    let seed = cli.seed.or(config.seed).unwrap_or_else(rand::random);
    let skill = cli.skill.clamp(0.0, 1.0);

    let levels = BuiltinLevels::new();
    if cli.list_levels {
        print_levels(&levels);
        return;
    }

    let level = match levels.get(level_id) {
        Ok(level) => level,
        Err(err) => {
            Cli::command()
                .error(ErrorKind::ValueValidation, err.to_string())
                .exit();
        }
    };

    let identity: Box<dyn IdentityContext> = match &cli.player {
        Some(raw) => match UserId::parse(raw) {
            Some(user) => Box::new(FixedIdentity::new(user)),
            None => {
                Cli::command()
                    .error(ErrorKind::ValueValidation, "--player must be a uuid")
                    .exit();
            }
        },
        None => Box::new(GuestIdentity),
    };
    let user = identity.current_user();

    let mut game = GameSession::new(levels).with_seed(seed);
    if !cli.no_store {
        match SessionDb::new() {
            Ok(db) => game = game.with_store(Box::new(db)),
            Err(err) => warn!("sqlite store unavailable, playing without it: {err}"),
        }
    }
    let history = (!cli.no_store).then(HistoryLog::new);

    if cli.realtime {
        if let Err(err) = run_realtime(&mut game, &level, user, tick_ms, cli.reaction_ms, seed) {
            error!("realtime session failed: {err}");
            std::process::exit(1);
        }
        return;
    }

    let mut player = AutoPlayer::new(seed ^ 0x9e37_79b9, skill, cli.reaction_ms);
    let mut reports = Vec::new();
    let mut store_failures = 0usize;

    for _ in 0..cli.sessions {
        let outcome = match run_session(&mut game, level.id, user, tick_ms, &mut player) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("session failed: {err}");
                std::process::exit(1);
            }
        };
        if outcome.store_failed {
            store_failures += 1;
        }
        if let Some(history) = &history {
            if let Err(err) = history.append(&outcome.completed) {
                warn!("failed to append history log: {err}");
            }
        }

        let report = SessionReport {
            result: outcome.completed,
            level_name: level.name.clone(),
            seed,
            expired_targets: outcome.expired_targets,
            stray_presses: outcome.stray_presses,
            reaction: outcome.reaction,
        };
        println!(
            "{}",
            serde_json::to_string(&report).expect("session report should serialize")
        );
        reports.push(report);
    }

    let summary = build_summary(&reports, &level, store_failures);
    let summary_text =
        serde_json::to_string_pretty(&summary).expect("run summary should serialize");
    println!("{summary_text}");
    if let Some(path) = &cli.summary_out {
        if let Err(err) = std::fs::write(path, &summary_text) {
            error!("failed to write summary to {}: {err}", path.display());
            std::process::exit(2);
        }
    }

    if store_failures > 0 {
        std::process::exit(1);
    }
}

fn build_summary(
    reports: &[SessionReport],
    level: &LevelDefinition,
    store_failures: usize,
) -> RunSummary {
    let count = reports.len().max(1) as f64;
    RunSummary {
        sessions: reports.len(),
        total_score: reports.iter().map(|r| r.result.final_score).sum(),
        best_score: reports
            .iter()
            .map(|r| r.result.final_score)
            .max()
            .unwrap_or(0),
        avg_accuracy: reports
            .iter()
            .map(|r| r.result.accuracy_percent)
            .sum::<f64>()
            / count,
        avg_wpm: reports.iter().map(|r| r.result.wpm).sum::<f64>() / count,
        reached_target_score: reports
            .iter()
            .filter(|r| r.result.final_score >= level.target_score as i64)
            .count(),
        store_failures,
    }
}
