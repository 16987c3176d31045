use crate::identity::UserId;
use serde::Serialize;

/// Aggregate of a user's completed sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub games_played: u64,
    pub best_score: i64,
    pub avg_accuracy: f64,
    pub avg_wpm: f64,
    pub best_combo: u32,
    pub total_hits: u64,
    pub total_misses: u64,
}

/// One ranked row. Guests never appear here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: UserId,
    pub score: i64,
    pub accuracy: f64,
    pub wpm: f64,
    pub max_combo: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub entries: Vec<LeaderboardEntry>,
}

/// Reaction-time profile of one session, computed from the raw samples the
/// scoring engine collects per hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    pub samples: usize,
    pub avg_ms: f64,
    pub std_dev_ms: f64,
}

impl ReactionSummary {
    pub fn from_samples(samples: &[u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let avg = samples.iter().sum::<u64>() as f64 / n;
        let variance = samples
            .iter()
            .map(|&s| {
                let diff = s as f64 - avg;
                diff * diff
            })
            .sum::<f64>()
            / n;
        Some(Self {
            samples: samples.len(),
            avg_ms: avg,
            std_dev_ms: variance.sqrt(),
        })
    }
}
