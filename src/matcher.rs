use crate::target::{Target, TargetState};

/// Maps a keystroke to at most one eligible visible target.
///
/// Among visible targets whose character matches case-insensitively, the
/// one with the earliest deadline wins, so the most urgent mole is cleared
/// first. Targets already at or past their deadline are ignored even if an
/// expiry sweep has not caught them yet. `None` means a stray keystroke:
/// the caller resets the combo but must NOT count a miss — misses are
/// recorded only when a target expires, which keeps the accuracy math
/// aligned with the expiry bookkeeping.
pub fn match_key(key: char, visible: &[&Target], now_ms: u64) -> Option<u64> {
    visible
        .iter()
        .filter(|t| t.state == TargetState::Visible)
        .filter(|t| t.deadline_ms > now_ms)
        .filter(|t| chars_match(key, t.character))
        .min_by_key(|t| t.deadline_ms)
        .map(|t| t.id)
}

fn chars_match(key: char, target: char) -> bool {
    key == target || key.to_lowercase().eq(target.to_lowercase())
}
