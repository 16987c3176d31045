use crate::reconcile::CompletedSession;
use crate::target::Target;
use serde::Serialize;

/// Everything a UI or event consumer needs to render a session. Drained
/// from the session after each command or tick; serializable so headless
/// drivers can emit them as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    TargetSpawned { target: Target },
    #[serde(rename_all = "camelCase")]
    TargetExpired { target_id: u64 },
    #[serde(rename_all = "camelCase")]
    TargetHit {
        target_id: u64,
        points: u32,
        combo: u32,
        reaction_time_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    TimeUpdated { time_remaining_ms: u64 },
    #[serde(rename_all = "camelCase")]
    SessionEnded { completed: CompletedSession },
}
