use crate::error::GameError;
use crate::identity::UserId;
use crate::store::SessionStore;
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The terminal record of a session, created exactly once at
/// reconciliation and never mutated afterwards. The wire shape matches the
/// finished-session JSON the original service exposed (`sessionId`,
/// `score`, `accuracy`, `wpm`, `maxCombo`, `hitsCount`, `missesCount`,
/// `isCompleted`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub session_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub level_id: u32,
    #[serde(rename = "score")]
    pub final_score: i64,
    #[serde(rename = "accuracy")]
    pub accuracy_percent: f64,
    pub wpm: f64,
    pub max_combo: u32,
    pub hits_count: u32,
    pub misses_count: u32,
    #[serde(default)]
    pub duration_seconds: u32,
    pub is_completed: bool,
}

impl CompletedSession {
    /// Coarse bounds check on the submitted values. Target spawning and
    /// hit timing are trusted from the client, so this is the only line of
    /// defense: physically impossible values are rejected outright, never
    /// clamped.
    pub fn validate(&self) -> Result<(), GameError> {
        if !(0.0..=100.0).contains(&self.accuracy_percent) || !self.accuracy_percent.is_finite() {
            return Err(GameError::InvalidResult(format!(
                "accuracy {} outside 0..=100",
                self.accuracy_percent
            )));
        }
        if self.final_score < 0 {
            return Err(GameError::InvalidResult(format!(
                "negative score {}",
                self.final_score
            )));
        }
        if self.wpm < 0.0 || !self.wpm.is_finite() {
            return Err(GameError::InvalidResult(format!("invalid wpm {}", self.wpm)));
        }
        Ok(())
    }
}

/// Validates a finished session and hands it to the persistence
/// collaborator. Validation failures skip persistence entirely; storage
/// failures are surfaced unchanged with no retry, leaving the record with
/// the caller so the submission can be repeated.
pub fn finalize(
    record: &CompletedSession,
    store: Option<&dyn SessionStore>,
) -> Result<(), GameError> {
    if let Err(err) = record.validate() {
        warn!("rejecting session {}: {}", record.session_id, err);
        return Err(err);
    }
    if let Some(store) = store {
        store.save(record).map_err(GameError::Storage)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::ActiveSession;
    use assert_matches::assert_matches;
    use std::cell::RefCell;

    fn record() -> CompletedSession {
        CompletedSession {
            session_id: Uuid::new_v4(),
            user_id: None,
            level_id: 1,
            final_score: 190,
            accuracy_percent: 83.5,
            wpm: 31.2,
            max_combo: 7,
            hits_count: 10,
            misses_count: 2,
            duration_seconds: 60,
            is_completed: true,
        }
    }

    /// Counts saves so tests can prove persistence was skipped.
    #[derive(Default)]
    struct RecordingStore {
        saved: RefCell<Vec<CompletedSession>>,
        fail_next: RefCell<bool>,
    }

    impl SessionStore for RecordingStore {
        fn record_start(
            &self,
            _session_id: Uuid,
            _user: Option<UserId>,
            _level_id: u32,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        fn save(&self, completed: &CompletedSession) -> Result<(), StoreError> {
            if *self.fail_next.borrow() {
                return Err(StoreError::Io("disk full".into()));
            }
            self.saved.borrow_mut().push(completed.clone());
            Ok(())
        }

        fn find_active(&self, _user: Option<UserId>) -> Result<Option<ActiveSession>, StoreError> {
            Ok(None)
        }

        fn history(
            &self,
            _user: Option<UserId>,
            _page: usize,
            _page_size: usize,
        ) -> Result<Vec<CompletedSession>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn valid_record_is_saved() {
        let store = RecordingStore::default();
        finalize(&record(), Some(&store)).unwrap();
        assert_eq!(store.saved.borrow().len(), 1);
    }

    #[test]
    fn out_of_range_accuracy_is_rejected_without_saving() {
        let store = RecordingStore::default();
        let mut bad = record();
        bad.accuracy_percent = 150.0;

        let err = finalize(&bad, Some(&store)).unwrap_err();
        assert_matches!(err, GameError::InvalidResult(_));
        assert!(store.saved.borrow().is_empty());
    }

    #[test]
    fn negative_score_is_rejected() {
        let mut bad = record();
        bad.final_score = -1;
        assert_matches!(bad.validate(), Err(GameError::InvalidResult(_)));
    }

    #[test]
    fn negative_wpm_is_rejected() {
        let mut bad = record();
        bad.wpm = -0.5;
        assert_matches!(bad.validate(), Err(GameError::InvalidResult(_)));
    }

    #[test]
    fn storage_failure_surfaces_unchanged() {
        let store = RecordingStore::default();
        *store.fail_next.borrow_mut() = true;

        let err = finalize(&record(), Some(&store)).unwrap_err();
        assert_matches!(err, GameError::Storage(StoreError::Io(_)));
    }

    #[test]
    fn finalize_without_store_only_validates() {
        finalize(&record(), None).unwrap();
    }

    #[test]
    fn wire_shape_uses_original_field_names() {
        let json = serde_json::to_value(record()).unwrap();
        for key in [
            "sessionId",
            "score",
            "accuracy",
            "wpm",
            "maxCombo",
            "hitsCount",
            "missesCount",
            "isCompleted",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert!(json.get("finalScore").is_none());
    }

    #[test]
    fn wire_shape_roundtrips() {
        let original = record();
        let json = serde_json::to_string(&original).unwrap();
        let parsed: CompletedSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn minimal_wire_payload_parses() {
        // Exactly the fields the original JSON shape carries.
        let json = r#"{
            "sessionId": "6f0a9054-9f0b-4bff-82cb-5ad613270b51",
            "score": 120,
            "accuracy": 92.0,
            "wpm": 28.4,
            "maxCombo": 9,
            "hitsCount": 23,
            "missesCount": 2,
            "isCompleted": true
        }"#;
        let parsed: CompletedSession = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.final_score, 120);
        assert_eq!(parsed.user_id, None);
    }
}
