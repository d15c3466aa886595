//! Immutable review-attempt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::concept::MemoryState;

/// Scheduling context captured at the moment an answer was graded.
///
/// Stored for audit: the interval that was chosen, the resulting due date,
/// and the full memory state the engine produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingSnapshot {
    pub interval_days: u32,
    pub due_at: DateTime<Utc>,
    pub memory: MemoryState,
}

/// One review attempt. Created once, never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    pub user_id: String,
    pub concept_id: Uuid,
    pub phrasing_id: Uuid,
    pub user_answer: String,
    pub is_correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SchedulingSnapshot>,
    pub created_at: DateTime<Utc>,
}

impl Interaction {
    pub fn new(
        user_id: impl Into<String>,
        concept_id: Uuid,
        phrasing_id: Uuid,
        user_answer: impl Into<String>,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            concept_id,
            phrasing_id,
            user_answer: user_answer.into(),
            is_correct,
            session_id: None,
            snapshot: None,
            created_at: now,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_snapshot(mut self, snapshot: SchedulingSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}
