//! Cached per-user aggregate counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single cached aggregate row per user.
///
/// Invariants: `due_now_count` includes new cards (new cards are always
/// due); `new_count + learning_count + mature_count == total_cards` over
/// non-deleted, non-archived concepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub total_cards: i64,
    pub new_count: i64,
    pub learning_count: i64,
    pub mature_count: i64,
    pub due_now_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_review_time: Option<DateTime<Utc>>,
    pub last_calculated: DateTime<Utc>,
}

impl UserStats {
    /// An empty stats row for a user with no concepts yet.
    pub fn empty(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            total_cards: 0,
            new_count: 0,
            learning_count: 0,
            mature_count: 0,
            due_now_count: 0,
            next_review_time: None,
            last_calculated: now,
        }
    }
}

/// A relative increment against a user's stats row.
///
/// Every field is a signed delta; the store applies them as a single
/// relative UPDATE so concurrent mutators cannot clobber each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDelta {
    pub total_cards: i64,
    pub new_count: i64,
    pub learning_count: i64,
    pub mature_count: i64,
    pub due_now_count: i64,
}

impl StatsDelta {
    /// True when applying this delta would change nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Accumulate another delta into this one.
    pub fn merge(&mut self, other: &StatsDelta) {
        self.total_cards += other.total_cards;
        self.new_count += other.new_count;
        self.learning_count += other.learning_count;
        self.mature_count += other.mature_count;
        self.due_now_count += other.due_now_count;
    }
}
