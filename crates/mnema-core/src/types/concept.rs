//! Concept types and embedded memory state.
//!
//! A concept is an atomic knowledge unit subject to spaced-repetition
//! scheduling. Its memory state follows the FSRS model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Card lifecycle state, following the classic SRS progression.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CardState {
    /// Never reviewed.
    #[default]
    New,
    /// Reviewed at least once, not yet graduated to day-scale intervals.
    Learning,
    /// Graduated; intervals of a day or more.
    Review,
    /// Lapsed out of review after a failed recall.
    Relearning,
}

/// FSRS memory state embedded in a concept.
///
/// Stability is the number of days for retrievability to drop to 90%.
/// Difficulty is on a 1.0-10.0 scale (higher = harder to remember).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    pub stability: f32,
    pub difficulty: f32,
    /// Last review timestamp. None until the first review.
    pub last_review: Option<DateTime<Utc>>,
    /// Next scheduled review. New cards are due immediately.
    pub next_review: DateTime<Utc>,
    /// Days elapsed between the last two reviews.
    pub elapsed_days: u32,
    /// Days of the currently scheduled interval.
    pub scheduled_days: u32,
    /// Review count. Never decreases.
    pub reps: u32,
    /// Lapse count. Incremented only on review -> relearning.
    pub lapses: u32,
    pub state: CardState,
    /// Cached retrievability snapshot, if one was taken. Invalidated on review.
    pub retrievability: Option<f32>,
}

impl MemoryState {
    /// Create the initial state for a brand-new concept, due immediately.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            stability: 0.0,
            difficulty: 5.0,
            last_review: None,
            next_review: now,
            elapsed_days: 0,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            state: CardState::New,
            retrievability: None,
        }
    }

    /// Whether this state is due at `now`. The boundary is inclusive.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }

    /// Convert to fsrs::MemoryState for use with fsrs crate functions.
    pub fn to_memory_state(&self) -> fsrs::MemoryState {
        fsrs::MemoryState {
            stability: self.stability,
            difficulty: self.difficulty,
        }
    }

    /// Rebuild from an fsrs::MemoryState plus the scheduling fields the
    /// card representation does not carry.
    pub fn from_memory_state(
        state: fsrs::MemoryState,
        next_review: DateTime<Utc>,
        reps: u32,
        lapses: u32,
    ) -> Self {
        Self {
            stability: state.stability,
            difficulty: state.difficulty,
            last_review: None,
            next_review,
            elapsed_days: 0,
            scheduled_days: 0,
            reps,
            lapses,
            state: if reps == 0 {
                CardState::New
            } else {
                CardState::Review
            },
            retrievability: None,
        }
    }
}

/// An atomic knowledge unit owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub memory: MemoryState,
    /// Denormalized count of active phrasings.
    pub phrasing_count: u32,
    pub conflict_score: f32,
    pub thin_score: f32,
    pub quality_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_phrasing_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Concept {
    /// Create a new concept with a fresh memory state, due immediately.
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            title: title.into(),
            description,
            content_type: None,
            memory: MemoryState::new(now),
            phrasing_count: 0,
            conflict_score: 0.0,
            thin_score: 1.0,
            quality_score: 0.0,
            canonical_phrasing_id: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
            deleted_at: None,
        }
    }

    /// Soft-deleted. Deletion always wins over archival for visibility.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Archived but not deleted.
    pub fn is_archived(&self) -> bool {
        self.deleted_at.is_none() && self.archived_at.is_some()
    }

    /// Eligible for active scheduling views.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none() && self.archived_at.is_none()
    }

    /// Recompute derived heuristics from the phrasing coverage.
    ///
    /// `thin_score` approaches 0 as the concept reaches the target number
    /// of phrasings; `quality_score` is its complement, weighted by
    /// whether a description exists.
    pub fn refresh_derived_scores(&mut self, target_phrasings: u32) {
        let target = target_phrasings.max(1) as f32;
        let coverage = (self.phrasing_count as f32 / target).min(1.0);
        self.thin_score = 1.0 - coverage;
        let described = if self.description.is_some() { 1.0 } else { 0.5 };
        self.quality_score = coverage * described;
    }
}

/// Normalize a concept title for duplicate detection: lowercase and
/// collapse internal whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
