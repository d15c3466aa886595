//! FSRS-6 review scheduler.
//!
//! Computes retrievability (probability of recall) and produces updated
//! memory states from graded answers. Review submissions carry a binary
//! correctness signal, so the engine derives the discrete FSRS rating
//! from it before applying the memory model.

use chrono::{DateTime, Duration, Utc};

use crate::types::{CardState, MemoryState};

/// Sentinel retrievability for never-reviewed material.
///
/// Callers must treat negative values as highest scheduling priority,
/// never as a valid probability.
pub const UNSEEN_RETRIEVABILITY: f32 = -1.0;

/// Grade for a review answer (maps to fsrs rating values 1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Grade {
    /// Complete failure to recall.
    Again = 1,
    /// Successful but difficult recall.
    Hard = 2,
    /// Normal successful recall.
    Good = 3,
    /// Effortless recall.
    Easy = 4,
}

impl Grade {
    /// Derive a grade from a binary answer.
    ///
    /// Binary answer formats carry no partial-credit signal, so correct
    /// maps to Good and incorrect to Again.
    pub fn from_answer(is_correct: bool) -> Self {
        if is_correct {
            Grade::Good
        } else {
            Grade::Again
        }
    }

    /// Convert to fsrs rating value (1-4).
    pub fn to_rating(self) -> u8 {
        self as u8
    }

    /// Create from fsrs rating value. Returns None for invalid values.
    pub fn from_rating(rating: u8) -> Option<Self> {
        match rating {
            1 => Some(Grade::Again),
            2 => Some(Grade::Hard),
            3 => Some(Grade::Good),
            4 => Some(Grade::Easy),
            _ => None,
        }
    }
}

/// FSRS-6 scheduler for review dynamics.
pub struct ReviewScheduler {
    /// FSRS decay parameter (FSRS-6 uses 0.1542).
    decay: f32,
    /// Initial stability values for each grade (Again, Hard, Good, Easy).
    initial_stability: [f32; 4],
    /// Initial difficulty values for each grade.
    initial_difficulty: [f32; 4],
    /// Interval cap in days.
    max_interval_days: u32,
}

impl ReviewScheduler {
    /// Create a new scheduler with FSRS-6 default parameters.
    pub fn new() -> Self {
        Self {
            decay: fsrs::FSRS6_DEFAULT_DECAY,
            // Initial stability by grade (from FSRS default parameters w[0..4]).
            // These represent days for retrievability to drop to 90%.
            initial_stability: [
                fsrs::DEFAULT_PARAMETERS[0],
                fsrs::DEFAULT_PARAMETERS[1],
                fsrs::DEFAULT_PARAMETERS[2],
                fsrs::DEFAULT_PARAMETERS[3],
            ],
            // Initial difficulty by grade; lower grades = higher difficulty.
            initial_difficulty: [8.0, 6.5, 5.0, 3.5],
            max_interval_days: 365,
        }
    }

    /// Create a scheduler with custom parameters.
    pub fn with_params(
        decay: f32,
        initial_stability: [f32; 4],
        initial_difficulty: [f32; 4],
        max_interval_days: u32,
    ) -> Self {
        Self {
            decay,
            initial_stability,
            initial_difficulty,
            max_interval_days,
        }
    }

    /// Create the initial memory state for a brand-new concept.
    ///
    /// New concepts are due immediately.
    pub fn initial_state(&self, now: DateTime<Utc>) -> MemoryState {
        MemoryState::new(now)
    }

    /// Whether material with this state is due at `now`.
    ///
    /// Missing state means unseen material, which is always presentable.
    /// The boundary is inclusive: exactly at `now` counts as due.
    pub fn is_due(state: Option<&MemoryState>, now: DateTime<Utc>) -> bool {
        match state {
            None => true,
            Some(s) => s.next_review <= now,
        }
    }

    /// Current retrievability (probability of recall) in [0, 1], or the
    /// `UNSEEN_RETRIEVABILITY` sentinel for missing/never-reviewed state.
    pub fn retrievability(&self, state: Option<&MemoryState>, now: DateTime<Utc>) -> f32 {
        let state = match state {
            Some(s) if s.reps > 0 => s,
            _ => return UNSEEN_RETRIEVABILITY,
        };
        let last_review = match state.last_review {
            Some(lr) => lr,
            None => return UNSEEN_RETRIEVABILITY,
        };

        let elapsed = now.signed_duration_since(last_review);
        let days_elapsed = elapsed.num_seconds() as f32 / 86_400.0;
        if days_elapsed <= 0.0 {
            return 1.0;
        }
        if state.stability <= 0.001 {
            return 0.0;
        }

        let mem_state = state.to_memory_state();
        fsrs::current_retrievability(mem_state, days_elapsed, self.decay).clamp(0.0, 1.0)
    }

    /// Process a review answer and produce the updated memory state.
    ///
    /// Returns the new state and the grade derived from the answer.
    /// `reps` never decreases; `lapses` increments only on the
    /// review -> relearning regression.
    pub fn schedule(
        &self,
        state: &MemoryState,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> (MemoryState, Grade) {
        let grade = Grade::from_answer(is_correct);
        let idx = grade.to_rating() as usize - 1;

        let (new_stability, new_difficulty) = if state.reps == 0 {
            (self.initial_stability[idx], self.initial_difficulty[idx])
        } else {
            let retrievability = self.retrievability(Some(state), now).max(0.0);

            let stability = if grade == Grade::Again {
                // Lapse: stability collapses to a fraction scaled by how
                // far the memory had decayed.
                let lapse_factor = 0.3 * (1.0 - retrievability).max(0.1);
                (state.stability * lapse_factor).max(0.1)
            } else {
                let grade_multiplier = match grade {
                    Grade::Hard => 1.2,
                    Grade::Good => 1.5,
                    Grade::Easy => 2.0,
                    Grade::Again => unreachable!(),
                };
                // Lower retrievability at review time = higher stability
                // gain, capped to prevent extreme values.
                let retrievability_boost = ((1.0 - retrievability) * 0.5 + 1.0).min(1.5);
                state.stability * grade_multiplier * retrievability_boost
            };

            let grade_offset = grade.to_rating() as f32 - 3.0;
            let difficulty = (state.difficulty - grade_offset * 0.5).clamp(1.0, 10.0);

            (stability, difficulty)
        };

        let interval_days = new_stability
            .round()
            .clamp(0.0, self.max_interval_days as f32) as u32;
        // Sub-day stabilities schedule at the stability fraction of a day
        // rather than snapping to midnight boundaries.
        let next_review = now
            + Duration::seconds(
                (new_stability.min(self.max_interval_days as f32) as f64 * 86_400.0) as i64,
            );

        let new_card_state = match (state.state, grade) {
            (CardState::New, _) => CardState::Learning,
            (CardState::Learning, Grade::Again) => CardState::Learning,
            // Graduation: the first time the computed interval reaches a
            // full day.
            (CardState::Learning, _) if interval_days >= 1 => CardState::Review,
            (CardState::Learning, _) => CardState::Learning,
            (CardState::Review, Grade::Again) => CardState::Relearning,
            (CardState::Review, _) => CardState::Review,
            (CardState::Relearning, Grade::Again) => CardState::Relearning,
            (CardState::Relearning, _) => CardState::Review,
        };

        let new_lapses =
            if state.state == CardState::Review && new_card_state == CardState::Relearning {
                state.lapses + 1
            } else {
                state.lapses
            };

        let elapsed_days = state
            .last_review
            .map(|lr| now.signed_duration_since(lr).num_days().max(0) as u32)
            .unwrap_or(0);

        let new_state = MemoryState {
            stability: new_stability,
            difficulty: new_difficulty,
            last_review: Some(now),
            next_review,
            elapsed_days,
            scheduled_days: interval_days,
            reps: state.reps + 1,
            lapses: new_lapses,
            state: new_card_state,
            // Stale after a review; queue reads recompute live values.
            retrievability: None,
        };

        (new_state, grade)
    }
}

impl Default for ReviewScheduler {
    fn default() -> Self {
        Self::new()
    }
}
