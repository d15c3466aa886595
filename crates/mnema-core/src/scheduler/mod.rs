//! Review scheduling engine.
//!
//! Pure functions mapping a concept's memory state plus an observed
//! answer to a new memory state, based on the Free Spaced Repetition
//! Scheduler (FSRS) algorithm. No I/O.

mod engine;

pub use engine::{Grade, ReviewScheduler, UNSEEN_RETRIEVABILITY};
