//! Review queue construction.
//!
//! Pure functions ordering due material by urgency and picking which
//! phrasing variant of a concept to present. No I/O.

mod prioritizer;
mod selector;

pub use prioritizer::{prioritize, priority_score, QueueEntry};
pub use selector::{select_active_phrasing, PhrasingSelection, SelectionReason};
