//! Study orchestrator.

mod main;

pub use main::{ReviewItem, ReviewOutcome, ReviewSubmission, Study};
