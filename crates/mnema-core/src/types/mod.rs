//! Core types for mnema.

mod concept;
mod interaction;
mod job;
mod message;
mod phrasing;
mod stats;

pub use concept::{normalize_title, CardState, Concept, MemoryState};
pub use interaction::{Interaction, SchedulingSnapshot};
pub use job::{GenerationJob, JobErrorCode, JobPhase, JobStatus};
pub use message::{Message, MessageRole};
pub use phrasing::{Phrasing, PhrasingType};
pub use stats::{StatsDelta, UserStats};
