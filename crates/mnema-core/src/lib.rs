//! mnema-core - Core library for mnema.
//!
//! This crate provides the review scheduling engine, queue
//! prioritization, per-user stats maintenance, and the generation job
//! pipeline behind the mnema spaced-repetition study engine.
//!
//! # Example
//!
//! ```ignore
//! use mnema_core::{Study, StudyConfig};
//!
//! let config = StudyConfig::default();
//! let study = Study::new(config, llm)?;
//!
//! // Kick off content generation.
//! let job = study.create_job("user1", "teach me the Krebs cycle", Utc::now())?;
//!
//! // Review what's due.
//! if let Some(item) = study.next_review_item("user1", Utc::now())? {
//!     println!("{}", item.phrasing.question);
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod jobs;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod study;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use batch::{apply_batched, BatchOutcome};
pub use config::{BatchLimits, JobConfig, LlmProvider, LlmProviderConfig, QueueConfig, StudyConfig};
pub use error::{ErrorCode, MnemaError, MnemaResult};
pub use jobs::{JobRunner, StepDispatcher, StepOutcome};
pub use queue::{prioritize, select_active_phrasing, PhrasingSelection, QueueEntry, SelectionReason};
pub use scheduler::{Grade, ReviewScheduler, UNSEEN_RETRIEVABILITY};
pub use stats::compute_delta;
pub use store::StudyStore;
pub use study::{ReviewItem, ReviewOutcome, ReviewSubmission, Study};
pub use traits::{GenerationOptions, Llm, LlmConfig, LlmResponse, ResponseFormat, TokenUsage};
pub use types::{
    CardState, Concept, GenerationJob, Interaction, JobErrorCode, JobPhase, JobStatus,
    MemoryState, Message, MessageRole, Phrasing, PhrasingType, StatsDelta, UserStats,
};
