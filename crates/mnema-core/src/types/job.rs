//! Generation job types.
//!
//! A generation job tracks one content-generation request end to end
//! across the multi-phase pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::MnemaError;

/// Overall job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// A terminal job never schedules further steps.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Pipeline phase within a processing job. Advancement is monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobPhase {
    /// Resolve the raw prompt into a generation intent.
    Clarifying,
    /// One generation call producing candidate concepts.
    ConceptSynthesis,
    /// Candidate concepts persisted; phrasing work being laid out.
    Generating,
    /// One pending concept's phrasings per step.
    PhrasingGeneration,
    /// Close out counters and mark the job complete.
    Finalizing,
}

impl JobPhase {
    /// The next phase in the pipeline, or None at the end.
    pub fn next(&self) -> Option<JobPhase> {
        match self {
            JobPhase::Clarifying => Some(JobPhase::ConceptSynthesis),
            JobPhase::ConceptSynthesis => Some(JobPhase::Generating),
            JobPhase::Generating => Some(JobPhase::PhrasingGeneration),
            JobPhase::PhrasingGeneration => Some(JobPhase::Finalizing),
            JobPhase::Finalizing => None,
        }
    }
}

/// Classified failure cause for a generation job.
///
/// `retryable` drives whether a caller may resubmit the same job shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobErrorCode {
    RateLimit,
    ApiKey,
    Network,
    Unknown,
}

impl JobErrorCode {
    /// Classify an external-call error into a job error code.
    ///
    /// Unrecognized errors default to Unknown, which is not retryable.
    pub fn classify(err: &MnemaError) -> Self {
        match err {
            MnemaError::RateLimit { .. } => JobErrorCode::RateLimit,
            MnemaError::Authentication { .. } | MnemaError::Configuration(_) => {
                JobErrorCode::ApiKey
            }
            MnemaError::Network { .. } => JobErrorCode::Network,
            _ => JobErrorCode::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, JobErrorCode::RateLimit | JobErrorCode::Network)
    }
}

/// One content-generation request, tracked end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: Uuid,
    pub user_id: String,
    pub prompt: String,
    pub status: JobStatus,
    pub phase: JobPhase,
    /// Phrasings returned by the generation service, valid or not.
    pub phrasing_generated: u32,
    /// Phrasings that passed validation and were persisted.
    pub phrasing_saved: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_total: Option<u32>,
    /// Concepts created by concept synthesis. Preserved on failure.
    pub concept_ids: Vec<Uuid>,
    /// Concepts still awaiting phrasing generation.
    pub pending_concept_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<JobErrorCode>,
    pub retryable: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    pub fn new(user_id: impl Into<String>, prompt: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            prompt: prompt.into(),
            status: JobStatus::Pending,
            phase: JobPhase::Clarifying,
            phrasing_generated: 0,
            phrasing_saved: 0,
            estimated_total: None,
            concept_ids: Vec::new(),
            pending_concept_ids: Vec::new(),
            error_message: None,
            error_code: None,
            retryable: false,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}
