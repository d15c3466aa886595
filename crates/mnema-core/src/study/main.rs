//! Core Study implementation.
//!
//! Thin, validated entry points over the scheduling engine, queue,
//! stats maintenance, and the generation job pipeline. Pure components
//! never touch I/O; everything stateful goes through the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::thread_rng;
use tracing::info;
use uuid::Uuid;

use crate::config::StudyConfig;
use crate::error::{MnemaError, MnemaResult};
use crate::jobs::{JobRunner, StepDispatcher, StepOutcome};
use crate::queue::{prioritize, select_active_phrasing, SelectionReason};
use crate::scheduler::{Grade, ReviewScheduler};
use crate::stats::compute_delta;
use crate::store::StudyStore;
use crate::traits::Llm;
use crate::types::{
    Concept, GenerationJob, Interaction, JobStatus, Phrasing, SchedulingSnapshot, UserStats,
};

/// A submitted review answer.
#[derive(Debug, Clone)]
pub struct ReviewSubmission {
    pub user_id: String,
    pub concept_id: Uuid,
    pub phrasing_id: Uuid,
    pub user_answer: String,
    pub is_correct: bool,
    pub session_id: Option<String>,
}

/// The next item to present for review.
#[derive(Debug, Clone)]
pub struct ReviewItem {
    pub concept: Concept,
    pub phrasing: Phrasing,
    pub retrievability: f32,
    pub total_phrasings: usize,
    pub phrasing_index: usize,
    pub selection_reason: SelectionReason,
}

/// Result of grading a review answer.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub concept: Concept,
    pub grade: Grade,
    pub next_review: DateTime<Utc>,
    pub interaction_id: Uuid,
}

/// Main Study struct - the core of mnema.
///
/// Must be constructed inside a tokio runtime; the job dispatcher spawns
/// its drain task on creation.
pub struct Study {
    config: StudyConfig,
    store: Arc<StudyStore>,
    scheduler: ReviewScheduler,
    runner: Arc<JobRunner>,
    dispatcher: StepDispatcher,
}

impl Study {
    /// Create a Study backed by the database at `config.db_path`.
    pub fn new(config: StudyConfig, llm: Arc<dyn Llm>) -> MnemaResult<Self> {
        let store = Arc::new(StudyStore::new(&config.db_path)?);
        Ok(Self::with_store(config, llm, store))
    }

    /// Create a Study over an existing store (useful for testing).
    pub fn with_store(config: StudyConfig, llm: Arc<dyn Llm>, store: Arc<StudyStore>) -> Self {
        let runner = Arc::new(JobRunner::new(store.clone(), llm, config.jobs.clone()));
        let dispatcher = StepDispatcher::spawn(runner.clone());
        Self {
            config,
            store,
            scheduler: ReviewScheduler::new(),
            runner,
            dispatcher,
        }
    }

    // =========================================================================
    // Review reads
    // =========================================================================

    /// Count of currently due concepts, including new ones.
    pub fn due_count(&self, user_id: &str, now: DateTime<Utc>) -> MnemaResult<i64> {
        self.store.due_count(user_id, now)
    }

    /// The cached per-user aggregate counters.
    pub fn user_card_stats(&self, user_id: &str, now: DateTime<Utc>) -> MnemaResult<UserStats> {
        match self.store.get_user_stats(user_id)? {
            Some(stats) => Ok(stats),
            // No row yet: seed one from a scan. Only happens once per user.
            None => self.store.recalculate_user_stats(user_id, now),
        }
    }

    /// Full-scan stats recalculation, the drift-correction backstop.
    pub fn recalculate_stats(&self, user_id: &str, now: DateTime<Utc>) -> MnemaResult<UserStats> {
        self.store.recalculate_user_stats(user_id, now)
    }

    /// Pick the next due item to review, or None when nothing is due.
    pub fn next_review_item(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> MnemaResult<Option<ReviewItem>> {
        let due: Vec<Concept> = self
            .store
            .list_active_concepts(user_id)?
            .into_iter()
            .filter(|c| c.memory.is_due(now))
            .collect();

        let mut rng = thread_rng();
        let queue = prioritize(due, now, &self.scheduler, &self.config.queue, &mut rng);

        for entry in queue {
            let phrasings = self.store.list_active_phrasings(entry.concept.id)?;
            if let Some(selection) = select_active_phrasing(&entry.concept, &phrasings) {
                return Ok(Some(ReviewItem {
                    concept: entry.concept,
                    phrasing: selection.phrasing,
                    retrievability: entry.retrievability,
                    total_phrasings: selection.total_phrasings,
                    phrasing_index: selection.phrasing_index,
                    selection_reason: selection.reason,
                }));
            }
        }
        Ok(None)
    }

    /// Interaction history for a concept, most recent first.
    pub fn concept_history(
        &self,
        user_id: &str,
        concept_id: Uuid,
        limit: usize,
    ) -> MnemaResult<Vec<Interaction>> {
        let concept = self.store.get_concept_owned(concept_id, user_id)?;
        self.store.list_interactions(concept.id, limit)
    }

    // =========================================================================
    // Review writes
    // =========================================================================

    /// Grade a submitted answer and persist everything it changes: the
    /// concept's memory state, the phrasing's attempt counters, the
    /// immutable interaction record, and the stats delta, atomically.
    pub fn record_interaction(
        &self,
        submission: ReviewSubmission,
        now: DateTime<Utc>,
    ) -> MnemaResult<ReviewOutcome> {
        let mut concept = self
            .store
            .get_concept_owned(submission.concept_id, &submission.user_id)?;
        if !concept.is_active() {
            return Err(MnemaError::validation(format!(
                "Concept '{}' is archived",
                concept.id
            )));
        }

        let phrasing = self
            .store
            .get_phrasing_owned(submission.phrasing_id, &submission.user_id)?;
        if phrasing.concept_id != concept.id {
            return Err(MnemaError::validation(format!(
                "Phrasing '{}' does not belong to concept '{}'",
                phrasing.id, concept.id
            )));
        }
        if !phrasing.is_active() {
            return Err(MnemaError::validation(format!(
                "Phrasing '{}' is not active",
                phrasing.id
            )));
        }

        let old_state = concept.memory.state;
        let old_next_review = concept.memory.next_review;
        let (new_memory, grade) = self
            .scheduler
            .schedule(&concept.memory, submission.is_correct, now);

        let delta = compute_delta(
            Some(old_state),
            Some(new_memory.state),
            Some(old_next_review),
            Some(new_memory.next_review),
            now,
        );

        let snapshot = SchedulingSnapshot {
            interval_days: new_memory.scheduled_days,
            due_at: new_memory.next_review,
            memory: new_memory.clone(),
        };
        let mut interaction = Interaction::new(
            &submission.user_id,
            concept.id,
            phrasing.id,
            submission.user_answer,
            submission.is_correct,
            now,
        )
        .with_snapshot(snapshot);
        if let Some(session_id) = submission.session_id {
            interaction = interaction.with_session(session_id);
        }

        concept.memory = new_memory;
        self.store
            .record_review(&concept, &interaction, delta.as_ref(), now)?;

        Ok(ReviewOutcome {
            next_review: concept.memory.next_review,
            interaction_id: interaction.id,
            concept,
            grade,
        })
    }

    // =========================================================================
    // Concept lifecycle
    // =========================================================================

    /// Archive a concept and its phrasings, removing them from active
    /// scheduling.
    pub fn archive_concept(
        &self,
        user_id: &str,
        concept_id: Uuid,
        now: DateTime<Utc>,
    ) -> MnemaResult<()> {
        let concept = self.store.get_concept_owned(concept_id, user_id)?;
        if !concept.is_active() {
            return Err(MnemaError::validation(format!(
                "Concept '{}' is already archived",
                concept_id
            )));
        }
        self.store
            .archive_concept(&concept, &self.config.batch, now)?;
        Ok(())
    }

    /// Restore an archived concept and its phrasings.
    pub fn restore_concept(
        &self,
        user_id: &str,
        concept_id: Uuid,
        now: DateTime<Utc>,
    ) -> MnemaResult<()> {
        let concept = self.store.get_concept_owned(concept_id, user_id)?;
        if !concept.is_archived() {
            return Err(MnemaError::validation(format!(
                "Concept '{}' is not archived",
                concept_id
            )));
        }
        self.store
            .restore_concept(&concept, &self.config.batch, now)?;
        Ok(())
    }

    /// Soft-delete a concept and its phrasings. Deleted concepts never
    /// come back into any view.
    pub fn delete_concept(
        &self,
        user_id: &str,
        concept_id: Uuid,
        now: DateTime<Utc>,
    ) -> MnemaResult<()> {
        let concept = self.store.get_concept_owned(concept_id, user_id)?;
        self.store
            .delete_concept(&concept, &self.config.batch, now)?;
        Ok(())
    }

    /// Set or clear the canonical phrasing override for a concept.
    pub fn set_canonical_phrasing(
        &self,
        user_id: &str,
        concept_id: Uuid,
        phrasing_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> MnemaResult<()> {
        let concept = self.store.get_concept_owned(concept_id, user_id)?;
        if let Some(phrasing_id) = phrasing_id {
            let phrasing = self.store.get_phrasing_owned(phrasing_id, user_id)?;
            if phrasing.concept_id != concept.id {
                return Err(MnemaError::validation(format!(
                    "Phrasing '{}' does not belong to concept '{}'",
                    phrasing_id, concept_id
                )));
            }
            if !phrasing.is_active() {
                return Err(MnemaError::validation(format!(
                    "Phrasing '{}' is not active",
                    phrasing_id
                )));
            }
        }
        self.store
            .set_canonical_phrasing(concept.id, phrasing_id, now)
    }

    // =========================================================================
    // Generation jobs
    // =========================================================================

    /// Create a generation job and schedule its first step.
    pub fn create_job(
        &self,
        user_id: &str,
        prompt: &str,
        now: DateTime<Utc>,
    ) -> MnemaResult<GenerationJob> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(MnemaError::validation("Generation prompt must not be empty"));
        }

        let job = GenerationJob::new(user_id, prompt, now);
        self.store.insert_job(&job)?;
        self.dispatcher.enqueue(job.id)?;
        info!(job_id = %job.id, "generation job created");
        Ok(job)
    }

    /// Request cancellation of a job. Idempotent against a job that is
    /// already terminal; a step already in flight is allowed to finish
    /// and persist its results.
    pub fn cancel_job(
        &self,
        user_id: &str,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> MnemaResult<GenerationJob> {
        let mut job = self.store.get_job_owned(job_id, user_id)?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(now);
        self.store.update_job(&job)?;
        info!(job_id = %job.id, "generation job cancelled");
        Ok(job)
    }

    /// Get a job by ID.
    pub fn get_job(&self, user_id: &str, job_id: Uuid) -> MnemaResult<GenerationJob> {
        self.store.get_job_owned(job_id, user_id)
    }

    /// Run one job step directly, bypassing the dispatcher. Useful for
    /// host environments that drive steps themselves.
    pub async fn run_job_step(&self, job_id: Uuid, now: DateTime<Utc>) -> MnemaResult<StepOutcome> {
        self.runner.run_step(job_id, now).await
    }
}
