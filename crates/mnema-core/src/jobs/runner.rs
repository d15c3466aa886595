//! Generation job state machine.
//!
//! Each invocation of [`JobRunner::run_step`] performs one bounded unit
//! of work (one phase step, or one pending concept's phrasing work),
//! persists the job, and reports whether another step should be
//! scheduled. Progress is durable after every step, so the pipeline
//! survives restarts with no long-lived worker, and a cancelled or
//! failed job is always clearly terminal rather than silently stuck.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::JobConfig;
use crate::error::{MnemaError, MnemaResult};
use crate::store::StudyStore;
use crate::traits::{GenerationOptions, Llm, ResponseFormat};
use crate::types::{
    normalize_title, Concept, GenerationJob, JobErrorCode, JobPhase, JobStatus, Message, Phrasing,
};

use super::parser::{parse_concept_candidates, parse_phrasing_candidates};
use super::prompts::{
    concept_synthesis_prompt, concept_synthesis_system_prompt, phrasing_generation_prompt,
    phrasing_generation_system_prompt,
};

/// What the caller should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Schedule the next step.
    Continue,
    /// The job reached a terminal status; stop scheduling.
    Terminal,
}

/// Drives generation jobs through their phases.
pub struct JobRunner {
    store: Arc<StudyStore>,
    llm: Arc<dyn Llm>,
    config: JobConfig,
}

impl JobRunner {
    pub fn new(store: Arc<StudyStore>, llm: Arc<dyn Llm>, config: JobConfig) -> Self {
        Self { store, llm, config }
    }

    /// Perform one bounded unit of work for a job.
    ///
    /// Observing a terminal status (including a cancellation requested
    /// between steps) is a no-op, which makes cancellation cooperative
    /// and idempotent.
    pub async fn run_step(&self, job_id: Uuid, now: DateTime<Utc>) -> MnemaResult<StepOutcome> {
        let mut job = self
            .store
            .get_job(job_id)?
            .ok_or_else(|| MnemaError::job_not_found(job_id.to_string()))?;

        if job.status.is_terminal() {
            return Ok(StepOutcome::Terminal);
        }

        match (job.status, job.phase) {
            (JobStatus::Pending, _) => self.start(&mut job, now),
            (JobStatus::Processing, JobPhase::Clarifying) => {
                // Resume path for a job interrupted before synthesis.
                job.phase = JobPhase::ConceptSynthesis;
                self.store.update_job(&job)?;
                Ok(StepOutcome::Continue)
            }
            (JobStatus::Processing, JobPhase::ConceptSynthesis) => {
                self.synthesize_concepts(&mut job, now).await
            }
            (JobStatus::Processing, JobPhase::Generating) => self.lay_out_phrasing_work(&mut job),
            (JobStatus::Processing, JobPhase::PhrasingGeneration) => {
                self.generate_phrasings(&mut job, now).await
            }
            (JobStatus::Processing, JobPhase::Finalizing) => self.finalize(&mut job, now),
            // Terminal statuses were handled above.
            (status, phase) => Err(MnemaError::internal(format!(
                "job {} in unexpected state {status}/{phase}",
                job.id
            ))),
        }
    }

    /// Pending -> processing; the raw prompt becomes the clarified
    /// generation intent.
    fn start(&self, job: &mut GenerationJob, now: DateTime<Utc>) -> MnemaResult<StepOutcome> {
        job.status = JobStatus::Processing;
        job.started_at = Some(now);
        job.phase = JobPhase::ConceptSynthesis;
        self.store.update_job(job)?;
        debug!(job_id = %job.id, "generation job started");
        Ok(StepOutcome::Continue)
    }

    /// One generation call synthesizing candidate concepts, then persist
    /// the survivors.
    async fn synthesize_concepts(
        &self,
        job: &mut GenerationJob,
        now: DateTime<Utc>,
    ) -> MnemaResult<StepOutcome> {
        let messages = [
            Message::system(concept_synthesis_system_prompt()),
            Message::user(concept_synthesis_prompt(
                &job.prompt,
                self.config.max_concepts_per_job,
            )),
        ];
        let options = GenerationOptions {
            response_format: Some(ResponseFormat::Json),
            ..Default::default()
        };

        let response = match self.llm.generate(&messages, Some(options)).await {
            Ok(r) => r,
            Err(e) => return self.fail(job, e, now),
        };

        let candidates = parse_concept_candidates(response.content_or_empty());
        let mut seen_titles: HashSet<String> = HashSet::new();
        let mut created: Vec<Uuid> = Vec::new();

        for candidate in candidates
            .into_iter()
            .take(self.config.max_concepts_per_job as usize)
        {
            let normalized = normalize_title(&candidate.title);
            if normalized.chars().count() < self.config.min_title_len {
                debug!(job_id = %job.id, title = %candidate.title, "skipping too-short title");
                continue;
            }
            // Duplicates within the batch and against existing material
            // are skipped, not errors.
            if !seen_titles.insert(normalized.clone()) {
                continue;
            }
            if self.store.title_exists(&job.user_id, &normalized)? {
                debug!(job_id = %job.id, title = %candidate.title, "skipping duplicate title");
                continue;
            }

            let mut concept =
                Concept::new(&job.user_id, candidate.title, candidate.description, now);
            concept.content_type = Some("generated".to_string());
            self.store.create_concept(&concept, now)?;
            created.push(concept.id);
        }

        job.concept_ids = created.clone();
        job.pending_concept_ids = created;
        job.phase = JobPhase::Generating;
        self.store.update_job(job)?;
        info!(job_id = %job.id, concepts = job.concept_ids.len(), "concept synthesis complete");
        Ok(StepOutcome::Continue)
    }

    /// Size the phrasing work from the surviving concepts.
    fn lay_out_phrasing_work(&self, job: &mut GenerationJob) -> MnemaResult<StepOutcome> {
        job.estimated_total = Some(
            job.pending_concept_ids.len() as u32 * self.config.target_phrasings_per_concept,
        );
        job.phase = JobPhase::PhrasingGeneration;
        self.store.update_job(job)?;
        Ok(StepOutcome::Continue)
    }

    /// One pending concept's phrasing generation and persistence.
    async fn generate_phrasings(
        &self,
        job: &mut GenerationJob,
        now: DateTime<Utc>,
    ) -> MnemaResult<StepOutcome> {
        let concept_id = match job.pending_concept_ids.first().copied() {
            Some(id) => id,
            None => {
                job.phase = JobPhase::Finalizing;
                self.store.update_job(job)?;
                return Ok(StepOutcome::Continue);
            }
        };

        // A concept deleted between steps is skipped, not an error.
        let concept = match self.store.get_concept(concept_id)? {
            Some(c) if !c.is_deleted() => c,
            _ => {
                job.pending_concept_ids.retain(|id| *id != concept_id);
                self.store.update_job(job)?;
                return Ok(StepOutcome::Continue);
            }
        };

        let target = self.config.target_phrasings_per_concept;
        let messages = [
            Message::system(phrasing_generation_system_prompt()),
            Message::user(phrasing_generation_prompt(
                &concept.title,
                concept.description.as_deref(),
                target,
            )),
        ];
        let options = GenerationOptions {
            response_format: Some(ResponseFormat::Json),
            ..Default::default()
        };

        let response = match self.llm.generate(&messages, Some(options)).await {
            Ok(r) => r,
            // The concept stays pending so a retried job shape can pick
            // it back up; everything already created is preserved.
            Err(e) => return self.fail(job, e, now),
        };

        let parsed = parse_phrasing_candidates(response.content_or_empty());
        job.phrasing_generated += parsed.total as u32;

        for candidate in parsed.valid {
            let mut phrasing = Phrasing::new(
                concept.id,
                &job.user_id,
                candidate.question,
                candidate.correct_answer,
                now,
            );
            phrasing.options = candidate.options;
            phrasing.explanation = candidate.explanation;
            phrasing.phrasing_type = candidate.phrasing_type;

            self.store.insert_phrasing(&phrasing, target, now)?;
            job.phrasing_saved += 1;
        }

        job.pending_concept_ids.retain(|id| *id != concept_id);
        self.store.update_job(job)?;
        debug!(
            job_id = %job.id,
            concept_id = %concept_id,
            saved = job.phrasing_saved,
            generated = job.phrasing_generated,
            "phrasing generation step complete"
        );
        Ok(StepOutcome::Continue)
    }

    /// Close the job out. Fewer phrasings than requested is still a
    /// completed job.
    fn finalize(&self, job: &mut GenerationJob, now: DateTime<Utc>) -> MnemaResult<StepOutcome> {
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        self.store.update_job(job)?;
        info!(
            job_id = %job.id,
            concepts = job.concept_ids.len(),
            phrasings = job.phrasing_saved,
            "generation job completed"
        );
        Ok(StepOutcome::Terminal)
    }

    /// Convert an external-call error into persisted, inspectable job
    /// state. Partial progress is preserved, never rolled back.
    fn fail(
        &self,
        job: &mut GenerationJob,
        err: MnemaError,
        now: DateTime<Utc>,
    ) -> MnemaResult<StepOutcome> {
        let code = JobErrorCode::classify(&err);
        job.status = JobStatus::Failed;
        job.error_message = Some(err.to_string());
        job.error_code = Some(code);
        job.retryable = code.is_retryable();
        job.completed_at = Some(now);
        self.store.update_job(job)?;
        warn!(
            job_id = %job.id,
            error_code = %code,
            retryable = job.retryable,
            "generation job failed: {err}"
        );
        Ok(StepOutcome::Terminal)
    }
}
