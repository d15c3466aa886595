//! Generation job persistence.
//!
//! Every pipeline step rewrites the full job row, so progress is durable
//! between invocations and a half-finished job is always inspectable.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_opt_ts, parse_ts, uuid_col, StudyStore};
use crate::error::{MnemaError, MnemaResult};
use crate::types::{GenerationJob, JobPhase, JobStatus};

const JOB_COLUMNS: &str = "id, user_id, prompt, status, phase, phrasing_generated, \
     phrasing_saved, estimated_total, concept_ids, pending_concept_ids, error_message, \
     error_code, retryable, created_at, started_at, completed_at";

impl StudyStore {
    /// Insert a freshly created job.
    pub fn insert_job(&self, job: &GenerationJob) -> MnemaResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO generation_jobs
             (id, user_id, prompt, status, phase, phrasing_generated, phrasing_saved,
              estimated_total, concept_ids, pending_concept_ids, error_message,
              error_code, retryable, created_at, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                job.id.to_string(),
                job.user_id,
                job.prompt,
                job.status.to_string(),
                job.phase.to_string(),
                job.phrasing_generated,
                job.phrasing_saved,
                job.estimated_total,
                ids_to_json(&job.concept_ids)?,
                ids_to_json(&job.pending_concept_ids)?,
                job.error_message,
                job.error_code.map(|c| c.to_string()),
                job.retryable,
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Persist the job's current state. Called after every step.
    pub fn update_job(&self, job: &GenerationJob) -> MnemaResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE generation_jobs SET
                status = ?1, phase = ?2, phrasing_generated = ?3, phrasing_saved = ?4,
                estimated_total = ?5, concept_ids = ?6, pending_concept_ids = ?7,
                error_message = ?8, error_code = ?9, retryable = ?10,
                started_at = ?11, completed_at = ?12
             WHERE id = ?13",
            params![
                job.status.to_string(),
                job.phase.to_string(),
                job.phrasing_generated,
                job.phrasing_saved,
                job.estimated_total,
                ids_to_json(&job.concept_ids)?,
                ids_to_json(&job.pending_concept_ids)?,
                job.error_message,
                job.error_code.map(|c| c.to_string()),
                job.retryable,
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
                job.id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Err(MnemaError::job_not_found(job.id.to_string()));
        }
        Ok(())
    }

    /// Get a job by ID.
    pub fn get_job(&self, job_id: Uuid) -> MnemaResult<Option<GenerationJob>> {
        let conn = self.lock()?;
        let result = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = ?1"),
                params![job_id.to_string()],
                job_from_row,
            )
            .optional()?;
        Ok(result)
    }

    /// Get a job, enforcing ownership.
    pub fn get_job_owned(&self, job_id: Uuid, user_id: &str) -> MnemaResult<GenerationJob> {
        let job = self
            .get_job(job_id)?
            .ok_or_else(|| MnemaError::job_not_found(job_id.to_string()))?;
        if job.user_id != user_id {
            return Err(MnemaError::not_owner(format!(
                "Job '{}' belongs to another user",
                job_id
            )));
        }
        Ok(job)
    }

    /// Jobs for a user, most recent first.
    pub fn list_jobs(&self, user_id: &str, limit: usize) -> MnemaResult<Vec<GenerationJob>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs
             WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2"
        ))?;
        let jobs = stmt
            .query_map(params![user_id, limit], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}

fn ids_to_json(ids: &[Uuid]) -> MnemaResult<String> {
    Ok(serde_json::to_string(
        &ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
    )?)
}

fn ids_from_json(json: &str) -> Vec<Uuid> {
    serde_json::from_str::<Vec<String>>(json)
        .unwrap_or_default()
        .iter()
        .filter_map(|s| Uuid::parse_str(s).ok())
        .collect()
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<GenerationJob> {
    let status: String = row.get(3)?;
    let phase: String = row.get(4)?;
    let concept_ids_json: String = row.get(8)?;
    let pending_json: String = row.get(9)?;
    let error_code: Option<String> = row.get(11)?;

    Ok(GenerationJob {
        id: uuid_col(row, 0)?,
        user_id: row.get(1)?,
        prompt: row.get(2)?,
        status: status.parse().unwrap_or(JobStatus::Failed),
        phase: phase.parse().unwrap_or(JobPhase::Clarifying),
        phrasing_generated: row.get(5)?,
        phrasing_saved: row.get(6)?,
        estimated_total: row.get(7)?,
        concept_ids: ids_from_json(&concept_ids_json),
        pending_concept_ids: ids_from_json(&pending_json),
        error_message: row.get(10)?,
        error_code: error_code.and_then(|s| s.parse().ok()),
        retryable: row.get(12)?,
        created_at: parse_ts(row.get(13)?),
        started_at: parse_opt_ts(row.get(14)?),
        completed_at: parse_opt_ts(row.get(15)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobErrorCode;

    fn epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_job_round_trip() {
        let store = StudyStore::in_memory().unwrap();
        let mut job = GenerationJob::new("user1", "teach me about enzymes", epoch());
        job.concept_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        job.pending_concept_ids = vec![job.concept_ids[1]];
        job.estimated_total = Some(6);

        store.insert_job(&job).unwrap();
        let loaded = store.get_job(job.id).unwrap().unwrap();

        assert_eq!(loaded.prompt, "teach me about enzymes");
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.phase, JobPhase::Clarifying);
        assert_eq!(loaded.concept_ids, job.concept_ids);
        assert_eq!(loaded.pending_concept_ids, job.pending_concept_ids);
        assert_eq!(loaded.estimated_total, Some(6));
    }

    #[test]
    fn test_update_persists_failure_fields() {
        let store = StudyStore::in_memory().unwrap();
        let mut job = GenerationJob::new("user1", "prompt", epoch());
        store.insert_job(&job).unwrap();

        job.status = JobStatus::Failed;
        job.error_message = Some("429 from provider".into());
        job.error_code = Some(JobErrorCode::RateLimit);
        job.retryable = true;
        job.completed_at = Some(epoch());
        store.update_job(&job).unwrap();

        let loaded = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.error_code, Some(JobErrorCode::RateLimit));
        assert!(loaded.retryable);
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn test_update_missing_job_errors() {
        let store = StudyStore::in_memory().unwrap();
        let job = GenerationJob::new("user1", "prompt", epoch());
        let err = store.update_job(&job).unwrap_err();
        assert!(matches!(err, MnemaError::NotFound { .. }));
    }

    #[test]
    fn test_get_job_owned_rejects_other_user() {
        let store = StudyStore::in_memory().unwrap();
        let job = GenerationJob::new("user1", "prompt", epoch());
        store.insert_job(&job).unwrap();

        let err = store.get_job_owned(job.id, "intruder").unwrap_err();
        assert!(matches!(err, MnemaError::Validation { .. }));
        assert!(store.get_job_owned(job.id, "user1").is_ok());
    }
}
