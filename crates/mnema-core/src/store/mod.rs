//! SQLite-backed document store.
//!
//! Persists concepts, phrasings, interactions, generation jobs, and the
//! per-user stats row. Each mutation runs as an atomic unit against the
//! records it touches; stats deltas are applied inside the same
//! transaction as the triggering mutation.

mod jobs;
mod stats;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::batch::{apply_batched, BatchOutcome};
use crate::config::BatchLimits;
use crate::error::{MnemaError, MnemaResult};
use crate::stats::compute_delta;
use crate::types::{
    normalize_title, CardState, Concept, Interaction, MemoryState, Phrasing, PhrasingType,
    StatsDelta,
};

/// SQLite-backed store for all study records.
pub struct StudyStore {
    conn: Arc<Mutex<Connection>>,
}

const CONCEPT_COLUMNS: &str = "id, user_id, title, description, content_type, \
     stability, difficulty, last_review, next_review, elapsed_days, scheduled_days, \
     reps, lapses, card_state, retrievability, phrasing_count, conflict_score, \
     thin_score, quality_score, canonical_phrasing_id, created_at, updated_at, \
     archived_at, deleted_at";

const PHRASING_COLUMNS: &str = "id, concept_id, user_id, question, options, correct_answer, \
     explanation, phrasing_type, attempt_count, correct_count, last_attempted_at, \
     created_at, updated_at, archived_at, deleted_at";

impl StudyStore {
    /// Create a new store at the given database path.
    ///
    /// Creates the file, its parent directory, and the schema if needed.
    pub fn new<P: AsRef<Path>>(path: P) -> MnemaResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> MnemaResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn lock(&self) -> MnemaResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MnemaError::database(e.to_string()))
    }

    fn init_schema(&self) -> MnemaResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS concepts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                normalized_title TEXT NOT NULL,
                description TEXT,
                content_type TEXT,
                stability REAL NOT NULL DEFAULT 0,
                difficulty REAL NOT NULL DEFAULT 5,
                last_review TEXT,
                next_review TEXT NOT NULL,
                elapsed_days INTEGER NOT NULL DEFAULT 0,
                scheduled_days INTEGER NOT NULL DEFAULT 0,
                reps INTEGER NOT NULL DEFAULT 0,
                lapses INTEGER NOT NULL DEFAULT 0,
                card_state TEXT NOT NULL DEFAULT 'new',
                retrievability REAL,
                phrasing_count INTEGER NOT NULL DEFAULT 0,
                conflict_score REAL NOT NULL DEFAULT 0,
                thin_score REAL NOT NULL DEFAULT 0,
                quality_score REAL NOT NULL DEFAULT 0,
                canonical_phrasing_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                archived_at TEXT,
                deleted_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_concepts_user_lifecycle
                ON concepts(user_id, deleted_at, archived_at);
            CREATE INDEX IF NOT EXISTS idx_concepts_user_next_review
                ON concepts(user_id, next_review);
            CREATE INDEX IF NOT EXISTS idx_concepts_user_title
                ON concepts(user_id, normalized_title);

            CREATE TABLE IF NOT EXISTS phrasings (
                id TEXT PRIMARY KEY,
                concept_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                question TEXT NOT NULL,
                options TEXT NOT NULL DEFAULT '[]',
                correct_answer TEXT NOT NULL,
                explanation TEXT,
                phrasing_type TEXT NOT NULL DEFAULT 'multiple_choice',
                attempt_count INTEGER NOT NULL DEFAULT 0,
                correct_count INTEGER NOT NULL DEFAULT 0,
                last_attempted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                archived_at TEXT,
                deleted_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_phrasings_concept_lifecycle
                ON phrasings(concept_id, deleted_at, archived_at);
            CREATE INDEX IF NOT EXISTS idx_phrasings_user_concept_archived
                ON phrasings(user_id, concept_id, archived_at);

            CREATE TABLE IF NOT EXISTS interactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                concept_id TEXT NOT NULL,
                phrasing_id TEXT NOT NULL,
                user_answer TEXT NOT NULL,
                is_correct INTEGER NOT NULL,
                session_id TEXT,
                snapshot TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_interactions_concept_created
                ON interactions(concept_id, created_at);

            CREATE TABLE IF NOT EXISTS user_stats (
                user_id TEXT PRIMARY KEY,
                total_cards INTEGER NOT NULL DEFAULT 0,
                new_count INTEGER NOT NULL DEFAULT 0,
                learning_count INTEGER NOT NULL DEFAULT 0,
                mature_count INTEGER NOT NULL DEFAULT 0,
                due_now_count INTEGER NOT NULL DEFAULT 0,
                next_review_time TEXT,
                last_calculated TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS generation_jobs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                prompt TEXT NOT NULL,
                status TEXT NOT NULL,
                phase TEXT NOT NULL,
                phrasing_generated INTEGER NOT NULL DEFAULT 0,
                phrasing_saved INTEGER NOT NULL DEFAULT 0,
                estimated_total INTEGER,
                concept_ids TEXT NOT NULL DEFAULT '[]',
                pending_concept_ids TEXT NOT NULL DEFAULT '[]',
                error_message TEXT,
                error_code TEXT,
                retryable INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_user_status
                ON generation_jobs(user_id, status);
            ",
        )?;

        Ok(())
    }

    // =========================================================================
    // Concepts
    // =========================================================================

    /// Insert a new concept and apply the creation stats delta in the
    /// same transaction.
    pub fn create_concept(&self, concept: &Concept, now: DateTime<Utc>) -> MnemaResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO concepts
             (id, user_id, title, normalized_title, description, content_type,
              stability, difficulty, last_review, next_review, elapsed_days, scheduled_days,
              reps, lapses, card_state, retrievability, phrasing_count, conflict_score,
              thin_score, quality_score, canonical_phrasing_id, created_at, updated_at,
              archived_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
            params![
                concept.id.to_string(),
                concept.user_id,
                concept.title,
                normalize_title(&concept.title),
                concept.description,
                concept.content_type,
                concept.memory.stability,
                concept.memory.difficulty,
                concept.memory.last_review.map(|t| t.to_rfc3339()),
                concept.memory.next_review.to_rfc3339(),
                concept.memory.elapsed_days,
                concept.memory.scheduled_days,
                concept.memory.reps,
                concept.memory.lapses,
                concept.memory.state.to_string(),
                concept.memory.retrievability,
                concept.phrasing_count,
                concept.conflict_score,
                concept.thin_score,
                concept.quality_score,
                concept.canonical_phrasing_id.map(|id| id.to_string()),
                concept.created_at.to_rfc3339(),
                concept.updated_at.to_rfc3339(),
                concept.archived_at.map(|t| t.to_rfc3339()),
                concept.deleted_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        if let Some(delta) = compute_delta(
            None,
            Some(concept.memory.state),
            None,
            Some(concept.memory.next_review),
            now,
        ) {
            stats::apply_delta_conn(&tx, &concept.user_id, &delta, now)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Get a concept by ID, including archived and deleted ones.
    pub fn get_concept(&self, concept_id: Uuid) -> MnemaResult<Option<Concept>> {
        let conn = self.lock()?;
        let result = conn
            .query_row(
                &format!("SELECT {CONCEPT_COLUMNS} FROM concepts WHERE id = ?1"),
                params![concept_id.to_string()],
                concept_from_row,
            )
            .optional()?;
        Ok(result)
    }

    /// Get a non-deleted concept, enforcing ownership.
    ///
    /// Deleted concepts never surface; a wrong owner is a validation
    /// error, not a not-found, so callers can distinguish the two.
    pub fn get_concept_owned(&self, concept_id: Uuid, user_id: &str) -> MnemaResult<Concept> {
        let concept = self
            .get_concept(concept_id)?
            .filter(|c| !c.is_deleted())
            .ok_or_else(|| MnemaError::concept_not_found(concept_id.to_string()))?;
        if concept.user_id != user_id {
            return Err(MnemaError::not_owner(format!(
                "Concept '{}' belongs to another user",
                concept_id
            )));
        }
        Ok(concept)
    }

    /// All active (non-archived, non-deleted) concepts for a user.
    pub fn list_active_concepts(&self, user_id: &str) -> MnemaResult<Vec<Concept>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONCEPT_COLUMNS} FROM concepts
             WHERE user_id = ?1 AND deleted_at IS NULL AND archived_at IS NULL
             ORDER BY next_review ASC"
        ))?;
        let concepts = stmt
            .query_map(params![user_id], concept_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(concepts)
    }

    /// Whether a non-deleted concept with this normalized title exists.
    pub fn title_exists(&self, user_id: &str, normalized_title: &str) -> MnemaResult<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM concepts
             WHERE user_id = ?1 AND normalized_title = ?2 AND deleted_at IS NULL",
            params![user_id, normalized_title],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Persist a graded review: concept memory update, phrasing attempt
    /// counters, the immutable interaction record, and the stats delta,
    /// all in one transaction.
    pub fn record_review(
        &self,
        concept: &Concept,
        interaction: &Interaction,
        delta: Option<&StatsDelta>,
        now: DateTime<Utc>,
    ) -> MnemaResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE concepts SET
                stability = ?1, difficulty = ?2, last_review = ?3, next_review = ?4,
                elapsed_days = ?5, scheduled_days = ?6, reps = ?7, lapses = ?8,
                card_state = ?9, retrievability = ?10, updated_at = ?11
             WHERE id = ?12",
            params![
                concept.memory.stability,
                concept.memory.difficulty,
                concept.memory.last_review.map(|t| t.to_rfc3339()),
                concept.memory.next_review.to_rfc3339(),
                concept.memory.elapsed_days,
                concept.memory.scheduled_days,
                concept.memory.reps,
                concept.memory.lapses,
                concept.memory.state.to_string(),
                concept.memory.retrievability,
                now.to_rfc3339(),
                concept.id.to_string(),
            ],
        )?;

        tx.execute(
            "UPDATE phrasings SET
                attempt_count = attempt_count + 1,
                correct_count = correct_count + ?1,
                last_attempted_at = ?2,
                updated_at = ?2
             WHERE id = ?3",
            params![
                if interaction.is_correct { 1 } else { 0 },
                now.to_rfc3339(),
                interaction.phrasing_id.to_string(),
            ],
        )?;

        let snapshot_json = interaction
            .snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        tx.execute(
            "INSERT INTO interactions
             (id, user_id, concept_id, phrasing_id, user_answer, is_correct,
              session_id, snapshot, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                interaction.id.to_string(),
                interaction.user_id,
                interaction.concept_id.to_string(),
                interaction.phrasing_id.to_string(),
                interaction.user_answer,
                interaction.is_correct,
                interaction.session_id,
                snapshot_json,
                interaction.created_at.to_rfc3339(),
            ],
        )?;

        if let Some(delta) = delta {
            stats::apply_delta_conn(&tx, &concept.user_id, delta, now)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Interaction history for a concept, most recent first.
    pub fn list_interactions(
        &self,
        concept_id: Uuid,
        limit: usize,
    ) -> MnemaResult<Vec<Interaction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, concept_id, phrasing_id, user_answer, is_correct,
                    session_id, snapshot, created_at
             FROM interactions WHERE concept_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let interactions = stmt
            .query_map(params![concept_id.to_string(), limit], interaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(interactions)
    }

    /// Archive a concept: bulk-archive its phrasings, then archive the
    /// concept row and remove it from active scheduling counters.
    pub fn archive_concept(
        &self,
        concept: &Concept,
        limits: &BatchLimits,
        now: DateTime<Utc>,
    ) -> MnemaResult<BatchOutcome> {
        let outcome = self.archive_phrasings_bulk(&concept.user_id, concept.id, limits, now)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE concepts SET archived_at = ?1, updated_at = ?1, phrasing_count = 0
             WHERE id = ?2 AND archived_at IS NULL AND deleted_at IS NULL",
            params![now.to_rfc3339(), concept.id.to_string()],
        )?;
        if let Some(delta) = compute_delta(
            Some(concept.memory.state),
            None,
            Some(concept.memory.next_review),
            None,
            now,
        ) {
            stats::apply_delta_conn(&tx, &concept.user_id, &delta, now)?;
        }
        tx.commit()?;
        Ok(outcome)
    }

    /// Restore an archived concept and its phrasings.
    pub fn restore_concept(
        &self,
        concept: &Concept,
        limits: &BatchLimits,
        now: DateTime<Utc>,
    ) -> MnemaResult<BatchOutcome> {
        let outcome = self.restore_phrasings_bulk(&concept.user_id, concept.id, limits, now)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE concepts SET archived_at = NULL, updated_at = ?1,
                phrasing_count = (SELECT COUNT(*) FROM phrasings
                                  WHERE concept_id = ?2 AND deleted_at IS NULL
                                    AND archived_at IS NULL)
             WHERE id = ?2 AND archived_at IS NOT NULL AND deleted_at IS NULL",
            params![now.to_rfc3339(), concept.id.to_string()],
        )?;
        if let Some(delta) = compute_delta(
            None,
            Some(concept.memory.state),
            None,
            Some(concept.memory.next_review),
            now,
        ) {
            stats::apply_delta_conn(&tx, &concept.user_id, &delta, now)?;
        }
        tx.commit()?;
        Ok(outcome)
    }

    /// Soft-delete a concept and its phrasings. Never hard-deletes.
    pub fn delete_concept(
        &self,
        concept: &Concept,
        limits: &BatchLimits,
        now: DateTime<Utc>,
    ) -> MnemaResult<BatchOutcome> {
        let outcome = self.delete_phrasings_bulk(&concept.user_id, concept.id, limits, now)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE concepts SET deleted_at = ?1, updated_at = ?1, phrasing_count = 0
             WHERE id = ?2 AND deleted_at IS NULL",
            params![now.to_rfc3339(), concept.id.to_string()],
        )?;
        // An archived concept already left the scheduling counters.
        if concept.is_active() {
            if let Some(delta) = compute_delta(
                Some(concept.memory.state),
                None,
                Some(concept.memory.next_review),
                None,
                now,
            ) {
                stats::apply_delta_conn(&tx, &concept.user_id, &delta, now)?;
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    /// Set or clear the canonical phrasing override for a concept.
    pub fn set_canonical_phrasing(
        &self,
        concept_id: Uuid,
        phrasing_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> MnemaResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE concepts SET canonical_phrasing_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                phrasing_id.map(|id| id.to_string()),
                now.to_rfc3339(),
                concept_id.to_string(),
            ],
        )?;
        Ok(())
    }

    // =========================================================================
    // Phrasings
    // =========================================================================

    /// Insert a phrasing and keep the concept's denormalized
    /// `phrasing_count` and derived scores consistent, in one
    /// transaction.
    pub fn insert_phrasing(
        &self,
        phrasing: &Phrasing,
        target_phrasings: u32,
        now: DateTime<Utc>,
    ) -> MnemaResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO phrasings
             (id, concept_id, user_id, question, options, correct_answer, explanation,
              phrasing_type, attempt_count, correct_count, last_attempted_at,
              created_at, updated_at, archived_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                phrasing.id.to_string(),
                phrasing.concept_id.to_string(),
                phrasing.user_id,
                phrasing.question,
                serde_json::to_string(&phrasing.options)?,
                phrasing.correct_answer,
                phrasing.explanation,
                phrasing.phrasing_type.to_string(),
                phrasing.attempt_count,
                phrasing.correct_count,
                phrasing.last_attempted_at.map(|t| t.to_rfc3339()),
                phrasing.created_at.to_rfc3339(),
                phrasing.updated_at.to_rfc3339(),
                phrasing.archived_at.map(|t| t.to_rfc3339()),
                phrasing.deleted_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        tx.execute(
            "UPDATE concepts SET phrasing_count = phrasing_count + 1, updated_at = ?1
             WHERE id = ?2",
            params![now.to_rfc3339(), phrasing.concept_id.to_string()],
        )?;

        // Refresh derived heuristics from the new coverage.
        let mut concept = tx
            .query_row(
                &format!("SELECT {CONCEPT_COLUMNS} FROM concepts WHERE id = ?1"),
                params![phrasing.concept_id.to_string()],
                concept_from_row,
            )
            .optional()?
            .ok_or_else(|| MnemaError::concept_not_found(phrasing.concept_id.to_string()))?;
        concept.refresh_derived_scores(target_phrasings);
        tx.execute(
            "UPDATE concepts SET thin_score = ?1, quality_score = ?2 WHERE id = ?3",
            params![
                concept.thin_score,
                concept.quality_score,
                concept.id.to_string()
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Get a phrasing by ID, including inactive ones.
    pub fn get_phrasing(&self, phrasing_id: Uuid) -> MnemaResult<Option<Phrasing>> {
        let conn = self.lock()?;
        let result = conn
            .query_row(
                &format!("SELECT {PHRASING_COLUMNS} FROM phrasings WHERE id = ?1"),
                params![phrasing_id.to_string()],
                phrasing_from_row,
            )
            .optional()?;
        Ok(result)
    }

    /// Get a non-deleted phrasing, enforcing ownership.
    pub fn get_phrasing_owned(&self, phrasing_id: Uuid, user_id: &str) -> MnemaResult<Phrasing> {
        let phrasing = self
            .get_phrasing(phrasing_id)?
            .filter(|p| p.deleted_at.is_none())
            .ok_or_else(|| MnemaError::phrasing_not_found(phrasing_id.to_string()))?;
        if phrasing.user_id != user_id {
            return Err(MnemaError::not_owner(format!(
                "Phrasing '{}' belongs to another user",
                phrasing_id
            )));
        }
        Ok(phrasing)
    }

    /// Active phrasings for a concept, oldest first.
    pub fn list_active_phrasings(&self, concept_id: Uuid) -> MnemaResult<Vec<Phrasing>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PHRASING_COLUMNS} FROM phrasings
             WHERE concept_id = ?1 AND deleted_at IS NULL AND archived_at IS NULL
             ORDER BY created_at ASC"
        ))?;
        let phrasings = stmt
            .query_map(params![concept_id.to_string()], phrasing_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(phrasings)
    }

    /// Bulk-archive a concept's active phrasings in bounded batches.
    ///
    /// The selector filters on `archived_at`, the column the patch sets,
    /// so pagination never revisits patched rows.
    pub fn archive_phrasings_bulk(
        &self,
        user_id: &str,
        concept_id: Uuid,
        limits: &BatchLimits,
        now: DateTime<Utc>,
    ) -> MnemaResult<BatchOutcome> {
        apply_batched(
            |limit| {
                self.phrasing_ids_where(
                    user_id,
                    concept_id,
                    "deleted_at IS NULL AND archived_at IS NULL",
                    limit,
                )
            },
            |id| {
                let conn = self.lock()?;
                conn.execute(
                    "UPDATE phrasings SET archived_at = ?1, updated_at = ?1 WHERE id = ?2",
                    params![now.to_rfc3339(), id.to_string()],
                )?;
                Ok(())
            },
            limits,
        )
    }

    /// Bulk-restore a concept's archived phrasings.
    pub fn restore_phrasings_bulk(
        &self,
        user_id: &str,
        concept_id: Uuid,
        limits: &BatchLimits,
        now: DateTime<Utc>,
    ) -> MnemaResult<BatchOutcome> {
        apply_batched(
            |limit| {
                self.phrasing_ids_where(
                    user_id,
                    concept_id,
                    "deleted_at IS NULL AND archived_at IS NOT NULL",
                    limit,
                )
            },
            |id| {
                let conn = self.lock()?;
                conn.execute(
                    "UPDATE phrasings SET archived_at = NULL, updated_at = ?1 WHERE id = ?2",
                    params![now.to_rfc3339(), id.to_string()],
                )?;
                Ok(())
            },
            limits,
        )
    }

    /// Bulk soft-delete a concept's phrasings.
    pub fn delete_phrasings_bulk(
        &self,
        user_id: &str,
        concept_id: Uuid,
        limits: &BatchLimits,
        now: DateTime<Utc>,
    ) -> MnemaResult<BatchOutcome> {
        apply_batched(
            |limit| self.phrasing_ids_where(user_id, concept_id, "deleted_at IS NULL", limit),
            |id| {
                let conn = self.lock()?;
                conn.execute(
                    "UPDATE phrasings SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
                    params![now.to_rfc3339(), id.to_string()],
                )?;
                Ok(())
            },
            limits,
        )
    }

    fn phrasing_ids_where(
        &self,
        user_id: &str,
        concept_id: Uuid,
        predicate: &str,
        limit: usize,
    ) -> MnemaResult<Vec<Uuid>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id FROM phrasings
             WHERE user_id = ?1 AND concept_id = ?2 AND {predicate}
             ORDER BY created_at ASC LIMIT ?3"
        ))?;
        let ids = stmt
            .query_map(params![user_id, concept_id.to_string(), limit], |row| {
                let id: String = row.get(0)?;
                Ok(id)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        ids.into_iter()
            .map(|s| {
                Uuid::parse_str(&s).map_err(|e| MnemaError::database(format!("bad uuid: {e}")))
            })
            .collect()
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    Ok(s.and_then(|s| Uuid::parse_str(&s).ok()))
}

fn concept_from_row(row: &Row<'_>) -> rusqlite::Result<Concept> {
    let card_state: String = row.get(13)?;
    let memory = MemoryState {
        stability: row.get(5)?,
        difficulty: row.get(6)?,
        last_review: parse_opt_ts(row.get(7)?),
        next_review: parse_ts(row.get(8)?),
        elapsed_days: row.get(9)?,
        scheduled_days: row.get(10)?,
        reps: row.get(11)?,
        lapses: row.get(12)?,
        state: card_state.parse().unwrap_or(CardState::New),
        retrievability: row.get(14)?,
    };

    Ok(Concept {
        id: uuid_col(row, 0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        content_type: row.get(4)?,
        memory,
        phrasing_count: row.get(15)?,
        conflict_score: row.get(16)?,
        thin_score: row.get(17)?,
        quality_score: row.get(18)?,
        canonical_phrasing_id: opt_uuid_col(row, 19)?,
        created_at: parse_ts(row.get(20)?),
        updated_at: parse_ts(row.get(21)?),
        archived_at: parse_opt_ts(row.get(22)?),
        deleted_at: parse_opt_ts(row.get(23)?),
    })
}

fn phrasing_from_row(row: &Row<'_>) -> rusqlite::Result<Phrasing> {
    let options_json: String = row.get(4)?;
    let phrasing_type: String = row.get(7)?;

    Ok(Phrasing {
        id: uuid_col(row, 0)?,
        concept_id: uuid_col(row, 1)?,
        user_id: row.get(2)?,
        question: row.get(3)?,
        options: serde_json::from_str(&options_json).unwrap_or_default(),
        correct_answer: row.get(5)?,
        explanation: row.get(6)?,
        phrasing_type: phrasing_type.parse().unwrap_or(PhrasingType::MultipleChoice),
        attempt_count: row.get(8)?,
        correct_count: row.get(9)?,
        last_attempted_at: parse_opt_ts(row.get(10)?),
        created_at: parse_ts(row.get(11)?),
        updated_at: parse_ts(row.get(12)?),
        archived_at: parse_opt_ts(row.get(13)?),
        deleted_at: parse_opt_ts(row.get(14)?),
    })
}

fn interaction_from_row(row: &Row<'_>) -> rusqlite::Result<Interaction> {
    let snapshot_json: Option<String> = row.get(7)?;

    Ok(Interaction {
        id: uuid_col(row, 0)?,
        user_id: row.get(1)?,
        concept_id: uuid_col(row, 2)?,
        phrasing_id: uuid_col(row, 3)?,
        user_answer: row.get(4)?,
        is_correct: row.get(5)?,
        session_id: row.get(6)?,
        snapshot: snapshot_json.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_ts(row.get(8)?),
    })
}
