//! End-to-end flows across the generation pipeline and the review loop.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use mnema_core::error::{MnemaError, MnemaResult};
use mnema_core::traits::{GenerationOptions, Llm, LlmResponse};
use mnema_core::types::{GenerationJob, JobErrorCode, JobStatus, Message};
use mnema_core::{
    CardState, ReviewSubmission, SelectionReason, StepOutcome, Study, StudyConfig, StudyStore,
};

/// Scripted LLM double: pops one queued reply per call.
struct ScriptedLlm {
    replies: Mutex<VecDeque<MnemaResult<String>>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<MnemaResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl Llm for ScriptedLlm {
    async fn generate(
        &self,
        _messages: &[Message],
        _options: Option<GenerationOptions>,
    ) -> MnemaResult<LlmResponse> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(MnemaError::llm("script exhausted")));
        reply.map(|content| LlmResponse {
            content: Some(content),
            usage: None,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00+00:00")
        .unwrap()
        .with_timezone(&Utc)
}

fn concepts_reply(titles: &[&str]) -> MnemaResult<String> {
    let items: Vec<String> = titles
        .iter()
        .map(|t| format!(r#"{{"title": "{t}", "description": "About {t}"}}"#))
        .collect();
    Ok(format!(r#"{{"concepts": [{}]}}"#, items.join(",")))
}

fn phrasings_reply(count: usize) -> MnemaResult<String> {
    let items: Vec<String> = (0..count)
        .map(|i| {
            format!(r#"{{"question": "Q{i}?", "type": "short_answer", "correctAnswer": "A{i}"}}"#)
        })
        .collect();
    Ok(format!(r#"{{"phrasings": [{}]}}"#, items.join(",")))
}

fn study_with(replies: Vec<MnemaResult<String>>) -> (Study, Arc<StudyStore>) {
    let store = Arc::new(StudyStore::in_memory().unwrap());
    let study = Study::with_store(StudyConfig::default(), ScriptedLlm::new(replies), store.clone());
    (study, store)
}

/// Insert a job directly and drive it manually, avoiding a race with
/// the background dispatcher.
async fn drive_job(study: &Study, store: &StudyStore, prompt: &str) -> GenerationJob {
    let job = GenerationJob::new("user1", prompt, epoch());
    store.insert_job(&job).unwrap();

    let mut now = epoch();
    for _ in 0..50 {
        now += Duration::seconds(1);
        if study.run_job_step(job.id, now).await.unwrap() == StepOutcome::Terminal {
            break;
        }
    }
    store.get_job(job.id).unwrap().unwrap()
}

#[tokio::test]
async fn test_generation_then_review_flow() {
    let (study, store) = study_with(vec![
        concepts_reply(&["Mitosis", "Meiosis"]),
        phrasings_reply(2),
        phrasings_reply(2),
    ]);

    let job = drive_job(&study, &store, "cell division").await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.phrasing_saved, 4);

    let now = epoch() + Duration::minutes(1);
    assert_eq!(study.due_count("user1", now).unwrap(), 2);

    // Fresh generated material is presentable immediately.
    let item = study.next_review_item("user1", now).unwrap().unwrap();
    assert!(item.retrievability < 0.0, "unseen material sorts in the negative band");
    assert_eq!(item.selection_reason, SelectionReason::LeastSeen);
    assert_eq!(item.total_phrasings, 2);

    // Answer it correctly; the card graduates out of the due set.
    let outcome = study
        .record_interaction(
            ReviewSubmission {
                user_id: "user1".into(),
                concept_id: item.concept.id,
                phrasing_id: item.phrasing.id,
                user_answer: "A0".into(),
                is_correct: true,
                session_id: Some("session-1".into()),
            },
            now,
        )
        .unwrap();
    assert_eq!(outcome.concept.memory.reps, 1);
    assert_eq!(outcome.concept.memory.state, CardState::Learning);
    assert!(outcome.next_review > now);

    let stats = study.user_card_stats("user1", now).unwrap();
    assert_eq!(stats.total_cards, 2);
    assert_eq!(stats.new_count, 1);
    assert_eq!(stats.learning_count, 1);
    assert_eq!(
        stats.new_count + stats.learning_count + stats.mature_count,
        stats.total_cards
    );

    assert_eq!(study.due_count("user1", now).unwrap(), 1);

    // The interaction is on record with its scheduling snapshot.
    let history = study
        .concept_history("user1", item.concept.id, 10)
        .unwrap();
    assert_eq!(history.len(), 1);
    let snapshot = history[0].snapshot.as_ref().unwrap();
    assert_eq!(snapshot.due_at, outcome.next_review);
}

#[tokio::test]
async fn test_incorrect_answer_keeps_card_due_soon() {
    let (study, store) = study_with(vec![concepts_reply(&["Mitosis"]), phrasings_reply(1)]);
    drive_job(&study, &store, "cell division").await;

    let now = epoch() + Duration::minutes(1);
    let item = study.next_review_item("user1", now).unwrap().unwrap();
    let outcome = study
        .record_interaction(
            ReviewSubmission {
                user_id: "user1".into(),
                concept_id: item.concept.id,
                phrasing_id: item.phrasing.id,
                user_answer: "wrong".into(),
                is_correct: false,
                session_id: None,
            },
            now,
        )
        .unwrap();

    // A missed first answer stays on a sub-day interval.
    assert!(outcome.next_review <= now + Duration::days(1));
    assert_eq!(outcome.concept.memory.lapses, 0);

    // Later that day it is due again and re-presented.
    let later = now + Duration::days(1);
    assert_eq!(study.due_count("user1", later).unwrap(), 1);
    assert!(study.next_review_item("user1", later).unwrap().is_some());
}

#[tokio::test]
async fn test_background_dispatcher_completes_job() {
    let (study, _store) = study_with(vec![concepts_reply(&["Mitosis"]), phrasings_reply(2)]);

    let job = study.create_job("user1", "cell division", epoch()).unwrap();

    // The dispatcher drives the job to terminal in the background.
    let mut status = JobStatus::Pending;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        status = study.get_job("user1", job.id).unwrap().status;
        if status.is_terminal() {
            break;
        }
    }
    assert_eq!(status, JobStatus::Completed);

    let done = study.get_job("user1", job.id).unwrap();
    assert_eq!(done.concept_ids.len(), 1);
    assert_eq!(done.phrasing_saved, 2);
}

#[tokio::test]
async fn test_failed_stage_b_job_keeps_concepts_reviewable() {
    let (study, store) = study_with(vec![
        concepts_reply(&["Mitosis", "Meiosis"]),
        phrasings_reply(2),
        Err(MnemaError::rate_limit("429")),
    ]);

    let job = drive_job(&study, &store, "cell division").await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(JobErrorCode::RateLimit));
    assert!(job.retryable);
    assert!(!job.concept_ids.is_empty());

    // The concept that did get phrasings is fully reviewable.
    let now = epoch() + Duration::minutes(1);
    let item = study.next_review_item("user1", now).unwrap().unwrap();
    assert_eq!(item.total_phrasings, 2);
}

#[tokio::test]
async fn test_cancel_job_is_idempotent_and_observed() {
    let (study, store) = study_with(vec![
        concepts_reply(&["Mitosis"]),
        phrasings_reply(2),
    ]);
    let job = GenerationJob::new("user1", "cell division", epoch());
    store.insert_job(&job).unwrap();

    // Partially run: start + synthesis.
    study.run_job_step(job.id, epoch()).await.unwrap();
    study.run_job_step(job.id, epoch()).await.unwrap();

    let cancelled = study.cancel_job("user1", job.id, epoch()).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    // Cancelling again is a no-op returning the same terminal job.
    let again = study.cancel_job("user1", job.id, epoch()).unwrap();
    assert_eq!(again.status, JobStatus::Cancelled);
    assert_eq!(again.completed_at, cancelled.completed_at);

    // The next scheduled step observes the cancellation.
    assert_eq!(
        study.run_job_step(job.id, epoch()).await.unwrap(),
        StepOutcome::Terminal
    );

    // Concepts already created remain.
    assert_eq!(study.due_count("user1", epoch() + Duration::minutes(1)).unwrap(), 1);
}

#[tokio::test]
async fn test_cross_user_access_is_rejected() {
    let (study, store) = study_with(vec![concepts_reply(&["Mitosis"]), phrasings_reply(1)]);
    drive_job(&study, &store, "cell division").await;

    let now = epoch() + Duration::minutes(1);
    let item = study.next_review_item("user1", now).unwrap().unwrap();

    let err = study
        .record_interaction(
            ReviewSubmission {
                user_id: "intruder".into(),
                concept_id: item.concept.id,
                phrasing_id: item.phrasing.id,
                user_answer: "A0".into(),
                is_correct: true,
                session_id: None,
            },
            now,
        )
        .unwrap_err();
    assert!(matches!(err, MnemaError::Validation { .. }));

    let err = study.get_job("intruder", store.list_jobs("user1", 1).unwrap()[0].id);
    assert!(err.is_err());
}

#[tokio::test]
async fn test_archive_removes_from_queue_and_restore_brings_back() {
    let (study, store) = study_with(vec![concepts_reply(&["Mitosis"]), phrasings_reply(2)]);
    drive_job(&study, &store, "cell division").await;

    let now = epoch() + Duration::minutes(1);
    let item = study.next_review_item("user1", now).unwrap().unwrap();
    let concept_id = item.concept.id;

    study.archive_concept("user1", concept_id, now).unwrap();
    assert!(study.next_review_item("user1", now).unwrap().is_none());
    assert_eq!(study.due_count("user1", now).unwrap(), 0);

    // Archiving twice is a validation error, not silent.
    assert!(study.archive_concept("user1", concept_id, now).is_err());

    study.restore_concept("user1", concept_id, now).unwrap();
    let restored = study.next_review_item("user1", now).unwrap().unwrap();
    assert_eq!(restored.concept.id, concept_id);
    assert_eq!(restored.total_phrasings, 2);
}

#[tokio::test]
async fn test_delete_is_final_for_all_views() {
    let (study, store) = study_with(vec![concepts_reply(&["Mitosis"]), phrasings_reply(1)]);
    drive_job(&study, &store, "cell division").await;

    let now = epoch() + Duration::minutes(1);
    let item = study.next_review_item("user1", now).unwrap().unwrap();

    study.delete_concept("user1", item.concept.id, now).unwrap();
    assert!(study.next_review_item("user1", now).unwrap().is_none());
    assert_eq!(study.due_count("user1", now).unwrap(), 0);

    // A deleted concept cannot be archived or restored.
    assert!(study.archive_concept("user1", item.concept.id, now).is_err());
    assert!(study.restore_concept("user1", item.concept.id, now).is_err());
}

#[tokio::test]
async fn test_canonical_phrasing_always_presented() {
    let (study, store) = study_with(vec![concepts_reply(&["Mitosis"]), phrasings_reply(3)]);
    drive_job(&study, &store, "cell division").await;

    let now = epoch() + Duration::minutes(1);
    let item = study.next_review_item("user1", now).unwrap().unwrap();
    let concept_id = item.concept.id;
    let canonical_id = item.phrasing.id;

    study
        .set_canonical_phrasing("user1", concept_id, Some(canonical_id), now)
        .unwrap();

    // Attempt it; least-seen would now rotate away, canonical does not.
    study
        .record_interaction(
            ReviewSubmission {
                user_id: "user1".into(),
                concept_id,
                phrasing_id: canonical_id,
                user_answer: "wrong".into(),
                is_correct: false,
                session_id: None,
            },
            now,
        )
        .unwrap();

    let later = now + Duration::days(1);
    let next = study.next_review_item("user1", later).unwrap().unwrap();
    assert_eq!(next.phrasing.id, canonical_id);
    assert_eq!(next.selection_reason, SelectionReason::Canonical);
}

#[tokio::test]
async fn test_stats_survive_recalculation() {
    let (study, store) = study_with(vec![
        concepts_reply(&["Mitosis", "Meiosis", "Interphase"]),
        phrasings_reply(1),
        phrasings_reply(1),
        phrasings_reply(1),
    ]);
    drive_job(&study, &store, "cell division").await;

    let now = epoch() + Duration::minutes(1);
    // Review one card so the counters are not all-new.
    let item = study.next_review_item("user1", now).unwrap().unwrap();
    study
        .record_interaction(
            ReviewSubmission {
                user_id: "user1".into(),
                concept_id: item.concept.id,
                phrasing_id: item.phrasing.id,
                user_answer: "A0".into(),
                is_correct: true,
                session_id: None,
            },
            now,
        )
        .unwrap();

    let incremental = study.user_card_stats("user1", now).unwrap();
    let recalculated = study.recalculate_stats("user1", now).unwrap();

    assert_eq!(recalculated.total_cards, incremental.total_cards);
    assert_eq!(recalculated.new_count, incremental.new_count);
    assert_eq!(recalculated.learning_count, incremental.learning_count);
    assert_eq!(recalculated.mature_count, incremental.mature_count);
    assert_eq!(recalculated.due_now_count, incremental.due_now_count);
}
