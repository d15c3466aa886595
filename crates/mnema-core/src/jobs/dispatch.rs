//! Deferred step scheduling.
//!
//! Jobs progress through a work queue keyed by job id rather than a
//! blocking wait: a request handler enqueues the id and returns, and the
//! drain task invokes one durable step at a time. A slow generation call
//! therefore never holds a request-serving thread.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::error::{MnemaError, MnemaResult};

use super::runner::{JobRunner, StepOutcome};

/// Hands job ids to a background drain task.
///
/// The task exits when every dispatcher handle is dropped.
#[derive(Clone)]
pub struct StepDispatcher {
    tx: mpsc::UnboundedSender<Uuid>,
}

impl StepDispatcher {
    /// Spawn the drain task on the current tokio runtime.
    pub fn spawn(runner: Arc<JobRunner>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Uuid>();

        tokio::spawn(async move {
            while let Some(job_id) = rx.recv().await {
                // Drive this job stepwise until terminal. Each step
                // persists before the next is invoked, and a
                // cancellation set between steps is observed by the
                // following one.
                loop {
                    match runner.run_step(job_id, Utc::now()).await {
                        Ok(StepOutcome::Continue) => continue,
                        Ok(StepOutcome::Terminal) => break,
                        Err(e) => {
                            warn!(%job_id, error = %e, "job step errored; leaving job resumable");
                            break;
                        }
                    }
                }
            }
        });

        Self { tx }
    }

    /// Enqueue a job for processing.
    pub fn enqueue(&self, job_id: Uuid) -> MnemaResult<()> {
        self.tx
            .send(job_id)
            .map_err(|_| MnemaError::internal("job dispatcher is not running"))
    }
}
