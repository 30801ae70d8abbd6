//! Submission queue and worker pool (§5): an in-process replacement for
//! the teacher's Redis-backed job queue (`redis_manager.rs`), sized to a
//! single judging core with no distributed workers.
//!
//! Grounded on `main.rs`'s worker loop shape — pop a job, dispatch it,
//! log the outcome — generalized from "one task popping from Redis" to
//! "N tasks popping from a bounded `tokio::mpsc` channel" per §5's worker
//! pool requirement. `config::is_testing()` mirrors the original's
//! `is_testing()` switch: under test, submissions are judged inline on
//! the caller's task instead of being handed to the pool, so assertions
//! immediately following a submit don't race a background task.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::orchestrator::Orchestrator;

/// A bounded queue of submission ids awaiting judging, drained by a fixed
/// pool of worker tasks.
pub struct WorkerPool {
    sender: mpsc::Sender<Uuid>,
}

impl WorkerPool {
    /// Spawn `worker_count` tasks, each pulling submission ids off the
    /// shared channel and judging them one at a time via `orchestrator`.
    /// The orchestrator's own per-submission lock (§3) makes it safe for
    /// more than one worker to dequeue the same id without double-judging
    /// it concurrently.
    pub fn spawn(orchestrator: Arc<Orchestrator>, worker_count: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        for worker_index in 0..worker_count.max(1) {
            let orchestrator = orchestrator.clone();
            let receiver = receiver.clone();
            tokio::spawn(async move {
                loop {
                    let submission_id = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    let Some(submission_id) = submission_id else {
                        info!("worker {} shutting down: queue closed", worker_index);
                        break;
                    };
                    info!("worker {} judging submission {}", worker_index, submission_id);
                    if let Err(e) = orchestrator.judge_submission(submission_id).await {
                        error!("worker {} failed to judge {}: {:#}", worker_index, submission_id, e);
                    }
                }
            });
        }

        Self { sender }
    }

    /// Enqueue a submission for judging. Blocks (asynchronously) if the
    /// queue is at capacity, applying backpressure to the caller rather
    /// than growing unboundedly.
    pub async fn enqueue(&self, submission_id: Uuid) -> Result<()> {
        self.sender
            .send(submission_id)
            .await
            .map_err(|_| anyhow::anyhow!("worker pool queue is closed"))
    }
}

/// Submit a submission for judging, routing around the worker pool
/// entirely when running under the test harness (§5) so a test can
/// assert on the judged result immediately after this call returns.
pub async fn submit(
    pool: &WorkerPool,
    orchestrator: &Orchestrator,
    submission_id: Uuid,
) -> Result<()> {
    if crate::config::is_testing() {
        orchestrator.judge_submission(submission_id).await
    } else {
        pool.enqueue(submission_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_store::SubmissionLogStore;
    use crate::model::{JudgeMode, Problem, Submission, SubmissionStatus, TestCase};
    use crate::repository::FakeRepository;
    use crate::spj::CheckerCache;

    async fn orchestrator_with_fake_repo() -> (Arc<FakeRepository>, Arc<Orchestrator>) {
        let repo = Arc::new(FakeRepository::new());
        let log_dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let orchestrator = Arc::new(Orchestrator::new(
            repo.clone(),
            Arc::new(SubmissionLogStore::new(log_dir.into_path())),
            Arc::new(CheckerCache::new(cache_dir.into_path())),
            false,
        ));
        (repo, orchestrator)
    }

    #[tokio::test]
    async fn pool_drains_enqueued_submissions() {
        let (repo, orchestrator) = orchestrator_with_fake_repo().await;
        repo.seed_problem(Problem {
            id: "p1".to_string(),
            time_limit_seconds: Some(1.0),
            memory_limit_mb: Some(64),
            testcases: vec![TestCase {
                input: "1\n".to_string(),
                expected_output: "1\n".to_string(),
            }],
            judge_mode: JudgeMode::Standard,
            spj_script: None,
        })
        .await;
        repo.seed_language(crate::model::LanguageProfile {
            name: "python".to_string(),
            file_ext: "py".to_string(),
            compile_cmd: None,
            run_cmd: vec!["python3".to_string()],
            default_time_limit_seconds: 3.0,
            default_memory_limit_mb: 128,
        })
        .await;
        let submission = Submission::new(
            "u1".to_string(),
            "p1".to_string(),
            "python".to_string(),
            "print(1)".to_string(),
        );
        let id = submission.submission_id;
        repo.save_submission(&submission).await.unwrap();

        let pool = WorkerPool::spawn(orchestrator.clone(), 2, 16);
        pool.enqueue(id).await.unwrap();

        // Give the worker a moment to drain the channel and persist a
        // terminal status; real assertions on verdict correctness live in
        // orchestrator.rs's own tests.
        for _ in 0..50 {
            if repo.get_submission(id).await.unwrap().status != SubmissionStatus::Pending {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let updated = repo.get_submission(id).await.unwrap();
        assert_ne!(updated.status, SubmissionStatus::Pending);
    }

    #[tokio::test]
    async fn submit_under_testing_mode_runs_inline() {
        std::env::set_var("TESTING", "1");
        let (repo, orchestrator) = orchestrator_with_fake_repo().await;
        repo.seed_problem(Problem {
            id: "p1".to_string(),
            time_limit_seconds: Some(1.0),
            memory_limit_mb: Some(64),
            testcases: vec![TestCase {
                input: "1\n".to_string(),
                expected_output: "1\n".to_string(),
            }],
            judge_mode: JudgeMode::Standard,
            spj_script: None,
        })
        .await;
        repo.seed_language(crate::model::LanguageProfile {
            name: "python".to_string(),
            file_ext: "py".to_string(),
            compile_cmd: None,
            run_cmd: vec!["python3".to_string()],
            default_time_limit_seconds: 3.0,
            default_memory_limit_mb: 128,
        })
        .await;
        let submission = Submission::new(
            "u1".to_string(),
            "p1".to_string(),
            "python".to_string(),
            "print(1)".to_string(),
        );
        let id = submission.submission_id;
        repo.save_submission(&submission).await.unwrap();

        let pool = WorkerPool::spawn(orchestrator.clone(), 1, 1);
        submit(&pool, &orchestrator, id).await.ok();

        let updated = repo.get_submission(id).await.unwrap();
        assert_ne!(updated.status, SubmissionStatus::Pending);
        std::env::remove_var("TESTING");
    }
}
