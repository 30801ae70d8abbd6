//! Judge Orchestrator (§4.6): drives one submission through every test
//! case, in order, without early termination, and persists the result.
//!
//! Grounded on `app/judge.py::Judge.judge_submission` /
//! `_judge_test_case`: every test case in `problem.testcases` is judged
//! regardless of earlier failures (§4.6 step 6), each worth 10 points
//! toward `counts = 10 * len(testcases)`. This is a deliberate departure
//! from the teacher's own `judger.rs::process_judge_job`, which breaks on
//! the first non-`Accepted` verdict and marks the remainder `Skipped` —
//! see DESIGN.md for why that teacher behavior was not carried forward.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::comparator;
use crate::executor::{self, ExecutionLimits as SandboxLimits, ExecutionSpec, SandboxLanguage};
use crate::fallback::{self, FallbackSpec};
use crate::log_store::SubmissionLogStore;
use crate::model::{JudgeMode, SubmissionLog, SubmissionStatus, TestCaseOutcome};
use crate::repository::SharedRepository;
use crate::spj::{self, CheckerCache, SpjStatus};
use crate::verdict::Verdict;

/// Per-submission judging, one submission id at a time. A second call for
/// the same id while the first is in flight waits for it rather than
/// racing it (§3: concurrent re-judges of the same submission are not
/// supported).
pub struct Orchestrator {
    repository: SharedRepository,
    log_store: Arc<SubmissionLogStore>,
    checker_cache: Arc<CheckerCache>,
    allow_fallback: bool,
    in_flight: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        repository: SharedRepository,
        log_store: Arc<SubmissionLogStore>,
        checker_cache: Arc<CheckerCache>,
        allow_fallback: bool,
    ) -> Self {
        Self {
            repository,
            log_store,
            checker_cache,
            allow_fallback,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, submission_id: Uuid) -> Arc<Mutex<()>> {
        let mut guards = self.in_flight.lock().await;
        guards
            .entry(submission_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn judge_submission(&self, submission_id: Uuid) -> Result<()> {
        let guard_lock = self.lock_for(submission_id).await;
        let _guard = guard_lock.lock().await;

        match self.judge_submission_inner(submission_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("judging failed for {}: {:#}", submission_id, e);
                if let Ok(mut submission) = self.repository.get_submission(submission_id).await {
                    submission.status = SubmissionStatus::Error;
                    let _ = self.repository.save_submission(&submission).await;
                }
                Err(e)
            }
        }
    }

    async fn judge_submission_inner(&self, submission_id: Uuid) -> Result<()> {
        let mut submission = self
            .repository
            .get_submission(submission_id)
            .await
            .context("submission not found")?;
        let problem = self
            .repository
            .get_problem(&submission.problem_id)
            .await
            .context("problem not found")?;
        let language_profile = self
            .repository
            .get_language_profile(&submission.language)
            .await
            .context("language profile not found")?;

        let language = executor::SandboxLanguage::from_name(&submission.language)
            .context("unsupported language")?;

        let limits = SandboxLimits {
            time_limit_seconds: problem
                .time_limit_seconds
                .unwrap_or(language_profile.default_time_limit_seconds),
            memory_limit_mb: problem
                .memory_limit_mb
                .unwrap_or(language_profile.default_memory_limit_mb),
        };

        let counts = 10 * problem.testcases.len() as u32;
        let mut score = 0u32;
        let mut outcomes = Vec::with_capacity(problem.testcases.len());

        for (index, testcase) in problem.testcases.iter().enumerate() {
            let run = self
                .run_one(language, &submission.code, &testcase.input, &limits)
                .await?;

            let verdict = if run.status.is_clean_run() {
                self.apply_judge_mode(
                    problem.judge_mode,
                    &problem,
                    &testcase.input,
                    &testcase.expected_output,
                    &run.stdout,
                )
                .await
            } else {
                run.status
            };

            if verdict == Verdict::AC {
                score += 10;
            }

            outcomes.push(TestCaseOutcome {
                index,
                verdict,
                time_used_seconds: run.time_used_seconds,
                memory_used_mb: run.memory_used_mb,
                input_echo: testcase.input.clone(),
                expected_output: testcase.expected_output.clone(),
                actual_output: run.stdout,
            });
        }

        let log = SubmissionLog {
            submission_id,
            user_id: submission.user_id.clone(),
            problem_id: submission.problem_id.clone(),
            language: submission.language.clone(),
            score,
            counts,
            testcase_outcomes: outcomes,
            submit_time: submission.submit_time,
        };
        self.log_store.put(&log).await?;

        submission.status = SubmissionStatus::Success;
        submission.score = score;
        submission.counts = counts;
        self.repository.save_submission(&submission).await?;

        info!(
            "judged submission {}: {}/{}",
            submission_id, score, counts
        );
        Ok(())
    }

    async fn run_one(
        &self,
        language: SandboxLanguage,
        code: &str,
        stdin: &str,
        limits: &SandboxLimits,
    ) -> Result<crate::model::SandboxRun> {
        let spec = ExecutionSpec {
            language,
            code: code.to_string(),
            stdin: stdin.to_string(),
            limits: limits.clone(),
        };

        match executor::execute_sandboxed(&spec).await {
            Ok(run) => Ok(run),
            Err(e) if self.allow_fallback => {
                warn!("sandbox unavailable ({}), using fallback executor", e);
                let fallback_spec = FallbackSpec {
                    language,
                    code: code.to_string(),
                    stdin: stdin.to_string(),
                    limits: limits.clone(),
                };
                fallback::execute_fallback(&fallback_spec).await
            }
            Err(e) => Ok(crate::model::SandboxRun {
                status: Verdict::UNK,
                time_used_seconds: 0.0,
                memory_used_mb: 0,
                stdout: String::new(),
                error_text: Some(e.to_string()),
            }),
        }
    }

    async fn apply_judge_mode(
        &self,
        mode: JudgeMode,
        problem: &crate::model::Problem,
        input: &str,
        expected_output: &str,
        actual_output: &str,
    ) -> Verdict {
        match mode {
            JudgeMode::Strict => {
                if comparator::compare_strict(actual_output, expected_output) {
                    Verdict::AC
                } else {
                    Verdict::WA
                }
            }
            JudgeMode::Standard => {
                if comparator::compare_standard(actual_output, expected_output) {
                    Verdict::AC
                } else {
                    Verdict::WA
                }
            }
            JudgeMode::Spj => {
                let Some(spj_script) = &problem.spj_script else {
                    warn!(
                        "problem {} declares spj judge_mode with no script, falling back to standard compare",
                        problem.id
                    );
                    return if comparator::compare_standard(actual_output, expected_output) {
                        Verdict::AC
                    } else {
                        Verdict::WA
                    };
                };

                let verdict = self
                    .run_spj(problem, spj_script, input, expected_output, actual_output)
                    .await;

                verdict.unwrap_or_else(|e| {
                    warn!("SPJ run failed for problem {}: {:#}", problem.id, e);
                    Verdict::UNK
                })
            }
        }
    }

    async fn run_spj(
        &self,
        problem: &crate::model::Problem,
        spj_script: &crate::model::SpjScript,
        input: &str,
        expected_output: &str,
        actual_output: &str,
    ) -> Result<Verdict> {
        let artifact_path = self
            .checker_cache
            .get_or_prepare(&problem.id, spj_script.language, &spj_script.content)
            .await?;

        let result = match spj_script.language {
            crate::model::SpjLanguage::Python => {
                spj::run_python_spj(&artifact_path, input, expected_output, actual_output).await?
            }
            crate::model::SpjLanguage::Cpp => {
                spj::run_cpp_spj(&artifact_path, input, expected_output, actual_output).await?
            }
        };

        Ok(match result.status {
            SpjStatus::Ac => Verdict::AC,
            SpjStatus::Wa => Verdict::WA,
            SpjStatus::SpjError => {
                warn!(
                    "SPJ_ERROR for problem {} ({:?}), falling back to standard compare",
                    problem.id, result.message
                );
                if comparator::compare_standard(actual_output, expected_output) {
                    Verdict::AC
                } else {
                    Verdict::WA
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JudgeMode as Mode, LanguageProfile, Problem, SpjLanguage, SpjScript, Submission, TestCase};
    use crate::repository::FakeRepository;

    fn python_language_profile() -> LanguageProfile {
        LanguageProfile {
            name: "python".to_string(),
            file_ext: "py".to_string(),
            compile_cmd: None,
            run_cmd: vec!["python3".to_string()],
            default_time_limit_seconds: 3.0,
            default_memory_limit_mb: 128,
        }
    }

    fn python_echo_problem(id: &str, mode: Mode) -> Problem {
        Problem {
            id: id.to_string(),
            time_limit_seconds: Some(2.0),
            memory_limit_mb: Some(64),
            testcases: vec![
                TestCase {
                    input: "3\n".to_string(),
                    expected_output: "9\n".to_string(),
                },
                TestCase {
                    input: "4\n".to_string(),
                    expected_output: "16\n".to_string(),
                },
            ],
            judge_mode: mode,
            spj_script: None,
        }
    }

    async fn orchestrator_with(repo: Arc<FakeRepository>) -> Orchestrator {
        let log_dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        Orchestrator::new(
            repo,
            Arc::new(SubmissionLogStore::new(log_dir.into_path())),
            Arc::new(CheckerCache::new(cache_dir.into_path())),
            false,
        )
    }

    // These scenario tests exercise the orchestrator's bookkeeping
    // (scoring, no-early-exit, log persistence) against a fake repository;
    // they do not spawn a real Docker sandbox, so `run_one` here is
    // expected to fail and fall through to the `Verdict::UNK` path when no
    // fallback is configured — which is exactly what they assert on.

    #[tokio::test]
    async fn missing_submission_is_reported_as_an_error() {
        let repo = Arc::new(FakeRepository::new());
        let orchestrator = orchestrator_with(repo).await;
        let result = orchestrator.judge_submission(Uuid::new_v4()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn every_testcase_is_judged_even_without_a_working_sandbox() {
        let repo = Arc::new(FakeRepository::new());
        repo.seed_problem(python_echo_problem("p1", Mode::Standard)).await;
        repo.seed_language(python_language_profile()).await;
        let submission = Submission::new(
            "u1".to_string(),
            "p1".to_string(),
            "python".to_string(),
            "n=int(input());print(n*n)".to_string(),
        );
        let id = submission.submission_id;
        repo.save_submission(&submission).await.unwrap();

        let orchestrator = orchestrator_with(repo.clone()).await;
        // Without Docker available in this environment, execute_sandboxed
        // will error for every test case; the orchestrator still judges
        // both test cases (no early exit) and records UNK for each.
        let _ = orchestrator.judge_submission(id).await;

        let updated = repo.get_submission(id).await.unwrap();
        assert_eq!(updated.counts, 20);
    }

    #[tokio::test]
    async fn unsupported_language_is_rejected_before_running_anything() {
        let repo = Arc::new(FakeRepository::new());
        repo.seed_problem(python_echo_problem("p1", Mode::Standard)).await;
        let submission = Submission::new(
            "u1".to_string(),
            "p1".to_string(),
            "rust".to_string(),
            "fn main() {}".to_string(),
        );
        let id = submission.submission_id;
        repo.save_submission(&submission).await.unwrap();

        let orchestrator = orchestrator_with(repo.clone()).await;
        assert!(orchestrator.judge_submission(id).await.is_err());
        let updated = repo.get_submission(id).await.unwrap();
        assert_eq!(updated.status, crate::model::SubmissionStatus::Error);
    }

    #[test]
    fn spj_script_declaration_is_well_formed() {
        let script = SpjScript {
            language: SpjLanguage::Python,
            content: b"print('ok')".to_vec(),
        };
        assert_eq!(script.language, SpjLanguage::Python);
    }

    /// §4.6 step 6 / §7: a checker that returns SPJ_ERROR (here, by
    /// printing malformed JSON) must fall back to the standard text
    /// comparator rather than being treated as an automatic WA.
    #[tokio::test]
    async fn spj_error_falls_back_to_standard_comparator() {
        let repo = Arc::new(FakeRepository::new());
        let orchestrator = orchestrator_with(repo).await;
        let problem = Problem {
            id: "spj1".to_string(),
            time_limit_seconds: Some(2.0),
            memory_limit_mb: Some(64),
            testcases: vec![],
            judge_mode: Mode::Spj,
            spj_script: Some(SpjScript {
                language: SpjLanguage::Python,
                content: b"print('not json')".to_vec(),
            }),
        };

        let verdict = orchestrator
            .apply_judge_mode(Mode::Spj, &problem, "3\n", "9\n", "9\n")
            .await;
        assert_eq!(verdict, Verdict::AC, "matching output should fall back to AC");

        let verdict = orchestrator
            .apply_judge_mode(Mode::Spj, &problem, "3\n", "9\n", "wrong\n")
            .await;
        assert_eq!(verdict, Verdict::WA, "mismatching output should fall back to WA");
    }
}
