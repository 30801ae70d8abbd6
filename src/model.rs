//! Core data model: problems, language profiles, submissions and their
//! judged outcomes.
//!
//! Every type here derives `Serialize`/`Deserialize` so the Repository and
//! Submission Log Store can persist them as plain JSON without a
//! translation layer, following the teacher's job/result struct convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single test case: plain text input and expected output. Newlines are
/// significant; comparison semantics live in `comparator.rs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

/// Judging policy for a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JudgeMode {
    #[default]
    Standard,
    Strict,
    Spj,
}

/// Declared language of an uploaded special-judge script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpjLanguage {
    Python,
    Cpp,
}

/// A problem-supplied checker script, stored alongside the problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpjScript {
    pub language: SpjLanguage,
    /// Raw script bytes, UTF-8 text in practice.
    pub content: Vec<u8>,
}

fn default_time_limit_seconds() -> f64 {
    3.0
}

fn default_memory_limit_mb() -> u32 {
    128
}

/// A judging problem: budgets, test cases, and judging policy.
///
/// The `test_cases` alias restores the original system's legacy key name
/// (`test_cases` in `problems/<id>.json`) as an accepted alternative to
/// `testcases`, per spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    /// Absent iff the problem does not override the language's default
    /// (spec.md §4.6 step 4: `time_limit = problem.time_limit ?? language.default_time`).
    #[serde(default)]
    pub time_limit_seconds: Option<f64>,
    #[serde(default)]
    pub memory_limit_mb: Option<u32>,
    #[serde(alias = "test_cases")]
    pub testcases: Vec<TestCase>,
    #[serde(default)]
    pub judge_mode: JudgeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spj_script: Option<SpjScript>,
}

/// A supported programming language and how to compile/run submissions in
/// it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub name: String,
    pub file_ext: String,
    #[serde(default)]
    pub compile_cmd: Option<Vec<String>>,
    pub run_cmd: Vec<String>,
    #[serde(default = "default_time_limit_seconds")]
    pub default_time_limit_seconds: f64,
    #[serde(default = "default_memory_limit_mb")]
    pub default_memory_limit_mb: u32,
}

/// Terminal or in-flight state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Success,
    Error,
}

/// A user-submitted program awaiting or having undergone judging.
///
/// Invariants (spec.md §3): `0 <= score <= counts`; `counts == 10 *
/// testcases.len()` at the moment judging completes; `status` is
/// `Success`/`Error` iff judging has terminated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: Uuid,
    pub user_id: String,
    pub problem_id: String,
    pub language: String,
    pub code: String,
    pub status: SubmissionStatus,
    pub score: u32,
    pub counts: u32,
    pub submit_time: DateTime<Utc>,
}

impl Submission {
    pub fn new(user_id: String, problem_id: String, language: String, code: String) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            user_id,
            problem_id,
            language,
            code,
            status: SubmissionStatus::Pending,
            score: 0,
            counts: 0,
            submit_time: Utc::now(),
        }
    }
}

/// Per-test-case judged outcome, kept verbatim in the submission log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseOutcome {
    pub index: usize,
    pub verdict: crate::verdict::Verdict,
    pub time_used_seconds: f64,
    pub memory_used_mb: u32,
    pub input_echo: String,
    pub expected_output: String,
    pub actual_output: String,
}

/// Immutable, write-once record of a completed judging pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionLog {
    pub submission_id: Uuid,
    pub user_id: String,
    pub problem_id: String,
    pub language: String,
    pub score: u32,
    pub counts: u32,
    pub testcase_outcomes: Vec<TestCaseOutcome>,
    pub submit_time: DateTime<Utc>,
}

/// Transient outcome of one sandboxed (or fallback) run, before verdict
/// policy (comparator / SPJ) has been applied.
#[derive(Debug, Clone)]
pub struct SandboxRun {
    pub status: crate::verdict::Verdict,
    pub time_used_seconds: f64,
    pub memory_used_mb: u32,
    pub stdout: String,
    pub error_text: Option<String>,
}

/// `{code, msg, data}` envelope shape used by the external HTTP layer.
/// Exists here only so Repository/Log Store tests can assert on the shape
/// collaborators will wrap results in — this crate does not serve HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub msg: String,
    pub data: T,
}
