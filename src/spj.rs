//! Special-Judge Runner (§4.3): executes a problem-supplied checker script
//! against `{input, expected_output, actual_output}` and interprets its
//! JSON verdict.
//!
//! Grounded on `routers/spj.py`: `validate_spj_script` (upload screening),
//! `run_spj_script` (JSON-out contract, 10s timeout, stderr on nonzero
//! exit). Stdin differs by language per §4.3 step 3 and
//! `tests/test_spj_integration.py`'s `cpp_spj_script` fixture: Python
//! checkers get a single JSON object, C++ checkers get three
//! newline-separated fields read via `getline`. The compiled-checker cache
//! follows the teacher's `compiler::CheckerCompiler::get_or_compile`,
//! swapped from raw source comparison to a `sha2` digest per spec.md §4.3.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::model::SpjLanguage;

/// Upload-time screen for special-judge scripts (§4.3). Rejects a script
/// containing any of the five extremely-dangerous call forms, checked
/// case-insensitively and independent of language — the original system
/// applies the same five-substring check regardless of declared language.
const DENIED_SUBSTRINGS: &[&str] = &[
    "eval(",
    "exec(",
    "os.system(",
    "subprocess.call(",
    "subprocess.run(",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenRejection {
    pub matched: String,
}

impl std::fmt::Display for ScreenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "script contains a denied call form: {}", self.matched)
    }
}

impl std::error::Error for ScreenRejection {}

/// Screen an uploaded checker script before it is accepted for storage.
pub fn screen_upload(content: &str) -> Result<(), ScreenRejection> {
    let lowered = content.to_lowercase();
    for needle in DENIED_SUBSTRINGS {
        if lowered.contains(needle) {
            return Err(ScreenRejection {
                matched: (*needle).to_string(),
            });
        }
    }
    Ok(())
}

/// Status reported by a checker's JSON verdict. Distinct from
/// `crate::verdict::Verdict`: this is the checker's own three-way
/// contract, mapped onto the wider taxonomy by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpjStatus {
    Ac,
    Wa,
    SpjError,
}

/// Parsed stdout of a checker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpjVerdict {
    pub status: SpjStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl SpjVerdict {
    fn error(message: impl Into<String>) -> Self {
        Self {
            status: SpjStatus::SpjError,
            message: Some(message.into()),
            score: None,
        }
    }
}

/// Input handed to the checker on stdin, as a single JSON object.
#[derive(Debug, Serialize)]
struct SpjInput<'a> {
    input: &'a str,
    expected_output: &'a str,
    actual_output: &'a str,
}

const SPJ_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a Python special-judge script: `python3 <script_file>`, JSON on
/// stdin, single JSON object on stdout.
pub async fn run_python_spj(
    script_path: &Path,
    input: &str,
    expected_output: &str,
    actual_output: &str,
) -> Result<SpjVerdict> {
    let payload = serde_json::to_vec(&SpjInput {
        input,
        expected_output,
        actual_output,
    })
    .context("failed to serialize SPJ input")?;
    run_spj_process(Command::new("python3").arg(script_path), payload).await
}

/// Run a compiled C++ special-judge binary. Unlike the Python contract,
/// C++ checkers read three newline-separated fields via `getline` rather
/// than a JSON object (§4.3 step 3).
pub async fn run_cpp_spj(
    binary_path: &Path,
    input: &str,
    expected_output: &str,
    actual_output: &str,
) -> Result<SpjVerdict> {
    let payload = format!("{input}\n{expected_output}\n{actual_output}\n").into_bytes();
    run_spj_process(Command::new(binary_path), payload).await
}

async fn run_spj_process(mut command: Command, payload: Vec<u8>) -> Result<SpjVerdict> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn SPJ process")?;

    let mut stdin = child.stdin.take().context("SPJ process has no stdin")?;
    let write_fut = async {
        stdin.write_all(&payload).await?;
        drop(stdin);
        Ok::<_, std::io::Error>(())
    };

    let run = async {
        write_fut.await.context("failed to write SPJ input")?;
        child
            .wait_with_output()
            .await
            .context("failed to wait for SPJ process")
    };

    let output = match tokio::time::timeout(SPJ_TIMEOUT, run).await {
        Ok(result) => result?,
        Err(_) => return Ok(SpjVerdict::error("SPJ script timed out")),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("SPJ process exited nonzero: {}", stderr);
        return Ok(SpjVerdict::error(if stderr.trim().is_empty() {
            "SPJ script exited with an error".to_string()
        } else {
            stderr.trim().to_string()
        }));
    }

    match serde_json::from_slice::<SpjVerdict>(&output.stdout) {
        Ok(verdict) => Ok(verdict),
        Err(e) => {
            debug!("SPJ produced unparseable output: {}", e);
            Ok(SpjVerdict::error("SPJ script produced malformed output"))
        }
    }
}

/// Compiled-checker cache for C++ special-judge scripts, keyed by problem
/// id with a content digest guarding against stale binaries.
pub struct CheckerCache {
    cache_dir: PathBuf,
}

fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

impl CheckerCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Get the path to a ready-to-run checker for `problem_id`, compiling
    /// (for `Cpp`) or materializing (for `Python`) it if the cached
    /// artifact is missing or its source digest has changed.
    pub async fn get_or_prepare(
        &self,
        problem_id: &str,
        language: SpjLanguage,
        source: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.cache_dir.join(format!("spj_{problem_id}"));
        tokio::fs::create_dir_all(&dir).await?;

        let digest = sha256_hex(source);
        let digest_path = dir.join("source.sha256");

        let (source_path, artifact_path) = match language {
            SpjLanguage::Python => (dir.join("checker.py"), dir.join("checker.py")),
            SpjLanguage::Cpp => (dir.join("checker.cpp"), dir.join("checker")),
        };

        let cached_digest = tokio::fs::read_to_string(&digest_path).await.ok();
        let up_to_date = cached_digest.as_deref() == Some(digest.as_str()) && artifact_path.exists();

        if up_to_date {
            debug!("SPJ checker cache hit for problem {}", problem_id);
            return Ok(artifact_path);
        }

        tokio::fs::write(&source_path, source).await?;

        if let SpjLanguage::Cpp = language {
            info!("Compiling C++ SPJ checker for problem {}", problem_id);
            let status = Command::new("g++")
                .args(["-O2", "-o"])
                .arg(&artifact_path)
                .arg(&source_path)
                .status()
                .await
                .context("failed to invoke g++ for SPJ compilation")?;
            if !status.success() {
                anyhow::bail!("failed to compile SPJ checker for problem {problem_id}");
            }
        }

        tokio::fs::write(&digest_path, &digest).await?;
        Ok(artifact_path)
    }

    pub async fn clear(&self, problem_id: &str) -> Result<()> {
        let dir = self.cache_dir.join(format!("spj_{problem_id}"));
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_rejects_each_denied_form_case_insensitively() {
        assert!(screen_upload("if EVAL(x): pass").is_err());
        assert!(screen_upload("os.System(cmd)".to_lowercase().as_str()).is_err());
        assert!(screen_upload("subprocess.run(['ls'])").is_err());
    }

    #[test]
    fn screen_allows_ordinary_checker_logic() {
        assert!(screen_upload(
            "import json, sys\ndata = json.load(sys.stdin)\nprint(json.dumps({'status': 'AC'}))"
        )
        .is_ok());
    }

    #[test]
    fn verdict_round_trips_through_json_in_screaming_snake_case() {
        let v = SpjVerdict {
            status: SpjStatus::Wa,
            message: Some("mismatch at line 3".to_string()),
            score: Some(0.5),
        };
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("\"WA\""));
        let back: SpjVerdict = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, SpjStatus::Wa);
    }

    #[test]
    fn error_helper_sets_spj_error_status() {
        let v = SpjVerdict::error("boom");
        assert_eq!(v.status, SpjStatus::SpjError);
        assert_eq!(v.message.as_deref(), Some("boom"));
    }

    /// A C++ checker reads three plain `getline`d fields, not a JSON
    /// object — this pins `run_cpp_spj`'s stdin shape against the
    /// `cpp_spj_script` fixture's `getline(cin, input); getline(cin,
    /// expected_output); getline(cin, actual_output);` contract.
    #[tokio::test]
    #[cfg(unix)]
    async fn cpp_spj_receives_newline_separated_fields_not_json() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("checker.sh");
        tokio::fs::write(
            &script_path,
            "#!/bin/sh\nread -r a\nread -r b\nread -r c\nprintf '{\"status\":\"AC\",\"message\":\"%s|%s|%s\"}' \"$a\" \"$b\" \"$c\"\n",
        )
        .await
        .unwrap();
        let mut perms = tokio::fs::metadata(&script_path).await.unwrap().permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&script_path, perms).await.unwrap();

        let verdict = run_cpp_spj(&script_path, "5", "10", "10").await.unwrap();
        assert_eq!(verdict.status, SpjStatus::Ac);
        assert_eq!(verdict.message.as_deref(), Some("5|10|10"));
    }
}
