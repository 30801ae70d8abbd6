//! Fallback Executor (§4.5): direct interpreter/compiler invocation used
//! only when the orchestrator is explicitly configured to allow it (the
//! Docker sandbox is unavailable). Never selected by default.
//!
//! Grounded on the original system's `DockerJudge._run_simulation`: same
//! source-level dangerous-operation scan, same "compile then run" shape
//! for C++. Memory enforcement uses `nix::sys::resource::setrlimit` (a
//! teacher dependency that had no caller anywhere in its source tree) to
//! impose a real `RLIMIT_AS` cap rather than the original's
//! always-too-late `psutil` read — see DESIGN.md for why that divergence
//! was chosen. Peak RSS is sampled by polling `/proc/<pid>/status` while
//! the child runs, since the process has usually already exited by the
//! time a caller could ask for its memory footprint.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::interval;
use tracing::debug;

#[cfg(unix)]
use tokio::process::CommandExt;

use crate::executor::{ExecutionLimits, SandboxLanguage};
use crate::model::SandboxRun;
use crate::verdict::Verdict;

/// Source-level dangerous-operation scan (§4.5). Distinct from the
/// Command Safety Validator (`validator.rs`): that module checks the
/// *invocation* (program + flags), this checks the *submitted source
/// text* before it is ever compiled or interpreted.
const DANGEROUS_SOURCE_PATTERNS: &[&str] = &[
    "import os",
    "import subprocess",
    "os.system",
    "subprocess.call",
    "subprocess.run",
    "eval(",
    "exec(",
    "__import__",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackRejection {
    pub matched: String,
}

impl std::fmt::Display for FallbackRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source contains a disallowed operation: {}", self.matched)
    }
}

impl std::error::Error for FallbackRejection {}

pub fn scan_source(code: &str) -> Result<(), FallbackRejection> {
    for pattern in DANGEROUS_SOURCE_PATTERNS {
        if code.contains(pattern) {
            return Err(FallbackRejection {
                matched: (*pattern).to_string(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FallbackSpec {
    pub language: SandboxLanguage,
    pub code: String,
    pub stdin: String,
    pub limits: ExecutionLimits,
}

/// Run a program directly on the host, without Docker. The caller
/// (orchestrator) is responsible for gating this path behind explicit
/// configuration; this function performs no such gating itself.
pub async fn execute_fallback(spec: &FallbackSpec) -> Result<SandboxRun> {
    if let Err(rejection) = scan_source(&spec.code) {
        return Ok(SandboxRun {
            status: Verdict::RE,
            time_used_seconds: 0.0,
            memory_used_mb: 0,
            stdout: String::new(),
            error_text: Some(rejection.to_string()),
        });
    }

    let work_dir = tempfile::tempdir().context("failed to create fallback work dir")?;
    let source_path = match spec.language {
        SandboxLanguage::Python => work_dir.path().join("main.py"),
        SandboxLanguage::Cpp => work_dir.path().join("main.cpp"),
    };
    tokio::fs::write(&source_path, &spec.code)
        .await
        .context("failed to write fallback source file")?;

    let binary_path = work_dir.path().join("main");
    if spec.language == SandboxLanguage::Cpp {
        let compile = Command::new("g++")
            .args(["-O2", "-o"])
            .arg(&binary_path)
            .arg(&source_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("failed to invoke g++ for fallback compilation")?;
        if !compile.status.success() {
            return Ok(SandboxRun {
                status: Verdict::CE,
                time_used_seconds: 0.0,
                memory_used_mb: 0,
                stdout: String::new(),
                error_text: Some(String::from_utf8_lossy(&compile.stderr).into_owned()),
            });
        }
    }

    run_with_limits(spec, &source_path, &binary_path).await
}

async fn run_with_limits(
    spec: &FallbackSpec,
    source_path: &Path,
    binary_path: &Path,
) -> Result<SandboxRun> {
    let memory_limit_bytes = (spec.limits.memory_limit_mb as u64) * 1024 * 1024;

    let mut command = match spec.language {
        SandboxLanguage::Python => {
            let mut c = Command::new("python3");
            c.arg(source_path);
            c
        }
        SandboxLanguage::Cpp => Command::new(binary_path),
    };

    // SAFETY: the closure only calls async-signal-safe libc APIs
    // (setrlimit) between fork and exec, as required by `pre_exec`.
    unsafe {
        command.pre_exec(move || {
            setrlimit(Resource::RLIMIT_AS, memory_limit_bytes, memory_limit_bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        });
    }

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn fallback process")?;

    let mut stdin = child.stdin.take().context("fallback process has no stdin")?;
    let stdin_data = spec.stdin.clone();
    tokio::spawn(async move {
        let _ = stdin.write_all(stdin_data.as_bytes()).await;
    });

    let mut stdout_pipe = child.stdout.take().context("fallback process has no stdout")?;
    let mut stderr_pipe = child.stderr.take().context("fallback process has no stderr")?;
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = tokio::io::AsyncReadExt::read_to_end(&mut stdout_pipe, &mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = tokio::io::AsyncReadExt::read_to_end(&mut stderr_pipe, &mut buf).await;
        buf
    });

    let pid = child.id();
    let deadline = Duration::from_secs_f64(spec.limits.time_limit_seconds);
    let start = Instant::now();

    let mut peak_rss_kb: u64 = 0;
    let mut poll = interval(Duration::from_millis(25));

    let status = loop {
        tokio::select! {
            result = child.wait() => {
                break Some(result.context("failed to wait for fallback process")?);
            }
            _ = poll.tick() => {
                if let Some(pid) = pid {
                    if let Some(kb) = read_vm_rss_kb(pid).await {
                        peak_rss_kb = peak_rss_kb.max(kb);
                    }
                }
                if start.elapsed() > deadline {
                    break None;
                }
            }
        }
    };

    let time_used_seconds = start.elapsed().as_secs_f64();
    let memory_used_mb = (peak_rss_kb / 1024) as u32;

    let status = match status {
        Some(s) => s,
        None => {
            if let Some(pid) = pid {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            return Ok(SandboxRun {
                status: Verdict::TLE,
                time_used_seconds: spec.limits.time_limit_seconds,
                memory_used_mb,
                stdout: String::new(),
                error_text: None,
            });
        }
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    if memory_used_mb > spec.limits.memory_limit_mb {
        return Ok(SandboxRun {
            status: Verdict::MLE,
            time_used_seconds,
            memory_used_mb,
            stdout: String::new(),
            error_text: None,
        });
    }

    if !status.success() {
        return Ok(SandboxRun {
            status: Verdict::RE,
            time_used_seconds,
            memory_used_mb,
            stdout: String::new(),
            error_text: Some(String::from_utf8_lossy(&stderr_bytes).into_owned()),
        });
    }

    Ok(SandboxRun {
        status: Verdict::AC,
        time_used_seconds,
        memory_used_mb,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        error_text: None,
    })
}

async fn read_vm_rss_kb(pid: u32) -> Option<u64> {
    let status = tokio::fs::read_to_string(format!("/proc/{pid}/status"))
        .await
        .ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
            return digits.parse::<u64>().ok();
        }
    }
    debug!("no VmRSS line for pid {}", pid);
    None
}
