//! Sandbox Executor (§4.4): builds a per-submission Docker image and runs
//! the program inside it with networking disabled and resource caps.
//!
//! Grounded on the original system's `DockerJudge.run_in_docker` /
//! `create_dockerfile`: same base images, the same `docker run` flag set,
//! the same build/run deadlines, and the same cleanup-in-every-path
//! guarantee. The typed `ExecutionSpec`/`ExecutionLimits` split follows the
//! teacher's `engine::executer::ExecutionSpec`/`ExecutionLimits`; the
//! outcome is reported as a `SandboxRun` (`model.rs`) rather than a
//! teacher-style `ExecutionOutcome` because the orchestrator only ever
//! needs a verdict, a clock, a memory reading, and stdout.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::SandboxRun;
use crate::verdict::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxLanguage {
    Python,
    Cpp,
}

impl SandboxLanguage {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Some(Self::Python),
            "cpp" | "c++" => Some(Self::Cpp),
            _ => None,
        }
    }

    fn base_image(self) -> &'static str {
        match self {
            Self::Python => "python:3.9-slim",
            Self::Cpp => "gcc:11",
        }
    }

    fn source_file_name(self) -> &'static str {
        match self {
            Self::Python => "main.py",
            Self::Cpp => "main.cpp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub time_limit_seconds: f64,
    pub memory_limit_mb: u32,
}

#[derive(Debug, Clone)]
pub struct ExecutionSpec {
    pub language: SandboxLanguage,
    pub code: String,
    pub stdin: String,
    pub limits: ExecutionLimits,
}

const BUILD_TIMEOUT: Duration = Duration::from_secs(30);
const CONTAINER_PREFIX: &str = "oj_judge_";

fn dockerfile_for(language: SandboxLanguage, source_file: &str) -> String {
    match language {
        SandboxLanguage::Python => format!(
            "FROM {}\nWORKDIR /app\nCOPY {source_file} .\nCMD [\"python\", \"{source_file}\"]\n",
            language.base_image()
        ),
        SandboxLanguage::Cpp => format!(
            "FROM {}\nWORKDIR /app\nCOPY {source_file} .\nRUN g++ -O2 -o main {source_file}\nCMD [\"./main\"]\n",
            language.base_image()
        ),
    }
}

/// Run one program inside a freshly built, single-use Docker image.
///
/// Every exit path removes the build directory (dropped at function end),
/// the temporary image, and — on the timeout path — the still-running
/// container; `docker run --rm` removes the container on every other path.
pub async fn execute_sandboxed(spec: &ExecutionSpec) -> Result<SandboxRun> {
    let container_name = format!(
        "{CONTAINER_PREFIX}{}",
        &Uuid::new_v4().simple().to_string()[..8]
    );
    let image_name = format!("{container_name}_image");

    let build_dir = tempfile::tempdir().context("failed to create sandbox build dir")?;
    let source_file = spec.language.source_file_name();
    tokio::fs::write(build_dir.path().join(source_file), &spec.code)
        .await
        .context("failed to write submitted source into sandbox build dir")?;
    tokio::fs::write(
        build_dir.path().join("Dockerfile"),
        dockerfile_for(spec.language, source_file),
    )
    .await
    .context("failed to write Dockerfile")?;

    let result = run_build_and_execute(spec, &image_name, &container_name, build_dir.path()).await;

    let _ = Command::new("docker")
        .args(["rmi", &image_name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    result
}

async fn run_build_and_execute(
    spec: &ExecutionSpec,
    image_name: &str,
    container_name: &str,
    build_dir: &Path,
) -> Result<SandboxRun> {
    let build = Command::new("docker")
        .args(["build", "-t", image_name])
        .arg(build_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn docker build")?;

    let build_output = match tokio::time::timeout(BUILD_TIMEOUT, build.wait_with_output()).await {
        Ok(out) => out.context("docker build did not complete")?,
        Err(_) => {
            return Ok(SandboxRun {
                status: Verdict::CE,
                time_used_seconds: 0.0,
                memory_used_mb: 0,
                stdout: String::new(),
                error_text: Some("sandbox image build timed out".to_string()),
            });
        }
    };

    if !build_output.status.success() {
        return Ok(SandboxRun {
            status: Verdict::CE,
            time_used_seconds: 0.0,
            memory_used_mb: 0,
            stdout: String::new(),
            error_text: Some(String::from_utf8_lossy(&build_output.stderr).into_owned()),
        });
    }

    let run_cmd = match spec.language {
        SandboxLanguage::Python => {
            format!("python /app/{} < /app/input.txt", spec.language.source_file_name())
        }
        SandboxLanguage::Cpp => "./main < /app/input.txt".to_string(),
    };
    let run_script = format!("cat > /app/input.txt << 'EOF'\n{}\nEOF\n{run_cmd}", spec.stdin);

    let memory_flag = format!("{}m", spec.limits.memory_limit_mb);
    let cpus_flag = spec.limits.time_limit_seconds.to_string();

    let run = Command::new("docker")
        .args([
            "run",
            "--name",
            container_name,
            "--rm",
            "--network",
            "none",
            "--memory",
            &memory_flag,
            "--cpus",
            &cpus_flag,
            "--pids-limit",
            "50",
            "--ulimit",
            "nofile=64:64",
            "--security-opt",
            "no-new-privileges",
            "--cap-drop",
            "ALL",
            "--tmpfs",
            "/tmp:rw,noexec,nosuid,size=100m",
            "--tmpfs",
            "/var/tmp:rw,noexec,nosuid,size=32m",
            image_name,
            "sh",
            "-c",
            &run_script,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn docker run")?;

    let wall_deadline = Duration::from_secs_f64(spec.limits.time_limit_seconds + 1.0);
    let start = Instant::now();
    let run_output = match tokio::time::timeout(wall_deadline, run.wait_with_output()).await {
        Ok(out) => out.context("docker run did not complete")?,
        Err(_) => {
            let _ = Command::new("docker")
                .args(["kill", container_name])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            return Ok(SandboxRun {
                status: Verdict::TLE,
                time_used_seconds: spec.limits.time_limit_seconds,
                memory_used_mb: 0,
                stdout: String::new(),
                error_text: None,
            });
        }
    };
    let time_used_seconds = start.elapsed().as_secs_f64();

    if !run_output.status.success() {
        return Ok(SandboxRun {
            status: Verdict::RE,
            time_used_seconds,
            memory_used_mb: 0,
            stdout: String::new(),
            error_text: Some(String::from_utf8_lossy(&run_output.stderr).into_owned()),
        });
    }

    let memory_used_mb = read_container_memory_mb(container_name).await;

    if memory_used_mb > spec.limits.memory_limit_mb {
        return Ok(SandboxRun {
            status: Verdict::MLE,
            time_used_seconds,
            memory_used_mb,
            stdout: String::new(),
            error_text: None,
        });
    }

    Ok(SandboxRun {
        status: Verdict::AC,
        time_used_seconds,
        memory_used_mb,
        stdout: String::from_utf8_lossy(&run_output.stdout).into_owned(),
        error_text: None,
    })
}

/// Advisory memory reading via `docker stats`. This is the original
/// system's only memory signal; since the container has already exited by
/// the time this runs (`--rm` already removed it, in fact) this mostly
/// observes a stale/zero value in practice, which is why §4.4 treats the
/// enforced `--memory` cgroup cap as primary and this reading as a
/// secondary, best-effort figure layered on top.
async fn read_container_memory_mb(container_name: &str) -> u32 {
    let stats = Command::new("docker")
        .args([
            "stats",
            "--no-stream",
            "--format",
            "{{.MemUsage}}",
            container_name,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;

    let stats = match stats {
        Ok(s) => s,
        Err(e) => {
            debug!("docker stats unavailable: {}", e);
            return 0;
        }
    };
    let text = String::from_utf8_lossy(&stats.stdout);
    parse_mem_usage(text.trim())
}

fn parse_mem_usage(mem_str: &str) -> u32 {
    let Some((used, _)) = mem_str.split_once('/') else {
        return 0;
    };
    let used = used.trim();
    if let Some(value) = used.strip_suffix("MiB") {
        value.trim().parse::<f64>().map(|v| v as u32).unwrap_or(0)
    } else if let Some(value) = used.strip_suffix("KiB") {
        value
            .trim()
            .parse::<f64>()
            .map(|v| (v / 1024.0) as u32)
            .unwrap_or(0)
    } else if let Some(value) = used.strip_suffix("GiB") {
        value
            .trim()
            .parse::<f64>()
            .map(|v| (v * 1024.0) as u32)
            .unwrap_or_else(|_| {
                warn!("unparseable GiB memory reading: {}", used);
                0
            })
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_detection_is_case_insensitive_and_aliased() {
        assert_eq!(SandboxLanguage::from_name("Python3"), Some(SandboxLanguage::Python));
        assert_eq!(SandboxLanguage::from_name("C++"), Some(SandboxLanguage::Cpp));
        assert_eq!(SandboxLanguage::from_name("rust"), None);
    }

    #[test]
    fn dockerfile_python_runs_the_copied_source() {
        let df = dockerfile_for(SandboxLanguage::Python, "main.py");
        assert!(df.contains("FROM python:3.9-slim"));
        assert!(df.contains("CMD [\"python\", \"main.py\"]"));
    }

    #[test]
    fn dockerfile_cpp_compiles_before_running() {
        let df = dockerfile_for(SandboxLanguage::Cpp, "main.cpp");
        assert!(df.contains("FROM gcc:11"));
        assert!(df.contains("RUN g++ -O2 -o main main.cpp"));
    }

    #[test]
    fn parses_mib_and_kib_memory_readings() {
        assert_eq!(parse_mem_usage("12.5MiB / 256MiB"), 12);
        assert_eq!(parse_mem_usage("2048KiB / 256MiB"), 2);
        assert_eq!(parse_mem_usage("garbage"), 0);
    }
}
