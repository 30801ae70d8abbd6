//! Command Safety Validator (§4.1): a static deny-list check run on every
//! command before it reaches the sandbox or fallback executor.
//!
//! Grounded on the original system's `docker_judge.py::validate_command`,
//! ported verbatim down to the exact command/flag sets; the typed
//! `Command` shape follows the teacher's `runner::CommandSpec` builder.

use std::fmt;

/// A command about to be run inside the sandbox or fallback path: program
/// name plus its argument vector. Mirrors `runner::CommandSpec` but carries
/// no environment/work-dir concerns — those belong to the executor, not
/// the validator.
#[derive(Debug, Clone)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn parts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }
}

/// Reason a command was rejected. Kept distinct so the orchestrator can
/// render a `CE`/`UNK`-appropriate message without re-deriving which rule
/// fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyCommand,
    DeniedCommand(String),
    DeniedFlag(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyCommand => write!(f, "command is empty"),
            ValidationError::DeniedCommand(c) => write!(f, "command '{c}' is not permitted"),
            ValidationError::DeniedFlag(flag) => write!(f, "flag '{flag}' is not permitted"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Denied command names (§4.1). Matched case-insensitively against the
/// lowercased program name only — not substrings of arguments.
const DENIED_COMMANDS: &[&str] = &[
    "rm", "rmdir", "del", "format", "mkfs", "dd", "shred", "sudo", "su", "chmod", "chown", "mount",
    "umount", "iptables", "firewall", "service", "systemctl", "ssh", "scp", "wget", "curl", "nc",
    "telnet", "kubectl", "helm", "docker",
];

/// Denied flags (§4.1), matched against each argument after the program
/// name: exact match, or substring match for any argument starting with
/// `-`.
const DENIED_FLAGS: &[&str] = &[
    "-rf",
    "--recursive",
    "--force",
    "--no-preserve-root",
    "--preserve-root=0",
    "-exec",
    "-ok",
    "-delete",
    "--privileged",
];

/// Validate a command against the deny-list. Absence of an allow-list
/// match is NOT itself a rejection reason — §4.1 only denies, it does not
/// additionally require allow-list membership; language profiles already
/// constrain which programs get invoked.
pub fn validate(cmd: &Command) -> Result<(), ValidationError> {
    let mut parts = cmd.parts().map(|p| p.to_ascii_lowercase());
    let main = parts.next().ok_or(ValidationError::EmptyCommand)?;
    if main.is_empty() {
        return Err(ValidationError::EmptyCommand);
    }
    if DENIED_COMMANDS.contains(&main.as_str()) {
        return Err(ValidationError::DeniedCommand(main));
    }
    for part in parts {
        if DENIED_FLAGS.contains(&part.as_str()) {
            return Err(ValidationError::DeniedFlag(part));
        }
        if part.starts_with('-') && DENIED_FLAGS.iter().any(|flag| part.contains(flag)) {
            return Err(ValidationError::DeniedFlag(part));
        }
    }
    Ok(())
}

pub fn is_safe(cmd: &Command) -> bool {
    validate(cmd).is_ok()
}
