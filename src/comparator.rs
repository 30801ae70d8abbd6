//! Output Comparator (C1 §4.2): pure text-equality checks between a
//! program's stdout and a test case's expected output.
//!
//! Grounded on the teacher's `judger.rs::compare_output` and the original
//! system's `docker_judge.py::_normalize_output`, which agree on the
//! `standard` semantics; `strict` restores the distinction spec.md §4.2
//! draws between the two modes (the teacher collapsed both into one
//! lenient comparison).

use crate::model::JudgeMode;

/// Strip at most one trailing newline from a string.
fn strip_one_trailing_newline(s: &str) -> &str {
    s.strip_suffix('\n').unwrap_or(s)
}

/// `strict` mode: byte-exact after stripping at most one trailing newline
/// from both sides.
pub fn compare_strict(actual: &str, expected: &str) -> bool {
    strip_one_trailing_newline(actual) == strip_one_trailing_newline(expected)
}

/// `standard` mode: split on `\n`, right-trim each line of ASCII
/// whitespace, rejoin with `\n`, then right-trim the whole result.
fn normalize_standard(s: &str) -> String {
    s.split('\n')
        .map(|line| line.trim_end_matches(|c: char| c.is_ascii_whitespace()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end_matches(|c: char| c.is_ascii_whitespace())
        .to_string()
}

pub fn compare_standard(actual: &str, expected: &str) -> bool {
    normalize_standard(actual) == normalize_standard(expected)
}

/// Dispatch on judging mode. `Spj` has no comparator semantics of its own —
/// callers route to the checker runner instead and only fall back here
/// (in `standard` mode) on `SPJ_ERROR` per spec.md §7.
pub fn compare(mode: JudgeMode, actual: &str, expected: &str) -> bool {
    match mode {
        JudgeMode::Strict => compare_strict(actual, expected),
        JudgeMode::Standard | JudgeMode::Spj => compare_standard(actual, expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_strips_single_trailing_newline_each_side() {
        assert!(compare_strict("hello\n", "hello"));
        assert!(compare_strict("hello", "hello\n"));
        assert!(!compare_strict("hello\n\n", "hello"));
    }

    #[test]
    fn strict_is_otherwise_byte_exact() {
        assert!(!compare_strict("hello ", "hello"));
        assert!(!compare_strict("Hello", "hello"));
    }

    #[test]
    fn standard_trims_trailing_whitespace_per_line() {
        assert!(compare_standard("hello  \nworld\n", "hello\nworld\n"));
    }

    #[test]
    fn standard_trims_trailing_blank_lines() {
        assert!(compare_standard("hello\nworld\n\n\n", "hello\nworld\n"));
    }

    #[test]
    fn standard_rejects_real_differences() {
        assert!(!compare_standard("hello\nworld\n", "hello\nearth\n"));
    }

    /// Testable property #5 (spec.md §8): compare(a,b) == compare(a +
    /// "\n\n  ", b + "  \n") under `standard` mode.
    #[test]
    fn standard_is_insensitive_to_trailing_padding() {
        let a = "3";
        let b = "3";
        assert_eq!(
            compare_standard(a, b),
            compare_standard(&format!("{a}\n\n  "), &format!("{b}  \n"))
        );
    }
}
