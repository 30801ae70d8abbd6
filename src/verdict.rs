//! The per-test-case verdict taxonomy (spec.md §7).
//!
//! Grounded on the teacher's `core/verdict.rs`, trimmed to the symbols
//! spec.md actually names and given the wire form spec.md §3 and §7 use
//! (`AC`, `WA`, `TLE`, `MLE`, `RE`, `CE`, `UNK`) rather than the teacher's
//! testlib-derived long-form names.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Program and checker/comparator accepted the output.
    AC,
    /// Output did not match.
    WA,
    /// Wall-clock deadline breached.
    TLE,
    /// Measured RSS exceeded the cap.
    MLE,
    /// Program exited non-zero or was killed.
    RE,
    /// Compilation failed or timed out.
    CE,
    /// Infrastructure fault.
    UNK,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::AC => "AC",
            Verdict::WA => "WA",
            Verdict::TLE => "TLE",
            Verdict::MLE => "MLE",
            Verdict::RE => "RE",
            Verdict::CE => "CE",
            Verdict::UNK => "UNK",
        };
        write!(f, "{}", s)
    }
}

impl Verdict {
    /// Whether this verdict, from the sandbox/fallback layer, is a clean
    /// run that should proceed to the comparator / SPJ stage (spec.md
    /// §4.6 step 6: "AC from sandbox = the program ran cleanly").
    pub fn is_clean_run(&self) -> bool {
        matches!(self, Verdict::AC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(Verdict::AC.to_string(), "AC");
        assert_eq!(Verdict::TLE.to_string(), "TLE");
        assert_eq!(Verdict::UNK.to_string(), "UNK");
    }

    #[test]
    fn only_ac_is_clean_run() {
        assert!(Verdict::AC.is_clean_run());
        assert!(!Verdict::WA.is_clean_run());
        assert!(!Verdict::RE.is_clean_run());
    }

    #[test]
    fn round_trips_through_json() {
        let v = Verdict::MLE;
        let json = serde_json::to_string(&v).unwrap();
        let back: Verdict = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
