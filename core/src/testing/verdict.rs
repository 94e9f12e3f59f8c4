use serde::{Deserialize, Serialize};

use super::record::ExecutionRecord;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumIter,
)]
pub enum Verdict {
    #[strum(serialize = "Correct")]
    Correct,
    #[strum(serialize = "Wrong Answer")]
    WrongAnswer,
    #[strum(serialize = "Runtime Error")]
    RuntimeError,
    #[strum(serialize = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[strum(serialize = "Memory Limit Exceeded")]
    MemoryLimitExceeded,
    #[strum(serialize = "Policy Violation")]
    PolicyViolation,
}

impl Verdict {
    pub fn code(self) -> &'static str {
        use Verdict::*;
        match self {
            Correct => "AC",
            WrongAnswer => "WA",
            RuntimeError => "RE",
            TimeLimitExceeded => "TLE",
            MemoryLimitExceeded => "MLE",
            PolicyViolation => "PV",
        }
    }

    pub fn is_correct(self) -> bool {
        self == Verdict::Correct
    }
}

/// How limit and policy violations other than the time limit are classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictMode {
    /// Memory/child/network kills surface as `RuntimeError` through the killed exit status.
    #[default]
    Compat,
    /// Memory kills become `MemoryLimitExceeded`, child/network kills `PolicyViolation`.
    Detailed,
}

pub fn classify(record: &ExecutionRecord, expected: &[String]) -> Verdict {
    classify_with(record, expected, VerdictMode::Compat)
}

/// First matching rule wins; the order is part of the contract.
pub fn classify_with(record: &ExecutionRecord, expected: &[String], mode: VerdictMode) -> Verdict {
    if record.timed_out {
        return Verdict::TimeLimitExceeded;
    }
    if mode == VerdictMode::Detailed {
        if record.memory_exceeded {
            return Verdict::MemoryLimitExceeded;
        }
        if record.spawned_child || record.used_network {
            return Verdict::PolicyViolation;
        }
    }
    if !record.exited_successfully() {
        return Verdict::RuntimeError;
    }
    if record.stdout != expected {
        return Verdict::WrongAnswer;
    }
    Verdict::Correct
}
