use std::{fmt, time::Duration};

use serde::{Serialize, Serializer};

/// Policy or limit breach that made the runner kill the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    #[strum(serialize = "time limit exceeded")]
    TimeLimit,
    #[strum(serialize = "memory limit exceeded")]
    MemoryLimit,
    #[strum(serialize = "attempted to start a child process")]
    ChildProcess,
    #[strum(serialize = "attempted to communicate through the network")]
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub peak_memory: u64,
    pub timed_out: bool,
    pub memory_exceeded: bool,
    pub spawned_child: bool,
    pub used_network: bool,
    pub violation: Option<Violation>,
}

impl ExecutionRecord {
    pub fn exited_successfully(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn exit_status(&self) -> ExitDisplay {
        ExitDisplay(self.exit_code)
    }
}

impl Default for ExecutionRecord {
    fn default() -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: Some(0),
            elapsed: Duration::ZERO,
            peak_memory: 0,
            timed_out: false,
            memory_exceeded: false,
            spawned_child: false,
            used_network: false,
            violation: None,
        }
    }
}

pub struct ExitDisplay(Option<i32>);

impl fmt::Display for ExitDisplay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "killed by signal"),
        }
    }
}

pub(crate) fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
