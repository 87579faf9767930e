use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random SessionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution context an instruction ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum Origin {
    /// Main script on the primary cursor.
    Main,
    /// State body on the primary cursor.
    State {
        /// Machine id.
        machine: usize,
        /// State index.
        state: usize,
    },
    /// Thread of a parallel block.
    Thread {
        /// Parallel block id.
        block: usize,
        /// Thread index.
        thread: usize,
    },
    /// Trigger body.
    Trigger {
        /// Trigger id.
        trigger: usize,
    },
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::State { machine, state } => write!(f, "state {}/{}", machine, state),
            Self::Thread { block, thread } => write!(f, "thread {}/{}", block, thread),
            Self::Trigger { trigger } => write!(f, "trigger {}", trigger),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every round ran to the end of the script.
    Completed,
    /// A `停止` instruction ended the run.
    Stopped,
    /// The playback time limit elapsed.
    TimeLimitReached,
    /// Stopped from outside through [`SessionControl`](super::SessionControl).
    Aborted,
    /// Input injection failed on the primary cursor.
    Faulted {
        /// Line of the failing instruction.
        line: usize,
        /// Provider message.
        reason: String,
    },
}

impl RunStatus {
    /// Whether the run ended without an abort or a fault.
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::TimeLimitReached)
    }
}

/// A failure contained to one thread or trigger body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Context that faulted.
    pub origin: Origin,
    /// Line of the failing instruction.
    pub line: usize,
    /// Logical time of the failure.
    pub at_ms: u64,
    /// Provider message.
    pub reason: String,
}

/// One executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Logical time the instruction started.
    pub at_ms: u64,
    /// Source line.
    pub line: usize,
    /// Context it ran in.
    pub origin: Origin,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Session that produced the report.
    pub session: SessionId,
    /// Program name.
    pub program: String,
    /// Program fingerprint.
    pub fingerprint: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Terminal status.
    pub status: RunStatus,
    /// Logical run time, pauses excluded.
    pub elapsed_ms: u64,
    /// Rounds started.
    pub rounds: u32,
    /// Instructions executed across all contexts.
    pub instructions_executed: u64,
    /// Contained faults.
    pub faults: Vec<Fault>,
    /// Timestamp drift warnings emitted.
    pub drift_warnings: u64,
    /// Execution trace, when enabled.
    pub trace: Option<Vec<TraceEntry>>,
}

impl RunReport {
    /// A run with contained faults completed in a degraded state.
    pub fn is_degraded(&self) -> bool {
        !self.faults.is_empty()
    }

    /// Source lines of the trace, in execution order.
    pub fn trace_lines(&self) -> Vec<usize> {
        self.trace
            .iter()
            .flatten()
            .map(|entry| entry.line)
            .collect()
    }
}
