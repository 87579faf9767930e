//! Script front end: text → tokenized lines → validated [`Program`].
//!
//! Scripts are line oriented. The tokenizer ([`parser`]) classifies each line
//! and splits instruction fields; the [`builder`] resolves keywords into the
//! closed [`InstructionKind`] enumeration, matches block delimiters, and
//! resolves labels, states and scopes. Any structural problem is reported as
//! a [`LoadError`] naming the offending line, before anything executes.

/// Tokenized line structures.
pub mod ast;
/// Resolution of tokenized lines into the program model.
pub mod builder;
/// Duration, timestamp and coordinate literals.
pub mod literal;
/// Program model consumed by the engine.
pub mod ir;
/// Line tokenizer.
pub mod parser;

use std::fmt;
use std::path::Path;

use anyhow::Context;
use thiserror::Error;

pub use ast::{ActionLine, LineKind, Script, SourceLine};
pub use builder::build_program;
pub use ir::{
    Click, Instruction, InstructionKind, Label, ParallelBlock, Program, Scope, StateDef,
    StateMachine, ThreadSpan, Transition, TransitionCondition, TriggerBlock, TriggerKind,
};
pub use parser::tokenize;

/// Convenience result alias for load operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Block constructs tracked by the builder's nesting stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `並行開始` … `並行結束`.
    Parallel,
    /// `線程>` … `線程結束`.
    Thread,
    /// `定時觸發>` … `定時結束`.
    TimerTrigger,
    /// `條件觸發>` … `條件結束`.
    ConditionTrigger,
    /// `優先偵測>` … `優先偵測結束`.
    PriorityTrigger,
    /// `狀態機>` … `狀態機結束`.
    StateMachine,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parallel => "parallel",
            Self::Thread => "thread",
            Self::TimerTrigger => "timer trigger",
            Self::ConditionTrigger => "condition trigger",
            Self::PriorityTrigger => "priority trigger",
            Self::StateMachine => "state machine",
        };
        f.write_str(name)
    }
}

/// Errors that prevent a script from loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The line is neither a comment, a label, a branch marker nor an instruction.
    #[error("line {line}: unrecognised line `{text}`")]
    Syntax {
        /// Offending line.
        line: usize,
        /// Line text.
        text: String,
    },

    /// The instruction keyword is unknown.
    #[error("line {line}: unknown instruction `{text}`")]
    UnknownInstruction {
        /// Offending line.
        line: usize,
        /// Instruction head.
        text: String,
    },

    /// A coordinate, duration or operand could not be read.
    #[error("line {line}: malformed {what} `{text}`")]
    Malformed {
        /// Offending line.
        line: usize,
        /// What was being read.
        what: &'static str,
        /// The text that failed to parse.
        text: String,
    },

    /// `#name*N` with `N` not a positive integer.
    #[error("line {line}: label quota must be a positive integer, found `{text}`")]
    InvalidQuota {
        /// Offending line.
        line: usize,
        /// Quota text.
        text: String,
    },

    /// A label name was defined twice.
    #[error("line {line}: duplicate label `#{name}` (first defined on line {first})")]
    DuplicateLabel {
        /// Offending line.
        line: usize,
        /// Label name.
        name: String,
        /// Line of the first definition.
        first: usize,
    },

    /// A jump or branch names a label that does not exist.
    #[error("line {line}: unknown label `#{name}`")]
    UnresolvedLabel {
        /// Offending line.
        line: usize,
        /// Label name.
        name: String,
    },

    /// A jump or branch targets a label in a different thread, trigger or state.
    #[error("line {line}: label `#{name}` is outside the current {scope}")]
    CrossScopeJump {
        /// Offending line.
        line: usize,
        /// Label name.
        name: String,
        /// Scope of the jump site.
        scope: String,
    },

    /// A closing marker does not match the innermost open block.
    #[error("line {line}: end of {found} does not match the {open} opened on line {opened}")]
    MismatchedBlock {
        /// Offending line.
        line: usize,
        /// Block the marker tries to close.
        found: BlockKind,
        /// Innermost open block.
        open: BlockKind,
        /// Line where the open block started.
        opened: usize,
    },

    /// A closing marker appears with no open block.
    #[error("line {line}: end of {found} without a matching start")]
    UnopenedBlock {
        /// Offending line.
        line: usize,
        /// Block the marker tries to close.
        found: BlockKind,
    },

    /// Input ended with a block still open.
    #[error("line {line}: {kind} block is never closed")]
    UnclosedBlock {
        /// Line where the block started.
        line: usize,
        /// Block kind.
        kind: BlockKind,
    },

    /// An instruction appears where the block structure does not allow it.
    #[error("line {line}: {detail}")]
    Misplaced {
        /// Offending line.
        line: usize,
        /// Explanation.
        detail: String,
    },

    /// A `>>`/`>>>` marker does not follow a conditional instruction.
    #[error("line {line}: branch marker must follow a conditional instruction")]
    OrphanBranch {
        /// Offending line.
        line: usize,
    },

    /// A state machine has no state marked initial.
    #[error("line {line}: state machine `{machine}` has no initial state")]
    MissingInitialState {
        /// Line of the machine header.
        line: usize,
        /// Machine name.
        machine: String,
    },

    /// A state machine marks several states initial.
    #[error("line {line}: state machine `{machine}` already has an initial state")]
    MultipleInitialStates {
        /// Offending line.
        line: usize,
        /// Machine name.
        machine: String,
    },

    /// A state name is declared twice in one machine.
    #[error("line {line}: duplicate state `{name}`")]
    DuplicateState {
        /// Offending line.
        line: usize,
        /// State name.
        name: String,
    },

    /// A transition targets a state that does not exist.
    #[error("line {line}: unknown state `{name}`")]
    UnknownState {
        /// Offending line.
        line: usize,
        /// State name.
        name: String,
    },

    /// A transition uses a condition other than success/failure/default.
    #[error("line {line}: unknown transition condition `{token}`")]
    UnknownCondition {
        /// Offending line.
        line: usize,
        /// Condition token.
        token: String,
    },
}

impl LoadError {
    /// Source line the error points at.
    pub fn line(&self) -> usize {
        match self {
            Self::Syntax { line, .. }
            | Self::UnknownInstruction { line, .. }
            | Self::Malformed { line, .. }
            | Self::InvalidQuota { line, .. }
            | Self::DuplicateLabel { line, .. }
            | Self::UnresolvedLabel { line, .. }
            | Self::CrossScopeJump { line, .. }
            | Self::MismatchedBlock { line, .. }
            | Self::UnopenedBlock { line, .. }
            | Self::UnclosedBlock { line, .. }
            | Self::Misplaced { line, .. }
            | Self::OrphanBranch { line }
            | Self::MissingInitialState { line, .. }
            | Self::MultipleInitialStates { line, .. }
            | Self::DuplicateState { line, .. }
            | Self::UnknownState { line, .. }
            | Self::UnknownCondition { line, .. } => *line,
        }
    }
}

/// Tokenize and build a program from script text.
pub fn parse_program(name: &str, source: &str) -> Result<Program> {
    let script = tokenize(name, source)?;
    build_program(&script)
}

/// Read a script file and build it; the file stem names the program.
pub fn load_script(path: &Path) -> anyhow::Result<Program> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "anonymous".to_string());
    let program = parse_program(&name, &source)
        .with_context(|| format!("Failed to load script {}", path.display()))?;
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_script_names_program_after_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("farm.txt");
        std::fs::write(&path, "#start\n>按A, 延遲50ms, T=0s000\n>跳到#start\n").unwrap();

        let program = load_script(&path).unwrap();
        assert_eq!(program.name, "farm");
        assert_eq!(program.instructions.len(), 3);
    }

    #[test]
    fn load_script_reports_line_of_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.txt");
        std::fs::write(&path, ">按A\n>跳到#nowhere\n").unwrap();

        let err = load_script(&path).unwrap_err();
        let load = err.downcast_ref::<LoadError>().expect("load error in chain");
        assert_eq!(load.line(), 2);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let temp = TempDir::new().unwrap();
        let err = load_script(&temp.path().join("absent.txt")).unwrap_err();
        assert!(err.to_string().contains("Failed to read script"));
    }
}
