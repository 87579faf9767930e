use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::{MouseButton, Point};

/// Fully validated program ready for execution.
///
/// Instructions are kept in one flat list in source order; block tables point
/// into it by index. Nothing in here changes while a program runs.
///
/// Only programs produced by [`build_program`](super::build_program) (and so
/// by `parse_program` and `load_script`) are valid input for the engine: it
/// indexes the instruction list and the block tables without bounds checks.
/// Hand-edited tables with dangling indices make a session panic. For that
/// reason a program can be serialized for inspection but not deserialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    /// Program identifier.
    pub name: String,
    /// blake3 hex digest of the source text.
    pub fingerprint: String,
    /// Instructions in source order.
    pub instructions: Vec<Instruction>,
    /// Label table, indexed by label id.
    pub labels: Vec<Label>,
    /// Label name → label id.
    pub label_index: BTreeMap<String, usize>,
    /// Parallel blocks with their thread spans.
    pub parallels: Vec<ParallelBlock>,
    /// Trigger blocks, armed when a run starts.
    pub triggers: Vec<TriggerBlock>,
    /// State machines.
    pub machines: Vec<StateMachine>,
}

impl Program {
    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Look up a label by name.
    pub fn label_named(&self, name: &str) -> Option<&Label> {
        self.label_index.get(name).map(|id| &self.labels[*id])
    }

    /// Source line of the instruction at `index`, if any.
    pub fn line_of(&self, index: usize) -> Option<usize> {
        self.instructions.get(index).map(|instruction| instruction.line)
    }
}

/// One executable step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// 1-based source line.
    pub line: usize,
    /// Resolved kind and operands.
    pub kind: InstructionKind,
    /// Post-delay in milliseconds, before playback speed scaling.
    pub delay_ms: u64,
    /// Declared absolute timestamp, used only for drift checks.
    pub timestamp_ms: Option<u64>,
}

/// Closed set of instruction kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstructionKind {
    /// Press and release a key.
    KeyPress {
        /// Key identifier as written in the script.
        key: String,
    },
    /// Press a key and hold it.
    KeyDown {
        /// Key identifier.
        key: String,
    },
    /// Release a held key.
    KeyUp {
        /// Key identifier.
        key: String,
    },
    /// Move the pointer.
    MouseMove {
        /// Destination.
        at: Point,
    },
    /// Click at a position.
    MouseClick {
        /// Position.
        at: Point,
        /// Click flavour.
        click: Click,
    },
    /// Press a mouse button and hold it.
    MouseDown {
        /// Position.
        at: Point,
        /// Button.
        button: MouseButton,
    },
    /// Release a mouse button.
    MouseUp {
        /// Position.
        at: Point,
        /// Button.
        button: MouseButton,
    },
    /// Rotate the wheel.
    Scroll {
        /// Position.
        at: Point,
        /// Notches, positive is up.
        delta: i32,
    },
    /// Check whether an image is on screen.
    ImageLocate {
        /// Image name.
        image: String,
    },
    /// Move the pointer to the center of an image.
    ImageMoveTo {
        /// Image name.
        image: String,
    },
    /// Click the center of an image.
    ImageClick {
        /// Image name.
        image: String,
        /// Button.
        button: MouseButton,
    },
    /// Check whether any of several images is on screen.
    ImageLocateAny {
        /// Candidate image names, in priority order.
        images: Vec<String>,
    },
    /// Check whether text is on screen.
    OcrCheckText {
        /// Text to find.
        text: String,
    },
    /// Wait until text appears.
    OcrWaitText {
        /// Text to find.
        text: String,
        /// Explicit timeout; the configured default applies otherwise.
        timeout_ms: Option<u64>,
    },
    /// Click on recognised text.
    OcrClickText {
        /// Text to find.
        text: String,
    },
    /// Pure wait; the duration is the instruction's delay.
    Delay,
    /// Transfer to a label.
    Jump {
        /// Label id.
        label: usize,
    },
    /// End the run normally.
    Stop,
    /// Label definition site.
    LabelDef {
        /// Label id.
        label: usize,
    },
    /// `>>`: act on a true outcome.
    BranchSuccess {
        /// Target label id, or fall through.
        label: Option<usize>,
    },
    /// `>>>`: act on a false outcome.
    BranchFailure {
        /// Target label id, or fall through.
        label: Option<usize>,
    },
    /// Start of a thread span.
    ThreadBegin {
        /// Parallel block id.
        block: usize,
        /// Thread index within the block.
        thread: usize,
    },
    /// End of a thread span.
    ThreadEnd {
        /// Parallel block id.
        block: usize,
        /// Thread index within the block.
        thread: usize,
    },
    /// Start of a parallel block.
    ParallelBegin {
        /// Parallel block id.
        block: usize,
    },
    /// Join point of a parallel block.
    ParallelEnd {
        /// Parallel block id.
        block: usize,
    },
    /// Start of a timer trigger body.
    TimerTriggerBegin {
        /// Trigger id.
        trigger: usize,
    },
    /// End of a timer trigger body.
    TimerTriggerEnd {
        /// Trigger id.
        trigger: usize,
    },
    /// Start of a condition trigger body.
    ConditionTriggerBegin {
        /// Trigger id.
        trigger: usize,
    },
    /// End of a condition trigger body.
    ConditionTriggerEnd {
        /// Trigger id.
        trigger: usize,
    },
    /// Start of a priority trigger body.
    PriorityTriggerBegin {
        /// Trigger id.
        trigger: usize,
    },
    /// End of a priority trigger body.
    PriorityTriggerEnd {
        /// Trigger id.
        trigger: usize,
    },
    /// Entry of a state machine.
    StateMachineBegin {
        /// Machine id.
        machine: usize,
    },
    /// Header of a state body.
    StateDef {
        /// Machine id.
        machine: usize,
        /// State index within the machine.
        state: usize,
    },
    /// Transition declaration; evaluated after the state body, not in place.
    StateTransition {
        /// Machine id.
        machine: usize,
        /// State index within the machine.
        state: usize,
        /// Transition index within the state.
        transition: usize,
    },
    /// End of a state machine.
    StateMachineEnd {
        /// Machine id.
        machine: usize,
    },
}

impl InstructionKind {
    /// Whether the instruction produces an outcome that branch markers read.
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            Self::ImageLocate { .. }
                | Self::ImageMoveTo { .. }
                | Self::ImageClick { .. }
                | Self::ImageLocateAny { .. }
                | Self::OcrCheckText { .. }
                | Self::OcrWaitText { .. }
                | Self::OcrClickText { .. }
        )
    }

    /// Whether the instruction is a branch marker.
    pub fn is_branch(&self) -> bool {
        matches!(self, Self::BranchSuccess { .. } | Self::BranchFailure { .. })
    }
}

/// Click flavour for coordinate clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Click {
    /// Primary button.
    Left,
    /// Secondary button.
    Right,
    /// Wheel button.
    Middle,
    /// Primary button, twice.
    Double,
}

impl Click {
    /// Single-click button, `None` for a double click.
    pub fn button(self) -> Option<MouseButton> {
        match self {
            Self::Left => Some(MouseButton::Left),
            Self::Right => Some(MouseButton::Right),
            Self::Middle => Some(MouseButton::Middle),
            Self::Double => None,
        }
    }
}

/// Named jump target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Index of the `LabelDef` instruction.
    pub index: usize,
    /// Number of honored jumps per round; `None` is unlimited.
    pub quota: Option<u32>,
    /// Scope the label lives in.
    pub scope: Scope,
    /// Definition line.
    pub line: usize,
}

/// Region of the program a label belongs to. Jumps never cross scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Scope {
    /// Top-level script.
    Main,
    /// One thread of a parallel block.
    Thread {
        /// Parallel block id.
        block: usize,
        /// Thread index.
        thread: usize,
    },
    /// One trigger body.
    Trigger {
        /// Trigger id.
        trigger: usize,
    },
    /// One state body.
    State {
        /// Machine id.
        machine: usize,
        /// State index.
        state: usize,
    },
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main script"),
            Self::Thread { .. } => f.write_str("thread"),
            Self::Trigger { .. } => f.write_str("trigger body"),
            Self::State { .. } => f.write_str("state body"),
        }
    }
}

/// `並行開始` … `並行結束`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelBlock {
    /// Index of `ParallelBegin`.
    pub begin: usize,
    /// Index of `ParallelEnd`.
    pub end: usize,
    /// Header line.
    pub line: usize,
    /// Thread spans in declaration order.
    pub threads: Vec<ThreadSpan>,
}

/// One thread inside a parallel block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSpan {
    /// Thread name.
    pub name: String,
    /// Index of `ThreadBegin`.
    pub begin: usize,
    /// Index of `ThreadEnd`.
    pub end: usize,
    /// Header line.
    pub line: usize,
}

/// Background trigger declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerBlock {
    /// Trigger flavour.
    pub kind: TriggerKind,
    /// Index of the begin marker.
    pub begin: usize,
    /// Index of the end marker.
    pub end: usize,
    /// Header line.
    pub line: usize,
}

/// Trigger flavours, in increasing scheduling precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fires every interval.
    Timer {
        /// Interval between the end of one firing and the next.
        interval_ms: u64,
    },
    /// Fires when an image appears, then sleeps for the cooldown.
    Condition {
        /// Watched image.
        image: String,
        /// Explicit cooldown; the configured default applies otherwise.
        cooldown_ms: Option<u64>,
    },
    /// Fires when an image appears and preempts the main script.
    Priority {
        /// Watched image.
        image: String,
    },
}

impl TriggerKind {
    /// Scheduling rank; higher fires first when several are due together.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Timer { .. } => 0,
            Self::Condition { .. } => 1,
            Self::Priority { .. } => 2,
        }
    }

    /// Short name used in logs and fault reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timer { .. } => "timer",
            Self::Condition { .. } => "condition",
            Self::Priority { .. } => "priority",
        }
    }
}

/// `狀態機>name` … `狀態機結束`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachine {
    /// Machine name.
    pub name: String,
    /// Index of `StateMachineBegin`.
    pub begin: usize,
    /// Index of `StateMachineEnd`.
    pub end: usize,
    /// Header line.
    pub line: usize,
    /// States in declaration order.
    pub states: Vec<StateDef>,
    /// Index of the initial state.
    pub initial: usize,
}

impl StateMachine {
    /// Find a state by name.
    pub fn state_named(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|state| state.name == name)
    }
}

/// One state and its outgoing transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    /// State name.
    pub name: String,
    /// Index of the `StateDef` header; the body starts right after it.
    pub begin: usize,
    /// Exclusive end of the body (next header or the machine end).
    pub end: usize,
    /// Header line.
    pub line: usize,
    /// Marked `初始` / `initial`.
    pub initial: bool,
    /// Transitions in declaration order.
    pub transitions: Vec<Transition>,
}

/// `切換>condition>state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// When the transition applies.
    pub condition: TransitionCondition,
    /// Target state index.
    pub target: usize,
    /// Declaration line.
    pub line: usize,
}

/// Transition guard tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionCondition {
    /// Last conditional in the visit was true.
    Success,
    /// Last conditional in the visit was false.
    Failure,
    /// Always; considered after every other transition.
    Default,
}

impl TransitionCondition {
    /// Parse a condition token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "success" | "成功" => Some(Self::Success),
            "failure" | "fail" | "失敗" | "失败" => Some(Self::Failure),
            "default" | "預設" | "默认" | "其他" => Some(Self::Default),
            _ => None,
        }
    }

    /// Whether the guard admits the given outcome.
    pub fn admits(self, outcome: Option<bool>) -> bool {
        match self {
            Self::Success => outcome == Some(true),
            Self::Failure => outcome == Some(false),
            Self::Default => true,
        }
    }
}
