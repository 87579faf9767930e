use serde::{Deserialize, Serialize};

/// One meaningful script line after tokenizing (comments and blanks dropped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLine {
    /// 1-based line number in the original text.
    pub line: usize,
    /// Classified content.
    pub kind: LineKind,
}

/// Line shapes recognised by the tokenizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum LineKind {
    /// `#name` or `#name*N`.
    Label {
        /// Label name without the leading `#`.
        name: String,
        /// Repeat quota, when given.
        quota: Option<u32>,
    },
    /// `>>` optionally followed by `#label`.
    BranchSuccess(Option<String>),
    /// `>>>` optionally followed by `#label`.
    BranchFailure(Option<String>),
    /// `>head, params…, delay, T=…`.
    Action(ActionLine),
}

/// Raw fields of an instruction line; keywords are resolved by the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLine {
    /// Action token including its operand (`按A`, `if>pic01`, `移動至(1,2)`).
    pub head: String,
    /// Remaining fields that are neither delay nor timestamp.
    pub params: Vec<String>,
    /// Declared post-delay in milliseconds.
    pub delay_ms: Option<u64>,
    /// Declared absolute timestamp in milliseconds.
    pub timestamp_ms: Option<u64>,
}

/// Tokenized script, retained with its source for fingerprinting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// Script identifier (usually the file stem).
    pub name: String,
    /// Tokenized lines.
    pub lines: Vec<SourceLine>,
    /// Original source text.
    pub source: String,
}

impl Script {
    /// Construct a tokenized script.
    pub fn new(name: impl Into<String>, source: impl Into<String>, lines: Vec<SourceLine>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            lines,
        }
    }
}
