use std::collections::BTreeMap;

use super::ast::{ActionLine, LineKind, Script, SourceLine};
use super::ir::{
    Click, Instruction, InstructionKind, Label, ParallelBlock, Program, Scope, StateDef,
    StateMachine, ThreadSpan, Transition, TransitionCondition, TriggerBlock, TriggerKind,
};
use super::literal::{parse_duration_ms, parse_point, parse_tuple};
use super::{BlockKind, LoadError, Result};
use crate::capability::{MouseButton, Point};

/// Resolve a tokenized script into a validated program.
pub fn build_program(script: &Script) -> Result<Program> {
    let mut builder = Builder::default();
    for line in &script.lines {
        builder.push(line)?;
    }
    builder.finish(script)
}

/// Head of an instruction line after keyword resolution.
#[derive(Debug, Clone, PartialEq)]
enum Parsed {
    Plain(InstructionKind),
    Delay(u64),
    Jump(String),
    ParallelBegin,
    ParallelEnd,
    ThreadBegin(String),
    ThreadEnd,
    TriggerBegin(TriggerKind),
    TriggerEnd(BlockKind),
    MachineBegin(String),
    MachineEnd,
    State { name: String, initial: bool },
    Transition { condition: TransitionCondition, target: String },
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    kind: BlockKind,
    id: usize,
    line: usize,
}

#[derive(Debug)]
struct LabelRef {
    instruction: usize,
    name: String,
    line: usize,
    scope: Scope,
}

#[derive(Debug)]
struct PendingTransition {
    machine: usize,
    state: usize,
    target: String,
    line: usize,
}

#[derive(Debug, Default)]
struct Builder {
    instructions: Vec<Instruction>,
    labels: Vec<Label>,
    label_index: BTreeMap<String, usize>,
    references: Vec<LabelRef>,
    parallels: Vec<ParallelBlock>,
    triggers: Vec<TriggerBlock>,
    machines: Vec<StateMachine>,
    transitions: Vec<PendingTransition>,
    stack: Vec<OpenBlock>,
    /// Current thread index inside the innermost parallel block.
    thread: Option<usize>,
    /// Current state index inside the innermost machine.
    state: Option<usize>,
    /// Whether the previous line admits a following branch marker.
    branch_ready: bool,
}

impl Builder {
    fn push(&mut self, source: &SourceLine) -> Result<()> {
        let line = source.line;
        match &source.kind {
            LineKind::Label { name, quota } => {
                let scope = self.body_scope(line, "labels")?;
                if let Some(existing) = self.label_index.get(name) {
                    return Err(LoadError::DuplicateLabel {
                        line,
                        name: name.clone(),
                        first: self.labels[*existing].line,
                    });
                }
                let id = self.labels.len();
                self.labels.push(Label {
                    name: name.clone(),
                    index: self.instructions.len(),
                    quota: *quota,
                    scope,
                    line,
                });
                self.label_index.insert(name.clone(), id);
                self.emit(line, InstructionKind::LabelDef { label: id }, 0, None);
                self.branch_ready = false;
            }
            LineKind::BranchSuccess(target) | LineKind::BranchFailure(target) => {
                let scope = self.body_scope(line, "branch markers")?;
                if !self.branch_ready {
                    return Err(LoadError::OrphanBranch { line });
                }
                let kind = match source.kind {
                    LineKind::BranchSuccess(_) => InstructionKind::BranchSuccess { label: None },
                    _ => InstructionKind::BranchFailure { label: None },
                };
                let index = self.emit(line, kind, 0, None);
                if let Some(name) = target {
                    self.references.push(LabelRef {
                        instruction: index,
                        name: name.clone(),
                        line,
                        scope,
                    });
                }
            }
            LineKind::Action(action) => {
                let parsed = resolve(line, action)?;
                self.push_action(line, action, parsed)?;
            }
        }
        Ok(())
    }

    fn push_action(&mut self, line: usize, action: &ActionLine, parsed: Parsed) -> Result<()> {
        let delay = action.delay_ms.unwrap_or(0);
        let stamp = action.timestamp_ms;
        match parsed {
            Parsed::Plain(kind) => {
                self.body_scope(line, "instructions")?;
                self.branch_ready = kind.is_conditional();
                self.emit(line, kind, delay, stamp);
            }
            Parsed::Delay(duration) => {
                self.body_scope(line, "instructions")?;
                self.branch_ready = false;
                let total = duration
                    .checked_add(delay)
                    .ok_or_else(|| malformed(line, "delay", &action.head))?;
                self.emit(line, InstructionKind::Delay, total, stamp);
            }
            Parsed::Jump(name) => {
                let scope = self.body_scope(line, "instructions")?;
                self.branch_ready = false;
                let index = self.emit(line, InstructionKind::Jump { label: usize::MAX }, delay, stamp);
                self.references.push(LabelRef {
                    instruction: index,
                    name,
                    line,
                    scope,
                });
            }
            Parsed::ParallelBegin => {
                self.top_level(line, BlockKind::Parallel)?;
                let id = self.parallels.len();
                let begin = self.emit(line, InstructionKind::ParallelBegin { block: id }, delay, stamp);
                self.parallels.push(ParallelBlock {
                    begin,
                    end: begin,
                    line,
                    threads: Vec::new(),
                });
                self.open(BlockKind::Parallel, id, line);
            }
            Parsed::ParallelEnd => {
                let block = self.close(line, BlockKind::Parallel)?;
                let end = self.emit(line, InstructionKind::ParallelEnd { block: block.id }, delay, stamp);
                self.parallels[block.id].end = end;
                self.thread = None;
            }
            Parsed::ThreadBegin(name) => {
                let block = match self.stack.last() {
                    Some(open) if open.kind == BlockKind::Parallel => open.id,
                    Some(_) => {
                        return Err(misplaced(line, "blocks cannot be nested inside another block"));
                    }
                    None => return Err(misplaced(line, "thread outside a parallel block")),
                };
                let thread = self.parallels[block].threads.len();
                let begin = self.emit(line, InstructionKind::ThreadBegin { block, thread }, delay, stamp);
                self.parallels[block].threads.push(ThreadSpan {
                    name,
                    begin,
                    end: begin,
                    line,
                });
                self.thread = Some(thread);
                self.open(BlockKind::Thread, block, line);
            }
            Parsed::ThreadEnd => {
                let open = self.close(line, BlockKind::Thread)?;
                let thread = self.thread.take().unwrap_or_default();
                let end = self.emit(
                    line,
                    InstructionKind::ThreadEnd {
                        block: open.id,
                        thread,
                    },
                    delay,
                    stamp,
                );
                self.parallels[open.id].threads[thread].end = end;
            }
            Parsed::TriggerBegin(kind) => {
                let block_kind = match kind {
                    TriggerKind::Timer { .. } => BlockKind::TimerTrigger,
                    TriggerKind::Condition { .. } => BlockKind::ConditionTrigger,
                    TriggerKind::Priority { .. } => BlockKind::PriorityTrigger,
                };
                self.top_level(line, block_kind)?;
                let trigger = self.triggers.len();
                let marker = match block_kind {
                    BlockKind::TimerTrigger => InstructionKind::TimerTriggerBegin { trigger },
                    BlockKind::ConditionTrigger => InstructionKind::ConditionTriggerBegin { trigger },
                    _ => InstructionKind::PriorityTriggerBegin { trigger },
                };
                let begin = self.emit(line, marker, delay, stamp);
                self.triggers.push(TriggerBlock {
                    kind,
                    begin,
                    end: begin,
                    line,
                });
                self.open(block_kind, trigger, line);
            }
            Parsed::TriggerEnd(block_kind) => {
                let open = self.close(line, block_kind)?;
                let trigger = open.id;
                let marker = match block_kind {
                    BlockKind::TimerTrigger => InstructionKind::TimerTriggerEnd { trigger },
                    BlockKind::ConditionTrigger => InstructionKind::ConditionTriggerEnd { trigger },
                    _ => InstructionKind::PriorityTriggerEnd { trigger },
                };
                let end = self.emit(line, marker, delay, stamp);
                self.triggers[trigger].end = end;
            }
            Parsed::MachineBegin(name) => {
                self.top_level(line, BlockKind::StateMachine)?;
                let machine = self.machines.len();
                let begin = self.emit(line, InstructionKind::StateMachineBegin { machine }, delay, stamp);
                self.machines.push(StateMachine {
                    name,
                    begin,
                    end: begin,
                    line,
                    states: Vec::new(),
                    initial: 0,
                });
                self.state = None;
                self.open(BlockKind::StateMachine, machine, line);
            }
            Parsed::State { name, initial } => {
                let machine = self.machine_context(line, "state outside a state machine")?;
                if self.machines[machine].state_named(&name).is_some() {
                    return Err(LoadError::DuplicateState { line, name });
                }
                let definition = &mut self.machines[machine];
                if initial && definition.states.iter().any(|state| state.initial) {
                    return Err(LoadError::MultipleInitialStates {
                        line,
                        machine: definition.name.clone(),
                    });
                }
                let begin = self.instructions.len();
                if let Some(previous) = self.state.and_then(|index| definition.states.get_mut(index)) {
                    previous.end = begin;
                }
                let state = definition.states.len();
                definition.states.push(StateDef {
                    name,
                    begin,
                    end: begin,
                    line,
                    initial,
                    transitions: Vec::new(),
                });
                if initial {
                    definition.initial = state;
                }
                self.state = Some(state);
                self.branch_ready = false;
                self.emit(line, InstructionKind::StateDef { machine, state }, delay, stamp);
            }
            Parsed::Transition { condition, target } => {
                let machine = self.machine_context(line, "transition outside a state machine")?;
                let state = self
                    .state
                    .ok_or_else(|| misplaced(line, "transition must belong to a state"))?;
                let transitions = &mut self.machines[machine].states[state].transitions;
                let transition = transitions.len();
                transitions.push(Transition {
                    condition,
                    target: usize::MAX,
                    line,
                });
                self.transitions.push(PendingTransition {
                    machine,
                    state,
                    target,
                    line,
                });
                self.branch_ready = false;
                self.emit(
                    line,
                    InstructionKind::StateTransition {
                        machine,
                        state,
                        transition,
                    },
                    delay,
                    stamp,
                );
            }
            Parsed::MachineEnd => {
                let open = self.close(line, BlockKind::StateMachine)?;
                let end = self.instructions.len();
                let machine = &mut self.machines[open.id];
                if let Some(last) = self.state.take().and_then(|index| machine.states.get_mut(index)) {
                    last.end = end;
                }
                if !machine.states.iter().any(|state| state.initial) {
                    return Err(LoadError::MissingInitialState {
                        line: machine.line,
                        machine: machine.name.clone(),
                    });
                }
                machine.end = end;
                self.resolve_transitions(open.id)?;
                self.emit(line, InstructionKind::StateMachineEnd { machine: open.id }, delay, stamp);
            }
        }
        Ok(())
    }

    fn emit(
        &mut self,
        line: usize,
        kind: InstructionKind,
        delay_ms: u64,
        timestamp_ms: Option<u64>,
    ) -> usize {
        self.instructions.push(Instruction {
            line,
            kind,
            delay_ms,
            timestamp_ms,
        });
        self.instructions.len() - 1
    }

    fn open(&mut self, kind: BlockKind, id: usize, line: usize) {
        self.stack.push(OpenBlock { kind, id, line });
        self.branch_ready = false;
    }

    fn close(&mut self, line: usize, found: BlockKind) -> Result<OpenBlock> {
        match self.stack.last() {
            None => Err(LoadError::UnopenedBlock { line, found }),
            Some(open) if open.kind != found => Err(LoadError::MismatchedBlock {
                line,
                found,
                open: open.kind,
                opened: open.line,
            }),
            Some(_) => {
                self.branch_ready = false;
                self.stack.pop().ok_or(LoadError::UnopenedBlock { line, found })
            }
        }
    }

    /// Blocks only open at top level.
    fn top_level(&self, line: usize, kind: BlockKind) -> Result<()> {
        match self.stack.last() {
            None => Ok(()),
            Some(open) => Err(misplaced(
                line,
                &format!("{} block cannot be nested inside a {} block", kind, open.kind),
            )),
        }
    }

    fn machine_context(&self, line: usize, detail: &str) -> Result<usize> {
        match self.stack.last() {
            Some(open) if open.kind == BlockKind::StateMachine => Ok(open.id),
            _ => Err(misplaced(line, detail)),
        }
    }

    /// Scope of an ordinary line at the current position, if ordinary lines are allowed here.
    fn body_scope(&self, line: usize, what: &str) -> Result<Scope> {
        let Some(open) = self.stack.last() else {
            return Ok(Scope::Main);
        };
        match open.kind {
            BlockKind::Parallel => Err(misplaced(
                line,
                &format!("{} inside a parallel block must belong to a thread", what),
            )),
            BlockKind::Thread => Ok(Scope::Thread {
                block: open.id,
                thread: self.thread.unwrap_or_default(),
            }),
            BlockKind::TimerTrigger | BlockKind::ConditionTrigger | BlockKind::PriorityTrigger => {
                Ok(Scope::Trigger { trigger: open.id })
            }
            BlockKind::StateMachine => match self.state {
                Some(state) => Ok(Scope::State {
                    machine: open.id,
                    state,
                }),
                None => Err(misplaced(
                    line,
                    &format!("{} inside a state machine must belong to a state", what),
                )),
            },
        }
    }

    fn resolve_transitions(&mut self, machine: usize) -> Result<()> {
        let pending: Vec<PendingTransition> = self
            .transitions
            .drain(..)
            .filter(|transition| transition.machine == machine)
            .collect();
        let definition = &mut self.machines[machine];
        for transition in pending {
            let target = definition
                .state_named(&transition.target)
                .ok_or_else(|| LoadError::UnknownState {
                    line: transition.line,
                    name: transition.target.clone(),
                })?;
            let transitions = &mut definition.states[transition.state].transitions;
            if let Some(slot) = transitions
                .iter_mut()
                .find(|slot| slot.line == transition.line)
            {
                slot.target = target;
            }
        }
        Ok(())
    }

    fn finish(mut self, script: &Script) -> Result<Program> {
        if let Some(open) = self.stack.last() {
            return Err(LoadError::UnclosedBlock {
                line: open.line,
                kind: open.kind,
            });
        }

        for reference in std::mem::take(&mut self.references) {
            let id = *self
                .label_index
                .get(&reference.name)
                .ok_or_else(|| LoadError::UnresolvedLabel {
                    line: reference.line,
                    name: reference.name.clone(),
                })?;
            if self.labels[id].scope != reference.scope {
                return Err(LoadError::CrossScopeJump {
                    line: reference.line,
                    name: reference.name,
                    scope: reference.scope.to_string(),
                });
            }
            match &mut self.instructions[reference.instruction].kind {
                InstructionKind::Jump { label } => *label = id,
                InstructionKind::BranchSuccess { label } | InstructionKind::BranchFailure { label } => {
                    *label = Some(id)
                }
                _ => {}
            }
        }

        Ok(Program {
            name: script.name.clone(),
            fingerprint: blake3::hash(script.source.as_bytes()).to_hex().to_string(),
            instructions: self.instructions,
            labels: self.labels,
            label_index: self.label_index,
            parallels: self.parallels,
            triggers: self.triggers,
            machines: self.machines,
        })
    }
}

fn misplaced(line: usize, detail: &str) -> LoadError {
    LoadError::Misplaced {
        line,
        detail: detail.to_string(),
    }
}

fn malformed(line: usize, what: &'static str, text: &str) -> LoadError {
    LoadError::Malformed {
        line,
        what,
        text: text.to_string(),
    }
}

/// Strip a keyword from the start of `head`.
///
/// ASCII keywords match case-insensitively and must end on a word boundary,
/// so `click` does not match `click-text` or `clicker`.
fn strip_keyword<'a>(head: &'a str, keyword: &str) -> Option<&'a str> {
    let prefix = head.get(..keyword.len())?;
    if !prefix.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &head[keyword.len()..];
    let word_keyword = keyword.ends_with(|ch: char| ch.is_ascii_alphanumeric());
    if word_keyword && rest.starts_with(|ch: char| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_') {
        return None;
    }
    Some(rest)
}

fn strip_any<'a>(head: &'a str, keywords: &[&str]) -> Option<&'a str> {
    keywords.iter().find_map(|keyword| strip_keyword(head, keyword))
}

/// Operand introduced by `>` or whitespace: `線程>name`, `thread name`.
fn operand(line: usize, rest: &str, what: &'static str) -> Result<String> {
    let value = rest.strip_prefix('>').unwrap_or(rest).trim();
    if value.is_empty() || !(rest.starts_with('>') || rest.starts_with(char::is_whitespace)) {
        return Err(malformed(line, what, rest));
    }
    Ok(value.to_string())
}

fn no_operand(line: usize, rest: &str) -> Result<()> {
    if rest.trim().is_empty() {
        Ok(())
    } else {
        Err(malformed(line, "operand", rest))
    }
}

fn point(line: usize, rest: &str) -> Result<Point> {
    parse_point(rest).ok_or_else(|| malformed(line, "coordinate", rest))
}

fn duration(line: usize, text: &str, what: &'static str) -> Result<u64> {
    parse_duration_ms(text.trim_start_matches(['=', ':']).trim()).ok_or_else(|| malformed(line, what, text))
}

/// Read the value of the one optional parameter an instruction accepts;
/// any other parameter is rejected.
fn option_param<'a>(line: usize, params: &'a [String], keywords: &[&str]) -> Result<Option<&'a str>> {
    let mut found = None;
    for param in params {
        match strip_any(param, keywords) {
            Some(value) => found = Some(value.trim()),
            None => return Err(malformed(line, "parameter", param)),
        }
    }
    Ok(found)
}

const PRESS_VERBS: [(&str, bool); 3] = [("按下", true), ("放開", false), ("放开", false)];

/// Resolve the head of an instruction line into a keyword and operands.
fn resolve(line: usize, action: &ActionLine) -> Result<Parsed> {
    let head = action.head.trim();
    let params = action.params.as_slice();

    if let Some(parsed) = resolve_structure(line, head, params)? {
        return Ok(parsed);
    }
    match resolve_plain(line, head, params)? {
        Some(kind) => Ok(Parsed::Plain(kind)),
        None => Err(LoadError::UnknownInstruction {
            line,
            text: head.to_string(),
        }),
    }
}

fn resolve_structure(line: usize, head: &str, params: &[String]) -> Result<Option<Parsed>> {
    // Closing markers first: several share a prefix with their opener.
    let markers: [(&[&str], Parsed); 7] = [
        (&["並行結束", "并行结束", "end-parallel"], Parsed::ParallelEnd),
        (&["線程結束", "线程结束", "end-thread"], Parsed::ThreadEnd),
        (&["定時結束", "每隔結束", "定时结束", "end-every"], Parsed::TriggerEnd(BlockKind::TimerTrigger)),
        (&["條件結束", "當偵測結束", "条件结束", "end-when"], Parsed::TriggerEnd(BlockKind::ConditionTrigger)),
        (&["優先偵測結束", "优先侦测结束", "end-priority"], Parsed::TriggerEnd(BlockKind::PriorityTrigger)),
        (&["狀態機結束", "状态机结束", "end-machine"], Parsed::MachineEnd),
        (&["並行開始", "并行开始", "parallel"], Parsed::ParallelBegin),
    ];
    for (keywords, parsed) in markers {
        if let Some(rest) = strip_any(head, keywords) {
            no_operand(line, rest)?;
            option_param(line, params, &[])?;
            return Ok(Some(parsed));
        }
    }

    if let Some(rest) = strip_any(head, &["線程", "线程", "thread"]) {
        option_param(line, params, &[])?;
        return Ok(Some(Parsed::ThreadBegin(operand(line, rest, "thread name")?)));
    }
    if let Some(rest) = strip_any(head, &["定時觸發", "每隔", "定时触发", "every"]) {
        option_param(line, params, &[])?;
        let interval_ms = duration(line, &operand(line, rest, "interval")?, "interval")?;
        if interval_ms == 0 {
            return Err(malformed(line, "interval", rest));
        }
        return Ok(Some(Parsed::TriggerBegin(TriggerKind::Timer { interval_ms })));
    }
    if let Some(rest) = strip_any(head, &["條件觸發", "當偵測到", "条件触发", "when"]) {
        let image = operand(line, rest, "image name")?;
        let cooldown_ms = match option_param(line, params, &["冷卻", "冷却", "cooldown"])? {
            Some(value) => Some(duration(line, value, "cooldown")?),
            None => None,
        };
        return Ok(Some(Parsed::TriggerBegin(TriggerKind::Condition { image, cooldown_ms })));
    }
    if let Some(rest) = strip_any(head, &["優先偵測", "优先侦测", "priority"]) {
        option_param(line, params, &[])?;
        let image = operand(line, rest, "image name")?;
        return Ok(Some(Parsed::TriggerBegin(TriggerKind::Priority { image })));
    }
    if let Some(rest) = strip_any(head, &["狀態機", "状态机", "machine"]) {
        option_param(line, params, &[])?;
        return Ok(Some(Parsed::MachineBegin(operand(line, rest, "machine name")?)));
    }
    if let Some(rest) = strip_any(head, &["狀態", "状态", "state"]) {
        let name = operand(line, rest, "state name")?;
        let initial = match option_param(line, params, &["初始", "initial"])? {
            Some("") => true,
            Some(other) => return Err(malformed(line, "state modifier", other)),
            None => false,
        };
        return Ok(Some(Parsed::State { name, initial }));
    }
    if let Some(rest) = strip_any(head, &["切換", "切换", "switch"]) {
        option_param(line, params, &[])?;
        let body = operand(line, rest, "transition")?;
        let (token, target) = body
            .split_once('>')
            .ok_or_else(|| malformed(line, "transition", &body))?;
        let condition = TransitionCondition::from_token(token).ok_or_else(|| {
            LoadError::UnknownCondition {
                line,
                token: token.trim().to_string(),
            }
        })?;
        let target = target.trim();
        if target.is_empty() {
            return Err(malformed(line, "transition", &body));
        }
        return Ok(Some(Parsed::Transition {
            condition,
            target: target.to_string(),
        }));
    }

    if let Some(rest) = strip_any(head, &["跳到", "跳至", "jump"]) {
        option_param(line, params, &[])?;
        let target = rest.trim();
        return match target.strip_prefix('#').map(str::trim) {
            Some(name) if !name.is_empty() => Ok(Some(Parsed::Jump(name.to_string()))),
            _ => Err(malformed(line, "jump target", rest)),
        };
    }
    if let Some(rest) = strip_any(head, &["延遲", "延迟", "delay"]) {
        option_param(line, params, &[])?;
        return Ok(Some(Parsed::Delay(duration(line, rest, "delay")?)));
    }
    Ok(None)
}

fn resolve_plain(line: usize, head: &str, params: &[String]) -> Result<Option<InstructionKind>> {
    if let Some(rest) = strip_any(head, &["停止", "stop"]) {
        no_operand(line, rest)?;
        option_param(line, params, &[])?;
        return Ok(Some(InstructionKind::Stop));
    }

    // Text recognition.
    if let Some(rest) = strip_any(head, &["等待文字", "wait-text"]) {
        let text = operand(line, rest, "text")?;
        let timeout_ms = match option_param(line, params, &["最長", "最长", "max", "timeout"])? {
            Some(value) => Some(duration(line, value, "timeout")?),
            None => None,
        };
        return Ok(Some(InstructionKind::OcrWaitText { text, timeout_ms }));
    }
    if let Some(rest) = strip_any(head, &["if文字", "如果文字", "if-text"]) {
        option_param(line, params, &[])?;
        let text = operand(line, rest, "text")?;
        return Ok(Some(InstructionKind::OcrCheckText { text }));
    }
    if let Some(rest) = strip_any(head, &["點擊文字", "点击文字", "click-text"]) {
        option_param(line, params, &[])?;
        let text = operand(line, rest, "text")?;
        return Ok(Some(InstructionKind::OcrClickText { text }));
    }

    // Images.
    if let Some(rest) = strip_any(head, &["辨識任一", "识别任一", "locate-any"]) {
        option_param(line, params, &[])?;
        let list = operand(line, rest, "image list")?;
        let images: Vec<String> = list
            .split(['|', '、'])
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        if images.is_empty() {
            return Err(malformed(line, "image list", rest));
        }
        return Ok(Some(InstructionKind::ImageLocateAny { images }));
    }
    if let Some(rest) = strip_any(head, &["如果存在", "辨識", "识别", "if", "locate"]) {
        option_param(line, params, &[])?;
        let image = operand(line, rest, "image name")?;
        return Ok(Some(InstructionKind::ImageLocate { image }));
    }

    // Pointer.
    if let Some(rest) = strip_any(head, &["移動至", "移动至", "move"]) {
        option_param(line, params, &[])?;
        if rest.starts_with('>') {
            let image = operand(line, rest, "image name")?;
            return Ok(Some(InstructionKind::ImageMoveTo { image }));
        }
        return Ok(Some(InstructionKind::MouseMove {
            at: point(line, rest)?,
        }));
    }
    let clicks: [(&[&str], Click); 4] = [
        (&["左鍵點擊", "左键点击", "click"], Click::Left),
        (&["右鍵點擊", "右键点击", "rclick"], Click::Right),
        (&["中鍵點擊", "中键点击", "mclick"], Click::Middle),
        (&["雙擊", "双击", "dclick"], Click::Double),
    ];
    for (keywords, click) in clicks {
        if let Some(rest) = strip_any(head, keywords) {
            option_param(line, params, &[])?;
            if rest.starts_with('>') {
                let button = click
                    .button()
                    .ok_or_else(|| malformed(line, "coordinate", rest))?;
                let image = operand(line, rest, "image name")?;
                return Ok(Some(InstructionKind::ImageClick { image, button }));
            }
            return Ok(Some(InstructionKind::MouseClick {
                at: point(line, rest)?,
                click,
            }));
        }
    }
    if let Some((down, at, button)) = mouse_button_action(line, head)? {
        option_param(line, params, &[])?;
        return Ok(Some(if down {
            InstructionKind::MouseDown { at, button }
        } else {
            InstructionKind::MouseUp { at, button }
        }));
    }
    if let Some(rest) = strip_any(head, &["滾輪", "滚轮", "scroll"]) {
        option_param(line, params, &[])?;
        return match parse_tuple(rest).as_deref() {
            Some([x, y, delta]) => Ok(Some(InstructionKind::Scroll {
                at: Point::new(*x, *y),
                delta: *delta,
            })),
            _ => Err(malformed(line, "scroll operands", rest)),
        };
    }

    // Keyboard.
    let keys: [(&[&str], fn(String) -> InstructionKind); 3] = [
        (&["按下", "keydown"], |key| InstructionKind::KeyDown { key }),
        (&["放開", "放开", "keyup"], |key| InstructionKind::KeyUp { key }),
        (&["按鍵", "按键", "按", "press"], |key| InstructionKind::KeyPress { key }),
    ];
    for (keywords, build) in keys {
        if let Some(rest) = strip_any(head, keywords) {
            option_param(line, params, &[])?;
            let key = rest.trim();
            if key.is_empty() || key.contains(['(', ')']) {
                return Err(malformed(line, "key", head));
            }
            return Ok(Some(build(key.to_string())));
        }
    }
    Ok(None)
}

/// `按下左鍵(x,y)`, `按下left鍵(x,y)`, `左鍵放開(x,y)`, `mousedown right(x,y)`; returns (is_down, point, button).
fn mouse_button_action(line: usize, head: &str) -> Result<Option<(bool, Point, MouseButton)>> {
    // 按下<btn>鍵(x,y)
    for (verb, down) in PRESS_VERBS {
        let Some(rest) = head.strip_prefix(verb) else {
            continue;
        };
        if let Some((name, coordinates)) = rest.split_once(['鍵', '键']) {
            if let Some(button) = MouseButton::from_name(name) {
                return Ok(Some((down, point(line, coordinates)?, button)));
            }
        }
    }
    // <btn>鍵按下(x,y)
    if let Some((name, rest)) = head.split_once(['鍵', '键']) {
        if let Some(button) = MouseButton::from_name(name) {
            for (verb, down) in PRESS_VERBS {
                if let Some(coordinates) = rest.strip_prefix(verb) {
                    return Ok(Some((down, point(line, coordinates)?, button)));
                }
            }
        }
    }
    for (keyword, down) in [("mousedown", true), ("mouseup", false)] {
        if let Some(rest) = strip_keyword(head, keyword) {
            let rest = rest.trim();
            let (name, coordinates) = match rest.find('(') {
                Some(split) => rest.split_at(split),
                None => return Err(malformed(line, "coordinate", rest)),
            };
            let button = if name.trim().is_empty() {
                MouseButton::Left
            } else {
                MouseButton::from_name(name).ok_or_else(|| malformed(line, "mouse button", name))?
            };
            return Ok(Some((down, point(line, coordinates)?, button)));
        }
    }
    Ok(None)
}
