use std::collections::BTreeSet;
use std::sync::Arc;

use crate::capability::{Capabilities, CapabilityError, MouseButton, Point};
use crate::config::EngineConfig;
use crate::script::{InstructionKind, Program};

use super::report::{Origin, TraceEntry};

/// State shared by every cursor of a session.
pub(crate) struct Env {
    pub program: Arc<Program>,
    pub caps: Capabilities,
    pub config: EngineConfig,
    pub ledger: Ledger,
    /// Current logical time.
    pub now: u64,
}

/// Per-run mutable bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    /// Remaining jumps per label; `None` is unlimited.
    quotas: Vec<Option<u32>>,
    /// Keys pressed with key-down and not yet released.
    pub held_keys: BTreeSet<String>,
    pub executed: u64,
    pub drift_warnings: u64,
    pub trace: Option<Vec<TraceEntry>>,
    /// Logical time the current round started.
    pub round_start: u64,
}

impl Ledger {
    pub fn new(program: &Program, record_trace: bool) -> Self {
        let mut ledger = Self {
            trace: record_trace.then(Vec::new),
            ..Self::default()
        };
        ledger.reset_quotas(program);
        ledger
    }

    pub fn reset_quotas(&mut self, program: &Program) {
        self.quotas = program.labels.iter().map(|label| label.quota).collect();
    }

    /// Consume one jump to `label`; false once the quota is spent.
    pub fn take_quota(&mut self, label: usize) -> bool {
        match self.quotas.get_mut(label) {
            Some(Some(0)) => false,
            Some(Some(remaining)) => {
                *remaining -= 1;
                true
            }
            Some(None) => true,
            None => false,
        }
    }

    fn record(&mut self, at_ms: u64, line: usize, origin: Origin) {
        self.executed += 1;
        if let Some(trace) = self.trace.as_mut() {
            trace.push(TraceEntry {
                at_ms,
                line,
                origin,
            });
        }
    }
}

/// Result of running a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    /// Instruction done; the cursor may keep going.
    Continue,
    /// Waiting until `ready_at`.
    Blocked,
    /// Reached the end of its span.
    Finished,
    /// `停止`.
    Stop { line: usize },
    /// Main script reached a parallel block; the cursor now sits on its join point.
    EnterParallel { block: usize },
    /// Main script reached a state machine; the cursor now sits on its end marker.
    EnterMachine { machine: usize },
    /// Input injection failed.
    Fault { line: usize, reason: String },
}

/// Sequential instruction pointer over one span of the program.
#[derive(Debug, Clone)]
pub(crate) struct Cursor {
    pub origin: Origin,
    pub pc: usize,
    end: usize,
    /// Logical time the next instruction may start.
    pub ready_at: u64,
    /// Outcome of the most recent conditional.
    pub last_outcome: Option<bool>,
    /// Deadline of the perception wait in progress.
    wait_deadline: Option<u64>,
}

enum Sight {
    Found(Option<Point>),
    Absent,
    Unavailable,
}

#[derive(Clone, Copy)]
enum OnFound {
    Nothing,
    Move,
    Click(MouseButton),
}

impl Cursor {
    /// Cursor over `start..end`, first instruction at `ready_at`.
    pub fn new(origin: Origin, start: usize, end: usize, ready_at: u64) -> Self {
        Self {
            origin,
            pc: start,
            end,
            ready_at,
            last_outcome: None,
            wait_deadline: None,
        }
    }

    /// Run until the cursor blocks, finishes or raises an event.
    pub fn advance(&mut self, env: &mut Env) -> Step {
        let budget = env.config.max_steps_per_tick;
        let mut steps = 0u32;
        loop {
            if self.ready_at > env.now {
                return Step::Blocked;
            }
            if self.pc >= self.end {
                return Step::Finished;
            }
            if steps >= budget {
                tracing::warn!(
                    origin = %self.origin,
                    line = env.program.line_of(self.pc).unwrap_or_default(),
                    "step budget exhausted without a delay, yielding 1 ms"
                );
                self.ready_at = env.now + 1;
                return Step::Blocked;
            }
            steps += 1;
            match self.step(env) {
                Step::Continue => continue,
                other => return other,
            }
        }
    }

    fn complete(&mut self, now: u64, delay: u64) -> Step {
        self.pc += 1;
        self.ready_at = now.saturating_add(delay);
        Step::Continue
    }

    fn step(&mut self, env: &mut Env) -> Step {
        let program = Arc::clone(&env.program);
        let instruction = &program.instructions[self.pc];
        let line = instruction.line;
        let now = env.now;
        let delay = env.config.playback.scale(instruction.delay_ms);

        if self.wait_deadline.is_none() {
            env.ledger.record(now, line, self.origin);
            tracing::debug!(origin = %self.origin, line, at_ms = now, "execute {:?}", instruction.kind);
            if let (Origin::Main, Some(stamp)) = (self.origin, instruction.timestamp_ms) {
                let expected = env.ledger.round_start.saturating_add(env.config.playback.scale(stamp));
                let drift = now.abs_diff(expected);
                if drift > env.config.drift_warning_ms {
                    tracing::warn!(line, drift_ms = drift, "timestamp drift");
                    env.ledger.drift_warnings += 1;
                }
            }
        }

        let input = env.caps.input();
        let effect = match &instruction.kind {
            InstructionKind::KeyPress { key } => input.press_key(key),
            InstructionKind::KeyDown { key } => {
                let result = input.key_down(key);
                if result.is_ok() {
                    env.ledger.held_keys.insert(key.clone());
                }
                result
            }
            InstructionKind::KeyUp { key } => {
                let result = input.key_up(key);
                env.ledger.held_keys.remove(key);
                result
            }
            InstructionKind::MouseMove { at } => input.move_mouse(*at),
            InstructionKind::MouseClick { at, click } => match click.button() {
                Some(button) => input.click(*at, button),
                None => input.double_click(*at),
            },
            InstructionKind::MouseDown { at, button } => input.mouse_down(*at, *button),
            InstructionKind::MouseUp { at, button } => input.mouse_up(*at, *button),
            InstructionKind::Scroll { at, delta } => input.scroll(*at, *delta),

            InstructionKind::ImageLocate { image } => {
                let sight = look_for_image(&env.caps, image);
                let timeout = env.config.vision_timeout_ms;
                return self.settle(env, line, sight, timeout, delay, OnFound::Nothing);
            }
            InstructionKind::ImageMoveTo { image } => {
                let sight = look_for_image(&env.caps, image);
                let timeout = env.config.vision_timeout_ms;
                return self.settle(env, line, sight, timeout, delay, OnFound::Move);
            }
            InstructionKind::ImageClick { image, button } => {
                let sight = look_for_image(&env.caps, image);
                let timeout = env.config.vision_timeout_ms;
                return self.settle(env, line, sight, timeout, delay, OnFound::Click(*button));
            }
            InstructionKind::ImageLocateAny { images } => {
                let sight = look_for_any(&env.caps, images);
                let timeout = env.config.vision_timeout_ms;
                return self.settle(env, line, sight, timeout, delay, OnFound::Nothing);
            }
            InstructionKind::OcrCheckText { text } => {
                let sight = look_for_text(&env.caps, text, false);
                let timeout = env.config.text_check_timeout_ms;
                return self.settle(env, line, sight, timeout, delay, OnFound::Nothing);
            }
            InstructionKind::OcrWaitText { text, timeout_ms } => {
                let sight = look_for_text(&env.caps, text, false);
                let timeout = timeout_ms.unwrap_or(env.config.text_wait_timeout_ms);
                return self.settle(env, line, sight, timeout, delay, OnFound::Nothing);
            }
            InstructionKind::OcrClickText { text } => {
                let sight = look_for_text(&env.caps, text, true);
                let timeout = env.config.text_check_timeout_ms;
                return self.settle(env, line, sight, timeout, delay, OnFound::Click(MouseButton::Left));
            }

            InstructionKind::Jump { label } => {
                if env.ledger.take_quota(*label) {
                    self.pc = program.labels[*label].index;
                    self.ready_at = now.saturating_add(delay);
                    return Step::Continue;
                }
                tracing::debug!(line, label = %program.labels[*label].name, "label quota spent, falling through");
                Ok(())
            }
            InstructionKind::BranchSuccess { label } => {
                return self.branch(env, &program, self.last_outcome == Some(true), *label);
            }
            InstructionKind::BranchFailure { label } => {
                return self.branch(env, &program, self.last_outcome == Some(false), *label);
            }
            InstructionKind::Stop => return Step::Stop { line },

            InstructionKind::TimerTriggerBegin { trigger }
            | InstructionKind::ConditionTriggerBegin { trigger }
            | InstructionKind::PriorityTriggerBegin { trigger } => {
                // Trigger bodies run on their own cursors.
                self.pc = program.triggers[*trigger].end + 1;
                self.ready_at = now.saturating_add(delay);
                return Step::Continue;
            }
            InstructionKind::ParallelBegin { block } => {
                if self.origin != Origin::Main {
                    return misplaced_block(line);
                }
                self.pc = program.parallels[*block].end;
                self.ready_at = now.saturating_add(delay);
                return Step::EnterParallel { block: *block };
            }
            InstructionKind::StateMachineBegin { machine } => {
                if self.origin != Origin::Main {
                    return misplaced_block(line);
                }
                self.pc = program.machines[*machine].end;
                self.ready_at = now.saturating_add(delay);
                return Step::EnterMachine { machine: *machine };
            }

            InstructionKind::Delay
            | InstructionKind::LabelDef { .. }
            | InstructionKind::ThreadBegin { .. }
            | InstructionKind::ThreadEnd { .. }
            | InstructionKind::ParallelEnd { .. }
            | InstructionKind::TimerTriggerEnd { .. }
            | InstructionKind::ConditionTriggerEnd { .. }
            | InstructionKind::PriorityTriggerEnd { .. }
            | InstructionKind::StateDef { .. }
            | InstructionKind::StateTransition { .. }
            | InstructionKind::StateMachineEnd { .. } => Ok(()),
        };

        match effect {
            Ok(()) => self.complete(now, delay),
            Err(CapabilityError::Unavailable(reason)) => {
                tracing::warn!(origin = %self.origin, line, %reason, "input capability unavailable, skipping");
                self.complete(now, delay)
            }
            Err(err) => Step::Fault {
                line,
                reason: err.to_string(),
            },
        }
    }

    fn branch(&mut self, env: &mut Env, program: &Program, matched: bool, label: Option<usize>) -> Step {
        if let (true, Some(label)) = (matched, label) {
            if env.ledger.take_quota(label) {
                self.pc = program.labels[label].index;
                self.ready_at = env.now;
                return Step::Continue;
            }
        }
        self.complete(env.now, 0)
    }

    fn settle(
        &mut self,
        env: &mut Env,
        line: usize,
        sight: Sight,
        timeout_ms: u64,
        delay: u64,
        on_found: OnFound,
    ) -> Step {
        let now = env.now;
        match sight {
            Sight::Found(at) => {
                self.wait_deadline = None;
                let effect = match (on_found, at) {
                    (OnFound::Move, Some(at)) => env.caps.input().move_mouse(at),
                    (OnFound::Click(button), Some(at)) => env.caps.input().click(at, button),
                    _ => Ok(()),
                };
                match effect {
                    Ok(()) => {}
                    Err(CapabilityError::Unavailable(reason)) => {
                        tracing::warn!(origin = %self.origin, line, %reason, "input capability unavailable, skipping");
                    }
                    Err(err) => {
                        return Step::Fault {
                            line,
                            reason: err.to_string(),
                        };
                    }
                }
                self.last_outcome = Some(true);
                self.complete(now, delay)
            }
            Sight::Absent => {
                let deadline = *self.wait_deadline.get_or_insert(now.saturating_add(timeout_ms));
                if now < deadline {
                    self.ready_at = now.saturating_add(env.config.wait_poll_ms).min(deadline);
                    return Step::Blocked;
                }
                self.wait_deadline = None;
                self.last_outcome = Some(false);
                self.complete(now, delay)
            }
            Sight::Unavailable => {
                self.wait_deadline = None;
                self.last_outcome = Some(false);
                self.complete(now, delay)
            }
        }
    }
}

fn misplaced_block(line: usize) -> Step {
    Step::Fault {
        line,
        reason: "block can only start from the main script".to_string(),
    }
}

fn look_for_image(caps: &Capabilities, image: &str) -> Sight {
    let Some(vision) = caps.vision() else {
        tracing::warn!(image, "no vision provider, image treated as not found");
        return Sight::Unavailable;
    };
    match vision.locate_image(image, None) {
        Ok(Some(rect)) => Sight::Found(Some(rect.center())),
        Ok(None) => Sight::Absent,
        Err(err) => {
            tracing::warn!(image, error = %err, "image lookup failed");
            Sight::Unavailable
        }
    }
}

fn look_for_any(caps: &Capabilities, images: &[String]) -> Sight {
    let Some(vision) = caps.vision() else {
        tracing::warn!(?images, "no vision provider, images treated as not found");
        return Sight::Unavailable;
    };
    match vision.locate_any(images) {
        Ok(Some((name, rect))) => {
            tracing::debug!(image = %name, "matched");
            Sight::Found(Some(rect.center()))
        }
        Ok(None) => Sight::Absent,
        Err(err) => {
            tracing::warn!(?images, error = %err, "image lookup failed");
            Sight::Unavailable
        }
    }
}

fn look_for_text(caps: &Capabilities, text: &str, locate: bool) -> Sight {
    let Some(recognizer) = caps.text() else {
        tracing::debug!(text, "no text recognizer, skipping");
        return Sight::Unavailable;
    };
    let result = if locate {
        recognizer.locate(text).map(|at| match at {
            Some(at) => Sight::Found(Some(at)),
            None => Sight::Absent,
        })
    } else {
        recognizer
            .contains(text)
            .map(|found| if found { Sight::Found(None) } else { Sight::Absent })
    };
    match result {
        Ok(sight) => sight,
        Err(CapabilityError::Unavailable(reason)) => {
            tracing::debug!(text, %reason, "text recognition unavailable, skipping");
            Sight::Unavailable
        }
        Err(err) => {
            tracing::warn!(text, error = %err, "text recognition failed");
            Sight::Unavailable
        }
    }
}
