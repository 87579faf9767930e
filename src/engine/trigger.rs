use crate::capability::Capabilities;
use crate::config::EngineConfig;
use crate::script::{Program, TriggerKind};

use super::cursor::{Cursor, Env};
use super::report::Origin;

/// Armed trigger: polling schedule plus the body in flight, if any.
///
/// Timer and condition bodies run on their own cursor, held here. Priority
/// bodies run on the primary cursor, so only the `busy` flag is kept.
#[derive(Debug)]
pub(crate) struct Watcher {
    pub trigger: usize,
    kind: TriggerKind,
    /// Next poll; `None` when the trigger can never fire.
    next_poll: Option<u64>,
    cooldown_until: u64,
    /// Fired and not yet settled (running, or queued for the primary cursor).
    busy: bool,
    pub body: Option<Cursor>,
}

impl Watcher {
    /// Arm a trigger at run start. Timers fire immediately.
    pub fn arm(program: &Program, trigger: usize, caps: &Capabilities) -> Self {
        let block = &program.triggers[trigger];
        let next_poll = match &block.kind {
            TriggerKind::Timer { .. } => Some(0),
            TriggerKind::Condition { image, .. } | TriggerKind::Priority { image } => {
                if caps.vision().is_some() {
                    Some(0)
                } else {
                    tracing::warn!(
                        line = block.line,
                        image = %image,
                        "no vision provider, {} trigger will never fire",
                        block.kind.label()
                    );
                    None
                }
            }
        };
        Self {
            trigger,
            kind: block.kind.clone(),
            next_poll,
            cooldown_until: 0,
            busy: false,
            body: None,
        }
    }

    pub fn rank(&self) -> u8 {
        self.kind.rank()
    }

    pub fn preempts(&self) -> bool {
        matches!(self.kind, TriggerKind::Priority { .. })
    }

    pub fn is_due(&self, now: u64) -> bool {
        !self.busy && self.next_poll.is_some_and(|at| at <= now)
    }

    /// Check the trigger condition; true when the body should run now.
    pub fn poll(&mut self, env: &Env) -> bool {
        let now = env.now;
        let config = &env.config;
        let (image, cooldown, cadence) = match &self.kind {
            TriggerKind::Timer { .. } => {
                self.fire(now, now);
                return true;
            }
            TriggerKind::Condition { image, cooldown_ms } => (
                image.as_str(),
                cooldown_ms.unwrap_or(config.default_cooldown_ms),
                config.condition_poll_ms,
            ),
            TriggerKind::Priority { image } => {
                (image.as_str(), config.priority_cooldown_ms, config.priority_poll_ms)
            }
        };

        let found = match env.caps.vision().map(|vision| vision.locate_image(image, None)) {
            Some(Ok(found)) => found.is_some(),
            Some(Err(err)) => {
                tracing::warn!(trigger = self.trigger, image, error = %err, "trigger check failed");
                false
            }
            None => false,
        };
        if found {
            self.fire(now, now.saturating_add(cooldown));
            true
        } else {
            self.next_poll = Some(now.saturating_add(cadence));
            false
        }
    }

    fn fire(&mut self, now: u64, cooldown_until: u64) {
        tracing::info!(trigger = self.trigger, kind = self.kind.label(), at_ms = now, "trigger fired");
        self.busy = true;
        self.cooldown_until = cooldown_until;
    }

    /// Cursor over the trigger body.
    pub fn body_cursor(&self, program: &Program, now: u64) -> Cursor {
        let block = &program.triggers[self.trigger];
        Cursor::new(
            Origin::Trigger {
                trigger: self.trigger,
            },
            block.begin + 1,
            block.end,
            now,
        )
    }

    /// The body finished (or faulted); schedule the next poll.
    pub fn settle(&mut self, config: &EngineConfig, now: u64) {
        self.busy = false;
        self.body = None;
        let next = match &self.kind {
            TriggerKind::Timer { interval_ms } => now.saturating_add(*interval_ms),
            TriggerKind::Condition { .. } => now.saturating_add(config.condition_poll_ms).max(self.cooldown_until),
            TriggerKind::Priority { .. } => now.saturating_add(config.priority_poll_ms).max(self.cooldown_until),
        };
        if self.next_poll.is_some() {
            self.next_poll = Some(next);
        }
    }

    /// Earliest time this watcher needs the scheduler.
    pub fn next_wake(&self) -> Option<u64> {
        if self.busy {
            self.body.as_ref().map(|body| body.ready_at)
        } else {
            self.next_poll
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{DryRunInput, PresetVision};
    use crate::engine::cursor::Ledger;
    use crate::script::parse_program;
    use std::sync::Arc;

    fn env(source: &str, caps: Capabilities) -> Env {
        let program = parse_program("t", source).unwrap();
        let ledger = Ledger::new(&program, false);
        Env {
            program: Arc::new(program),
            caps,
            config: EngineConfig::default(),
            ledger,
            now: 0,
        }
    }

    #[test]
    fn timer_fires_at_arm_then_after_interval() {
        let mut env = env(">每隔>30秒\n>按F1\n>每隔結束", Capabilities::new(DryRunInput::new()));
        let mut watcher = Watcher::arm(&env.program, 0, &env.caps);
        assert!(watcher.is_due(0));
        assert!(watcher.poll(&env));
        assert!(!watcher.is_due(0));

        env.now = 40;
        watcher.settle(&env.config, env.now);
        assert_eq!(watcher.next_wake(), Some(30_040));
    }

    #[test]
    fn condition_respects_cooldown() {
        let caps = Capabilities::new(DryRunInput::new()).with_vision(PresetVision::with_images(["boss"]));
        let mut env = env(">when>boss, cooldown 5s\n>按A\n>end-when", caps);
        let mut watcher = Watcher::arm(&env.program, 0, &env.caps);
        assert!(watcher.poll(&env));
        env.now = 10;
        watcher.settle(&env.config, env.now);
        assert_eq!(watcher.next_wake(), Some(5_000));
        assert!(!watcher.is_due(4_999));
        assert!(watcher.is_due(5_000));
    }

    #[test]
    fn condition_polls_at_cadence_while_absent() {
        let caps = Capabilities::new(DryRunInput::new()).with_vision(PresetVision::default());
        let env = env(">條件觸發>boss\n>按A\n>條件結束", caps);
        let mut watcher = Watcher::arm(&env.program, 0, &env.caps);
        assert!(!watcher.poll(&env));
        assert_eq!(watcher.next_wake(), Some(200));
    }

    #[test]
    fn missing_vision_disarms_image_triggers() {
        let env = env(">優先偵測>hp\n>按H\n>優先偵測結束", Capabilities::new(DryRunInput::new()));
        let watcher = Watcher::arm(&env.program, 0, &env.caps);
        assert!(!watcher.is_due(0));
        assert_eq!(watcher.next_wake(), None);
        assert!(watcher.preempts());
    }

    #[test]
    fn body_cursor_spans_the_block() {
        let env = env(">按X\n>每隔>1s\n>按F1\n>按F2\n>每隔結束", Capabilities::new(DryRunInput::new()));
        let watcher = Watcher::arm(&env.program, 0, &env.caps);
        let cursor = watcher.body_cursor(&env.program, 7);
        assert_eq!(cursor.pc, 2);
        assert_eq!(cursor.ready_at, 7);
    }
}
