use std::cmp::Reverse;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::capability::Capabilities;
use crate::config::{ConfigError, EngineConfig};
use crate::script::Program;

use super::cursor::{Cursor, Env, Ledger, Step};
use super::machine::MachineRun;
use super::report::{Fault, Origin, RunReport, RunStatus, SessionId};
use super::trigger::Watcher;

/// Handle for stopping or pausing a session from another task or thread.
#[derive(Debug, Clone, Default)]
pub struct SessionControl {
    inner: Arc<ControlState>,
}

#[derive(Debug, Default)]
struct ControlState {
    stopped: AtomicBool,
    paused: AtomicBool,
    notify: Notify,
}

impl SessionControl {
    /// Create a fresh control handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the run. Every cursor stops at its next scheduling point.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Freeze the logical clock until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Continue after a pause.
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Whether the session is paused.
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Wait for the next stop, pause or resume request.
    pub async fn changed(&self) {
        self.inner.notify.notified().await;
    }
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing more to do before `next_wake_ms` (logical time).
    Pending {
        /// Earliest logical time at which a cursor or trigger needs service.
        next_wake_ms: u64,
    },
    /// The session is paused; logical time must not advance.
    Paused,
    /// The run ended.
    Finished(RunReport),
}

/// What currently owns the primary cursor.
#[derive(Debug)]
enum Frame {
    Main(Cursor),
    Machine(MachineRun),
    /// Preempting priority body; the frame below resumes where it stopped.
    Priority { watcher: usize, cursor: Cursor },
}

#[derive(Debug)]
struct ThreadRun {
    block: usize,
    thread: usize,
    cursor: Cursor,
}

/// One execution of a program.
///
/// A session owns every cursor, trigger and state machine of the run and is
/// driven by repeated calls to [`tick`](Self::tick) with a monotonically
/// increasing logical time. The drivers in [`super::driver`] supply that
/// time from a virtual or a real clock.
pub struct Session {
    id: SessionId,
    env: Env,
    control: SessionControl,
    started_at: DateTime<Utc>,
    started: bool,
    frames: Vec<Frame>,
    threads: Vec<ThreadRun>,
    /// Watchers in scheduling order: priority, condition, timer.
    watchers: Vec<Watcher>,
    priority_queue: VecDeque<usize>,
    /// Parallel block the main script is joining on.
    join: Option<usize>,
    rounds: u32,
    faults: Vec<Fault>,
    report: Option<RunReport>,
}

impl Session {
    /// Prepare a run; nothing executes until the first tick.
    pub fn new(
        program: impl Into<Arc<Program>>,
        caps: Capabilities,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let program = program.into();
        let ledger = Ledger::new(&program, config.record_trace);

        let mut watchers: Vec<Watcher> = (0..program.triggers.len())
            .map(|trigger| Watcher::arm(&program, trigger, &caps))
            .collect();
        watchers.sort_by_key(|watcher| Reverse(watcher.rank()));

        let main = Cursor::new(Origin::Main, 0, program.len(), 0);
        Ok(Self {
            id: SessionId::new(),
            env: Env {
                program,
                caps,
                config,
                ledger,
                now: 0,
            },
            control: SessionControl::new(),
            started_at: Utc::now(),
            started: false,
            frames: vec![Frame::Main(main)],
            threads: Vec::new(),
            watchers,
            priority_queue: VecDeque::new(),
            join: None,
            rounds: 1,
            faults: Vec::new(),
            report: None,
        })
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Control handle shared with this session.
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Program being run.
    pub fn program(&self) -> &Program {
        &self.env.program
    }

    /// Current logical time.
    pub fn now(&self) -> u64 {
        self.env.now
    }

    /// Advance the run to logical time `now_ms`.
    ///
    /// Due triggers are polled first (priority, then condition, then timer),
    /// then every cursor runs until it blocks. Calling `tick` again after the
    /// run finished returns the same report.
    pub fn tick(&mut self, now_ms: u64) -> TickOutcome {
        if let Some(report) = &self.report {
            return TickOutcome::Finished(report.clone());
        }
        // A paused tick leaves the logical clock where it was.
        if self.control.is_paused() && !self.control.is_stopped() {
            return TickOutcome::Paused;
        }
        self.env.now = self.env.now.max(now_ms);
        if !self.started {
            self.started = true;
            tracing::info!(
                session = %self.id,
                program = %self.env.program.name,
                triggers = self.watchers.len(),
                "run started"
            );
        }

        if self.control.is_stopped() {
            return self.finish(RunStatus::Aborted);
        }
        if let Some(limit) = self.env.config.playback.time_limit_ms {
            if self.env.now >= limit {
                return self.finish(RunStatus::TimeLimitReached);
            }
        }

        self.poll_triggers();
        if let ControlFlow::Break(status) = self.settle() {
            return self.finish(status);
        }
        TickOutcome::Pending {
            next_wake_ms: self.next_wake(),
        }
    }

    fn poll_triggers(&mut self) {
        let now = self.env.now;
        for index in 0..self.watchers.len() {
            if !self.watchers[index].is_due(now) || !self.watchers[index].poll(&self.env) {
                continue;
            }
            if self.watchers[index].preempts() {
                self.preempt(index);
            } else {
                let body = self.watchers[index].body_cursor(&self.env.program, now);
                self.watchers[index].body = Some(body);
            }
        }
    }

    fn preempt(&mut self, watcher: usize) {
        if matches!(self.frames.last(), Some(Frame::Priority { .. })) {
            tracing::info!(trigger = self.watchers[watcher].trigger, "priority body running, firing queued");
            self.priority_queue.push_back(watcher);
            return;
        }
        let cursor = self.watchers[watcher].body_cursor(&self.env.program, self.env.now);
        self.frames.push(Frame::Priority { watcher, cursor });
    }

    /// Run every cursor until none can make progress at the current time.
    fn settle(&mut self) -> ControlFlow<RunStatus> {
        loop {
            let executed = self.env.ledger.executed;
            let mut changed = self.step_primary()?;
            changed |= self.step_trigger_bodies()?;
            changed |= self.step_threads()?;
            if !changed && self.env.ledger.executed == executed {
                return ControlFlow::Continue(());
            }
        }
    }

    fn step_primary(&mut self) -> ControlFlow<RunStatus, bool> {
        let now = self.env.now;
        let mut changed = false;
        let mut transitions = 0u32;
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return ControlFlow::Continue(changed);
            };
            match frame {
                Frame::Main(cursor) => {
                    if self.join.is_some() {
                        return ControlFlow::Continue(changed);
                    }
                    match cursor.advance(&mut self.env) {
                        Step::Continue | Step::Blocked => return ControlFlow::Continue(changed),
                        Step::Finished => self.end_round()?,
                        Step::EnterParallel { block } => self.spawn_threads(block),
                        Step::EnterMachine { machine } => {
                            let run = MachineRun::enter(&self.env.program, machine, now);
                            self.frames.push(Frame::Machine(run));
                        }
                        Step::Stop { line } => return ControlFlow::Break(stopped(line)),
                        Step::Fault { line, reason } => {
                            tracing::warn!(line, %reason, "input failed on the main script");
                            return ControlFlow::Break(RunStatus::Faulted { line, reason });
                        }
                    }
                }
                Frame::Machine(run) => match run.cursor.advance(&mut self.env) {
                    Step::Continue
                    | Step::Blocked
                    | Step::EnterParallel { .. }
                    | Step::EnterMachine { .. } => return ControlFlow::Continue(changed),
                    Step::Finished => match run.next_state(&self.env.program) {
                        Some(target) => {
                            run.transition(&self.env.program, target, now);
                            transitions += 1;
                            if transitions >= self.env.config.max_steps_per_tick {
                                tracing::warn!("state transitions without a delay, yielding 1 ms");
                                run.cursor.ready_at = now + 1;
                            }
                        }
                        None => {
                            let machine = &self.env.program.machines[run.machine];
                            tracing::info!(
                                machine = %machine.name,
                                state = %machine.states[run.state].name,
                                "no transition matched, state machine halts"
                            );
                            self.frames.pop();
                        }
                    },
                    Step::Stop { line } => return ControlFlow::Break(stopped(line)),
                    Step::Fault { line, reason } => {
                        tracing::warn!(line, %reason, "input failed in a state body");
                        return ControlFlow::Break(RunStatus::Faulted { line, reason });
                    }
                },
                Frame::Priority { watcher, cursor } => {
                    let watcher = *watcher;
                    let origin = cursor.origin;
                    match cursor.advance(&mut self.env) {
                        Step::Continue
                        | Step::Blocked
                        | Step::EnterParallel { .. }
                        | Step::EnterMachine { .. } => return ControlFlow::Continue(changed),
                        Step::Finished => {
                            self.frames.pop();
                            self.release_priority(watcher);
                        }
                        Step::Fault { line, reason } => {
                            self.contain(origin, line, reason);
                            self.frames.pop();
                            self.release_priority(watcher);
                        }
                        Step::Stop { line } => return ControlFlow::Break(stopped(line)),
                    }
                }
            }
            changed = true;
        }
    }

    /// A priority body ended: the frame below resumes, or the next queued firing starts.
    fn release_priority(&mut self, watcher: usize) {
        let now = self.env.now;
        self.watchers[watcher].settle(&self.env.config, now);
        match self.priority_queue.pop_front() {
            Some(next) => {
                let cursor = self.watchers[next].body_cursor(&self.env.program, now);
                self.frames.push(Frame::Priority {
                    watcher: next,
                    cursor,
                });
            }
            None => tracing::debug!(trigger = self.watchers[watcher].trigger, at_ms = now, "preempted cursor resumes"),
        }
    }

    fn end_round(&mut self) -> ControlFlow<RunStatus> {
        let playback = &self.env.config.playback;
        if !playback.repeat.continues_after(self.rounds) {
            return ControlFlow::Break(RunStatus::Completed);
        }
        let start = self.env.now.saturating_add(playback.repeat_interval_ms);
        self.rounds += 1;
        self.env.ledger.reset_quotas(&self.env.program);
        self.env.ledger.round_start = start;
        self.frames = vec![Frame::Main(Cursor::new(
            Origin::Main,
            0,
            self.env.program.len(),
            start,
        ))];
        tracing::info!(round = self.rounds, start_ms = start, "round started");
        ControlFlow::Continue(())
    }

    fn spawn_threads(&mut self, block: usize) {
        let now = self.env.now;
        let parallel = &self.env.program.parallels[block];
        for (thread, span) in parallel.threads.iter().enumerate() {
            tracing::info!(thread = %span.name, at_ms = now, "thread started");
            self.threads.push(ThreadRun {
                block,
                thread,
                cursor: Cursor::new(
                    Origin::Thread { block, thread },
                    span.begin + 1,
                    span.end,
                    now,
                ),
            });
        }
        self.join = Some(block);
    }

    fn step_trigger_bodies(&mut self) -> ControlFlow<RunStatus, bool> {
        let now = self.env.now;
        let mut changed = false;
        for index in 0..self.watchers.len() {
            let Some(body) = self.watchers[index].body.as_mut() else {
                continue;
            };
            let origin = body.origin;
            match body.advance(&mut self.env) {
                Step::Finished => {
                    self.watchers[index].settle(&self.env.config, now);
                    changed = true;
                }
                Step::Fault { line, reason } => {
                    self.contain(origin, line, reason);
                    self.watchers[index].settle(&self.env.config, now);
                    changed = true;
                }
                Step::Stop { line } => return ControlFlow::Break(stopped(line)),
                Step::Continue | Step::Blocked | Step::EnterParallel { .. } | Step::EnterMachine { .. } => {}
            }
        }
        ControlFlow::Continue(changed)
    }

    fn step_threads(&mut self) -> ControlFlow<RunStatus, bool> {
        let mut changed = false;
        let mut index = 0;
        while index < self.threads.len() {
            let run = &mut self.threads[index];
            let origin = run.cursor.origin;
            match run.cursor.advance(&mut self.env) {
                Step::Finished => {
                    let run = self.threads.remove(index);
                    let name = &self.env.program.parallels[run.block].threads[run.thread].name;
                    tracing::info!(thread = %name, at_ms = self.env.now, "thread finished");
                    changed = true;
                    continue;
                }
                Step::Fault { line, reason } => {
                    self.contain(origin, line, reason);
                    self.threads.remove(index);
                    changed = true;
                    continue;
                }
                Step::Stop { line } => return ControlFlow::Break(stopped(line)),
                Step::Continue | Step::Blocked | Step::EnterParallel { .. } | Step::EnterMachine { .. } => {}
            }
            index += 1;
        }

        if let Some(block) = self.join {
            if !self.threads.iter().any(|run| run.block == block) {
                tracing::info!(block, at_ms = self.env.now, "parallel block joined");
                self.join = None;
                changed = true;
            }
        }
        ControlFlow::Continue(changed)
    }

    fn contain(&mut self, origin: Origin, line: usize, reason: String) {
        tracing::warn!(%origin, line, %reason, "fault contained");
        self.faults.push(Fault {
            origin,
            line,
            at_ms: self.env.now,
            reason,
        });
    }

    fn next_wake(&self) -> u64 {
        let now = self.env.now;
        let primary = match self.frames.last() {
            Some(Frame::Main(cursor)) if self.join.is_none() => Some(cursor.ready_at),
            Some(Frame::Main(_)) | None => None,
            Some(Frame::Machine(run)) => Some(run.cursor.ready_at),
            Some(Frame::Priority { cursor, .. }) => Some(cursor.ready_at),
        };
        let wake = primary
            .into_iter()
            .chain(self.threads.iter().map(|run| run.cursor.ready_at))
            .chain(self.watchers.iter().filter_map(Watcher::next_wake))
            .min()
            .unwrap_or(now + 1)
            .max(now + 1);
        match self.env.config.playback.time_limit_ms {
            Some(limit) => wake.min(limit.max(now + 1)),
            None => wake,
        }
    }

    fn finish(&mut self, status: RunStatus) -> TickOutcome {
        self.release_held_keys();
        self.frames.clear();
        self.threads.clear();
        self.priority_queue.clear();
        for watcher in &mut self.watchers {
            watcher.body = None;
        }

        let report = RunReport {
            session: self.id,
            program: self.env.program.name.clone(),
            fingerprint: self.env.program.fingerprint.clone(),
            started_at: self.started_at,
            status,
            elapsed_ms: self.env.now,
            rounds: self.rounds,
            instructions_executed: self.env.ledger.executed,
            faults: std::mem::take(&mut self.faults),
            drift_warnings: self.env.ledger.drift_warnings,
            trace: self.env.ledger.trace.take(),
        };
        tracing::info!(
            session = %self.id,
            status = ?report.status,
            elapsed_ms = report.elapsed_ms,
            rounds = report.rounds,
            faults = report.faults.len(),
            "run finished"
        );
        self.report = Some(report.clone());
        TickOutcome::Finished(report)
    }

    fn release_held_keys(&mut self) {
        for key in std::mem::take(&mut self.env.ledger.held_keys) {
            match self.env.caps.input().key_up(&key) {
                Ok(()) => tracing::debug!(key = %key, "released held key"),
                Err(err) => tracing::warn!(key = %key, error = %err, "failed to release held key"),
            }
        }
    }
}

fn stopped(line: usize) -> RunStatus {
    tracing::info!(line, "stop instruction");
    RunStatus::Stopped
}
