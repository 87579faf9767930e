use crate::script::{Program, StateDef, Transition, TransitionCondition};

use super::cursor::Cursor;
use super::report::Origin;

/// Active state machine on the primary cursor.
#[derive(Debug)]
pub(crate) struct MachineRun {
    pub machine: usize,
    pub state: usize,
    /// Cursor over the current visit of the state body.
    pub cursor: Cursor,
}

impl MachineRun {
    /// Enter a machine at its initial state.
    pub fn enter(program: &Program, machine: usize, now: u64) -> Self {
        let definition = &program.machines[machine];
        tracing::info!(
            machine = %definition.name,
            state = %definition.states[definition.initial].name,
            "state machine entered"
        );
        let state = definition.initial;
        Self {
            machine,
            state,
            cursor: visit(program, machine, state, now),
        }
    }

    /// Pick the next state once the body of the current visit has finished.
    pub fn next_state(&self, program: &Program) -> Option<usize> {
        let state = &program.machines[self.machine].states[self.state];
        select_transition(state, self.cursor.last_outcome).map(|transition| transition.target)
    }

    /// Move to `target`; its body restarts from the first instruction.
    pub fn transition(&mut self, program: &Program, target: usize, now: u64) {
        let definition = &program.machines[self.machine];
        tracing::info!(
            machine = %definition.name,
            from = %definition.states[self.state].name,
            to = %definition.states[target].name,
            at_ms = now,
            "state transition"
        );
        self.state = target;
        self.cursor = visit(program, self.machine, target, now);
    }
}

fn visit(program: &Program, machine: usize, state: usize, now: u64) -> Cursor {
    let definition = &program.machines[machine].states[state];
    Cursor::new(
        Origin::State { machine, state },
        definition.begin + 1,
        definition.end,
        now,
    )
}

/// First matching transition in declaration order, with `default` considered last.
pub(crate) fn select_transition(state: &StateDef, outcome: Option<bool>) -> Option<&Transition> {
    state
        .transitions
        .iter()
        .filter(|transition| transition.condition != TransitionCondition::Default)
        .find(|transition| transition.condition.admits(outcome))
        .or_else(|| {
            state
                .transitions
                .iter()
                .find(|transition| transition.condition == TransitionCondition::Default)
        })
}
