//! Execution of loaded programs.
//!
//! A [`Session`] multiplexes every execution context of a run on one
//! deterministic tick function:
//!
//! - the primary cursor, owned in turn by the main script, the active state
//!   machine, or a preempting priority body;
//! - one cursor per thread of the parallel block being joined;
//! - one watcher per trigger, with its own cursor while a timer or condition
//!   body runs.
//!
//! The drivers feed the session a logical clock: [`run`] jumps straight to
//! the next wake-up, [`run_realtime`] follows the wall clock on tokio.

mod cursor;
/// Clock drivers for sessions.
pub mod driver;
mod machine;
/// Run outcome types.
pub mod report;
/// Session state and the tick loop.
pub mod session;
mod trigger;

pub use driver::{run, run_realtime, run_session};
pub use report::{Fault, Origin, RunReport, RunStatus, SessionId, TraceEntry};
pub use session::{Session, SessionControl, TickOutcome};
