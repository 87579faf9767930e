use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::capability::Capabilities;
use crate::config::{ConfigError, EngineConfig};
use crate::script::Program;

use super::report::RunReport;
use super::session::{Session, TickOutcome};

/// How often a paused session is re-checked.
const PAUSE_POLL: Duration = Duration::from_millis(10);

/// Run a program to completion on a virtual clock.
///
/// Logical time jumps straight to the next wake-up, so delays cost nothing
/// in wall-clock time. Identical inputs always produce identical runs.
pub fn run(
    program: impl Into<Arc<Program>>,
    caps: Capabilities,
    config: EngineConfig,
) -> Result<RunReport, ConfigError> {
    let session = Session::new(program, caps, config)?;
    Ok(run_session(session))
}

/// Drive an existing session on a virtual clock.
///
/// Use this when a [`super::SessionControl`] must be taken from the session
/// before it starts.
pub fn run_session(mut session: Session) -> RunReport {
    let mut now = session.now();
    loop {
        match session.tick(now) {
            TickOutcome::Pending { next_wake_ms } => now = next_wake_ms,
            TickOutcome::Paused => std::thread::sleep(PAUSE_POLL),
            TickOutcome::Finished(report) => return report,
        }
    }
}

/// Drive a session against the wall clock.
///
/// Logical time is the time elapsed since the first tick minus the time
/// spent paused. Stop and pause requests wake the driver immediately.
pub async fn run_realtime(mut session: Session) -> RunReport {
    let control = session.control();
    let origin = Instant::now();
    let mut paused_total = Duration::ZERO;
    let mut paused_since: Option<Instant> = None;

    loop {
        let wall = Instant::now();
        if let Some(since) = paused_since.take() {
            paused_total += wall - since;
        }
        let logical = (wall - origin).saturating_sub(paused_total);

        match session.tick(logical.as_millis() as u64) {
            TickOutcome::Finished(report) => return report,
            TickOutcome::Paused => {
                paused_since = Some(wall);
                tracing::debug!(at_ms = session.now(), "session paused");
                control.changed().await;
            }
            TickOutcome::Pending { next_wake_ms } => {
                let deadline = origin + paused_total + Duration::from_millis(next_wake_ms);
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = control.changed() => {}
                }
            }
        }
    }
}
