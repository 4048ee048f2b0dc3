//! Async driver that runs a session to completion
//!
//! The runner sleeps through every `arc.wait` suspension and resumes the
//! session afterwards. A watch channel carries cancellation; cancelling
//! during a wait tears the session down at that suspension point.

use std::time::Duration;
use tokio::sync::watch;

use crate::core::error::Result;
use crate::runtime::events::{TriggerEvent, TriggerEventType};
use crate::runtime::session::{ScriptSession, SessionState, StepOutcome};

/// Longest single wait the runner honours
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// How a driven session ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct MacroRunner {
    max_wait: Duration,
}

impl Default for MacroRunner {
    fn default() -> Self {
        Self { max_wait: MAX_WAIT }
    }
}

impl MacroRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Bind (if needed), start and resume `session` until it ends
    pub async fn run(
        &self,
        session: &mut ScriptSession,
        script: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RunOutcome> {
        if session.state() == SessionState::Created {
            session.bind()?;
        }
        session.deliver_event(TriggerEvent::now(
            TriggerEventType::OnMacroStart,
            serde_json::json!({ "macro": session.macro_name() }),
        ))?;

        let mut cancel_open = true;
        let mut outcome = session.start(script)?;
        loop {
            match outcome {
                StepOutcome::Completed => return Ok(RunOutcome::Completed),
                StepOutcome::Failed(message) => return Ok(RunOutcome::Failed(message)),
                StepOutcome::Suspended { wait_seconds } => {
                    let wait = self.wait_duration(wait_seconds);
                    tracing::trace!(session = %session.id(), "Waiting {:?}", wait);

                    if *cancel.borrow_and_update()
                        || sleep_or_cancel(wait, &mut cancel, &mut cancel_open).await
                    {
                        session.cancel();
                        return Ok(RunOutcome::Cancelled);
                    }

                    outcome = session.resume()?;
                }
            }
        }
    }

    fn wait_duration(&self, seconds: f64) -> Duration {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(seconds)
            .unwrap_or(self.max_wait)
            .min(self.max_wait)
    }
}

/// Sleep for `wait`; true when cancellation was requested first
async fn sleep_or_cancel(
    wait: Duration,
    cancel: &mut watch::Receiver<bool>,
    cancel_open: &mut bool,
) -> bool {
    let sleep = tokio::time::sleep(wait);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = cancel.changed(), if *cancel_open => match changed {
                Ok(()) => {
                    if *cancel.borrow_and_update() {
                        return true;
                    }
                }
                // Sender dropped: nobody can cancel any more
                Err(_) => *cancel_open = false,
            },
        }
    }
}
