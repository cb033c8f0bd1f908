//! Run context: cancellation and event delivery for one generation run.

use crate::error::{SimError, SimResult};
use crate::events::{EventSink, NullSink, Phase, SimEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative cancellation signal with an optional deadline.
///
/// Clones share the same flag, so any holder can cancel the run. Generation
/// checks the token between developers and between PR clusters.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Creates a token that only fires when cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this token that also fires once `timeout` elapses.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns `Err(Cancelled)` naming `stage` if the token has fired.
    pub fn check(&self, stage: &str) -> SimResult<()> {
        if self.is_cancelled() {
            Err(SimError::cancelled(stage))
        } else {
            Ok(())
        }
    }
}

/// Everything a generation run needs from its caller besides the seed.
#[derive(Clone)]
pub struct RunContext {
    cancel: CancelToken,
    events: Arc<dyn EventSink>,
}

impl RunContext {
    /// Creates a context with the given token and sink.
    pub fn new(cancel: CancelToken, events: Arc<dyn EventSink>) -> Self {
        Self { cancel, events }
    }

    /// Context that never cancels and discards events.
    pub fn detached() -> Self {
        Self::new(CancelToken::new(), Arc::new(NullSink))
    }

    /// The cancellation token.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Checks for cancellation.
    pub fn check(&self, stage: &str) -> SimResult<()> {
        self.cancel.check(stage)
    }

    /// Delivers an event to the sink.
    pub fn emit(&self, event: SimEvent) {
        self.events.emit(&event);
    }

    pub fn phase_start(&self, phase: Phase, message: impl Into<String>) {
        self.emit(SimEvent::PhaseStart {
            phase,
            message: message.into(),
        });
    }

    pub fn phase_complete(&self, phase: Phase, message: impl Into<String>) {
        self.emit(SimEvent::PhaseComplete {
            phase,
            message: message.into(),
            success: true,
        });
    }

    pub fn progress(&self, phase: Phase, current: u64, total: u64) {
        self.emit(SimEvent::Progress { phase, current, total });
    }

    pub fn warning(&self, message: impl Into<String>, context: impl Into<String>) {
        self.emit(SimEvent::Warning {
            message: message.into(),
            context: context.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>, context: impl Into<String>) {
        self.emit(SimEvent::Error {
            message: message.into(),
            context: context.into(),
        });
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::detached()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use std::sync::Mutex;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check("commits").is_ok());

        clone.cancel();

        assert!(token.is_cancelled());
        let err = token.check("commits").unwrap_err();
        assert!(matches!(err, SimError::Cancelled { ref stage } if stage == "commits"));
    }

    #[test]
    fn test_zero_timeout_fires_immediately() {
        let token = CancelToken::new().with_timeout(Duration::ZERO);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_run_context_forwards_events() {
        let bus = EventBus::shared();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        let ctx = RunContext::new(CancelToken::new(), bus);
        ctx.phase_start(Phase::Commits, "generating");
        ctx.warning("single developer roster", "reviewers");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[1], SimEvent::Warning { .. }));
    }
}
