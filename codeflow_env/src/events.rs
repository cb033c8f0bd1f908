//! Typed progress events.
//!
//! Generation reports its progress through a closed set of [`SimEvent`]
//! variants delivered to an [`EventSink`]. Emitting is fire-and-forget: sinks
//! return nothing, so a subscriber can never alter generation control flow.

use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

/// Pipeline phases that report start/complete events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LoadSeed,
    Commits,
    PullRequests,
    Quality,
    Survival,
    Research,
    Export,
}

impl Phase {
    /// Returns the phase name.
    pub fn name(&self) -> &'static str {
        match self {
            Phase::LoadSeed => "load_seed",
            Phase::Commits => "commits",
            Phase::PullRequests => "pull_requests",
            Phase::Quality => "quality",
            Phase::Survival => "survival",
            Phase::Research => "research",
            Phase::Export => "export",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A progress event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    PhaseStart {
        phase: Phase,
        message: String,
    },
    PhaseComplete {
        phase: Phase,
        message: String,
        success: bool,
    },
    Progress {
        phase: Phase,
        current: u64,
        total: u64,
    },
    Warning {
        message: String,
        context: String,
    },
    Error {
        message: String,
        context: String,
    },
}

/// Receiver of progress events.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: &SimEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &SimEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &SimEvent) {
        match event {
            SimEvent::PhaseStart { phase, message } => {
                tracing::info!(phase = phase.name(), "{}", message)
            }
            SimEvent::PhaseComplete { phase, message, success } => {
                tracing::info!(phase = phase.name(), success, "{}", message)
            }
            SimEvent::Progress { phase, current, total } => {
                tracing::debug!(phase = phase.name(), current, total, "progress")
            }
            SimEvent::Warning { message, context } => {
                tracing::warn!(context = context.as_str(), "{}", message)
            }
            SimEvent::Error { message, context } => {
                tracing::error!(context = context.as_str(), "{}", message)
            }
        }
    }
}

type Handler = Box<dyn Fn(&SimEvent) + Send + Sync>;

/// In-memory fan-out bus. Handlers run synchronously in subscription order.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<Handler>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped bus for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Registers a handler for all future events.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&SimEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(handler));
    }

    /// Number of registered handlers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: &SimEvent) {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        for handler in handlers.iter() {
            handler(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
