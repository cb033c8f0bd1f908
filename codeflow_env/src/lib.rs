//! Codeflow Environment Layer
//!
//! Shared plumbing for the generation pipeline, kept free of any domain
//! logic so the core and the simulator can both depend on it:
//!
//! - **Errors**: the [`SimError`] taxonomy (configuration, invariant,
//!   resource ceiling, cancellation, I/O)
//! - **Events**: a closed [`SimEvent`] set delivered to an [`EventSink`]
//! - **Cancellation**: a [`CancelToken`] with optional deadline, bundled with
//!   the sink into a [`RunContext`]
//! - **Time**: [`TimeWindow`] ranges for generation and queries
//!
//! # Example
//!
//! ```ignore
//! use codeflow_env::{CancelToken, RunContext, TracingSink};
//! use std::sync::Arc;
//!
//! let ctx = RunContext::new(CancelToken::new(), Arc::new(TracingSink));
//! engine.generate(window, Velocity::Medium, &ctx)?;
//! ```

mod context;
mod error;
mod events;
mod types;

pub use context::{CancelToken, RunContext};
pub use error::{SimError, SimResult};
pub use events::{EventBus, EventSink, NullSink, Phase, SimEvent, TracingSink};
pub use types::TimeWindow;
