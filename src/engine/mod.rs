//! Generic event-driven training loop: drives a step function over epochs
//! and batches and dispatches lifecycle events to registered handlers.

mod event;
mod run_loop;

pub use event::{Event, Flow, Handler, HandlerRegistry, Trigger};
pub use run_loop::{Loop, RunContext, RunOutcome, RunStatus};
