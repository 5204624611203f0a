//! Lifecycle events, triggers, and the handler registry.

use std::collections::HashMap;
use std::fmt;

use super::run_loop::RunContext;

/// Lifecycle events fired by [`super::Loop::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Started,
    EpochStarted,
    IterationCompleted,
    EpochCompleted,
    /// Fired instead of `EpochCompleted` when an `IterationCompleted` handler
    /// cut the epoch short.
    EpochHalted,
    Completed,
    /// Fired instead of `Completed` when the run stops early.
    Halted,
}

impl Event {
    pub fn name(self) -> &'static str {
        match self {
            Event::Started => "started",
            Event::EpochStarted => "epoch_started",
            Event::IterationCompleted => "iteration_completed",
            Event::EpochCompleted => "epoch_completed",
            Event::EpochHalted => "epoch_halted",
            Event::Completed => "completed",
            Event::Halted => "halted",
        }
    }

    /// 1-based occurrence counter that triggers are evaluated against.
    pub fn occurrence<S>(self, ctx: &RunContext<S>) -> usize {
        match self {
            Event::IterationCompleted => ctx.iteration,
            Event::EpochStarted | Event::EpochCompleted | Event::EpochHalted => ctx.epoch + 1,
            Event::Started | Event::Completed | Event::Halted => 1,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decides whether a registered handler fires for a given occurrence.
#[derive(Debug, Clone, Copy, Default)]
pub enum Trigger {
    #[default]
    Always,
    /// Every `n`th occurrence. `Every(0)` never fires.
    Every(usize),
    Filter(fn(usize) -> bool),
}

impl Trigger {
    pub fn fires(&self, occurrence: usize) -> bool {
        match *self {
            Trigger::Always => true,
            Trigger::Every(0) => false,
            Trigger::Every(n) => occurrence % n == 0,
            Trigger::Filter(predicate) => predicate(occurrence),
        }
    }
}

/// What a handler asks the loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

/// Observer attached to a loop event.
///
/// Handlers see the run context by shared reference; they can keep their own
/// state but never write into the training state.
pub trait Handler<S, E> {
    fn handle(&mut self, ctx: &RunContext<S>) -> Result<Flow, E>;

    /// Name used in logs and error reports.
    fn name(&self) -> &str {
        "handler"
    }
}

impl<S, E, F> Handler<S, E> for F
where
    F: FnMut(&RunContext<S>) -> Result<Flow, E>,
{
    fn handle(&mut self, ctx: &RunContext<S>) -> Result<Flow, E> {
        self(ctx)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

struct Registered<'a, S, E> {
    trigger: Trigger,
    handler: Box<dyn Handler<S, E> + 'a>,
}

/// Result of dispatching one event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Dispatch {
    Continue,
    /// Name of the handler that asked to halt.
    Halt(String),
}

/// Handler failure tagged with the handler's name.
pub(crate) struct HandlerFailure<E> {
    pub handler: String,
    pub source: E,
}

/// Event → ordered list of (trigger, handler).
pub struct HandlerRegistry<'a, S, E> {
    entries: HashMap<Event, Vec<Registered<'a, S, E>>>,
}

impl<'a, S, E> HandlerRegistry<'a, S, E> {
    pub fn new() -> Self {
        HandlerRegistry {
            entries: HashMap::new(),
        }
    }

    /// Append a handler for `event`. Handlers of one event fire in
    /// registration order.
    pub fn register<H>(&mut self, event: Event, trigger: Trigger, handler: H)
    where
        H: Handler<S, E> + 'a,
    {
        self.entries.entry(event).or_default().push(Registered {
            trigger,
            handler: Box::new(handler),
        });
    }

    /// Number of handlers registered for `event`.
    pub fn len(&self, event: Event) -> usize {
        self.entries.get(&event).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Fire every handler of `event` whose trigger matches. The first halt
    /// short-circuits the rest.
    pub(crate) fn dispatch(
        &mut self,
        event: Event,
        ctx: &RunContext<S>,
    ) -> Result<Dispatch, HandlerFailure<E>> {
        let Some(handlers) = self.entries.get_mut(&event) else {
            return Ok(Dispatch::Continue);
        };
        let occurrence = event.occurrence(ctx);

        for entry in handlers.iter_mut() {
            if !entry.trigger.fires(occurrence) {
                continue;
            }
            let flow = entry.handler.handle(ctx).map_err(|source| HandlerFailure {
                handler: entry.handler.name().to_string(),
                source,
            })?;
            if flow == Flow::Halt {
                let handler = entry.handler.name().to_string();
                tracing::debug!(event = %event, handler = %handler, occurrence, "handler requested halt");
                return Ok(Dispatch::Halt(handler));
            }
        }
        Ok(Dispatch::Continue)
    }
}

impl<S, E> Default for HandlerRegistry<'_, S, E> {
    fn default() -> Self {
        Self::new()
    }
}
