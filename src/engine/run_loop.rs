use crate::data::DataSource;
use crate::error::LoopError;

use super::event::{Dispatch, Event, Handler, HandlerFailure, HandlerRegistry, Trigger};

/// Snapshot handed to handlers.
#[derive(Debug, Clone)]
pub struct RunContext<S> {
    /// 0-based epoch currently running (or last run, after completion).
    pub epoch: usize,
    /// Batches processed since the run started.
    pub iteration: usize,
    /// Batches processed in the current epoch.
    pub iteration_in_epoch: usize,
    pub state: S,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// A handler of `event` asked the whole run to stop.
    Halted { event: Event },
}

/// Final context plus how the run ended.
#[derive(Debug)]
pub struct RunOutcome<S> {
    pub context: RunContext<S>,
    pub status: RunStatus,
}

impl<S> RunOutcome<S> {
    pub fn is_halted(&self) -> bool {
        matches!(self.status, RunStatus::Halted { .. })
    }

    pub fn into_state(self) -> S {
        self.context.state
    }
}

type InitFn<'a, S, E> = Box<dyn FnMut() -> Result<S, E> + 'a>;
type StepFn<'a, S, T, E> = Box<dyn FnMut(S, T) -> Result<S, E> + 'a>;

/// Generic epoch/batch driver.
///
/// Owns an initializer, a step function and a handler registry. The step
/// function consumes the previous state and returns its replacement; handlers
/// only ever see the state through a shared reference.
pub struct Loop<'a, S, T, E> {
    init_fn: InitFn<'a, S, E>,
    step_fn: StepFn<'a, S, T, E>,
    handlers: HandlerRegistry<'a, S, E>,
}

impl<'a, S, T, E> Loop<'a, S, T, E> {
    /// Build a loop from a step function and an initializer. No side effects.
    pub fn build<F, I>(step_fn: F, init_fn: I) -> Self
    where
        F: FnMut(S, T) -> Result<S, E> + 'a,
        I: FnMut() -> Result<S, E> + 'a,
    {
        Loop {
            init_fn: Box::new(init_fn),
            step_fn: Box::new(step_fn),
            handlers: HandlerRegistry::new(),
        }
    }

    /// Attach `handler` to `event`.
    pub fn register<H>(&mut self, event: Event, trigger: Trigger, handler: H) -> &mut Self
    where
        H: Handler<S, E> + 'a,
    {
        self.handlers.register(event, trigger, handler);
        self
    }

    /// Builder-style [`Loop::register`].
    pub fn with_handler<H>(mut self, event: Event, trigger: Trigger, handler: H) -> Self
    where
        H: Handler<S, E> + 'a,
    {
        self.handlers.register(event, trigger, handler);
        self
    }

    pub fn handlers(&self) -> &HandlerRegistry<'a, S, E> {
        &self.handlers
    }

    /// Run `epochs` passes over `data`.
    ///
    /// A halt requested at `IterationCompleted` ends the current epoch only;
    /// a halt at any other event ends the run. Step and handler errors abort
    /// the run.
    pub fn run<D>(&mut self, data: &D, epochs: usize) -> Result<RunOutcome<S>, LoopError<E>>
    where
        D: DataSource<Batch = T> + ?Sized,
    {
        let state = (self.init_fn)().map_err(LoopError::Init)?;
        let mut ctx = RunContext {
            epoch: 0,
            iteration: 0,
            iteration_in_epoch: 0,
            state,
        };

        if self.fire(Event::Started, &ctx)? {
            return self.halt(ctx, Event::Started);
        }

        for epoch in 0..epochs {
            ctx.epoch = epoch;
            ctx.iteration_in_epoch = 0;

            if self.fire(Event::EpochStarted, &ctx)? {
                return self.halt(ctx, Event::EpochStarted);
            }

            let mut epoch_halted = false;
            for batch in data.batches() {
                ctx.state = (self.step_fn)(ctx.state, batch).map_err(|source| LoopError::Step {
                    epoch,
                    iteration: ctx.iteration,
                    source,
                })?;
                ctx.iteration += 1;
                ctx.iteration_in_epoch += 1;

                if self.fire(Event::IterationCompleted, &ctx)? {
                    epoch_halted = true;
                    break;
                }
            }

            let epoch_end = if epoch_halted {
                tracing::debug!(epoch, iteration = ctx.iteration, "epoch halted early");
                Event::EpochHalted
            } else {
                Event::EpochCompleted
            };
            if self.fire(epoch_end, &ctx)? {
                return self.halt(ctx, epoch_end);
            }
        }

        if self.fire(Event::Completed, &ctx)? {
            return self.halt(ctx, Event::Completed);
        }

        Ok(RunOutcome {
            context: ctx,
            status: RunStatus::Completed,
        })
    }

    /// Dispatch `event`; `Ok(true)` means a handler asked to halt.
    fn fire(&mut self, event: Event, ctx: &RunContext<S>) -> Result<bool, LoopError<E>> {
        match self.handlers.dispatch(event, ctx) {
            Ok(Dispatch::Continue) => Ok(false),
            Ok(Dispatch::Halt(_)) => Ok(true),
            Err(HandlerFailure { handler, source }) => Err(LoopError::Handler {
                event,
                handler,
                source,
            }),
        }
    }

    /// Fire `Halted` and wrap up. Halts requested by `Halted` handlers are
    /// ignored since the run is already stopping.
    fn halt(&mut self, ctx: RunContext<S>, event: Event) -> Result<RunOutcome<S>, LoopError<E>> {
        tracing::debug!(event = %event, epoch = ctx.epoch, iteration = ctx.iteration, "run halted");
        self.fire(Event::Halted, &ctx)?;
        Ok(RunOutcome {
            context: ctx,
            status: RunStatus::Halted { event },
        })
    }
}
