use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use super::{Player, RunningStat};
use crate::error::StepError;

/// Parameters, optimizer state and running loss of one player.
#[derive(Clone)]
pub struct PlayerState<M, O> {
    pub model: M,
    pub optimizer: O,
    pub loss: RunningStat,
}

impl<M, O> PlayerState<M, O> {
    pub fn new(model: M, optimizer: O) -> Self {
        PlayerState {
            model,
            optimizer,
            loss: RunningStat::new(),
        }
    }

    /// One gradient update, consuming the current state.
    ///
    /// `loss_fn` sees the trainable parameters and closes over the data and
    /// the other player's frozen parameters. The loss is folded into the
    /// running average at position `iteration`. With `check_finite` set, a
    /// NaN/inf loss is reported before any parameter is touched.
    pub fn update<B, F>(
        self,
        player: Player,
        learning_rate: f64,
        iteration: usize,
        check_finite: bool,
        loss_fn: F,
    ) -> Result<Self, StepError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
        F: FnOnce(&M) -> Result<Tensor<B, 1>, StepError>,
    {
        let PlayerState {
            model,
            mut optimizer,
            loss,
        } = self;

        let objective = loss_fn(&model)?;
        let value: f32 = objective.clone().into_scalar().elem();
        if check_finite && !value.is_finite() {
            return Err(StepError::NonFiniteLoss {
                player,
                iteration,
                value,
            });
        }

        let grads = GradientsParams::from_grads(objective.backward(), &model);
        let model = optimizer.step(learning_rate, model, grads);

        Ok(PlayerState {
            model,
            optimizer,
            loss: loss.update(value as f64, iteration),
        })
    }
}

/// Everything threaded from one step to the next.
#[derive(Clone)]
pub struct TrainState<G, D, OG, OD> {
    /// Batches processed so far.
    pub iteration: usize,
    pub discriminator: PlayerState<D, OD>,
    pub generator: PlayerState<G, OG>,
}

/// Running loss averages of both players.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PlayerLosses {
    pub discriminator: f64,
    pub generator: f64,
}

impl<G, D, OG, OD> TrainState<G, D, OG, OD> {
    pub fn new(generator: PlayerState<G, OG>, discriminator: PlayerState<D, OD>) -> Self {
        TrainState {
            iteration: 0,
            discriminator,
            generator,
        }
    }

    pub fn losses(&self) -> PlayerLosses {
        PlayerLosses {
            discriminator: self.discriminator.loss.value(),
            generator: self.generator.loss.value(),
        }
    }
}
